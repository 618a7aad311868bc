// crates/chords-ingest-core/src/error.rs

use std::path::PathBuf;

use chords_ingest_parser::ParserError;
use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::timestamp::TimestampParseError;

/// Conditions that end a run. Rows without a time value are skipped and never
/// surface here.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to load {}: {source}", path.display())]
    FileLoad {
        path: PathBuf,
        #[source]
        source: ParserError,
    },

    #[error("{} does not contain a \"{column}\" column", path.display())]
    MissingTimeColumn { path: PathBuf, column: String },

    #[error("{} row {row}: {source}", path.display())]
    Timestamp {
        path: PathBuf,
        row: usize,
        #[source]
        source: TimestampParseError,
    },

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

pub type Result<T> = std::result::Result<T, RunError>;
