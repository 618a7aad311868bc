//! Timestamp normalization and paced CHORDS submission for field-logger
//! exports.

pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod mapper;
pub mod outbound;
pub mod pipeline;
pub mod timestamp;

pub use batch::{FileBatchProcessor, FileSummary, RunSummary};
pub use config::{ConfigError, SubmissionConfig, VariableMapping, VariableSpec};
pub use delivery::{ChordsDelivery, Delivery, DeliveryError};
pub use error::RunError;
pub use mapper::{map_row, RowMapper, VariableRecord};
pub use pipeline::{DrainState, Submission, SubmissionPipeline, DEFAULT_POLL_INTERVAL};
pub use timestamp::{TimestampParseError, TimestampResolver};
