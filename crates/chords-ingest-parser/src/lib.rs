//! Loading of field-logger exports (spreadsheets or delimited text) into rows
//! addressable by column name.

pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use formats::{DelimitedParser, SpreadsheetParser};
pub use model::{CellValue, RawRow, RawTable, TableMetadata};
pub use registry::{load_table_file, parse_with_parsers, TableParser};
