mod common;
mod delimited;
mod spreadsheet;

pub use delimited::DelimitedParser;
pub use spreadsheet::SpreadsheetParser;

pub(crate) use common::normalize_headers;
