use std::path::Path;

use tracing::debug;

use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{DelimitedParser, SpreadsheetParser};
use crate::model::RawTable;

pub trait TableParser {
    fn name(&self) -> &'static str;
    fn parse(&self, path: &Path) -> Result<RawTable, ParserError>;
}

/// Loads `path` as a spreadsheet, falling back to delimited text split on
/// `delimiter`.
pub fn load_table_file(path: &Path, delimiter: u8) -> Result<RawTable, ParserError> {
    let spreadsheet = SpreadsheetParser;
    let delimited = DelimitedParser::new(delimiter);
    let parsers: [&dyn TableParser; 2] = [&spreadsheet, &delimited];
    parse_with_parsers(path, &parsers)
}

pub fn parse_with_parsers(
    path: &Path,
    parsers: &[&dyn TableParser],
) -> Result<RawTable, ParserError> {
    if !path.is_file() {
        return Err(ParserError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let mut attempts = Vec::new();

    for parser in parsers {
        match parser.parse(path) {
            Ok(table) => return Ok(table),
            Err(ParserError::FormatMismatch { reason, .. }) => {
                debug!(file = %path.display(), parser = parser.name(), %reason, "format mismatch");
                attempts.push(ParserAttempt::new(parser.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingParser {
        path: path.to_path_buf(),
        attempts,
    })
}
