use std::path::Path;

use csv::{ErrorKind, ReaderBuilder};

use crate::errors::ParserError;
use crate::model::{CellValue, RawTable};
use crate::registry::TableParser;

use super::normalize_headers;

/// Delimited text with a single header row.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedParser {
    delimiter: u8,
}

impl Default for DelimitedParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl DelimitedParser {
    const NAME: &'static str = "DELIMITED";

    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn map_csv_error(err: csv::Error) -> ParserError {
        match err.kind() {
            ErrorKind::Utf8 { .. } => ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!("content is not UTF-8 text: {err}"),
            },
            _ => ParserError::Csv {
                parser: Self::NAME,
                source: err,
            },
        }
    }
}

impl TableParser for DelimitedParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, path: &Path) -> Result<RawTable, ParserError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(Self::map_csv_error)?;

        let header_record = reader.headers().map_err(Self::map_csv_error)?.clone();
        if header_record.is_empty() {
            return Err(ParserError::EmptyData { parser: Self::NAME });
        }
        let headers = normalize_headers(header_record.iter().map(str::to_string));

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.map_err(Self::map_csv_error)?;
            records.push(record.iter().map(CellValue::from_text).collect());
        }

        Ok(RawTable::from_records(path, Self::NAME, headers, records))
    }
}
