use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType, Reader};

use crate::errors::ParserError;
use crate::model::{CellValue, RawTable};
use crate::registry::TableParser;

use super::normalize_headers;

/// First worksheet of an xlsx/xlsm/xlsb/xls/ods workbook, first row as header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetParser;

impl SpreadsheetParser {
    const NAME: &'static str = "SPREADSHEET";

    fn mismatch(reason: impl Into<String>) -> ParserError {
        ParserError::FormatMismatch {
            parser: Self::NAME,
            reason: reason.into(),
        }
    }
}

impl TableParser for SpreadsheetParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, path: &Path) -> Result<RawTable, ParserError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|err| Self::mismatch(format!("failed to open workbook: {err}")))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Self::mismatch("workbook has no worksheets"))?
            .map_err(|err| Self::mismatch(format!("failed to read first worksheet: {err}")))?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or(ParserError::EmptyData { parser: Self::NAME })?;
        let headers = normalize_headers(header_row.iter().map(header_text));

        let records = rows
            .map(|row| row.iter().map(cell_value).collect())
            .collect();

        Ok(RawTable::from_records(path, Self::NAME, headers, records))
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Missing,
        Data::String(value) => CellValue::from_text(value),
        Data::Float(value) => CellValue::from_number(*value),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| CellValue::Text(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(CellValue::Missing),
        other => other
            .as_string()
            .map(CellValue::Text)
            .unwrap_or(CellValue::Missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cells_keep_their_value() {
        assert_eq!(cell_value(&Data::Float(21.5)), CellValue::Number(21.5));
        assert_eq!(cell_value(&Data::Int(7)), CellValue::Number(7.0));
    }

    #[test]
    fn blank_nan_and_error_cells_are_missing() {
        assert!(cell_value(&Data::Empty).is_missing());
        assert!(cell_value(&Data::Float(f64::NAN)).is_missing());
        assert!(cell_value(&Data::String("  ".into())).is_missing());
        assert!(cell_value(&Data::String("NaN".into())).is_missing());
    }

    #[test]
    fn text_cells_are_verbatim() {
        assert_eq!(
            cell_value(&Data::String("Saturday, 2/12/2022 - 7:00am - 8:00am".into())),
            CellValue::Text("Saturday, 2/12/2022 - 7:00am - 8:00am".into())
        );
    }
}
