use std::fmt;
use std::path::{Path, PathBuf};

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// Interprets raw delimited text. Blank cells and `NaN` markers are missing;
    /// everything else is kept verbatim.
    pub fn from_text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            CellValue::Missing
        } else {
            CellValue::Text(value.to_string())
        }
    }

    pub fn from_number(value: f64) -> Self {
        if value.is_nan() {
            CellValue::Missing
        } else {
            CellValue::Number(value)
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole numbers keep one decimal place, so 22.0 is not sent as 22.
            CellValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e16 => {
                write!(f, "{value:.1}")
            }
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Missing => f.write_str("NaN"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::from_text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::from_number(value)
    }
}

/// One row of a table, holding only the cells that were actually present.
/// Rows shorter than the header lack the trailing columns entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }
}

impl<K, V> FromIterator<(K, V)> for RawRow
where
    K: Into<String>,
    V: Into<CellValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub source_path: PathBuf,
    pub format: &'static str,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RawTable {
    pub metadata: TableMetadata,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub(crate) fn from_records(
        path: &Path,
        format: &'static str,
        headers: Vec<String>,
        records: Vec<Vec<CellValue>>,
    ) -> Self {
        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = RawRow::with_capacity(record.len());
                for (name, value) in headers.iter().zip(record) {
                    row.push(name.clone(), value);
                }
                row
            })
            .collect();

        Self {
            metadata: TableMetadata {
                source_path: path.to_path_buf(),
                format,
                headers,
            },
            rows,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.metadata.headers.iter().any(|name| name == column)
    }

    pub fn headers(&self) -> &[String] {
        &self.metadata.headers
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}
