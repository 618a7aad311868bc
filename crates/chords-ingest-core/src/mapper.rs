use chords_ingest_parser::{CellValue, RawRow};
use tracing::{debug, warn};

use crate::config::{VariableMapping, TIMESTAMP_KEY};

/// A row projected onto the short-name vocabulary, stamped with its instant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    at: f64,
    vars: Vec<(String, CellValue)>,
}

impl VariableRecord {
    pub fn new(at: f64) -> Self {
        Self {
            at,
            vars: Vec::new(),
        }
    }

    /// Epoch seconds of the observation.
    pub fn at(&self) -> f64 {
        self.at
    }

    /// Missing cells are never stored; they are dropped here.
    pub fn insert(&mut self, short_name: impl Into<String>, value: CellValue) {
        if value.is_missing() {
            return;
        }
        let short_name = short_name.into();
        match self.vars.iter_mut().find(|(name, _)| *name == short_name) {
            Some((_, existing)) => *existing = value,
            None => self.vars.push((short_name, value)),
        }
    }

    pub fn get(&self, short_name: &str) -> Option<&CellValue> {
        self.vars
            .iter()
            .find(|(name, _)| name == short_name)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        key == TIMESTAMP_KEY || self.get(key).is_some()
    }

    /// Short-named values in mapping order, without `at`.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.vars.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Projects raw rows onto a [`VariableMapping`].
#[derive(Debug, Clone)]
pub struct RowMapper {
    mapping: VariableMapping,
    time_column: String,
}

impl RowMapper {
    pub fn new(mapping: VariableMapping, time_column: impl Into<String>) -> Self {
        Self {
            mapping,
            time_column: time_column.into(),
        }
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn map(&self, row: &RawRow, resolved_at: f64) -> Option<VariableRecord> {
        map_row(row, &self.mapping, &self.time_column, resolved_at)
    }
}

/// Returns `None` when `time_column` is absent from `row`. Otherwise every
/// mapped column that is present and non-missing is copied verbatim.
pub fn map_row(
    row: &RawRow,
    mapping: &VariableMapping,
    time_column: &str,
    resolved_at: f64,
) -> Option<VariableRecord> {
    if !row.contains(time_column) {
        warn!(time_column, "row has no time column, skipping");
        return None;
    }

    let mut record = VariableRecord::new(resolved_at);
    for spec in mapping.iter() {
        let Some(value) = row.get(&spec.column_name) else {
            debug!(
                short_name = %spec.short_name,
                column_name = %spec.column_name,
                "skipping unrecognized column"
            );
            continue;
        };
        record.insert(spec.short_name.clone(), value.clone());
    }

    Some(record)
}
