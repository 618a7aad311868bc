use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chords_ingest_parser::{load_table_file, CellValue, ParserError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SubmissionConfig;
use crate::delivery::Delivery;
use crate::error::{Result, RunError};
use crate::mapper::RowMapper;
use crate::pipeline::{DrainState, SubmissionPipeline, DEFAULT_POLL_INTERVAL};
use crate::timestamp::TimestampResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: PathBuf,
    pub format: &'static str,
    pub rows: usize,
    pub submitted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,
    pub drain: DrainState,
}

impl RunSummary {
    pub fn total_submitted(&self) -> usize {
        self.files.iter().map(|file| file.submitted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.files.iter().map(|file| file.skipped).sum()
    }
}

/// Drives every file of a run through resolution, mapping and submission,
/// strictly in order.
pub struct FileBatchProcessor {
    config: SubmissionConfig,
    pipeline: SubmissionPipeline,
    resolver: TimestampResolver,
    mapper: RowMapper,
    reference_year: i32,
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
}

impl FileBatchProcessor {
    pub fn new(config: SubmissionConfig, delivery: Arc<dyn Delivery>, reference_year: i32) -> Self {
        let mapper = RowMapper::new(config.variables.clone(), config.time_column_name.clone());
        Self {
            config,
            pipeline: SubmissionPipeline::new(delivery),
            resolver: TimestampResolver::default(),
            mapper,
            reference_year,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Lets the caller stop the final drain early.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub async fn run(&self, files: &[PathBuf]) -> Result<RunSummary> {
        // A missing file anywhere in the list fails the run before anything is sent.
        for path in files {
            if !path.is_file() {
                error!(file = %path.display(), "file does not exist");
                return Err(RunError::FileLoad {
                    path: path.clone(),
                    source: ParserError::NotFound { path: path.clone() },
                });
            }
        }

        self.pipeline.start(&self.config)?;

        let mut summaries = Vec::with_capacity(files.len());
        for path in files {
            info!(file = %path.display(), "handling file");
            summaries.push(self.process_file(path).await?);
        }

        let drain = self
            .pipeline
            .drain(self.poll_interval, self.cancel.as_ref())
            .await;

        Ok(RunSummary {
            files: summaries,
            drain,
        })
    }

    pub async fn process_file(&self, path: &Path) -> Result<FileSummary> {
        let time_column = self.mapper.time_column();

        let table = load_table_file(path, self.config.delimiter).map_err(|source| {
            error!(file = %path.display(), error = %source, "failed to parse file");
            RunError::FileLoad {
                path: path.to_path_buf(),
                source,
            }
        })?;

        if !table.has_column(time_column) {
            error!(file = %path.display(), column = time_column, "time column missing, can not parse");
            return Err(RunError::MissingTimeColumn {
                path: path.to_path_buf(),
                column: time_column.to_string(),
            });
        }
        debug!(file = %path.display(), format = table.metadata.format, headers = ?table.headers(), "parsed file");

        let mut summary = FileSummary {
            path: path.to_path_buf(),
            format: table.metadata.format,
            rows: table.height(),
            submitted: 0,
            skipped: 0,
        };

        for (row_index, row) in table.rows.iter().enumerate() {
            // Only a row too short to reach the time column is skipped. A blank
            // or NaN time cell is malformed content and fails in the resolver.
            let Some(raw_time) = row.get(time_column).map(CellValue::to_string) else {
                warn!(file = %path.display(), row = row_index, "no time for row, skipping");
                summary.skipped += 1;
                continue;
            };

            let at = self
                .resolver
                .resolve(&raw_time, self.reference_year, self.config.timezone)
                .map_err(|source| {
                    error!(
                        file = %path.display(),
                        row = row_index,
                        raw = %raw_time,
                        "unparseable timestamp, aborting"
                    );
                    RunError::Timestamp {
                        path: path.to_path_buf(),
                        row: row_index,
                        source,
                    }
                })?;

            let Some(record) = self.mapper.map(row, at) else {
                summary.skipped += 1;
                continue;
            };

            self.pipeline.submit(&record, &self.config).await?;
            summary.submitted += 1;
        }

        info!(
            file = %path.display(),
            rows = summary.rows,
            submitted = summary.submitted,
            skipped = summary.skipped,
            "file complete"
        );
        Ok(summary)
    }
}
