use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chords_ingest_core::{
    ChordsDelivery, DrainState, FileBatchProcessor, RunSummary, SubmissionConfig,
};
use chrono::{Datelike, Local};
use clap::Parser;
use comfy_table::Table;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Submit field-logger exports to a CHORDS portal, one paced record per row.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data files or glob patterns, processed in the order given
    #[arg(short, long, required = true, num_args = 1..)]
    files: Vec<String>,
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: PathBuf,
    /// Build and log records without sending them
    #[arg(short, long)]
    test: bool,
    /// Enable debug logging
    #[arg(long)]
    debug: bool,
    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
    /// Year assumed for range timestamps that omit it [default: current year]
    #[arg(long)]
    year: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Loaded first so a RUST_LOG kept in .env reaches the filter.
    dotenvy::dotenv().ok();
    init_tracing(cli.debug, cli.json_logs);
    debug!("debug logging enabled");

    info!(config = %cli.config.display(), "starting chords-ingest");
    let config = SubmissionConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?
        .with_credentials(
            env::var("CHORDS_API_EMAIL").ok(),
            env::var("CHORDS_API_KEY").ok(),
        )
        .with_test_mode(cli.test);

    let files = expand_files(&cli.files)?;

    let year = cli.year.unwrap_or_else(|| Local::now().year());
    if cli.year.is_none() {
        info!(year, "no --year given, range timestamps without a year use the current year");
    }

    let delivery = ChordsDelivery::new(config.retry_delay)
        .context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    watch_interrupts(cancel.clone());

    let processor = FileBatchProcessor::new(config, Arc::new(delivery), year)
        .with_cancellation(cancel);
    let summary = processor.run(&files).await?;

    print_summary(&summary);

    if let DrainState::Draining { remaining } = summary.drain {
        bail!("{remaining} records were still queued when the run stopped");
    }

    info!("all done");
    Ok(())
}

fn env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_tracing(debug: bool, json: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(debug));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn expand_files(args: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for arg in args {
        if !arg.contains(['*', '?', '[']) {
            files.push(PathBuf::from(arg));
            continue;
        }

        let before = files.len();
        for entry in glob::glob(arg).with_context(|| format!("invalid glob pattern '{arg}'"))? {
            files.push(entry.with_context(|| format!("could not read a match of '{arg}'"))?);
        }
        if files.len() == before {
            bail!("pattern '{arg}' matched no files");
        }
    }
    Ok(files)
}

/// First Ctrl-C stops waiting on the delivery queue; a second exits at once.
fn watch_interrupts(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, queued records will not be waited for; press Ctrl-C again to exit now");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table.set_header(vec!["File", "Format", "Rows", "Submitted", "Skipped"]);
    for file in &summary.files {
        table.add_row(vec![
            file.path.display().to_string(),
            file.format.to_string(),
            file.rows.to_string(),
            file.submitted.to_string(),
            file.skipped.to_string(),
        ]);
    }
    println!("{table}");
    println!(
        "Submitted {} records, skipped {} rows.",
        summary.total_submitted(),
        summary.total_skipped()
    );
}
