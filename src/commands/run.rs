//! Run command implementation

use crate::config::Config;
use crate::driver::{Driver, RunStats};
use crate::error::Result;
use crate::processor::ProcessOptions;
use crate::store::QueryStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Command-line overrides for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the run to these datasets
    pub dataset_ids: Vec<Uuid>,
    pub dry_run: bool,
    pub time_window_secs: Option<f64>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
}

/// Collapse every dataset (or the requested ones)
pub async fn cmd_run(
    config: &Config,
    store: Arc<dyn QueryStore>,
    options: RunOptions,
) -> Result<RunStats> {
    let mut config = config.clone();
    if let Some(window) = options.time_window_secs {
        config.collapse.time_window_secs = window;
    }
    if let Some(batch_size) = options.batch_size {
        config.collapse.batch_size = batch_size;
    }
    if let Some(concurrency) = options.concurrency {
        config.driver.dataset_concurrency = concurrency;
    }
    config.validate()?;

    let mut process = ProcessOptions::from_config(&config);
    process.dry_run = options.dry_run;

    if options.dry_run {
        info!("Dry run: duplicates and watermarks will not be written");
    }

    let driver = Driver::new(store, process, config.driver.resolved_concurrency());
    let only = (!options.dataset_ids.is_empty()).then_some(options.dataset_ids.as_slice());
    driver.run(only).await
}

/// Print run stats to console
pub fn print_run_stats(stats: &RunStats) {
    if stats.dry_run {
        println!("\nCollapse Dry Run\n");
    } else {
        println!("\nCollapse Complete\n");
    }
    println!(
        "Datasets: {} ({} succeeded, {} failed)",
        stats.datasets_total, stats.datasets_succeeded, stats.datasets_failed
    );
    println!("Rows scanned: {}", stats.rows_scanned);
    println!("Duplicates found: {}", stats.duplicates_found);
    if !stats.dry_run {
        println!("Duplicates written: {}", stats.duplicates_written);
    }

    if !stats.reports.is_empty() {
        println!("\nDatasets:");
        for report in &stats.reports {
            let watermark = report
                .watermark
                .map(|w| w.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {}  {} duplicates, watermark {}",
                report.dataset_id, report.duplicates_found, watermark
            );
        }
    }

    if !stats.errors.is_empty() {
        println!("\nErrors:");
        for error in &stats.errors {
            println!("- {}", error);
        }
    }
}
