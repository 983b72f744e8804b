//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::models::QueryCounts;
use crate::store::QueryStore;
use crate::watermark::WatermarkStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Collapse state of one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStatus {
    pub dataset_id: Uuid,
    pub watermark: Option<DateTime<Utc>>,
    pub counts: QueryCounts,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: Option<String>,
    pub database_url: String,
    pub datasets: Vec<DatasetStatus>,
}

/// Get per-dataset watermarks and row counts
pub async fn cmd_status(
    config: &Config,
    store: &dyn QueryStore,
    dataset_ids: &[Uuid],
) -> Result<StatusInfo> {
    info!("Getting status");

    let mut datasets = store.list_datasets().await?;
    if !dataset_ids.is_empty() {
        datasets.retain(|id| dataset_ids.contains(id));
    }

    let watermarks = WatermarkStore::new(store);
    let mut statuses = Vec::with_capacity(datasets.len());
    for dataset_id in datasets {
        statuses.push(DatasetStatus {
            dataset_id,
            watermark: watermarks.get(dataset_id).await?,
            counts: store.dataset_counts(dataset_id).await?,
        });
    }

    Ok(StatusInfo {
        config_path: config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string()),
        database_url: config.database.url.clone(),
        datasets: statuses,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\nquery-collapse Status\n");
    println!(
        "Configuration: {}",
        status.config_path.as_deref().unwrap_or("(defaults)")
    );
    println!("Database: {}", status.database_url);

    if status.datasets.is_empty() {
        println!("\nNo datasets found.");
        return;
    }

    println!("\nDatasets:");
    for dataset in &status.datasets {
        println!("• {}", dataset.dataset_id);
        match dataset.watermark {
            Some(w) => println!("  Watermark: {}", w.to_rfc3339()),
            None => println!("  Watermark: never collapsed"),
        }
        println!(
            "  Rows: {}, Duplicates: {}, Watermark records: {}",
            dataset.counts.total_rows,
            dataset.counts.duplicate_rows,
            dataset.counts.watermark_records
        );
    }
}
