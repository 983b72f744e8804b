//! Dataset fan-out
//!
//! Every dataset gets its own task; a counting semaphore bounds how many run
//! at once. Datasets are independent, so one failure never cancels the
//! others. Only failing to enumerate datasets aborts the run.

use crate::error::{Error, Result};
use crate::processor::{DatasetProcessor, DatasetReport, ProcessOptions};
use crate::store::QueryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Aggregate outcome of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub dry_run: bool,
    pub datasets_total: usize,
    pub datasets_succeeded: usize,
    pub datasets_failed: usize,
    pub rows_scanned: usize,
    pub duplicates_found: usize,
    pub duplicates_written: usize,
    pub reports: Vec<DatasetReport>,
    pub errors: Vec<String>,
}

impl RunStats {
    fn record(&mut self, report: DatasetReport) {
        self.datasets_succeeded += 1;
        self.rows_scanned += report.rows_scanned;
        self.duplicates_found += report.duplicates_found;
        self.duplicates_written += report.duplicates_written;
        self.reports.push(report);
    }

    fn record_failure(&mut self, message: String) {
        self.datasets_failed += 1;
        self.errors.push(message);
    }
}

/// Runs a [`DatasetProcessor`] per dataset under a concurrency bound
pub struct Driver {
    store: Arc<dyn QueryStore>,
    options: ProcessOptions,
    concurrency: usize,
}

impl Driver {
    pub fn new(store: Arc<dyn QueryStore>, options: ProcessOptions, concurrency: usize) -> Self {
        Self {
            store,
            options,
            concurrency: concurrency.max(1),
        }
    }

    /// Process every dataset in the store, or only those in `only`
    pub async fn run(&self, only: Option<&[Uuid]>) -> Result<RunStats> {
        let mut datasets = self.store.list_datasets().await?;
        if let Some(only) = only {
            for id in only {
                if !datasets.contains(id) {
                    warn!(dataset_id = %id, "Requested dataset has no queries");
                }
            }
            datasets.retain(|id| only.contains(id));
        }

        info!(
            datasets = datasets.len(),
            concurrency = self.concurrency,
            dry_run = self.options.dry_run,
            "Starting collapse run"
        );

        let stats = self.process_all(datasets).await?;

        info!(
            succeeded = stats.datasets_succeeded,
            failed = stats.datasets_failed,
            duplicates = stats.duplicates_found,
            "Collapse run finished"
        );
        Ok(stats)
    }

    async fn process_all(&self, datasets: Vec<Uuid>) -> Result<RunStats> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut stats = RunStats {
            dry_run: self.options.dry_run,
            datasets_total: datasets.len(),
            ..Default::default()
        };

        for dataset_id in datasets {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::PoolClosed)?;
            let processor = DatasetProcessor::new(self.store.clone(), self.options.clone());

            join_set.spawn(async move {
                let _permit = permit;
                (dataset_id, processor.run(dataset_id).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(report))) => stats.record(report),
                Ok((dataset_id, Err(e))) => {
                    warn!(%dataset_id, "Dataset left for the next run");
                    stats.record_failure(e.to_string());
                }
                Err(e) => {
                    error!(error = %e, "Dataset task aborted");
                    stats.record_failure(format!("Dataset task aborted: {}", e));
                }
            }
        }

        stats.reports.sort_by_key(|r| r.dataset_id);
        Ok(stats)
    }
}
