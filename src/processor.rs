//! Per-dataset collapse loop
//!
//! One dataset is processed as a strictly sequential loop:
//!
//! ```text
//! Start -> FetchingInitial -> Collapsing -> Writing -> FetchingNext -+-> Finalizing
//!                                  ^                                 |
//!                                  +---------------------------------+
//! ```
//!
//! The loop ends when a fetch comes back empty or makes no progress (its
//! oldest row is the oldest row of the previous batch). After each completed
//! write the local watermark moves to the newest row of that batch; it is
//! persisted once at the end, and also after a failure so that completed
//! iterations are not redone. The I/O of each iteration shares one deadline.

use crate::collapse::collapse_queries;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::QueryFetcher;
use crate::models::SearchQuery;
use crate::store::QueryStore;
use crate::watermark::WatermarkStore;
use crate::writer::DuplicateWriter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Step of the per-dataset loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    FetchingInitial,
    Collapsing,
    Writing,
    FetchingNext,
    Finalizing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Start => write!(f, "loading watermark"),
            Phase::FetchingInitial => write!(f, "fetching initial batch"),
            Phase::Collapsing => write!(f, "collapsing"),
            Phase::Writing => write!(f, "writing duplicates"),
            Phase::FetchingNext => write!(f, "fetching next batch"),
            Phase::Finalizing => write!(f, "persisting watermark"),
        }
    }
}

/// Settings for one dataset pass
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub batch_size: usize,
    pub time_window_secs: f64,
    pub excluded_search_types: Vec<String>,
    pub iteration_timeout: Duration,
    pub write_batch_size: usize,
    pub write_concurrency: usize,
    /// Collapse and report without writing duplicates or watermarks
    pub dry_run: bool,
}

impl ProcessOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.collapse.batch_size,
            time_window_secs: config.collapse.time_window_secs,
            excluded_search_types: config.collapse.excluded_search_types.clone(),
            iteration_timeout: config.collapse.iteration_timeout(),
            write_batch_size: config.writer.batch_size,
            write_concurrency: config.writer.concurrency,
            dry_run: false,
        }
    }
}

/// Outcome of one successful dataset pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetReport {
    pub dataset_id: Uuid,
    /// Watermark the pass started from (`None` on a cold start)
    pub resumed_from: Option<DateTime<Utc>>,
    /// Watermark reached by the last completed iteration
    pub watermark: Option<DateTime<Utc>>,
    pub watermark_persisted: bool,
    pub iterations: usize,
    pub rows_scanned: usize,
    pub duplicates_found: usize,
    pub duplicates_written: usize,
}

impl DatasetReport {
    fn new(dataset_id: Uuid) -> Self {
        Self {
            dataset_id,
            resumed_from: None,
            watermark: None,
            watermark_persisted: false,
            iterations: 0,
            rows_scanned: 0,
            duplicates_found: 0,
            duplicates_written: 0,
        }
    }
}

/// Runs the fetch, collapse, write loop for one dataset at a time
pub struct DatasetProcessor {
    store: Arc<dyn QueryStore>,
    options: ProcessOptions,
}

impl DatasetProcessor {
    pub fn new(store: Arc<dyn QueryStore>, options: ProcessOptions) -> Self {
        Self { store, options }
    }

    /// Collapse everything new in `dataset_id`.
    ///
    /// Errors carry the phase they happened in. The persisted watermark never
    /// moves past the last completed iteration.
    pub async fn run(&self, dataset_id: Uuid) -> Result<DatasetReport> {
        info!(%dataset_id, "Processing dataset");

        let mut report = DatasetReport::new(dataset_id);
        let outcome = self.collapse_dataset(dataset_id, &mut report).await;

        self.finalize(&mut report).await;

        match outcome {
            Ok(()) => {
                info!(
                    %dataset_id,
                    iterations = report.iterations,
                    rows = report.rows_scanned,
                    duplicates = report.duplicates_found,
                    "Processed dataset"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    %dataset_id,
                    phase = ?e.phase(),
                    watermark = ?report.watermark,
                    error = %e,
                    "Dataset processing stopped"
                );
                Err(e)
            }
        }
    }

    async fn collapse_dataset(&self, dataset_id: Uuid, report: &mut DatasetReport) -> Result<()> {
        let store = self.store.as_ref();
        let watermarks = WatermarkStore::new(store);
        let fetcher = QueryFetcher::new(
            store,
            self.options.batch_size,
            &self.options.excluded_search_types,
        );
        let writer = DuplicateWriter::new(
            store,
            self.options.write_batch_size,
            self.options.write_concurrency,
        );

        let deadline = self.deadline();
        let resumed_from = self
            .step(dataset_id, Phase::Start, deadline, watermarks.get(dataset_id))
            .await?;
        report.resumed_from = resumed_from;
        report.watermark = resumed_from;

        match resumed_from {
            Some(since) => info!(%dataset_id, %since, "Resuming from watermark"),
            None => info!(%dataset_id, "No watermark, cold start"),
        }

        let mut batch = self
            .step(
                dataset_id,
                Phase::FetchingInitial,
                deadline,
                fetcher.fetch(dataset_id, resumed_from),
            )
            .await?;

        while !batch.is_empty() {
            let deadline = self.deadline();

            enter(dataset_id, Phase::Collapsing);
            let duplicates = new_duplicates(&batch, self.options.time_window_secs);
            report.iterations += 1;
            report.rows_scanned += batch.len();
            report.duplicates_found += duplicates.len();

            if !self.options.dry_run {
                report.duplicates_written += self
                    .step(dataset_id, Phase::Writing, deadline, writer.write(&duplicates))
                    .await?;
            }

            // Batches are newest first
            let newest = batch[0].created_at;
            report.watermark = Some(newest);

            let next = self
                .step(
                    dataset_id,
                    Phase::FetchingNext,
                    deadline,
                    fetcher.fetch(dataset_id, Some(newest)),
                )
                .await?;

            let stalled = next.last().map(|q| q.id) == batch.last().map(|q| q.id);
            if next.is_empty() || stalled {
                break;
            }
            batch = next;
        }

        Ok(())
    }

    /// Persist the reached watermark. Best effort: a failure is logged and
    /// leaves already committed duplicates in place.
    async fn finalize(&self, report: &mut DatasetReport) {
        let Some(watermark) = report.watermark else {
            return;
        };
        if self.options.dry_run || report.resumed_from == Some(watermark) {
            return;
        }

        let watermarks = WatermarkStore::new(self.store.as_ref());
        let persisted = self
            .step(
                report.dataset_id,
                Phase::Finalizing,
                self.deadline(),
                watermarks.set(report.dataset_id, watermark),
            )
            .await;

        match persisted {
            Ok(()) => report.watermark_persisted = true,
            Err(e) => error!(
                dataset_id = %report.dataset_id,
                %watermark,
                error = %e,
                "Failed to persist watermark"
            ),
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.options.iteration_timeout
    }

    /// Run one I/O step under `deadline`, tagging failures with the phase
    async fn step<T, F>(
        &self,
        dataset_id: Uuid,
        phase: Phase,
        deadline: Instant,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        enter(dataset_id, phase);
        match timeout_at(deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::dataset(dataset_id, phase, e)),
            Err(_) => Err(Error::dataset(
                dataset_id,
                phase,
                Error::Timeout(self.options.iteration_timeout),
            )),
        }
    }
}

/// Duplicates in `batch` that are not flagged yet. A resumed fetch re-reads
/// rows flagged by an earlier run; appending them again would change nothing.
fn new_duplicates(batch: &[SearchQuery], window_secs: f64) -> Vec<SearchQuery> {
    let flagged: HashSet<Uuid> = batch
        .iter()
        .filter(|q| q.is_duplicate)
        .map(|q| q.id)
        .collect();

    collapse_queries(batch, window_secs)
        .into_iter()
        .filter(|q| !flagged.contains(&q.id))
        .collect()
}

fn enter(dataset_id: Uuid, phase: Phase) {
    debug!(%dataset_id, %phase, "Entering phase");
}
