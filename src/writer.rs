//! Duplicate persistence
//!
//! All rows of one `write` call go through a single transaction. Rows are
//! sent in fixed-size batches; inside a batch up to `concurrency` inserts are
//! in flight at once. The first failed insert rolls the whole call back.

use crate::error::{Error, Result};
use crate::models::SearchQuery;
use crate::store::QueryStore;
use futures::stream::{self, TryStreamExt};
use tracing::{debug, warn};

/// Appends duplicate-flagged copies of query rows
pub struct DuplicateWriter<'a> {
    store: &'a dyn QueryStore,
    batch_size: usize,
    concurrency: usize,
}

impl<'a> DuplicateWriter<'a> {
    pub fn new(store: &'a dyn QueryStore, batch_size: usize, concurrency: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Persist `duplicates`; returns the number of rows written
    pub async fn write(&self, duplicates: &[SearchQuery]) -> Result<usize> {
        if duplicates.is_empty() {
            return Ok(0);
        }

        let tx = self.store.begin_duplicates().await?;

        for (index, batch) in duplicates.chunks(self.batch_size).enumerate() {
            let tx_ref = tx.as_ref();
            let inserted = stream::iter(batch.iter().map(Ok::<_, Error>))
                .try_for_each_concurrent(self.concurrency, |row| tx_ref.insert(row))
                .await;

            if let Err(e) = inserted {
                warn!(batch = index, error = %e, "Duplicate insert failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }

            debug!(batch = index, rows = batch.len(), "Duplicate batch inserted");
        }

        tx.commit().await?;
        Ok(duplicates.len())
    }
}
