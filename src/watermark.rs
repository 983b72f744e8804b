//! Per-dataset collapse watermarks
//!
//! Watermark records are append-only. The authoritative watermark of a
//! dataset is the one carried by its most recently inserted record, no
//! matter whether that timestamp is older or newer than earlier records.

use crate::error::Result;
use crate::models::DatasetWatermark;
use crate::store::QueryStore;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Read/append access to dataset watermarks
pub struct WatermarkStore<'a> {
    store: &'a dyn QueryStore,
}

impl<'a> WatermarkStore<'a> {
    pub fn new(store: &'a dyn QueryStore) -> Self {
        Self { store }
    }

    /// The furthest-collapsed timestamp, or `None` for a never-processed dataset
    pub async fn get(&self, dataset_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let latest = self.store.latest_watermark(dataset_id).await?;
        Ok(latest.map(|w| w.last_collapsed))
    }

    /// Append a new watermark record
    pub async fn set(&self, dataset_id: Uuid, last_collapsed: DateTime<Utc>) -> Result<()> {
        let record = DatasetWatermark::new(dataset_id, last_collapsed);
        self.store.append_watermark(&record).await?;
        debug!(%dataset_id, %last_collapsed, record_id = %record.id, "Watermark appended");
        Ok(())
    }
}
