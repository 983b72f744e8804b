//! Query log storage
//!
//! This module defines the store contract the collapse engine depends on:
//! - Dataset enumeration
//! - Ordered, filtered query retrieval
//! - Append-only watermark records
//! - Transactional appends of duplicate copies
//!
//! [`SqliteQueryStore`] is the sqlx-backed implementation.

mod schema;
mod sqlite;

pub use schema::*;
pub use sqlite::*;

use crate::error::Result;
use crate::models::{DatasetWatermark, QueryCounts, SearchQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Selection of query rows for one dataset
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub dataset_id: Uuid,
    /// Only rows created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Include rows already carrying the duplicate flag
    pub include_duplicates: bool,
    /// Search types left out entirely
    pub excluded_search_types: Vec<String>,
    pub limit: usize,
}

/// Read/write access to the query and watermark tables.
///
/// Implementations must tolerate concurrent use from many dataset workers.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Distinct dataset identifiers present in the query table
    async fn list_datasets(&self) -> Result<Vec<Uuid>>;

    /// Rows matching `filter`, newest first, at most `filter.limit`.
    ///
    /// Each id appears once, as its most recently inserted row; the
    /// duplicate filter applies to that row.
    async fn fetch_queries(&self, filter: &QueryFilter) -> Result<Vec<SearchQuery>>;

    /// The most recently inserted watermark record for a dataset
    async fn latest_watermark(&self, dataset_id: Uuid) -> Result<Option<DatasetWatermark>>;

    /// Append a watermark record
    async fn append_watermark(&self, watermark: &DatasetWatermark) -> Result<()>;

    /// Open a transaction for appending duplicate copies
    async fn begin_duplicates(&self) -> Result<Box<dyn DuplicateTx>>;

    /// Row counts for a dataset
    async fn dataset_counts(&self, dataset_id: Uuid) -> Result<QueryCounts>;
}

/// An open duplicate-append transaction.
///
/// `insert` takes `&self` so a bounded set of inserts can be in flight at
/// once. Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait DuplicateTx: Send + Sync {
    async fn insert(&self, row: &SearchQuery) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
