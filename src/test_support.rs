//! Shared fixtures for unit tests

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{DatasetWatermark, QueryCounts, SearchQuery};
use crate::store::{DuplicateTx, QueryFilter, QueryStore, SqliteQueryStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// 2024-01-01T00:00:00Z
const BASE_EPOCH_SECS: i64 = 1_704_067_200;

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_EPOCH_SECS, 0).unwrap()
}

/// A plain, unflagged query created `secs` after the base instant
pub fn query_at(dataset_id: Uuid, text: &str, secs: i64) -> SearchQuery {
    query_at_micros(dataset_id, text, secs * 1_000_000)
}

pub fn query_at_micros(dataset_id: Uuid, text: &str, micros: i64) -> SearchQuery {
    SearchQuery {
        id: Uuid::new_v4(),
        query: text.to_string(),
        top_score: 0.5,
        created_at: base_time() + ChronoDuration::microseconds(micros),
        search_type: "search".to_string(),
        request_params: "{}".to_string(),
        latency: 12.5,
        results: Vec::new(),
        query_vector: Vec::new(),
        is_duplicate: false,
        query_rating: String::new(),
        dataset_id,
    }
}

/// A fresh SQLite store in a temporary directory
pub async fn temp_store() -> (SqliteQueryStore, TempDir) {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", tmp.path().join("test.db").display()),
        max_connections: 5,
        busy_timeout_secs: 5,
    };
    let store = SqliteQueryStore::connect(&config).await.unwrap();
    (store, tmp)
}

fn injected(what: &str) -> Error {
    Error::Io(std::io::Error::other(format!("injected {} failure", what)))
}

/// Wraps a real store and fails or slows chosen operations
pub struct FaultyStore {
    inner: Arc<SqliteQueryStore>,
    failing_datasets: HashSet<Uuid>,
    fail_fetch_after: Option<usize>,
    fail_insert_at: Option<usize>,
    fail_watermark_append: bool,
    fetch_delay: Option<Duration>,
    fetches: AtomicUsize,
    counters: Arc<TxCounters>,
    pub transactions_begun: AtomicUsize,
    pub rollbacks: Arc<AtomicUsize>,
    pub max_inserts_in_flight: Arc<AtomicUsize>,
}

#[derive(Default)]
struct TxCounters {
    inserts: AtomicUsize,
    in_flight: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<SqliteQueryStore>) -> Self {
        Self {
            inner,
            failing_datasets: HashSet::new(),
            fail_fetch_after: None,
            fail_insert_at: None,
            fail_watermark_append: false,
            fetch_delay: None,
            fetches: AtomicUsize::new(0),
            counters: Arc::new(TxCounters::default()),
            transactions_begun: AtomicUsize::new(0),
            rollbacks: Arc::new(AtomicUsize::new(0)),
            max_inserts_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every fetch for `dataset_id` fails
    pub fn fail_dataset(mut self, dataset_id: Uuid) -> Self {
        self.failing_datasets.insert(dataset_id);
        self
    }

    /// The first `n` fetches succeed, later ones fail
    pub fn fail_fetch_after(mut self, n: usize) -> Self {
        self.fail_fetch_after = Some(n);
        self
    }

    /// The `n`th insert (1-based, across transactions) fails
    pub fn fail_insert_at(mut self, n: usize) -> Self {
        self.fail_insert_at = Some(n);
        self
    }

    pub fn fail_watermark_append(mut self) -> Self {
        self.fail_watermark_append = true;
        self
    }

    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }
}

#[async_trait]
impl QueryStore for FaultyStore {
    async fn list_datasets(&self) -> Result<Vec<Uuid>> {
        self.inner.list_datasets().await
    }

    async fn fetch_queries(&self, filter: &QueryFilter) -> Result<Vec<SearchQuery>> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_datasets.contains(&filter.dataset_id) {
            return Err(injected("fetch"));
        }
        let call = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_fetch_after.is_some_and(|n| call > n) {
            return Err(injected("fetch"));
        }
        self.inner.fetch_queries(filter).await
    }

    async fn latest_watermark(&self, dataset_id: Uuid) -> Result<Option<DatasetWatermark>> {
        self.inner.latest_watermark(dataset_id).await
    }

    async fn append_watermark(&self, watermark: &DatasetWatermark) -> Result<()> {
        if self.fail_watermark_append {
            return Err(injected("watermark"));
        }
        self.inner.append_watermark(watermark).await
    }

    async fn begin_duplicates(&self) -> Result<Box<dyn DuplicateTx>> {
        self.transactions_begun.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.begin_duplicates().await?;
        Ok(Box::new(FaultyTx {
            inner,
            fail_insert_at: self.fail_insert_at,
            counters: self.counters.clone(),
            rollbacks: self.rollbacks.clone(),
            max_in_flight: self.max_inserts_in_flight.clone(),
        }))
    }

    async fn dataset_counts(&self, dataset_id: Uuid) -> Result<QueryCounts> {
        self.inner.dataset_counts(dataset_id).await
    }
}

struct FaultyTx {
    inner: Box<dyn DuplicateTx>,
    fail_insert_at: Option<usize>,
    counters: Arc<TxCounters>,
    rollbacks: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl DuplicateTx for FaultyTx {
    async fn insert(&self, row: &SearchQuery) -> Result<()> {
        let call = self.counters.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        // Let sibling inserts start so the in-flight bound is observable
        tokio::task::yield_now().await;

        let result = if self.fail_insert_at == Some(call) {
            Err(injected("insert"))
        } else {
            self.inner.insert(row).await
        };

        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}
