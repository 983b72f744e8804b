//! SQLite-backed query store using sqlx

use super::{DuplicateTx, QueryFilter, QueryStore, SCHEMA_SQL};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{DatasetWatermark, QueryCounts, SearchQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{FromRow, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const QUERY_COLUMNS: &str = "id, query, top_score, created_at, search_type, request_params, \
    latency, results, query_vector, is_duplicate, query_rating, dataset_id";

const INSERT_QUERY_SQL: &str = r#"
    INSERT INTO search_queries (
        id, query, top_score, created_at, search_type, request_params, latency,
        results, query_vector, is_duplicate, query_rating, dataset_id
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Raw `search_queries` row as stored
#[derive(Debug, FromRow)]
struct SearchQueryRow {
    id: String,
    query: String,
    top_score: f64,
    created_at: i64,
    search_type: String,
    request_params: String,
    latency: f64,
    results: String,
    query_vector: String,
    is_duplicate: i64,
    query_rating: String,
    dataset_id: String,
}

impl TryFrom<SearchQueryRow> for SearchQuery {
    type Error = Error;

    fn try_from(row: SearchQueryRow) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            query: row.query,
            top_score: row.top_score,
            created_at: from_micros(row.created_at)?,
            search_type: row.search_type,
            request_params: row.request_params,
            latency: row.latency,
            results: serde_json::from_str(&row.results)?,
            query_vector: serde_json::from_str(&row.query_vector)?,
            is_duplicate: row.is_duplicate != 0,
            query_rating: row.query_rating,
            dataset_id: Uuid::parse_str(&row.dataset_id)?,
        })
    }
}

/// Raw `last_collapsed_dataset` row as stored
#[derive(Debug, FromRow)]
struct WatermarkRow {
    id: String,
    last_collapsed: i64,
    dataset_id: String,
    created_at: i64,
}

impl TryFrom<WatermarkRow> for DatasetWatermark {
    type Error = Error;

    fn try_from(row: WatermarkRow) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            dataset_id: Uuid::parse_str(&row.dataset_id)?,
            last_collapsed: from_micros(row.last_collapsed)?,
            created_at: from_micros(row.created_at)?,
        })
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::InvalidRow(format!("timestamp out of range: {}", micros)))
}

async fn insert_row(conn: &mut SqliteConnection, row: &SearchQuery) -> Result<()> {
    let results = serde_json::to_string(&row.results)?;
    let query_vector = serde_json::to_string(&row.query_vector)?;

    sqlx::query(INSERT_QUERY_SQL)
        .bind(row.id.to_string())
        .bind(&row.query)
        .bind(row.top_score)
        .bind(row.created_at.timestamp_micros())
        .bind(&row.search_type)
        .bind(&row.request_params)
        .bind(row.latency)
        .bind(results)
        .bind(query_vector)
        .bind(i64::from(row.is_duplicate))
        .bind(&row.query_rating)
        .bind(row.dataset_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Query store handle over a bounded SQLite connection pool
#[derive(Clone)]
pub struct SqliteQueryStore {
    pool: SqlitePool,
}

impl SqliteQueryStore {
    /// Connect to the database, creating it and its schema when missing
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        debug!(url = %config.url, "Connecting to SQLite database");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };

        if !store.is_initialized().await? {
            store.init_schema().await?;
        }

        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='search_queries'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Append raw query rows in one transaction
    pub async fn insert_queries(&self, rows: &[SearchQuery]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            insert_row(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueryStore for SqliteQueryStore {
    async fn list_datasets(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT dataset_id FROM search_queries ORDER BY dataset_id")
                .fetch_all(&self.pool)
                .await?;

        ids.iter()
            .map(|id| Uuid::parse_str(id).map_err(Error::from))
            .collect()
    }

    async fn fetch_queries(&self, filter: &QueryFilter) -> Result<Vec<SearchQuery>> {
        // Flagging appends a copy, so each id is resolved to its latest row
        // before flags and the limit are applied
        let mut inner = format!(
            "SELECT {}, rowid AS row_order, \
             ROW_NUMBER() OVER (PARTITION BY id ORDER BY rowid DESC) AS version \
             FROM search_queries WHERE dataset_id = ?",
            QUERY_COLUMNS
        );
        if filter.since.is_some() {
            inner.push_str(" AND created_at >= ?");
        }
        if !filter.excluded_search_types.is_empty() {
            let placeholders = filter
                .excluded_search_types
                .iter()
                .map(|_| "?")
                .collect::<Vec<_>>()
                .join(",");
            inner.push_str(&format!(" AND search_type NOT IN ({})", placeholders));
        }

        let mut sql = format!(
            "SELECT {} FROM ({}) WHERE version = 1",
            QUERY_COLUMNS, inner
        );
        if !filter.include_duplicates {
            sql.push_str(" AND is_duplicate = 0");
        }
        sql.push_str(" ORDER BY created_at DESC, row_order DESC LIMIT ?");

        let mut query =
            sqlx::query_as::<_, SearchQueryRow>(&sql).bind(filter.dataset_id.to_string());
        if let Some(since) = filter.since {
            query = query.bind(since.timestamp_micros());
        }
        for search_type in &filter.excluded_search_types {
            query = query.bind(search_type);
        }
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);

        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.into_iter().map(SearchQuery::try_from).collect()
    }

    async fn latest_watermark(&self, dataset_id: Uuid) -> Result<Option<DatasetWatermark>> {
        let row = sqlx::query_as::<_, WatermarkRow>(
            r#"
            SELECT id, last_collapsed, dataset_id, created_at
            FROM last_collapsed_dataset
            WHERE dataset_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(dataset_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DatasetWatermark::try_from).transpose()
    }

    async fn append_watermark(&self, watermark: &DatasetWatermark) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO last_collapsed_dataset (id, last_collapsed, dataset_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(watermark.id.to_string())
        .bind(watermark.last_collapsed.timestamp_micros())
        .bind(watermark.dataset_id.to_string())
        .bind(watermark.created_at.timestamp_micros())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn begin_duplicates(&self) -> Result<Box<dyn DuplicateTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteDuplicateTx { tx: Mutex::new(tx) }))
    }

    async fn dataset_counts(&self, dataset_id: Uuid) -> Result<QueryCounts> {
        let (total, duplicates): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_duplicate), 0) \
             FROM search_queries WHERE dataset_id = ?",
        )
        .bind(dataset_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let watermarks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM last_collapsed_dataset WHERE dataset_id = ?")
                .bind(dataset_id.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(QueryCounts {
            total_rows: total.max(0) as u64,
            duplicate_rows: duplicates.max(0) as u64,
            watermark_records: watermarks.max(0) as u64,
        })
    }
}

/// One SQLite transaction shared by concurrent inserts.
///
/// A SQLite connection serves one statement at a time, so inserts queue on
/// the mutex. The insert statement is prepared once and reused from the
/// connection's statement cache.
struct SqliteDuplicateTx {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl DuplicateTx for SqliteDuplicateTx {
    async fn insert(&self, row: &SearchQuery) -> Result<()> {
        let mut tx = self.tx.lock().await;
        insert_row(&mut tx, row).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}
