//! Candidate query retrieval
//!
//! A cold start (no watermark) reads only unflagged rows: nothing has been
//! collapsed yet. Once a watermark exists, everything at or after it is read,
//! flagged rows included, so bursts straddling the previous boundary are
//! seen whole. Excluded search types are never read.

use crate::error::Result;
use crate::models::SearchQuery;
use crate::store::{QueryFilter, QueryStore};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Paginated, newest-first reader of one dataset's queries
pub struct QueryFetcher<'a> {
    store: &'a dyn QueryStore,
    limit: usize,
    excluded_search_types: &'a [String],
}

impl<'a> QueryFetcher<'a> {
    pub fn new(
        store: &'a dyn QueryStore,
        limit: usize,
        excluded_search_types: &'a [String],
    ) -> Self {
        Self {
            store,
            limit,
            excluded_search_types,
        }
    }

    /// Fetch up to `limit` rows, newest first
    pub async fn fetch(
        &self,
        dataset_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SearchQuery>> {
        let filter = QueryFilter {
            dataset_id,
            since,
            include_duplicates: since.is_some(),
            excluded_search_types: self.excluded_search_types.to_vec(),
            limit: self.limit,
        };

        let rows = self.store.fetch_queries(&filter).await?;
        debug!(
            %dataset_id,
            since = ?since,
            rows = rows.len(),
            "Fetched query batch"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RAG_SEARCH_TYPE;
    use crate::test_support::{query_at, temp_store};

    async fn seeded() -> (crate::store::SqliteQueryStore, tempfile::TempDir, Uuid) {
        let (store, tmp) = temp_store().await;
        let dataset = Uuid::new_v4();

        let mut rag = query_at(dataset, "rag lookup", 4);
        rag.search_type = RAG_SEARCH_TYPE.to_string();
        let mut flagged = query_at(dataset, "fla", 5);
        flagged.is_duplicate = true;

        store
            .insert_queries(&[
                query_at(dataset, "one", 1),
                query_at(dataset, "two", 2),
                rag,
                flagged,
                query_at(dataset, "flag", 6),
            ])
            .await
            .unwrap();
        (store, tmp, dataset)
    }

    fn texts(rows: &[SearchQuery]) -> Vec<&str> {
        rows.iter().map(|q| q.query.as_str()).collect()
    }

    #[tokio::test]
    async fn test_cold_start_skips_flagged_and_rag() {
        let (store, _tmp, dataset) = seeded().await;
        let excluded = vec![RAG_SEARCH_TYPE.to_string()];
        let fetcher = QueryFetcher::new(&store, 100, &excluded);

        let rows = fetcher.fetch(dataset, None).await.unwrap();
        assert_eq!(texts(&rows), vec!["flag", "two", "one"]);
    }

    #[tokio::test]
    async fn test_resume_includes_flagged_rows_since_watermark() {
        let (store, _tmp, dataset) = seeded().await;
        let excluded = vec![RAG_SEARCH_TYPE.to_string()];
        let fetcher = QueryFetcher::new(&store, 100, &excluded);

        let since = query_at(dataset, "", 2).created_at;
        let rows = fetcher.fetch(dataset, Some(since)).await.unwrap();
        assert_eq!(texts(&rows), vec!["flag", "fla", "two"]);
    }

    #[tokio::test]
    async fn test_limit_caps_batch() {
        let (store, _tmp, dataset) = seeded().await;
        let excluded = vec![RAG_SEARCH_TYPE.to_string()];
        let fetcher = QueryFetcher::new(&store, 2, &excluded);

        let rows = fetcher.fetch(dataset, None).await.unwrap();
        assert_eq!(texts(&rows), vec!["flag", "two"]);
    }
}
