//! Query log records and collapse watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Search type that never takes part in collapsing (retrieval calls, not typed queries)
pub const RAG_SEARCH_TYPE: &str = "rag";

/// One logged search query event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub id: Uuid,
    pub query: String,
    pub top_score: f64,
    pub created_at: DateTime<Utc>,
    pub search_type: String,
    /// Serialized request parameters, stored verbatim
    pub request_params: String,
    pub latency: f64,
    pub results: Vec<String>,
    pub query_vector: Vec<f32>,
    pub is_duplicate: bool,
    pub query_rating: String,
    pub dataset_id: Uuid,
}

impl SearchQuery {
    /// Copy of this row carrying the duplicate flag, ready to be appended
    pub fn as_duplicate(&self) -> Self {
        Self {
            is_duplicate: true,
            ..self.clone()
        }
    }

    /// Query text with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.query.trim()
    }
}

/// A collapse watermark record. The store keeps every record; the most
/// recently inserted one per dataset is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetWatermark {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub last_collapsed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DatasetWatermark {
    pub fn new(dataset_id: Uuid, last_collapsed: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            last_collapsed,
            created_at: Utc::now(),
        }
    }
}

/// Row counts for one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCounts {
    /// Every stored row, duplicate copies included
    pub total_rows: u64,
    /// Rows carrying the duplicate flag
    pub duplicate_rows: u64,
    /// Watermark records appended for the dataset
    pub watermark_records: u64,
}
