//! SQLite schema definition

/// SQL schema for the query log database.
///
/// Timestamps are microseconds since the Unix epoch. Both tables are
/// append-only; insertion order (rowid) breaks timestamp ties.
pub const SCHEMA_SQL: &str = r#"
-- Search queries: one row per logged query, plus appended duplicate copies
CREATE TABLE IF NOT EXISTS search_queries (
    id TEXT NOT NULL,
    query TEXT NOT NULL,
    top_score REAL NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    search_type TEXT NOT NULL,
    request_params TEXT NOT NULL DEFAULT '',
    latency REAL NOT NULL DEFAULT 0,
    results TEXT NOT NULL DEFAULT '[]',
    query_vector TEXT NOT NULL DEFAULT '[]',
    is_duplicate INTEGER NOT NULL DEFAULT 0,
    query_rating TEXT NOT NULL DEFAULT '',
    dataset_id TEXT NOT NULL
);

-- Collapse watermarks: latest inserted row per dataset is authoritative
CREATE TABLE IF NOT EXISTS last_collapsed_dataset (
    id TEXT PRIMARY KEY,
    last_collapsed INTEGER NOT NULL,
    dataset_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_queries_dataset_created ON search_queries(dataset_id, created_at);
CREATE INDEX IF NOT EXISTS idx_queries_id ON search_queries(id);
CREATE INDEX IF NOT EXISTS idx_watermarks_dataset ON last_collapsed_dataset(dataset_id, created_at);
"#;
