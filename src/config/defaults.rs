//! Default values for configuration

/// Environment variable carrying the database connection string
pub const DATABASE_URL_ENV: &str = "COLLAPSE_DATABASE_URL";

/// Default database URL; `DATABASE_URL_ENV` overrides it at load time
pub fn default_database_url() -> String {
    "sqlite://query-collapse.db".to_string()
}

/// Default connection pool size
pub fn default_max_connections() -> u32 {
    10
}

/// Default SQLite busy timeout in seconds
pub fn default_busy_timeout_secs() -> u64 {
    5
}

/// Default number of queries fetched per iteration
pub fn default_fetch_batch_size() -> usize {
    5000
}

/// Default typing-burst window in seconds
pub fn default_time_window_secs() -> f64 {
    5.0
}

/// Search types never collapsed
pub fn default_excluded_search_types() -> Vec<String> {
    vec![crate::models::RAG_SEARCH_TYPE.to_string()]
}

/// Default deadline for one fetch/collapse/write iteration
pub fn default_iteration_timeout_secs() -> u64 {
    120
}

/// Default rows per duplicate-insert batch
pub fn default_write_batch_size() -> usize {
    100
}

/// Default concurrent inserts within a batch
pub fn default_write_concurrency() -> usize {
    10
}

/// Default dataset worker count (0 = twice the logical CPU count)
pub fn default_dataset_concurrency() -> usize {
    0
}
