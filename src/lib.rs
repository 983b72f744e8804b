//! query-collapse: incremental deduplication of typing-burst search queries
//!
//! Search logs record every intermediate prefix a user types ("a", "ap",
//! "app", "apple"). This crate finds those bursts per dataset, flags all but
//! the most complete query of each burst, and remembers how far each dataset
//! has been processed so later runs only look at new rows.

pub mod collapse;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod models;
pub mod processor;
pub mod store;
pub mod watermark;
pub mod writer;

#[cfg(test)]
mod test_support;
