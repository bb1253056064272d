//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{FailureKind, ScrapeStatus, StatusUpdate};
use crate::storage::{
    ProductField, ProductRecord, RunCounters, RunMode, RunRecord, RunStatus, StatusFilter,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No scrape status for URL: {0}")]
    UrlNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    /// A uniqueness constraint rejected a product write
    #[error("Duplicate product URL: {0}")]
    DuplicateUrl(String),

    #[error("Seller mismatch for {url}: URL belongs to {expected}, record says {actual}")]
    SellerMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Corrupt row for {url}: {reason}")]
    CorruptRow { url: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler. Callers
/// share one repository behind a mutex, so every method is a short synchronous
/// operation.
pub trait Repository {
    // ===== Run Management =====

    /// Creates a new batch run
    ///
    /// # Arguments
    ///
    /// * `mode` - What the run does
    /// * `seller_filter` - The seller name, or `all`
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, mode: RunMode, seller_filter: &str, config_hash: &str)
        -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Records the final status, counters and finish timestamp of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()>;

    // ===== Scrape Status =====

    /// Seeds a scrape status row if the URL is not known yet
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A new row was inserted
    /// * `Ok(false)` - The URL already had a row, which is left untouched
    /// * `Err(SellerMismatch)` - The URL is not owned by `seller`, or by any seller
    fn upsert_scrape_status(&mut self, url: &str, seller: &str) -> StorageResult<bool>;

    /// Records the outcome of a scrape attempt
    ///
    /// Fails with `UrlNotFound` if the URL was never seeded.
    fn update_scrape_status(&mut self, url: &str, update: &StatusUpdate) -> StorageResult<()>;

    fn get_scrape_status(&self, url: &str) -> StorageResult<Option<ScrapeStatus>>;

    /// URLs of the status rows matching a filter, ordered by URL
    fn find_urls(&self, filter: &StatusFilter) -> StorageResult<Vec<String>>;

    /// Full status rows matching a filter, ordered by URL
    fn find_statuses(&self, filter: &StatusFilter) -> StorageResult<Vec<ScrapeStatus>>;

    // ===== Products =====

    /// Inserts or replaces the product row for `record.url`
    ///
    /// Fails with `SellerMismatch` when the record's seller disagrees with the
    /// seller owning the URL, and with `DuplicateUrl` when a uniqueness constraint
    /// rejects the write.
    fn upsert_product(&mut self, record: &ProductRecord) -> StorageResult<()>;

    /// Writes a scrape result atomically
    ///
    /// The product upsert (when given) and the status update either both land or
    /// neither does.
    fn record_scrape(
        &mut self,
        url: &str,
        product: Option<&ProductRecord>,
        update: &StatusUpdate,
    ) -> StorageResult<()>;

    fn get_product(&self, url: &str) -> StorageResult<Option<ProductRecord>>;

    /// Products with no value in `field`, ordered by URL
    fn find_products_missing(&self, field: ProductField) -> StorageResult<Vec<ProductRecord>>;

    // ===== Statistics =====

    fn count_statuses(&self) -> StorageResult<u64>;

    fn count_products(&self) -> StorageResult<u64>;

    fn count_never_scraped(&self) -> StorageResult<u64>;

    /// Rows whose last scrape is older than the cutoff (never-scraped rows excluded)
    fn count_scraped_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Scrape status rows per seller
    fn count_statuses_by_seller(&self) -> StorageResult<HashMap<String, u64>>;

    /// Failed rows per failure reason
    fn count_failures(&self) -> StorageResult<HashMap<FailureKind, u64>>;
}
