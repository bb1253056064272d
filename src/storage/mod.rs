//! Storage module for persisting scrape data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Scrape status rows, one per known product URL
//! - Product rows and their raw structured-data payload
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteRepository;
pub use traits::{Repository, StorageError, StorageResult};

use crate::state::FailureKind;
use crate::ScoutError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A repository shared between concurrent sessions
///
/// The lock is only ever taken inside synchronous code, never across an await.
pub type SharedRepository = Arc<Mutex<dyn Repository + Send>>;

/// Opens (creating if needed) the repository database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteRepository)` - Successfully initialized repository
/// * `Err(ScoutError)` - Failed to open or initialize the database
pub fn open_repository(path: &Path) -> Result<SqliteRepository, ScoutError> {
    SqliteRepository::new(path)
}

/// Product fields produced by a seller strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub sku: String,
    pub brand: String,
    pub gtin: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Category breadcrumbs, outermost first
    pub categories: Option<Vec<String>>,
    pub price: f64,
    pub availability: String,
    pub offer_url: String,
    pub rating: Option<f64>,
    pub review_count: u32,
}

/// A persisted product, keyed by URL
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub url: String,
    pub seller: String,
    pub scraped: DateTime<Utc>,
    /// The structured-data payload exactly as parsed from the page
    pub json_ld: Value,
    pub details: ProductDetails,
}

/// Predicate for selecting scrape status rows
#[derive(Debug, Clone, PartialEq)]
pub enum StatusFilter {
    All,
    Seller(String),
    NeverScraped,
    /// Last attempt failed, optionally with a specific reason
    Failed(Option<FailureKind>),
    /// Never scraped, or last scraped before the cutoff
    ScrapedBefore(DateTime<Utc>),
}

/// Optional product columns that can be re-derived from the stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    Gtin,
    Rating,
    Description,
    Image,
    Categories,
}

impl ProductField {
    /// The product table column backing this field
    pub fn column(&self) -> &'static str {
        match self {
            Self::Gtin => "gtin",
            Self::Rating => "rating",
            Self::Description => "description",
            Self::Image => "image",
            Self::Categories => "categories",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "gtin" => Some(Self::Gtin),
            "rating" => Some(Self::Rating),
            "description" => Some(Self::Description),
            "image" => Some(Self::Image),
            "categories" => Some(Self::Categories),
            _ => None,
        }
    }

    /// Whether a product currently has a value for this field
    pub fn is_present(&self, details: &ProductDetails) -> bool {
        match self {
            Self::Gtin => details.gtin.is_some(),
            Self::Rating => details.rating.is_some(),
            Self::Description => details.description.is_some(),
            Self::Image => details.image.is_some(),
            Self::Categories => details.categories.is_some(),
        }
    }

    /// Copies this field's value from `source` into `target`, leaving the rest alone
    pub fn copy_value(&self, source: &ProductDetails, target: &mut ProductDetails) {
        match self {
            Self::Gtin => target.gtin = source.gtin.clone(),
            Self::Rating => target.rating = source.rating,
            Self::Description => target.description = source.description.clone(),
            Self::Image => target.image = source.image.clone(),
            Self::Categories => target.categories = source.categories.clone(),
        }
    }
}

/// Represents a batch run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub mode: RunMode,
    pub seller_filter: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counters: RunCounters,
}

/// Per-run tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// URLs attempted (scrape, backfill) or explore iterations (discover)
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// New scrape status rows inserted
    pub discovered: u64,
}

/// What a run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Discover,
    Seed,
    Scrape,
    Backfill,
}

impl RunMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Seed => "seed",
            Self::Scrape => "scrape",
            Self::Backfill => "backfill",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discover" => Some(Self::Discover),
            "seed" => Some(Self::Seed),
            "scrape" => Some(Self::Scrape),
            "backfill" => Some(Self::Backfill),
            _ => None,
        }
    }
}

/// Status of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
