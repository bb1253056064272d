//! Shelf-Scout: a browser-driven grocery product crawler
//!
//! This crate discovers product URLs on grocery sites by walking their category
//! menus in a real browser, extracts the embedded schema.org `Product` payload from
//! each product page, and keeps per-URL scrape freshness so that repeated batch runs
//! only revisit what has gone stale.

pub mod config;
pub mod crawler;
pub mod output;
pub mod renderer;
pub mod seller;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Shelf-Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Browser error: {0}")]
    Render(#[from] renderer::RenderError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
///
/// Everything in here is fatal: it means the seller table or the config file is
/// wrong, not that a page misbehaved.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown seller: {0}")]
    UnknownSeller(String),

    #[error("URL does not belong to any known seller: {0}")]
    UnrecognizedUrl(String),

    #[error("Invalid URL pattern for seller {seller}: {message}")]
    InvalidPattern { seller: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Shelf-Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use seller::{get_seller_from_url, SellerRegistry};
pub use state::{FailureKind, ScrapeOutcome, ScrapeState};
pub use url::{normalize_url, UrlExtractor};
