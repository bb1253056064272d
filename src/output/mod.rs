//! Output module for reporting scrape state
//!
//! This module handles:
//! - Computing freshness and failure statistics from the repository
//! - Printing them for the operator

pub mod stats;

pub use stats::{load_statistics, print_statistics, ScrapeStatistics};
