//! Crawler module for product discovery and scraping
//!
//! This module contains the core crawling logic, including:
//! - Category menu exploration that discovers product URLs
//! - Product page parsing through per-seller strategies
//! - Freshness- and fairness-based scrape scheduling
//! - Overall batch coordination

mod coordinator;
mod explorer;
mod parser;
mod scheduler;

pub use coordinator::{BackfillReport, BatchSummary, Coordinator};
pub use explorer::{
    DiscoveryReport, ExplorerPhase, ExplorerSettings, MenuStep, NavigationExplorer,
    TerminationCause,
};
pub use parser::{parse_content, persist_outcome, ProductParser};
pub use scheduler::{ScheduledUrl, ScrapeScheduler};
