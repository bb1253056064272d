//! State module for tracking scrape and discovery progress
//!
//! # Components
//!
//! - `FailureKind` / `ScrapeOutcome`: how a single scrape attempt ended
//! - `ScrapeState` / `ScrapeStatus`: the persisted freshness record of a product URL
//! - `DiscoveryState`: in-memory sets owned by one discovery run

mod discovery;
mod failure;
mod scrape_status;

pub use discovery::DiscoveryState;
pub use failure::{FailureKind, ScrapeOutcome};
pub use scrape_status::{ScrapeState, ScrapeStatus, StatusUpdate};
