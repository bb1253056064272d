//! Statistics generation from the scrape database
//!
//! This module provides functionality for extracting and displaying
//! scrape freshness statistics from the storage layer.

use crate::state::FailureKind;
use crate::storage::{Repository, RunRecord};
use crate::ScoutError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Scrape statistics summary
#[derive(Debug, Clone)]
pub struct ScrapeStatistics {
    /// Known product URLs (scrape status rows)
    pub total: u64,

    /// Distinct products stored
    pub unique: u64,

    /// URLs whose last scrape is older than the freshness threshold
    pub outdated: u64,

    /// URLs never attempted
    pub not_yet_scraped: u64,

    /// Known URLs per seller
    pub by_seller: HashMap<String, u64>,

    /// Failed URLs per failure reason
    pub failures: HashMap<FailureKind, u64>,

    /// The most recent batch run, if any
    pub latest_run: Option<RunRecord>,
}

impl ScrapeStatistics {
    /// URLs that are neither stale nor unscraped
    pub fn fresh(&self) -> u64 {
        self.total
            .saturating_sub(self.outdated)
            .saturating_sub(self.not_yet_scraped)
    }

    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `repo` - The repository to query
/// * `freshness_days` - Age after which a scrape counts as outdated
/// * `now` - Reference time for the freshness cutoff
///
/// # Returns
///
/// * `Ok(ScrapeStatistics)` - Successfully loaded statistics
/// * `Err(ScoutError)` - Failed to query statistics
pub fn load_statistics(
    repo: &dyn Repository,
    freshness_days: u32,
    now: DateTime<Utc>,
) -> Result<ScrapeStatistics, ScoutError> {
    let cutoff = now - Duration::days(i64::from(freshness_days));

    Ok(ScrapeStatistics {
        total: repo.count_statuses()?,
        unique: repo.count_products()?,
        outdated: repo.count_scraped_before(cutoff)?,
        not_yet_scraped: repo.count_never_scraped()?,
        by_seller: repo.count_statuses_by_seller()?,
        failures: repo.count_failures()?,
        latest_run: repo.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &ScrapeStatistics) {
    println!("=== Scrape Statistics ===\n");

    println!("Overview:");
    println!("  total: {}", stats.total);
    println!("  unique: {}", stats.unique);
    println!("  outdated: {}", stats.outdated);
    println!("  notyetscraped: {}", stats.not_yet_scraped);
    println!("  fresh: {}", stats.fresh());
    println!();

    if !stats.by_seller.is_empty() {
        println!("URLs by Seller:");
        let mut sellers: Vec<_> = stats.by_seller.iter().collect();
        sellers.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (seller, count) in sellers {
            let percentage = if stats.total > 0 {
                (*count as f64 / stats.total as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", seller, count, percentage);
        }
        println!();
    }

    if !stats.failures.is_empty() {
        println!("Failures ({}):", stats.failed());
        let mut failures: Vec<_> = stats.failures.iter().collect();
        failures.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (kind, count) in failures {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!(
            "Latest run: #{} {} ({}) started {}, {} processed",
            run.id,
            run.mode.to_db_string(),
            run.status.to_db_string(),
            run.started_at,
            run.counters.processed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ScrapeOutcome, StatusUpdate};
    use crate::storage::SqliteRepository;
    use chrono::TimeZone;

    const MILK: &str = "https://groceries.asda.com/product/milk/910000";
    const EGGS: &str = "https://groceries.asda.com/product/eggs/910001";
    const BREAD: &str = "https://www.tesco.com/groceries/en-GB/products/300000";

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_load_statistics() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_scrape_status(MILK, "asda").unwrap();
        repo.upsert_scrape_status(EGGS, "asda").unwrap();
        repo.upsert_scrape_status(BREAD, "tesco").unwrap();

        repo.update_scrape_status(
            MILK,
            &StatusUpdate::from_outcome(ScrapeOutcome::Failure(FailureKind::Timeout), day(1)),
        )
        .unwrap();
        repo.update_scrape_status(
            BREAD,
            &StatusUpdate::from_outcome(ScrapeOutcome::Failure(FailureKind::JsonDecode), day(9)),
        )
        .unwrap();

        let stats = load_statistics(&repo, 2, day(10)).unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.unique, 0);
        assert_eq!(stats.outdated, 1);
        assert_eq!(stats.not_yet_scraped, 1);
        assert_eq!(stats.fresh(), 1);
        assert_eq!(stats.by_seller.get("asda"), Some(&2));
        assert_eq!(stats.failures.get(&FailureKind::Timeout), Some(&1));
        assert_eq!(stats.failed(), 2);
        assert!(stats.latest_run.is_none());
    }

    #[test]
    fn test_fresh_never_underflows() {
        let stats = ScrapeStatistics {
            total: 1,
            unique: 0,
            outdated: 1,
            not_yet_scraped: 1,
            by_seller: HashMap::new(),
            failures: HashMap::new(),
            latest_run: None,
        };
        assert_eq!(stats.fresh(), 0);
    }
}
