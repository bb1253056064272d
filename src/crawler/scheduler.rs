//! Scrape scheduling
//!
//! This module decides which known product URLs are due for a (re)scrape and in
//! what order:
//! - A URL is due if it was never scraped or its last scrape is older than the
//!   freshness threshold
//! - Each seller's due URLs form a queue, never-scraped first, then oldest first
//! - The queues are interleaved round-robin so no seller starves the others

use crate::state::ScrapeStatus;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

/// A URL selected for scraping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledUrl {
    pub url: String,
    pub seller: String,

    /// None if the URL has never been scraped
    pub last_scraped: Option<DateTime<Utc>>,
}

impl From<ScrapeStatus> for ScheduledUrl {
    fn from(status: ScrapeStatus) -> Self {
        Self {
            url: status.url,
            seller: status.seller,
            last_scraped: status.last_scraped,
        }
    }
}

// Staleness order within one seller: never scraped first (None sorts before
// Some), then oldest, then URL so that plans are deterministic
impl Ord for ScheduledUrl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.last_scraped
            .cmp(&other.last_scraped)
            .then_with(|| self.url.cmp(&other.url))
    }
}

impl PartialOrd for ScheduledUrl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Selects and orders due URLs
#[derive(Debug, Clone)]
pub struct ScrapeScheduler {
    threshold: Duration,
    limit: Option<usize>,
}

impl ScrapeScheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    ///
    /// * `threshold` - How old a scrape may get before the URL is due again
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            limit: None,
        }
    }

    /// Scheduler with a threshold of whole days
    pub fn from_days(days: u32) -> Self {
        Self::new(Duration::days(i64::from(days)))
    }

    /// Truncates every plan to at most `limit` URLs, after interleaving
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Scrapes older than this instant are stale
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.threshold
    }

    pub fn is_due(&self, status: &ScrapeStatus, now: DateTime<Utc>) -> bool {
        match status.last_scraped {
            None => true,
            Some(last) => last < self.cutoff(now),
        }
    }

    /// Orders the due URLs among `statuses`
    ///
    /// Statuses that are not due are dropped. Sellers take turns in name order,
    /// each contributing its stalest remaining URL per turn, until every queue is
    /// empty.
    pub fn plan<I>(&self, statuses: I, now: DateTime<Utc>) -> Vec<ScheduledUrl>
    where
        I: IntoIterator<Item = ScrapeStatus>,
    {
        let mut by_seller: BTreeMap<String, Vec<ScheduledUrl>> = BTreeMap::new();
        for status in statuses {
            if self.is_due(&status, now) {
                by_seller
                    .entry(status.seller.clone())
                    .or_default()
                    .push(ScheduledUrl::from(status));
            }
        }

        let mut queues: Vec<VecDeque<ScheduledUrl>> = by_seller
            .into_values()
            .map(|mut urls| {
                urls.sort();
                VecDeque::from(urls)
            })
            .collect();

        let total: usize = queues.iter().map(VecDeque::len).sum();
        let cap = self.limit.map_or(total, |limit| limit.min(total));
        let mut plan = Vec::with_capacity(cap);

        while plan.len() < cap {
            for queue in queues.iter_mut() {
                if plan.len() == cap {
                    break;
                }
                if let Some(next) = queue.pop_front() {
                    plan.push(next);
                }
            }
            queues.retain(|q| !q.is_empty());
        }

        plan
    }
}
