use crate::storage::{Repository, StorageError, StorageResult};
use std::collections::{BTreeSet, HashSet};

/// In-memory progress of one discovery run
///
/// Owned by a single explorer run. Everything discovered is kept in `discovered`
/// for deduplication; URLs not yet written to the repository wait in `pending`
/// until the next flush.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryState {
    /// Every product URL seen during this run
    discovered: HashSet<String>,

    /// Menu item labels already clicked
    visited_menu_items: HashSet<String>,

    /// Discovered URLs awaiting the next flush
    pending: BTreeSet<String>,

    /// Explore iterations completed
    iterations: u64,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions a batch of extracted URLs into the run
    ///
    /// # Returns
    ///
    /// The number of URLs not seen before in this run
    pub fn record_urls<I>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for url in urls {
            if self.discovered.insert(url.clone()) {
                self.pending.insert(url);
                added += 1;
            }
        }
        added
    }

    /// Records a menu item as clicked; returns false if it was already visited
    pub fn mark_visited(&mut self, label: &str) -> bool {
        self.visited_menu_items.insert(label.to_string())
    }

    pub fn is_visited(&self, label: &str) -> bool {
        self.visited_menu_items.contains(label)
    }

    /// Advances the iteration counter and returns the new value
    pub fn tick(&mut self) -> u64 {
        self.iterations += 1;
        self.iterations
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited_menu_items.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Writes pending URLs as scrape status seed rows (insert-if-absent)
    ///
    /// On a storage error the URLs that were not written stay pending so a later
    /// flush can retry them. A URL the seller does not own is dropped and the
    /// mismatch is returned.
    ///
    /// # Returns
    ///
    /// The number of rows that did not exist before
    pub fn flush<R>(&mut self, repo: &mut R, seller: &str) -> StorageResult<usize>
    where
        R: Repository + ?Sized,
    {
        let mut inserted = 0;
        while let Some(url) = self.pending.pop_first() {
            match repo.upsert_scrape_status(&url, seller) {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e @ StorageError::SellerMismatch { .. }) => return Err(e),
                Err(e) => {
                    self.pending.insert(url);
                    return Err(e);
                }
            }
        }
        Ok(inserted)
    }
}
