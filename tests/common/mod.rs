//! Shared fixtures for the integration tests
//!
//! `FixtureSite` is a scripted grocery site: a map from URL to page content plus a
//! set of clickable elements. `FixtureFactory` hands out `FixtureRenderer`
//! sessions over one site and logs every page they load.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelf_scout::config::{
    BrowserConfig, Config, DiscoveryConfig, OutputConfig, ScrapeConfig,
};
use shelf_scout::renderer::{ElementRef, PageRenderer, RenderError, RenderResult, SessionFactory};
use shelf_scout::state::{FailureKind, ScrapeStatus, StatusUpdate};
use shelf_scout::storage::{
    ProductField, ProductRecord, Repository, RunCounters, RunMode, RunRecord, RunStatus,
    SqliteRepository, StatusFilter, StorageError, StorageResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ASDA_MILK: &str = "https://groceries.asda.com/product/milk/910000";
pub const ASDA_EGGS: &str = "https://groceries.asda.com/product/eggs/910001";
pub const ASDA_BREAD: &str = "https://groceries.asda.com/product/bread/910002";
pub const TESCO_BEANS: &str = "https://www.tesco.com/groceries/en-GB/products/254656543";

/// Configuration tuned for fast tests
pub fn test_config() -> Config {
    Config {
        browser: BrowserConfig {
            headless: true,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) TestAgent".to_string(),
            window_width: 1366,
            window_height: 900,
        },
        discovery: DiscoveryConfig {
            click_every: 1,
            flush_every: 2,
            poll_interval_ms: 1,
            transient_retry_pause_ms: 1,
            max_iterations: 6,
        },
        scrape: ScrapeConfig {
            freshness_days: 2,
            wait_timeout_secs: 1,
            poll_interval_ms: 5,
            sessions: 1,
        },
        output: OutputConfig {
            database_path: ":memory:".to_string(),
        },
        sellers: vec![],
    }
}

/// An in-memory repository wrapped for sharing between sessions
pub fn shared_repository() -> Arc<Mutex<SqliteRepository>> {
    Arc::new(Mutex::new(SqliteRepository::open_in_memory().unwrap()))
}

/// A product page carrying one ld+json block
pub fn product_page(url: &str, name: Option<&str>, sku: &str) -> String {
    let name = name
        .map(|n| format!(r#""name": "{}","#, n))
        .unwrap_or_default();
    format!(
        r#"<html><head><title>Product</title>
        <script type="application/ld+json">{{"@context": "https://schema.org", "@type": "Organization", "name": "Shop"}}</script>
        <script type="application/ld+json">{{
            "@context": "https://schema.org",
            "@type": "Product",
            {name}
            "sku": "{sku}",
            "gtin13": "50{sku}",
            "brand": {{"@type": "Brand", "name": "Farm Fresh"}},
            "offers": {{
                "@type": "Offer",
                "price": "1.25",
                "priceCurrency": "GBP",
                "availability": "https://schema.org/InStock",
                "url": "{url}"
            }}
        }}</script>
        </head><body><h1>Product</h1></body></html>"#
    )
}

/// A page whose product payload never renders
pub fn loading_page() -> String {
    "<html><body><div class=\"spinner\">Loading...</div></body></html>".to_string()
}

/// A clickable element rendered on every page
#[derive(Debug, Clone)]
pub struct FixtureElement {
    pub label: String,
    /// Page loaded when the element is clicked
    pub target: Option<String>,
}

/// A scripted site
#[derive(Debug, Default)]
pub struct FixtureSite {
    pages: HashMap<String, String>,
    elements: HashMap<String, Vec<FixtureElement>>,
    /// Clicks that fail with a stale element before succeeding
    stale_clicks: AtomicUsize,
    /// Content reads after which every call reports a lost session
    lose_session_after_reads: Option<usize>,
    reads: AtomicUsize,
    loads: Mutex<Vec<String>>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, content: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), content.into());
        self
    }

    pub fn element(mut self, selector: &str, label: &str, target: Option<&str>) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(FixtureElement {
                label: label.to_string(),
                target: target.map(String::from),
            });
        self
    }

    pub fn stale_clicks(self, count: usize) -> Self {
        self.stale_clicks.store(count, Ordering::SeqCst);
        self
    }

    pub fn lose_session_after_reads(mut self, reads: usize) -> Self {
        self.lose_session_after_reads = Some(reads);
        self
    }

    /// Every URL loaded by any session, in order
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    fn check_session(&self) -> RenderResult<()> {
        match self.lose_session_after_reads {
            Some(limit) if self.reads.load(Ordering::SeqCst) >= limit => {
                Err(RenderError::SessionLost("fixture connection closed".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// One scripted browser tab
pub struct FixtureRenderer {
    site: Arc<FixtureSite>,
    current: Option<String>,
    pub closed: bool,
}

impl FixtureRenderer {
    pub fn new(site: Arc<FixtureSite>) -> Self {
        Self {
            site,
            current: None,
            closed: false,
        }
    }
}

#[async_trait]
impl PageRenderer for FixtureRenderer {
    async fn load(&mut self, url: &str) -> RenderResult<()> {
        self.site.check_session()?;
        self.site.loads.lock().unwrap().push(url.to_string());
        if !self.site.pages.contains_key(url) {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: "404".to_string(),
            });
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn current_content(&mut self) -> RenderResult<String> {
        self.site.check_session()?;
        self.site.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .current
            .as_ref()
            .and_then(|url| self.site.pages.get(url))
            .cloned()
            .unwrap_or_else(|| "<html></html>".to_string()))
    }

    async fn find_elements(&mut self, selector: &str) -> RenderResult<Vec<ElementRef>> {
        self.site.check_session()?;
        Ok(self
            .site
            .elements
            .get(selector)
            .map(|elements| {
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, e)| ElementRef {
                        selector: selector.to_string(),
                        index,
                        label: e.label.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn click(&mut self, element: &ElementRef) -> RenderResult<()> {
        self.site.check_session()?;
        let stale = self.site.stale_clicks.load(Ordering::SeqCst);
        if stale > 0 {
            self.site.stale_clicks.store(stale - 1, Ordering::SeqCst);
            return Err(RenderError::StaleElement(element.label.clone()));
        }

        let target = self
            .site
            .elements
            .get(&element.selector)
            .and_then(|elements| elements.get(element.index))
            .ok_or_else(|| RenderError::StaleElement(element.label.clone()))?
            .target
            .clone();
        if let Some(url) = target {
            self.load(&url).await?;
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, _element: &ElementRef) -> RenderResult<()> {
        self.site.check_session()
    }

    async fn close(&mut self) -> RenderResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Opens fixture sessions over one site
pub struct FixtureFactory {
    pub site: Arc<FixtureSite>,
    pub sessions_opened: AtomicUsize,
}

impl FixtureFactory {
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site: Arc::new(site),
            sessions_opened: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionFactory for FixtureFactory {
    async fn open_session(&self) -> RenderResult<Box<dyn PageRenderer>> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureRenderer::new(Arc::clone(&self.site))))
    }
}

/// A repository whose product writes for chosen URLs hit a uniqueness conflict
pub struct ConflictingRepository {
    pub inner: SqliteRepository,
    pub conflicts: HashSet<String>,
}

impl ConflictingRepository {
    pub fn new(conflicts: &[&str]) -> Self {
        Self {
            inner: SqliteRepository::open_in_memory().unwrap(),
            conflicts: conflicts.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Repository for ConflictingRepository {
    fn create_run(
        &mut self,
        mode: RunMode,
        seller_filter: &str,
        config_hash: &str,
    ) -> StorageResult<i64> {
        self.inner.create_run(mode, seller_filter, config_hash)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        self.inner.finish_run(run_id, status, counters)
    }

    fn upsert_scrape_status(&mut self, url: &str, seller: &str) -> StorageResult<bool> {
        self.inner.upsert_scrape_status(url, seller)
    }

    fn update_scrape_status(&mut self, url: &str, update: &StatusUpdate) -> StorageResult<()> {
        self.inner.update_scrape_status(url, update)
    }

    fn get_scrape_status(&self, url: &str) -> StorageResult<Option<ScrapeStatus>> {
        self.inner.get_scrape_status(url)
    }

    fn find_urls(&self, filter: &StatusFilter) -> StorageResult<Vec<String>> {
        self.inner.find_urls(filter)
    }

    fn find_statuses(&self, filter: &StatusFilter) -> StorageResult<Vec<ScrapeStatus>> {
        self.inner.find_statuses(filter)
    }

    fn upsert_product(&mut self, record: &ProductRecord) -> StorageResult<()> {
        if self.conflicts.contains(&record.url) {
            return Err(StorageError::DuplicateUrl(record.url.clone()));
        }
        self.inner.upsert_product(record)
    }

    fn record_scrape(
        &mut self,
        url: &str,
        product: Option<&ProductRecord>,
        update: &StatusUpdate,
    ) -> StorageResult<()> {
        if product.is_some() && self.conflicts.contains(url) {
            return Err(StorageError::DuplicateUrl(url.to_string()));
        }
        self.inner.record_scrape(url, product, update)
    }

    fn get_product(&self, url: &str) -> StorageResult<Option<ProductRecord>> {
        self.inner.get_product(url)
    }

    fn find_products_missing(&self, field: ProductField) -> StorageResult<Vec<ProductRecord>> {
        self.inner.find_products_missing(field)
    }

    fn count_statuses(&self) -> StorageResult<u64> {
        self.inner.count_statuses()
    }

    fn count_products(&self) -> StorageResult<u64> {
        self.inner.count_products()
    }

    fn count_never_scraped(&self) -> StorageResult<u64> {
        self.inner.count_never_scraped()
    }

    fn count_scraped_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        self.inner.count_scraped_before(cutoff)
    }

    fn count_statuses_by_seller(&self) -> StorageResult<HashMap<String, u64>> {
        self.inner.count_statuses_by_seller()
    }

    fn count_failures(&self) -> StorageResult<HashMap<FailureKind, u64>> {
        self.inner.count_failures()
    }
}
