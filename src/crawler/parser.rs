//! Product page parsing
//!
//! This module turns one product URL into one scrape outcome:
//! - Loading the page and waiting for its structured-data payload
//! - Choosing and decoding the seller's payload block
//! - Mapping it through the seller strategy into a product record
//! - Persisting the product and the status update in one transaction

use crate::config::ScrapeConfig;
use crate::renderer::{ld_json_blocks, PageRenderer, RenderError, WaitCondition};
use crate::seller::{SellerProfile, SellerRegistry};
use crate::state::{FailureKind, ScrapeOutcome, StatusUpdate};
use crate::storage::{ProductRecord, Repository, StorageError};
use crate::ScoutError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Maps rendered page content to a product record
///
/// This is the pure half of the parser: no browser, no database. A page that
/// yields no usable record is classified by the returned `FailureKind`.
///
/// # Arguments
///
/// * `profile` - The seller owning `url`
/// * `url` - The product page URL
/// * `content` - Rendered page content
/// * `scraped` - Timestamp recorded on the product
pub fn parse_content(
    profile: &SellerProfile,
    url: &str,
    content: &str,
    scraped: DateTime<Utc>,
) -> Result<ProductRecord, FailureKind> {
    let blocks = ld_json_blocks(content);
    let index = profile
        .strategy
        .payload_block(&blocks)
        .ok_or(FailureKind::MissingName)?;
    let raw = blocks.get(index).ok_or(FailureKind::MissingName)?;

    let payload: Value = serde_json::from_str(raw.trim()).map_err(|e| {
        debug!("Payload for {} is not valid JSON: {}", url, e);
        FailureKind::JsonDecode
    })?;

    let doc = profile
        .strategy
        .select_document(&payload)
        .ok_or(FailureKind::MissingName)?;
    let details = profile.strategy.map(url, doc, &payload)?;

    Ok(ProductRecord {
        url: url.to_string(),
        seller: profile.name.to_string(),
        scraped,
        json_ld: payload,
        details,
    })
}

/// Writes a scrape result
///
/// A uniqueness conflict on the product write is downgraded to a
/// `DuplicatedUrl` failure, recorded without touching the product row.
pub fn persist_outcome<R>(
    repo: &mut R,
    url: &str,
    product: Option<&ProductRecord>,
    outcome: ScrapeOutcome,
    at: DateTime<Utc>,
) -> Result<ScrapeOutcome, StorageError>
where
    R: Repository + ?Sized,
{
    let update = StatusUpdate::from_outcome(outcome, at);
    match repo.record_scrape(url, product, &update) {
        Ok(()) => Ok(outcome),
        Err(StorageError::DuplicateUrl(dup)) => {
            warn!("Uniqueness conflict writing product {}", dup);
            let outcome = ScrapeOutcome::Failure(FailureKind::DuplicatedUrl);
            repo.record_scrape(url, None, &StatusUpdate::from_outcome(outcome, at))?;
            Ok(outcome)
        }
        Err(e) => Err(e),
    }
}

/// Scrapes product pages through a browser session
#[derive(Clone)]
pub struct ProductParser {
    registry: Arc<SellerRegistry>,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl ProductParser {
    pub fn new(registry: Arc<SellerRegistry>, config: &ScrapeConfig) -> Self {
        Self {
            registry,
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Scrapes one URL and records the result
    ///
    /// Every outcome, success or failure, updates the URL's `last_scraped`. A page
    /// that does not finish loading in time is a `Timeout` like a payload that
    /// never appears.
    ///
    /// # Returns
    ///
    /// * `Ok(ScrapeOutcome)` - The recorded outcome
    /// * `Err(ScoutError::Render)` - The browser session was lost; nothing was recorded
    /// * `Err(ScoutError)` - Unknown seller or a storage failure
    pub async fn scrape<R>(
        &self,
        renderer: &mut dyn PageRenderer,
        repo: &Mutex<R>,
        url: &str,
    ) -> Result<ScrapeOutcome, ScoutError>
    where
        R: Repository + Send + ?Sized,
    {
        let profile = self.registry.for_url(url)?;

        let result = match self.render(renderer, url).await {
            Ok(Some(content)) => parse_content(profile, url, &content, Utc::now()),
            Ok(None) => Err(FailureKind::Timeout),
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(RenderError::Timeout(message)) => {
                warn!("Timed out rendering {}: {}", url, message);
                Err(FailureKind::Timeout)
            }
            Err(e) => {
                warn!("Failed to render {}: {}", url, e);
                Err(FailureKind::Render)
            }
        };

        let (product, outcome) = match result {
            Ok(record) => (Some(record), ScrapeOutcome::Success),
            Err(kind) => (None, ScrapeOutcome::Failure(kind)),
        };

        let mut guard = repo
            .lock()
            .map_err(|_| ScoutError::Worker("repository lock poisoned".to_string()))?;
        let recorded = persist_outcome(&mut *guard, url, product.as_ref(), outcome, Utc::now())?;
        debug!("{} -> {}", url, recorded);
        Ok(recorded)
    }

    /// Loads the page and waits for the payload
    ///
    /// Returns `Ok(None)` if the payload never appeared within the timeout.
    async fn render(
        &self,
        renderer: &mut dyn PageRenderer,
        url: &str,
    ) -> Result<Option<String>, RenderError> {
        renderer.load(url).await?;
        let ready = renderer
            .wait_for(
                &WaitCondition::ProductPayload,
                self.wait_timeout,
                self.poll_interval,
            )
            .await?;
        if !ready {
            return Ok(None);
        }
        renderer.current_content().await.map(Some)
    }
}
