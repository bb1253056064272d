//! Browser rendering abstraction
//!
//! Defines the `PageRenderer` and `SessionFactory` traits that the explorer and
//! the product parser drive. The production adapter is Chromium over the DevTools
//! protocol (`chromium`); tests script their own renderer.

pub mod chromium;

pub use chromium::{ChromiumBrowser, ChromiumSession};

use crate::seller::fields::declares_product;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors raised while driving a browser session
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// The element reference no longer points at a live node
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// The element exists but cannot be scrolled to or clicked right now
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The connection to the browser is gone; nothing else on this session can succeed
    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl RenderError {
    /// Errors worth a short pause and a retry rather than abandoning the step
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StaleElement(_) | Self::NotInteractable(_))
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// A located element, addressed by the selector that found it and its position
/// among that selector's matches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub selector: String,
    pub index: usize,
    /// Visible text (or link target when the text is empty), used as the element's identity
    pub label: String,
}

/// What `wait_for` polls for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one element matches the CSS selector
    Selector(String),

    /// The page content contains the literal text
    ContentContains(String),

    /// An `application/ld+json` block declares a schema.org `Product`
    ProductPayload,
}

impl WaitCondition {
    /// Evaluates the condition against a content snapshot
    pub fn is_met(&self, content: &str) -> bool {
        match self {
            Self::Selector(selector) => match Selector::parse(selector) {
                Ok(sel) => Html::parse_document(content).select(&sel).next().is_some(),
                Err(_) => false,
            },
            Self::ContentContains(needle) => content.contains(needle.as_str()),
            Self::ProductPayload => ld_json_blocks(content)
                .iter()
                .any(|block| declares_product(block)),
        }
    }
}

/// Raw text of every `<script type="application/ld+json">` block, in document order
pub fn ld_json_blocks(content: &str) -> Vec<String> {
    let document = Html::parse_document(content);
    let selector = match Selector::parse(r#"script[type="application/ld+json"]"#) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .collect()
}

/// One browser tab, driven strictly sequentially
#[async_trait]
pub trait PageRenderer: Send {
    /// Navigates to a URL and waits for the load to settle
    async fn load(&mut self, url: &str) -> RenderResult<()>;

    /// Serialized live DOM of the current page
    async fn current_content(&mut self) -> RenderResult<String>;

    /// Every element currently matching a CSS selector
    async fn find_elements(&mut self, selector: &str) -> RenderResult<Vec<ElementRef>>;

    async fn click(&mut self, element: &ElementRef) -> RenderResult<()>;

    async fn scroll_into_view(&mut self, element: &ElementRef) -> RenderResult<()>;

    async fn close(&mut self) -> RenderResult<()>;

    /// First element matching a selector, if any
    async fn find_element(&mut self, selector: &str) -> RenderResult<Option<ElementRef>> {
        Ok(self.find_elements(selector).await?.into_iter().next())
    }

    /// Polls the page until `condition` holds or `timeout` elapses
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The condition was met
    /// * `Ok(false)` - The timeout elapsed first
    /// * `Err(RenderError)` - Reading the page failed
    async fn wait_for(
        &mut self,
        condition: &WaitCondition,
        timeout: Duration,
        poll_interval: Duration,
    ) -> RenderResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let content = self.current_content().await?;
            if condition.is_met(&content) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Opens independent browser sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> RenderResult<Box<dyn PageRenderer>>;
}
