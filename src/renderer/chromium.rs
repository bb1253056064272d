//! Chromium adapter over the DevTools protocol

use crate::config::BrowserConfig;
use crate::renderer::{ElementRef, PageRenderer, RenderError, RenderResult, SessionFactory};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Flag that hides `navigator.webdriver` from page scripts
const DISABLE_AUTOMATION_FLAG: &str = "--disable-blink-features=AutomationControlled";

/// Classifies a DevTools error
fn map_cdp_error(err: CdpError) -> RenderError {
    match err {
        CdpError::NotFound => RenderError::StaleElement(err.to_string()),
        CdpError::ScrollingFailed(msg) => RenderError::NotInteractable(msg),
        CdpError::Timeout => RenderError::Timeout(err.to_string()),
        CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => {
            RenderError::SessionLost(err.to_string())
        }
        other => classify_protocol_message(other.to_string()),
    }
}

/// Protocol errors Chrome raises for a node that a re-render has replaced
const STALE_NODE_MESSAGES: &[&str] = &[
    "no node with given id",
    "could not find node with given id",
    "node is detached",
    "node with given id does not belong to the document",
];

fn classify_protocol_message(message: String) -> RenderError {
    let lower = message.to_lowercase();
    if STALE_NODE_MESSAGES.iter().any(|m| lower.contains(m)) {
        RenderError::StaleElement(message)
    } else {
        RenderError::Browser(message)
    }
}

/// A launched Chrome process and the task pumping its DevTools events
pub struct ChromiumBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launches Chrome with the configured window, user agent and automation flag
    pub async fn launch(config: &BrowserConfig) -> RenderResult<Self> {
        let mut builder = CdpConfig::builder()
            .window_size(config.window_width, config.window_height)
            .arg(format!("--user-agent={}", config.user_agent))
            .arg(DISABLE_AUTOMATION_FLAG);
        if !config.headless {
            builder = builder.with_head();
        }
        let cdp_config = builder.build().map_err(RenderError::Browser)?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(map_cdp_error)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("DevTools handler stopped: {}", e);
                    break;
                }
            }
        });

        info!(
            "Launched Chrome ({}, {}x{})",
            if config.headless { "headless" } else { "headed" },
            config.window_width,
            config.window_height
        );

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Closes the browser process and stops the event pump
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl SessionFactory for ChromiumBrowser {
    async fn open_session(&self) -> RenderResult<Box<dyn PageRenderer>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;
        Ok(Box::new(ChromiumSession { page }))
    }
}

/// One Chrome tab
pub struct ChromiumSession {
    page: Page,
}

impl ChromiumSession {
    /// Re-locates an element by selector and position
    ///
    /// Elements are looked up fresh on every interaction; if the page changed so
    /// that the position no longer exists, the reference is stale.
    async fn locate(&self, element: &ElementRef) -> RenderResult<Element> {
        let mut found = self
            .page
            .find_elements(element.selector.as_str())
            .await
            .map_err(map_cdp_error)?;

        if element.index >= found.len() {
            return Err(RenderError::StaleElement(format!(
                "{}[{}] ({})",
                element.selector, element.index, element.label
            )));
        }
        Ok(found.swap_remove(element.index))
    }
}

#[async_trait]
impl PageRenderer for ChromiumSession {
    async fn load(&mut self, url: &str) -> RenderResult<()> {
        self.page.goto(url).await.map_err(|e| match map_cdp_error(e) {
            RenderError::Browser(message) => RenderError::Navigation {
                url: url.to_string(),
                message,
            },
            other => other,
        })?;
        Ok(())
    }

    async fn current_content(&mut self) -> RenderResult<String> {
        self.page.content().await.map_err(map_cdp_error)
    }

    async fn find_elements(&mut self, selector: &str) -> RenderResult<Vec<ElementRef>> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(CdpError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(map_cdp_error(e)),
        };

        let mut refs = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let text = element
                .inner_text()
                .await
                .map_err(map_cdp_error)?
                .unwrap_or_default();
            let label = match text.trim() {
                "" => element
                    .attribute("href")
                    .await
                    .map_err(map_cdp_error)?
                    .unwrap_or_default(),
                trimmed => trimmed.to_string(),
            };
            refs.push(ElementRef {
                selector: selector.to_string(),
                index,
                label,
            });
        }
        Ok(refs)
    }

    async fn click(&mut self, element: &ElementRef) -> RenderResult<()> {
        let target = self.locate(element).await?;
        target.scroll_into_view().await.map_err(map_cdp_error)?;
        target.click().await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &ElementRef) -> RenderResult<()> {
        let target = self.locate(element).await?;
        target.scroll_into_view().await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn close(&mut self) -> RenderResult<()> {
        self.page.clone().close().await.map_err(map_cdp_error)
    }
}
