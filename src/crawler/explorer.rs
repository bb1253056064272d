//! Navigation explorer for product URL discovery
//!
//! The explorer walks a seller's category menu in one browser session. Each
//! iteration snapshots the page and harvests product links; every few iterations
//! it clicks a random menu item it has not clicked before. Discovery is
//! best-effort: the walk is randomized and stops on cancellation, on loss of the
//! session, or at the iteration limit.

use crate::config::DiscoveryConfig;
use crate::renderer::{ElementRef, PageRenderer, RenderError, RenderResult};
use crate::seller::SellerProfile;
use crate::state::DiscoveryState;
use crate::storage::Repository;
use crate::url::UrlExtractor;
use crate::ScoutError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Attempts at one UI action before the step is skipped
const MAX_TRANSIENT_ATTEMPTS: u32 = 3;

/// Where an explorer run is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerPhase {
    /// Landing page, consent dialog, top-level menu
    Init,
    Explore,
    Terminated(TerminationCause),
}

/// Why an explorer run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    Cancelled,
    SessionLost,
    IterationLimit,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::SessionLost => write!(f, "browser session lost"),
            Self::IterationLimit => write!(f, "iteration limit reached"),
        }
    }
}

/// Result of one menu interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuStep {
    /// An unvisited item with this label was clicked
    Clicked(String),
    /// No menu items are rendered
    MenuNotFound,
    /// Every rendered item has been visited
    MenuExhausted,
}

/// Explorer timing and cadence
#[derive(Debug, Clone)]
pub struct ExplorerSettings {
    pub click_every: u64,
    pub flush_every: u64,
    pub poll_interval: Duration,
    pub transient_pause: Duration,
    /// 0 means unbounded
    pub max_iterations: u64,
}

impl From<&DiscoveryConfig> for ExplorerSettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            click_every: u64::from(config.click_every.max(1)),
            flush_every: u64::from(config.flush_every.max(1)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            transient_pause: Duration::from_millis(config.transient_retry_pause_ms),
            max_iterations: config.max_iterations,
        }
    }
}

/// Summary of a finished explorer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub seller: String,
    pub cause: TerminationCause,
    pub iterations: u64,
    /// Distinct product URLs seen during the run
    pub discovered: usize,
    /// Scrape status rows that did not exist before the run
    pub inserted: usize,
    pub menu_items_visited: usize,
}

/// Drives one browser session through a seller's category menu
pub struct NavigationExplorer<'a> {
    profile: &'a SellerProfile,
    extractor: &'a UrlExtractor,
    settings: ExplorerSettings,
    rng: StdRng,
    phase: ExplorerPhase,
    inserted: usize,
}

impl<'a> NavigationExplorer<'a> {
    /// Creates an explorer
    ///
    /// # Arguments
    ///
    /// * `profile` - The seller to explore
    /// * `extractor` - Extractor holding a rule for that seller
    /// * `settings` - Cadence and pauses
    /// * `rng` - Source of the menu item choices
    pub fn new(
        profile: &'a SellerProfile,
        extractor: &'a UrlExtractor,
        settings: ExplorerSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            profile,
            extractor,
            settings,
            rng,
            phase: ExplorerPhase::Init,
            inserted: 0,
        }
    }

    pub fn phase(&self) -> ExplorerPhase {
        self.phase
    }

    /// Runs the explorer until it terminates
    ///
    /// Newly seen URLs are flushed to the repository every `flush_every`
    /// iterations and once more on the way out, whatever the reason for stopping.
    ///
    /// # Returns
    ///
    /// * `Ok(DiscoveryReport)` - The run ended by cancellation, session loss or the iteration limit
    /// * `Err(ScoutError)` - A configuration or storage error stopped the run
    pub async fn run<R>(
        &mut self,
        renderer: &mut dyn PageRenderer,
        state: &mut DiscoveryState,
        repo: &Mutex<R>,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, ScoutError>
    where
        R: Repository + Send + ?Sized,
    {
        info!("Exploring {} from {}", self.profile.name, self.profile.landing_url);

        let result = match self.init(renderer, cancel).await {
            Ok(None) => self.explore(renderer, state, repo, cancel).await,
            Ok(Some(cause)) => Ok(cause),
            Err(e) => Err(e),
        };

        let flushed = self.flush(state, repo);
        let cause = result?;
        flushed?;

        self.phase = ExplorerPhase::Terminated(cause);
        info!(
            "Discovery for {} ended ({}): {} iterations, {} URLs seen, {} new",
            self.profile.name,
            cause,
            state.iterations(),
            state.discovered_count(),
            self.inserted
        );

        Ok(DiscoveryReport {
            seller: self.profile.name.to_string(),
            cause,
            iterations: state.iterations(),
            discovered: state.discovered_count(),
            inserted: self.inserted,
            menu_items_visited: state.visited_count(),
        })
    }

    /// Opens the site and reaches the grocery root
    ///
    /// Returns a termination cause if the run cannot proceed.
    async fn init(
        &mut self,
        renderer: &mut dyn PageRenderer,
        cancel: &CancellationToken,
    ) -> Result<Option<TerminationCause>, ScoutError> {
        self.phase = ExplorerPhase::Init;
        let selectors = self.profile.selectors;

        let steps = async {
            renderer.load(self.profile.landing_url).await?;
            if let Some(consent) = selectors.consent_button {
                self.click_first(renderer, consent).await?;
            }
            self.click_first(renderer, selectors.menu_button).await?;
            renderer.load(self.profile.grocery_root).await?;
            Ok::<(), RenderError>(())
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Some(TerminationCause::Cancelled)),
            outcome = steps => outcome,
        };

        match outcome {
            Ok(()) => {
                self.phase = ExplorerPhase::Explore;
                Ok(None)
            }
            Err(e) if e.is_session_lost() => {
                warn!("Session lost while opening {}: {}", self.profile.name, e);
                Ok(Some(TerminationCause::SessionLost))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn explore<R>(
        &mut self,
        renderer: &mut dyn PageRenderer,
        state: &mut DiscoveryState,
        repo: &Mutex<R>,
        cancel: &CancellationToken,
    ) -> Result<TerminationCause, ScoutError>
    where
        R: Repository + Send + ?Sized,
    {
        loop {
            if cancel.is_cancelled() {
                return Ok(TerminationCause::Cancelled);
            }
            if self.settings.max_iterations > 0 && state.iterations() >= self.settings.max_iterations
            {
                return Ok(TerminationCause::IterationLimit);
            }

            let iteration = state.tick();

            match self.iterate(renderer, state, iteration).await {
                Ok(()) => {}
                Err(ScoutError::Render(e)) if e.is_session_lost() => {
                    warn!("Session lost exploring {}: {}", self.profile.name, e);
                    return Ok(TerminationCause::SessionLost);
                }
                Err(ScoutError::Render(e)) => {
                    warn!("Iteration {} on {} failed: {}", iteration, self.profile.name, e);
                }
                Err(e) => return Err(e),
            }

            if iteration % self.settings.flush_every == 0 {
                self.flush(state, repo)?;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// One snapshot, and a menu click when the cadence says so
    async fn iterate(
        &mut self,
        renderer: &mut dyn PageRenderer,
        state: &mut DiscoveryState,
        iteration: u64,
    ) -> Result<(), ScoutError> {
        let content = match renderer.current_content().await {
            Ok(content) => content,
            Err(e) if e.is_transient() => {
                self.pause_after(&e).await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let urls = self.extractor.extract(self.profile.name, &content)?;
        let found = urls.len();
        let new = state.record_urls(urls);
        debug!(
            "Iteration {}: {} product links on page, {} new",
            iteration, found, new
        );

        if iteration % self.settings.click_every == 0 {
            match self.menu_step(renderer, state).await? {
                MenuStep::Clicked(label) => debug!("Clicked menu item '{}'", label),
                MenuStep::MenuNotFound => {
                    debug!("No menu items rendered, reopening the menu");
                    self.click_first(renderer, self.profile.selectors.menu_button)
                        .await?;
                }
                MenuStep::MenuExhausted => {
                    debug!("Every rendered menu item visited, returning to the grocery root");
                    renderer.load(self.profile.grocery_root).await?;
                }
            }
        }

        Ok(())
    }

    /// Clicks one random unvisited menu item
    async fn menu_step(
        &mut self,
        renderer: &mut dyn PageRenderer,
        state: &mut DiscoveryState,
    ) -> RenderResult<MenuStep> {
        let items = renderer
            .find_elements(self.profile.selectors.menu_item)
            .await?;
        if items.is_empty() {
            return Ok(MenuStep::MenuNotFound);
        }

        let unvisited: Vec<&ElementRef> = items
            .iter()
            .filter(|item| !item.label.is_empty() && !state.is_visited(&item.label))
            .collect();

        let choice = match unvisited.choose(&mut self.rng) {
            Some(item) => (*item).clone(),
            None => return Ok(MenuStep::MenuExhausted),
        };

        state.mark_visited(&choice.label);
        self.click_with_retry(renderer, &choice).await?;
        Ok(MenuStep::Clicked(choice.label))
    }

    /// Clicks the first element matching `selector`, if there is one
    async fn click_first(
        &self,
        renderer: &mut dyn PageRenderer,
        selector: &str,
    ) -> RenderResult<bool> {
        match renderer.find_element(selector).await? {
            Some(element) => self.click_with_retry(renderer, &element).await,
            None => {
                debug!("Nothing matches {}", selector);
                Ok(false)
            }
        }
    }

    /// Clicks an element, pausing and retrying on transient UI errors
    ///
    /// Returns `Ok(false)` if every attempt hit a transient error.
    async fn click_with_retry(
        &self,
        renderer: &mut dyn PageRenderer,
        element: &ElementRef,
    ) -> RenderResult<bool> {
        for attempt in 1..=MAX_TRANSIENT_ATTEMPTS {
            match renderer.click(element).await {
                Ok(()) => return Ok(true),
                Err(e) if e.is_transient() => {
                    warn!(
                        "Click on '{}' failed (attempt {}/{}): {}",
                        element.label, attempt, MAX_TRANSIENT_ATTEMPTS, e
                    );
                    tokio::time::sleep(self.settings.transient_pause).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    async fn pause_after(&self, error: &RenderError) {
        warn!("Transient UI error, pausing: {}", error);
        tokio::time::sleep(self.settings.transient_pause).await;
    }

    fn flush<R>(&mut self, state: &mut DiscoveryState, repo: &Mutex<R>) -> Result<(), ScoutError>
    where
        R: Repository + Send + ?Sized,
    {
        if state.pending_count() == 0 {
            return Ok(());
        }
        let mut guard = repo
            .lock()
            .map_err(|_| ScoutError::Worker("repository lock poisoned".to_string()))?;
        let inserted = state.flush(&mut *guard, self.profile.name)?;
        self.inserted += inserted;
        debug!("Flushed discovery checkpoint: {} new rows", inserted);
        Ok(())
    }
}
