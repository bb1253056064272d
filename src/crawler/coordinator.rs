//! Batch coordinator - run orchestration
//!
//! This module contains the entry points for each batch mode:
//! - Discovery: one explorer per selected seller, seeding scrape status rows
//! - Scrape: scheduling due URLs and fanning them out to browser sessions
//! - Seed: adding product URLs from a list
//! - Backfill: re-deriving missing product fields from stored payloads
//!
//! Every batch is recorded in the `runs` table with its final status and counters.

use crate::config::Config;
use crate::crawler::explorer::{DiscoveryReport, ExplorerSettings, NavigationExplorer, TerminationCause};
use crate::crawler::parser::ProductParser;
use crate::crawler::scheduler::{ScheduledUrl, ScrapeScheduler};
use crate::renderer::{PageRenderer, SessionFactory};
use crate::seller::{SellerProfile, SellerRegistry};
use crate::state::{DiscoveryState, FailureKind};
use crate::storage::{
    ProductField, Repository, RunCounters, RunMode, RunStatus, SharedRepository, StatusFilter,
};
use crate::seller::get_seller_from_url;
use crate::url::{normalize_url, UrlExtractor};
use crate::{ConfigError, ScoutError};
use chrono::Utc;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a batch ended, before it is written to the `runs` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub counters: RunCounters,
}

/// Result of a backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub examined: usize,
    pub filled: usize,
    /// Products whose stored payload does not carry the field either
    pub still_missing: Vec<String>,
}

/// What one scrape worker did
#[derive(Debug, Default)]
struct WorkerReport {
    counters: RunCounters,
    session_lost: bool,
}

/// Main batch coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    registry: Arc<SellerRegistry>,
    extractor: UrlExtractor,
    repo: SharedRepository,
    cancel: CancellationToken,
    rng_seed: Option<u64>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, recorded on every run
    /// * `repo` - The shared repository
    /// * `cancel` - Tripped to stop the current batch at the next safe point
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        repo: SharedRepository,
        cancel: CancellationToken,
    ) -> Result<Self, ScoutError> {
        let registry = SellerRegistry::builtin()?;
        let extractor = UrlExtractor::from_registry(&registry)?;

        Ok(Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            registry: Arc::new(registry),
            extractor,
            repo,
            cancel,
            rng_seed: None,
        })
    }

    /// Seeds the menu selection RNG so discovery walks are reproducible
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn registry(&self) -> &SellerRegistry {
        &self.registry
    }

    fn lock_repo(&self) -> Result<MutexGuard<'_, dyn Repository + Send + 'static>, ScoutError> {
        self.repo
            .lock()
            .map_err(|_| ScoutError::Worker("repository lock poisoned".to_string()))
    }

    fn sellers(&self, filter: Option<&str>) -> Result<Vec<&SellerProfile>, ScoutError> {
        Ok(self.registry.select(filter, &self.config.sellers)?)
    }

    fn begin_run(&self, mode: RunMode, filter: Option<&str>) -> Result<i64, ScoutError> {
        let label = filter.unwrap_or("all");
        let run_id = self.lock_repo()?.create_run(mode, label, &self.config_hash)?;
        info!("Starting {} run {} for {}", mode.to_db_string(), run_id, label);
        Ok(run_id)
    }

    fn end_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counters: RunCounters,
    ) -> Result<BatchSummary, ScoutError> {
        self.lock_repo()?.finish_run(run_id, status, &counters)?;
        info!(
            "Run {} {}: {} processed, {} succeeded, {} failed, {} discovered",
            run_id,
            status.to_db_string(),
            counters.processed,
            counters.succeeded,
            counters.failed,
            counters.discovered
        );
        Ok(BatchSummary {
            run_id,
            status,
            counters,
        })
    }

    /// Records a run that stopped on an error, then hands the error back
    fn fail_run<T>(&self, run_id: i64, counters: RunCounters, err: ScoutError) -> Result<T, ScoutError> {
        error!("Run {} failed: {}", run_id, err);
        if let Err(e) = self.end_run(run_id, RunStatus::Failed, counters) {
            warn!("Could not record failure of run {}: {}", run_id, e);
        }
        Err(err)
    }

    /// Explores every selected seller at once, seeding scrape status rows
    ///
    /// Each seller gets its own session and explorer, so an unbounded run keeps
    /// all of them busy until it is cancelled. A seller whose session is lost
    /// stops on its own; a fatal error stops every seller.
    pub async fn run_discovery(
        &self,
        factory: &dyn SessionFactory,
        seller_filter: Option<&str>,
    ) -> Result<BatchSummary, ScoutError> {
        let sellers = self.sellers(seller_filter)?;
        let run_id = self.begin_run(RunMode::Discover, seller_filter)?;
        let batch_cancel = self.cancel.child_token();

        let results = join_all(sellers.into_iter().map(|profile| {
            let cancel = batch_cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let result = self.discover_seller(factory, profile, &cancel).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result.map(Some)
            }
        }))
        .await;

        let mut counters = RunCounters::default();
        let mut status = RunStatus::Completed;
        let mut failure = None;

        for result in results {
            let report = match result {
                Ok(Some(report)) => report,
                Ok(None) => {
                    status = RunStatus::Interrupted;
                    continue;
                }
                Err(e) => {
                    failure.get_or_insert(e);
                    continue;
                }
            };

            println!(
                "[{}] discovery {}: {} URLs seen, {} new, {} menu items visited",
                report.seller, report.cause, report.discovered, report.inserted, report.menu_items_visited
            );

            counters.processed += report.discovered as u64;
            counters.discovered += report.inserted as u64;

            if report.cause != TerminationCause::IterationLimit {
                status = RunStatus::Interrupted;
            }
        }

        if let Some(err) = failure {
            return self.fail_run(run_id, counters, err);
        }
        self.end_run(run_id, status, counters)
    }

    async fn discover_seller(
        &self,
        factory: &dyn SessionFactory,
        profile: &SellerProfile,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, ScoutError> {
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut explorer = NavigationExplorer::new(
            profile,
            &self.extractor,
            ExplorerSettings::from(&self.config.discovery),
            rng,
        );
        let mut state = DiscoveryState::new();

        let mut session = factory.open_session().await?;
        let result = explorer
            .run(session.as_mut(), &mut state, self.repo.as_ref(), cancel)
            .await;
        close_session(session.as_mut()).await;
        result
    }

    /// Scrapes every due URL of the selected sellers
    ///
    /// URLs are planned by the scrape scheduler and handed out in plan order to
    /// `scrape.sessions` workers, each owning one browser session. A worker whose
    /// session is lost stops the whole batch.
    pub async fn run_scrape(
        &self,
        factory: Arc<dyn SessionFactory>,
        seller_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<BatchSummary, ScoutError> {
        let sellers: HashSet<&str> = self.sellers(seller_filter)?.iter().map(|p| p.name).collect();
        let run_id = self.begin_run(RunMode::Scrape, seller_filter)?;

        let plan = match self.plan_scrape(&sellers, limit) {
            Ok(plan) => plan,
            Err(e) => return self.fail_run(run_id, RunCounters::default(), e),
        };
        info!("{} URLs due for scraping", plan.len());

        let queue = Arc::new(AsyncMutex::new(VecDeque::from(plan)));
        let batch_cancel = self.cancel.child_token();
        let parser = ProductParser::new(Arc::clone(&self.registry), &self.config.scrape);

        let mut handles = Vec::new();
        for worker_id in 0..self.config.scrape.sessions.max(1) {
            handles.push(tokio::spawn(scrape_worker(
                worker_id,
                Arc::clone(&factory),
                parser.clone(),
                Arc::clone(&self.repo),
                Arc::clone(&queue),
                batch_cancel.clone(),
            )));
        }

        let mut counters = RunCounters::default();
        let mut session_lost = false;
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    counters.processed += report.counters.processed;
                    counters.succeeded += report.counters.succeeded;
                    counters.failed += report.counters.failed;
                    session_lost |= report.session_lost;
                }
                Ok(Err(e)) => {
                    batch_cancel.cancel();
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    batch_cancel.cancel();
                    failure.get_or_insert(ScoutError::Worker(e.to_string()));
                }
            }
        }

        if let Some(err) = failure {
            return self.fail_run(run_id, counters, err);
        }

        let remaining = queue.lock().await.len();
        let status = if self.cancel.is_cancelled() || session_lost || remaining > 0 {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.end_run(run_id, status, counters)
    }

    fn plan_scrape(
        &self,
        sellers: &HashSet<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ScheduledUrl>, ScoutError> {
        let now = Utc::now();
        let scheduler = ScrapeScheduler::from_days(self.config.scrape.freshness_days).with_limit(limit);
        let statuses = self
            .lock_repo()?
            .find_statuses(&StatusFilter::ScrapedBefore(scheduler.cutoff(now)))?;

        Ok(scheduler.plan(
            statuses
                .into_iter()
                .filter(|s| sellers.contains(s.seller.as_str())),
            now,
        ))
    }

    /// Seeds scrape status rows from a list of product URLs
    ///
    /// Blank lines and lines starting with `#` are skipped. Every URL is resolved
    /// to its seller before anything is written, so one unrecognized URL fails
    /// the batch without a run being recorded. URLs that already have a row are
    /// left untouched.
    pub fn run_seed<I, S>(&self, lines: I) -> Result<BatchSummary, ScoutError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seeds: Vec<(String, &'static str)> = Vec::new();
        let mut seen = HashSet::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let url = normalize_url(line)
                .map_err(|_| ConfigError::UnrecognizedUrl(line.to_string()))?
                .to_string();
            let seller = get_seller_from_url(&url)?;
            if seen.insert(url.clone()) {
                seeds.push((url, seller));
            }
        }

        let run_id = self.begin_run(RunMode::Seed, None)?;
        let mut counters = RunCounters::default();
        let mut status = RunStatus::Completed;

        for (url, seller) in seeds {
            if self.cancel.is_cancelled() {
                status = RunStatus::Interrupted;
                break;
            }
            let inserted = match self.lock_repo().and_then(|mut repo| {
                repo.upsert_scrape_status(&url, seller).map_err(ScoutError::from)
            }) {
                Ok(inserted) => inserted,
                Err(e) => return self.fail_run(run_id, counters, e),
            };

            counters.processed += 1;
            if inserted {
                counters.discovered += 1;
                println!("[{}] seeded {}", seller, url);
            } else {
                debug!("Already known: {}", url);
            }
        }

        self.end_run(run_id, status, counters)
    }

    /// Re-derives a missing product field from each stored payload
    ///
    /// Products whose payload still lacks the field are printed so they can be
    /// rescraped.
    pub fn run_backfill(
        &self,
        field: ProductField,
        seller_filter: Option<&str>,
    ) -> Result<(BatchSummary, BackfillReport), ScoutError> {
        let sellers: HashSet<&str> = self.sellers(seller_filter)?.iter().map(|p| p.name).collect();
        let run_id = self.begin_run(RunMode::Backfill, seller_filter)?;

        match self.backfill(field, &sellers) {
            Ok(report) => {
                let counters = RunCounters {
                    processed: report.examined as u64,
                    succeeded: report.filled as u64,
                    failed: report.still_missing.len() as u64,
                    discovered: 0,
                };
                let status = if self.cancel.is_cancelled() {
                    RunStatus::Interrupted
                } else {
                    RunStatus::Completed
                };
                Ok((self.end_run(run_id, status, counters)?, report))
            }
            Err(e) => self.fail_run(run_id, RunCounters::default(), e),
        }
    }

    fn backfill(
        &self,
        field: ProductField,
        sellers: &HashSet<&str>,
    ) -> Result<BackfillReport, ScoutError> {
        let candidates = self.lock_repo()?.find_products_missing(field)?;
        let mut report = BackfillReport::default();

        for mut record in candidates {
            if self.cancel.is_cancelled() {
                break;
            }
            if !sellers.contains(record.seller.as_str()) {
                continue;
            }
            report.examined += 1;

            let profile = self.registry.get(&record.seller)?;
            let derived = profile
                .strategy
                .select_document(&record.json_ld)
                .ok_or(FailureKind::MissingName)
                .and_then(|doc| profile.strategy.map(&record.url, doc, &record.json_ld));

            match derived {
                Ok(details) if field.is_present(&details) => {
                    field.copy_value(&details, &mut record.details);
                    self.lock_repo()?.upsert_product(&record)?;
                    report.filled += 1;
                    debug!("Backfilled {} for {}", field.column(), record.url);
                }
                Ok(_) => {
                    println!("[{}] still missing {}: {}", record.seller, field.column(), record.url);
                    report.still_missing.push(record.url);
                }
                Err(kind) => {
                    println!("[{}] payload unusable ({}): {}", record.seller, kind, record.url);
                    report.still_missing.push(record.url);
                }
            }
        }

        Ok(report)
    }
}

/// Pulls URLs from the shared queue until it is empty, the batch is cancelled,
/// or the worker's session is lost
async fn scrape_worker(
    worker_id: u32,
    factory: Arc<dyn SessionFactory>,
    parser: ProductParser,
    repo: SharedRepository,
    queue: Arc<AsyncMutex<VecDeque<ScheduledUrl>>>,
    cancel: CancellationToken,
) -> Result<WorkerReport, ScoutError> {
    let mut report = WorkerReport::default();
    let mut session = match factory.open_session().await {
        Ok(session) => session,
        Err(e) if e.is_session_lost() => {
            warn!("Worker {} could not open a session: {}", worker_id, e);
            cancel.cancel();
            report.session_lost = true;
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };
    debug!("Worker {} started", worker_id);

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }
        let next = queue.lock().await.pop_front();
        let Some(scheduled) = next else {
            break Ok(());
        };

        match parser.scrape(session.as_mut(), repo.as_ref(), &scheduled.url).await {
            Ok(outcome) => {
                println!("[{}] {} {}", scheduled.seller, outcome.code(), scheduled.url);
                report.counters.processed += 1;
                if outcome.is_success() {
                    report.counters.succeeded += 1;
                } else {
                    report.counters.failed += 1;
                }
            }
            Err(ScoutError::Render(e)) if e.is_session_lost() => {
                warn!("Worker {} lost its session at {}: {}", worker_id, scheduled.url, e);
                // The URL was not recorded; put it back for the next batch's count
                queue.lock().await.push_front(scheduled);
                report.session_lost = true;
                cancel.cancel();
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    close_session(session.as_mut()).await;
    debug!("Worker {} finished after {} URLs", worker_id, report.counters.processed);
    result.map(|()| report)
}

async fn close_session(session: &mut dyn PageRenderer) {
    if let Err(e) = session.close().await {
        debug!("Closing session failed: {}", e);
    }
}
