use crate::state::failure::{FailureKind, ScrapeOutcome};
use chrono::{DateTime, Utc};

/// Outcome of the most recent scrape attempt for a URL
///
/// This folds the `scrape_success` tri-state and the `fail_reason` column into one
/// value, so a failure reason without a failed attempt cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    NeverAttempted,
    Succeeded,
    Failed(FailureKind),
}

impl ScrapeState {
    /// Splits the state into the `(scrape_success, fail_reason)` column pair
    pub fn to_columns(&self) -> (Option<bool>, Option<&'static str>) {
        match self {
            Self::NeverAttempted => (None, None),
            Self::Succeeded => (Some(true), None),
            Self::Failed(kind) => (Some(false), Some(kind.to_db_string())),
        }
    }

    /// Rebuilds the state from the column pair
    ///
    /// Returns None when the columns violate the fail_reason invariant or carry an
    /// unknown failure code.
    pub fn from_columns(success: Option<bool>, fail_reason: Option<&str>) -> Option<Self> {
        match (success, fail_reason) {
            (None, None) => Some(Self::NeverAttempted),
            (Some(true), None) => Some(Self::Succeeded),
            (Some(false), Some(code)) => FailureKind::from_db_string(code).map(Self::Failed),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<ScrapeOutcome> for ScrapeState {
    fn from(outcome: ScrapeOutcome) -> Self {
        match outcome {
            ScrapeOutcome::Success => Self::Succeeded,
            ScrapeOutcome::Failure(kind) => Self::Failed(kind),
        }
    }
}

/// Per-URL scrape bookkeeping, one row per known product URL
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeStatus {
    pub url: String,
    pub seller: String,
    pub last_scraped: Option<DateTime<Utc>>,
    pub state: ScrapeState,
}

impl ScrapeStatus {
    /// A freshly discovered URL that has never been scraped
    pub fn seed(url: impl Into<String>, seller: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            seller: seller.into(),
            last_scraped: None,
            state: ScrapeState::NeverAttempted,
        }
    }
}

/// The fields written after every scrape attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusUpdate {
    pub last_scraped: DateTime<Utc>,
    pub state: ScrapeState,
}

impl StatusUpdate {
    pub fn from_outcome(outcome: ScrapeOutcome, at: DateTime<Utc>) -> Self {
        Self {
            last_scraped: at,
            state: outcome.into(),
        }
    }
}
