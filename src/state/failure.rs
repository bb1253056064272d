//! Scrape failure kinds and per-attempt outcomes
//!
//! Every scrape attempt ends in exactly one [`ScrapeOutcome`]. The failure codes
//! are persisted verbatim in `scrape_status.fail_reason`, so the strings returned
//! by [`FailureKind::to_db_string`] are part of the database format.
use std::fmt;

/// Why a single product scrape did not produce a Product row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// The structured product payload never appeared within the wait timeout
    Timeout,

    /// The payload appeared but is not valid JSON
    JsonDecode,

    /// The payload parsed but carries no product name (page rendered without
    /// product data, e.g. a redirect or a delisted item)
    MissingName,

    /// The payload has a name but lacks another required field
    MissingField,

    /// Writing the Product row hit a uniqueness conflict on its URL
    DuplicatedUrl,

    /// The page itself failed to load
    Render,
}

impl FailureKind {
    /// Converts the failure kind to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Timeout => "FAILURE_TIMEOUT",
            Self::JsonDecode => "FAILURE_JSON_DECODE",
            Self::MissingName => "FAILURE_MISSING_NAME",
            Self::MissingField => "FAILURE_MISSING_FIELD",
            Self::DuplicatedUrl => "FAILURE_DUPLICATED_URL",
            Self::Render => "FAILURE_RENDER",
        }
    }

    /// Parses a failure kind from its database representation
    ///
    /// Returns None if the string doesn't match any known code.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "FAILURE_TIMEOUT" => Some(Self::Timeout),
            "FAILURE_JSON_DECODE" => Some(Self::JsonDecode),
            "FAILURE_MISSING_NAME" => Some(Self::MissingName),
            "FAILURE_MISSING_FIELD" => Some(Self::MissingField),
            "FAILURE_DUPLICATED_URL" => Some(Self::DuplicatedUrl),
            "FAILURE_RENDER" => Some(Self::Render),
            _ => None,
        }
    }

    /// Returns all failure kinds
    pub fn all() -> [Self; 6] {
        [
            Self::Timeout,
            Self::JsonDecode,
            Self::MissingName,
            Self::MissingField,
            Self::DuplicatedUrl,
            Self::Render,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Result of one scrape attempt for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Success,
    Failure(FailureKind),
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Status code printed on the operator stream
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure(kind) => kind.to_db_string(),
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Success => None,
            Self::Failure(kind) => Some(*kind),
        }
    }
}

impl fmt::Display for ScrapeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_roundtrip() {
        for kind in FailureKind::all() {
            assert_eq!(FailureKind::from_db_string(kind.to_db_string()), Some(kind));
        }
    }

    #[test]
    fn test_from_db_string_unknown() {
        assert_eq!(FailureKind::from_db_string("FAILURE_GREMLINS"), None);
        assert_eq!(FailureKind::from_db_string("failure_timeout"), None);
        assert_eq!(FailureKind::from_db_string(""), None);
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(ScrapeOutcome::Success.code(), "SUCCESS");
        assert_eq!(
            ScrapeOutcome::Failure(FailureKind::Timeout).code(),
            "FAILURE_TIMEOUT"
        );
        assert_eq!(
            ScrapeOutcome::Failure(FailureKind::DuplicatedUrl).to_string(),
            "FAILURE_DUPLICATED_URL"
        );
    }

    #[test]
    fn test_outcome_failure_accessor() {
        assert!(ScrapeOutcome::Success.is_success());
        assert_eq!(ScrapeOutcome::Success.failure(), None);
        assert_eq!(
            ScrapeOutcome::Failure(FailureKind::MissingName).failure(),
            Some(FailureKind::MissingName)
        );
    }
}
