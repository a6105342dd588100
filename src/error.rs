//! Error types for the template cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the template cache
///
/// None of these are fatal: persistent-tier and decode failures degrade to
/// cache misses at the store boundary, and only a fetch failure on a direct
/// miss-fetch reaches the original caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent tier I/O failure
    #[error("persistent tier unavailable: {0}")]
    TierUnavailable(String),

    /// Persistent tier call exceeded its time budget
    #[error("persistent tier timed out after {0:?}")]
    TierTimeout(Duration),

    /// A stored value failed to decode or failed a shape check
    #[error("malformed entry under key {key}: {reason}")]
    MalformedEntry { key: String, reason: String },

    /// Stored schema version differs from the running version
    #[error("schema version mismatch: stored {stored}, running {running}")]
    VersionMismatch { stored: String, running: String },

    /// Caller-supplied fetch function failed
    #[error("fetch failed for template {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures that degrade to a cache miss rather than propagate
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::TierUnavailable(_)
                | Error::TierTimeout(_)
                | Error::MalformedEntry { .. }
                | Error::VersionMismatch { .. }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradable_classification() {
        assert!(Error::TierUnavailable("boom".into()).is_degradable());
        assert!(Error::TierTimeout(Duration::from_secs(2)).is_degradable());
        assert!(Error::MalformedEntry {
            key: "k".into(),
            reason: "bad json".into()
        }
        .is_degradable());
        assert!(Error::VersionMismatch {
            stored: "1".into(),
            running: "2".into()
        }
        .is_degradable());

        assert!(!Error::FetchFailed {
            id: "tpl".into(),
            reason: "upstream 500".into()
        }
        .is_degradable());
        assert!(!Error::Config("bad fraction".into()).is_degradable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::VersionMismatch {
            stored: "1".into(),
            running: "2".into(),
        };
        assert_eq!(
            format!("{}", err),
            "schema version mismatch: stored 1, running 2"
        );
    }
}
