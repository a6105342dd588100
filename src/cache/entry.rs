//! Cached template types
//!
//! A [`TemplateEntry`] is an opaque content object keyed by id and grouped by
//! category. Liveness is decided against an injected clock: an entry is live
//! only while its age stays within the tier's TTL *and* its schema version
//! matches the running version.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::UNCATEGORIZED;

/// A single cached template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Unique key
    pub id: String,
    /// Grouping key; defaults to the `uncategorized` sentinel
    #[serde(default = "uncategorized")]
    pub category: String,
    /// The cached content, opaque to the cache
    pub payload: Value,
    /// Set on every cache-filling write
    pub inserted_at: DateTime<Utc>,
    /// Cache format version this entry was written under
    pub schema_version: String,
}

fn uncategorized() -> String {
    UNCATEGORIZED.to_string()
}

impl TemplateEntry {
    /// Create an entry with the sentinel category
    ///
    /// `inserted_at` and `schema_version` are stamped by the store on write;
    /// the values set here are placeholders.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            category: uncategorized(),
            payload,
            inserted_at: DateTime::<Utc>::UNIX_EPOCH,
            schema_version: String::new(),
        }
    }

    /// Set the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Age of the entry at `now`; zero if `inserted_at` is in the future
    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        (now - self.inserted_at).max(ChronoDuration::zero())
    }

    /// Whether this entry may be served from a tier with window `ttl`
    pub fn is_live(&self, now: DateTime<Utc>, ttl: Duration, running_version: &str) -> bool {
        if self.schema_version != running_version {
            return false;
        }
        !self.is_expired(now, ttl)
    }

    /// Whether the entry's age exceeds `ttl`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        self.age(now) > ttl
    }
}

/// The full-list cache: every template as of one refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Entries in refresh order
    pub entries: Vec<TemplateEntry>,
    /// When the full list was last refreshed
    pub fetched_at: DateTime<Utc>,
}

impl CacheSnapshot {
    /// Whether the snapshot as a whole is still fresh
    ///
    /// Freshness is judged on `fetched_at`: a stale snapshot is stale even
    /// if individual entries would still pass their own TTL check.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        (now - self.fetched_at).max(ChronoDuration::zero()) <= ttl
    }
}

// =============================================================================
// Tests
// =============================================================================
