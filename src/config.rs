//! Cache configuration
//!
//! All tunables are named fields with defaults, injected at construction.
//! Consuming systems override per deployment instead of patching constants.

use std::time::Duration;

use crate::error::{Error, Result};

/// Sentinel category for entries stored without one
pub const UNCATEGORIZED: &str = "uncategorized";

/// Template cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// In-process liveness window for entries and snapshot freshness
    pub ttl: Duration,
    /// Durable-tier liveness window; entries older than this are cleanup
    /// candidates and no longer served from the persistent tier
    pub persist_ttl: Duration,
    /// Maximum entries held in the in-process id index
    pub max_size: usize,
    /// Fraction of cached ids removed per eviction pass (rounded up)
    pub eviction_fraction: f64,
    /// Minimum usage count for an id to qualify as a preload candidate
    pub preload_threshold: u64,
    /// Maximum fetches per preload invocation
    pub preload_limit: usize,
    /// How often stats are flushed to the monitoring collaborator
    pub flush_interval: Duration,
    /// Recorded events that trigger an early flush ahead of the timer
    pub flush_batch_size: u64,
    /// How often the durable tier is swept for expired/stale keys
    pub cleanup_interval: Duration,
    /// Time budget for a single persistent-tier call
    pub tier_timeout: Duration,
    /// Namespace prefix for all persistent-tier keys
    pub key_prefix: String,
    /// Running schema version; stored values under other versions are stale
    pub schema_version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            persist_ttl: Duration::from_secs(24 * 60 * 60),
            max_size: 100,
            eviction_fraction: 0.20,
            preload_threshold: 3,
            preload_limit: 5,
            flush_interval: Duration::from_secs(5 * 60),
            flush_batch_size: 250,
            cleanup_interval: Duration::from_secs(60 * 60),
            tier_timeout: Duration::from_secs(2),
            key_prefix: "tpl-cache".to_string(),
            schema_version: "1".to_string(),
        }
    }
}

impl CacheConfig {
    /// Validate field ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config("max_size must be at least 1".into()));
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "eviction_fraction must be in (0, 1], got {}",
                self.eviction_fraction
            )));
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(Error::Config(
                "key_prefix must be non-empty and must not contain ':'".into(),
            ));
        }
        if self.schema_version.is_empty() || self.schema_version.contains(':') {
            return Err(Error::Config(
                "schema_version must be non-empty and must not contain ':'".into(),
            ));
        }
        if self.persist_ttl < self.ttl {
            return Err(Error::Config(
                "persist_ttl must be at least as long as ttl".into(),
            ));
        }
        Ok(())
    }

    /// Number of ids removed by one eviction pass over `cached` entries
    pub fn eviction_count(&self, cached: usize) -> usize {
        (cached as f64 * self.eviction_fraction).ceil() as usize
    }
}

// =============================================================================
// Tests
// =============================================================================
