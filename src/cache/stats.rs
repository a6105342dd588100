//! Cache statistics and reporting
//!
//! Counters are process-local and reset on every flush; only the flushed
//! snapshot leaves the process, through the fire-and-forget monitoring
//! contract. The reporter also owns the hourly sweep that physically removes
//! expired and stale-version data from the durable tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

use crate::cache::entry::{CacheSnapshot, TemplateEntry};
use crate::clock::Clock;
use crate::monitor::MonitorSink;
use crate::persist::{with_timeout, KeyKind, Keyspace, PersistentTier};

// =============================================================================
// Counters
// =============================================================================

/// Hit/miss/save/preload counters for the current flush window
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    saves: AtomicU64,
    preloads: AtomicU64,
    /// Hits grouped by entry category
    category_hits: DashMap<String, u64>,
    /// Events recorded since the last flush, for the early-flush trigger
    events_since_flush: AtomicU64,
    batch_size: u64,
    flush_requested: Notify,
}

impl CacheStats {
    /// Create counters that request an early flush every `batch_size` events
    ///
    /// A `batch_size` of zero disables the early-flush trigger.
    pub fn new(batch_size: u64) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    /// Record a read served from either cache tier
    ///
    /// Full-list reads carry no category and update only the plain counter.
    pub fn record_hit(&self, category: Option<&str>) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if let Some(category) = category {
            *self.category_hits.entry(category.to_string()).or_insert(0) += 1;
        }
        self.bump_event();
    }

    /// Record a read neither tier could serve
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.bump_event();
    }

    /// Record a cache-filling write
    pub fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.bump_event();
    }

    /// Record a successful preload insert
    pub fn record_preload(&self) {
        self.preloads.fetch_add(1, Ordering::Relaxed);
        self.bump_event();
    }

    fn bump_event(&self) {
        let n = self.events_since_flush.fetch_add(1, Ordering::Relaxed) + 1;
        if self.batch_size > 0 && n >= self.batch_size {
            self.flush_requested.notify_one();
        }
    }

    /// Resolves when enough events have accumulated to warrant an early flush
    pub async fn batch_flush_requested(&self) {
        self.flush_requested.notified().await;
    }

    /// Read current counters without resetting them
    pub fn peek(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            preloads: self.preloads.load(Ordering::Relaxed),
            category_hits: self
                .category_hits
                .iter()
                .map(|kv| (kv.key().clone(), *kv.value()))
                .collect(),
        }
    }

    /// Read and zero the counters, ending the current flush window
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let snapshot = StatsSnapshot {
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            saves: self.saves.swap(0, Ordering::Relaxed),
            preloads: self.preloads.swap(0, Ordering::Relaxed),
            category_hits: {
                let mut drained = HashMap::new();
                self.category_hits.retain(|category, count| {
                    drained.insert(category.clone(), *count);
                    false
                });
                drained
            },
        };
        self.events_since_flush.store(0, Ordering::Relaxed);
        snapshot
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub saves: u64,
    pub preloads: u64,
    pub category_hits: HashMap<String, u64>,
}

impl StatsSnapshot {
    /// Fraction of reads served from either tier
    pub fn hit_ratio(&self) -> f64 {
        let total = (self.hits + self.misses) as f64;
        if total == 0.0 {
            0.0
        } else {
            self.hits as f64 / total
        }
    }
}

/// Diagnostic report for admin surfaces
#[derive(Debug, Clone)]
pub struct CacheReport {
    pub generated_at: DateTime<Utc>,
    pub cached_entries: usize,
    pub stats: StatsSnapshot,
    pub hit_ratio: f64,
    /// Categories by cumulative usage count, descending
    pub top_categories: Vec<(String, u64)>,
}

// =============================================================================
// Reporter
// =============================================================================

/// Result of one durable-tier cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Keys examined
    pub scanned: usize,
    /// Keys deleted
    pub removed: usize,
}

/// Flushes counters to the monitoring collaborator and sweeps the durable tier
pub struct StatsReporter {
    stats: Arc<CacheStats>,
    tier: Arc<dyn PersistentTier>,
    keyspace: Keyspace,
    monitor: Arc<dyn MonitorSink>,
    clock: Arc<dyn Clock>,
    persist_ttl: Duration,
    tier_timeout: Duration,
}

impl StatsReporter {
    pub fn new(
        stats: Arc<CacheStats>,
        tier: Arc<dyn PersistentTier>,
        keyspace: Keyspace,
        monitor: Arc<dyn MonitorSink>,
        clock: Arc<dyn Clock>,
        persist_ttl: Duration,
        tier_timeout: Duration,
    ) -> Self {
        Self {
            stats,
            tier,
            keyspace,
            monitor,
            clock,
            persist_ttl,
            tier_timeout,
        }
    }

    /// Emit the current window's counters and reset them
    pub fn flush(&self) -> StatsSnapshot {
        let snapshot = self.stats.snapshot_and_reset();
        self.monitor.log_event(
            "template_cache_flush",
            json!({
                "hits": snapshot.hits,
                "misses": snapshot.misses,
                "saves": snapshot.saves,
                "preloads": snapshot.preloads,
                "hit_ratio": snapshot.hit_ratio(),
                "category_hits": snapshot.category_hits,
            }),
        );
        snapshot
    }

    /// Sweep the durable tier, deleting expired and stale-version keys
    ///
    /// The only mechanism that physically removes stale data from the
    /// durable tier. Per-key failures are logged and the sweep continues.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        let keys = match with_timeout(
            self.tier_timeout,
            self.tier.enumerate(&self.keyspace.namespace_prefix()),
        )
        .await
        {
            Ok(keys) => keys,
            Err(e) => {
                warn!("cleanup enumerate failed: {}", e);
                return outcome;
            }
        };

        let now = self.clock.now();
        for key in keys {
            let Some(parsed) = self.keyspace.parse(&key) else {
                continue;
            };
            outcome.scanned += 1;

            if self.should_remove(&key, &parsed.version, parsed.kind, now).await {
                match with_timeout(self.tier_timeout, self.tier.delete(&key)).await {
                    Ok(_) => outcome.removed += 1,
                    Err(e) => warn!("cleanup delete of {} failed: {}", key, e),
                }
            }
        }

        self.monitor.log_event(
            "template_cache_cleanup",
            json!({"scanned": outcome.scanned, "removed": outcome.removed}),
        );
        outcome
    }

    async fn should_remove(
        &self,
        key: &str,
        stored_version: &str,
        kind: KeyKind,
        now: DateTime<Utc>,
    ) -> bool {
        // Stale-version keys are orphans of an earlier deployment
        if stored_version != self.keyspace.version() {
            debug!("cleanup: stale version under {}", key);
            return true;
        }

        // The current usage map is never age-deleted
        if kind == KeyKind::Usage {
            return false;
        }

        let value = match with_timeout(self.tier_timeout, self.tier.load(key)).await {
            Ok(Some(value)) => value,
            Ok(None) => return false,
            Err(e) => {
                warn!("cleanup load of {} failed: {}", key, e);
                return false;
            }
        };

        let max_age = ChronoDuration::from_std(self.persist_ttl).unwrap_or(ChronoDuration::MAX);
        let stored_at = match kind {
            KeyKind::Entry => serde_json::from_value::<TemplateEntry>(value)
                .map(|entry| entry.inserted_at)
                .ok(),
            KeyKind::Snapshot => serde_json::from_value::<CacheSnapshot>(value)
                .map(|snapshot| snapshot.fetched_at)
                .ok(),
            KeyKind::Usage => unreachable!("usage handled above"),
        };

        match stored_at {
            // Malformed values can never become readable again
            None => {
                debug!("cleanup: malformed value under {}", key);
                true
            }
            Some(stored_at) => (now - stored_at).max(ChronoDuration::zero()) > max_age,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::monitor::NullMonitor;
    use crate::persist::InMemoryTier;
    use serde_json::Value;

    #[test]
    fn test_counters_and_hit_ratio() {
        let stats = CacheStats::new(0);
        stats.record_hit(Some("wedding"));
        stats.record_hit(Some("wedding"));
        stats.record_hit(Some("email"));
        stats.record_miss();
        stats.record_save();
        stats.record_preload();

        let snapshot = stats.peek();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.saves, 1);
        assert_eq!(snapshot.preloads, 1);
        assert_eq!(snapshot.category_hits["wedding"], 2);
        assert_eq!(snapshot.category_hits["email"], 1);
        assert_eq!(snapshot.hit_ratio(), 0.75);
    }

    #[test]
    fn test_reset_ends_the_window() {
        let stats = CacheStats::new(0);
        stats.record_hit(Some("a"));
        stats.record_miss();

        let first = stats.snapshot_and_reset();
        assert_eq!(first.hits, 1);

        let second = stats.snapshot_and_reset();
        assert_eq!(second, StatsSnapshot::default());
    }

    #[test]
    fn test_empty_ratio_is_zero() {
        assert_eq!(StatsSnapshot::default().hit_ratio(), 0.0);
    }

    #[tokio::test]
    async fn test_batch_flush_trigger() {
        let stats = Arc::new(CacheStats::new(3));
        stats.record_hit(Some("a"));
        stats.record_miss();
        stats.record_hit(Some("a"));

        // The third event stored a wake-up permit
        tokio::time::timeout(Duration::from_secs(1), stats.batch_flush_requested())
            .await
            .expect("early flush requested");
    }

    fn reporter_with(
        tier: Arc<InMemoryTier>,
        clock: Arc<ManualClock>,
        persist_ttl: Duration,
    ) -> StatsReporter {
        StatsReporter::new(
            Arc::new(CacheStats::new(0)),
            tier,
            Keyspace::new("tpl-cache", "1"),
            Arc::new(NullMonitor),
            clock,
            persist_ttl,
            Duration::from_secs(2),
        )
    }

    fn persisted_entry(id: &str, inserted_at: DateTime<Utc>) -> Value {
        serde_json::to_value(TemplateEntry {
            id: id.to_string(),
            category: "wedding".to_string(),
            payload: json!("Hello"),
            inserted_at,
            schema_version: "1".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_and_stale_versions() {
        let tier = Arc::new(InMemoryTier::new());
        let clock = Arc::new(ManualClock::new());
        let now = clock.now();
        let keyspace = Keyspace::new("tpl-cache", "1");

        // Fresh entry, expired entry, stale-version entry, malformed value
        tier.save(&keyspace.entry_key("fresh"), persisted_entry("fresh", now))
            .await
            .unwrap();
        tier.save(
            &keyspace.entry_key("old"),
            persisted_entry("old", now - ChronoDuration::hours(48)),
        )
        .await
        .unwrap();
        tier.save("tpl-cache:entry:orphan:0", persisted_entry("orphan", now))
            .await
            .unwrap();
        tier.save(&keyspace.entry_key("garbled"), json!("not an entry"))
            .await
            .unwrap();
        // Current usage map must survive regardless of age
        tier.save(&keyspace.usage_key(), json!({})).await.unwrap();

        let reporter = reporter_with(tier.clone(), clock, Duration::from_secs(24 * 3600));
        let outcome = reporter.cleanup().await;

        assert_eq!(outcome.scanned, 5);
        assert_eq!(outcome.removed, 3);
        assert!(tier
            .load(&keyspace.entry_key("fresh"))
            .await
            .unwrap()
            .is_some());
        assert!(tier.load(&keyspace.usage_key()).await.unwrap().is_some());
        assert!(tier
            .load("tpl-cache:entry:orphan:0")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_usage_orphans_only() {
        let tier = Arc::new(InMemoryTier::new());
        let clock = Arc::new(ManualClock::new());
        let keyspace = Keyspace::new("tpl-cache", "1");

        tier.save(&keyspace.usage_key(), json!({})).await.unwrap();
        tier.save("tpl-cache:usage:records:0", json!({})).await.unwrap();

        let reporter = reporter_with(tier.clone(), clock, Duration::from_secs(3600));
        let outcome = reporter.cleanup().await;

        assert_eq!(outcome.removed, 1);
        assert!(tier.load(&keyspace.usage_key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_handles_stale_snapshot() {
        let tier = Arc::new(InMemoryTier::new());
        let clock = Arc::new(ManualClock::new());
        let now = clock.now();
        let keyspace = Keyspace::new("tpl-cache", "1");

        let snapshot = CacheSnapshot {
            entries: vec![],
            fetched_at: now - ChronoDuration::hours(2),
        };
        tier.save(
            &keyspace.snapshot_key(),
            serde_json::to_value(&snapshot).unwrap(),
        )
        .await
        .unwrap();

        let reporter = reporter_with(tier.clone(), clock, Duration::from_secs(3600));
        let outcome = reporter.cleanup().await;

        assert_eq!(outcome.removed, 1);
        assert!(tier
            .load(&keyspace.snapshot_key())
            .await
            .unwrap()
            .is_none());
    }
}
