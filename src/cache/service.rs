//! Template cache service
//!
//! The one surface the rest of the application calls. An explicit service
//! object constructed with injected dependencies (clock, durable tier,
//! monitoring sink); tests build isolated instances instead of sharing
//! process-wide state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::entry::{CacheSnapshot, TemplateEntry};
use crate::cache::preload::{PreloadOutcome, PreloadScheduler, TemplateFetcher};
use crate::cache::stats::{CacheReport, CacheStats, CleanupOutcome, StatsReporter, StatsSnapshot};
use crate::cache::store::{CacheHit, CacheStore, ListLookup};
use crate::cache::usage::UsageTracker;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::monitor::{MonitorSink, NullMonitor};
use crate::persist::{InMemoryTier, Keyspace, PersistentTier};

/// Two-tier template cache with usage tracking, preloading, and stats
pub struct TemplateCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<CacheStats>,
    store: Arc<CacheStore>,
    usage: Arc<UsageTracker>,
    preloader: PreloadScheduler,
    reporter: StatsReporter,
}

impl TemplateCache {
    /// Build a cache over the given durable tier, monitor, and clock
    pub fn new(
        config: CacheConfig,
        tier: Arc<dyn PersistentTier>,
        monitor: Arc<dyn MonitorSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let keyspace = Keyspace::new(config.key_prefix.as_str(), config.schema_version.as_str());
        let stats = Arc::new(CacheStats::new(config.flush_batch_size));
        let usage = Arc::new(UsageTracker::new(
            tier.clone(),
            keyspace.clone(),
            clock.clone(),
            config.tier_timeout,
        ));
        let store = Arc::new(CacheStore::new(
            config.clone(),
            tier.clone(),
            clock.clone(),
            stats.clone(),
            usage.clone(),
        ));
        let preloader = PreloadScheduler::new(
            store.clone(),
            usage.clone(),
            stats.clone(),
            config.preload_threshold,
            config.preload_limit,
        );
        let reporter = StatsReporter::new(
            stats.clone(),
            tier,
            keyspace,
            monitor,
            clock.clone(),
            config.persist_ttl,
            config.tier_timeout,
        );

        Ok(Self {
            config,
            clock,
            stats,
            store,
            usage,
            preloader,
            reporter,
        })
    }

    /// Cache over an in-memory tier with defaults (testing and ephemeral use)
    pub fn in_memory() -> Self {
        Self::new(
            CacheConfig::default(),
            Arc::new(InMemoryTier::new()),
            Arc::new(NullMonitor),
            Arc::new(SystemClock),
        )
        .expect("default configuration is valid")
    }

    /// Warm-start usage history from the durable tier
    pub async fn hydrate(&self) {
        self.usage.hydrate().await;
    }

    /// Look up one template; registers usage on a hit
    pub async fn get(&self, id: &str) -> Option<CacheHit> {
        let hit = self.store.get(id).await?;
        self.usage
            .register_use(&hit.entry.id, &hit.entry.category)
            .await;
        Some(hit)
    }

    /// Look up one template, fetching and caching it on a miss
    ///
    /// The only path where a fetch failure reaches the caller; the cache
    /// does not cache failures.
    pub async fn get_or_fetch(
        &self,
        id: &str,
        fetcher: &dyn TemplateFetcher,
    ) -> Result<TemplateEntry> {
        if let Some(hit) = self.get(id).await {
            return Ok(hit.entry);
        }
        let entry = fetcher.fetch(id).await?;
        let entry = self.store.put(entry).await;
        self.usage.register_use(&entry.id, &entry.category).await;
        Ok(entry)
    }

    /// Look up the full template list
    ///
    /// List reads do not register per-template usage; call
    /// [`register_usage`](Self::register_usage) for the templates actually
    /// rendered.
    pub async fn get_all(&self) -> ListLookup {
        self.store.get_all().await
    }

    /// Look up every live template in one category
    pub async fn get_by_category(&self, category: &str) -> ListLookup {
        self.store.get_by_category(category).await
    }

    /// Upsert one template into both tiers
    pub async fn put(&self, entry: TemplateEntry) -> TemplateEntry {
        self.store.put(entry).await
    }

    /// Replace the full snapshot and rebuild all indices
    pub async fn put_all(&self, entries: Vec<TemplateEntry>) -> CacheSnapshot {
        self.store.put_all(entries).await
    }

    /// Remove one template from both tiers
    pub async fn invalidate(&self, id: &str) -> bool {
        self.store.invalidate(id).await
    }

    /// Clear the cache and purge its durable keys (usage history survives)
    pub async fn invalidate_all(&self) {
        self.store.invalidate_all().await
    }

    /// Record one use of a template, returning the updated count
    pub async fn register_usage(&self, id: &str, category: &str) -> u64 {
        self.usage.register_use(id, category).await
    }

    /// Clear all usage history
    pub async fn reset_usage(&self) {
        self.usage.reset().await
    }

    /// Warm high-usage templates through the given fetcher
    pub async fn preload(&self, fetcher: &dyn TemplateFetcher) -> PreloadOutcome {
        self.preloader
            .preload(fetcher, &CancellationToken::new())
            .await
    }

    /// As [`preload`](Self::preload), stoppable between fetches
    pub async fn preload_with_cancel(
        &self,
        fetcher: &dyn TemplateFetcher,
        cancel: &CancellationToken,
    ) -> PreloadOutcome {
        self.preloader.preload(fetcher, cancel).await
    }

    /// Warm every template of one category
    pub async fn preload_category(
        &self,
        fetcher: &dyn TemplateFetcher,
        category: &str,
    ) -> Result<PreloadOutcome> {
        self.preloader
            .preload_category(fetcher, category, &CancellationToken::new())
            .await
    }

    /// Current counters, without ending the flush window
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.peek()
    }

    /// Emit and reset the counters
    pub fn flush_stats(&self) -> StatsSnapshot {
        self.reporter.flush()
    }

    /// Resolves when enough events have accumulated for an early flush
    pub async fn stats_flush_requested(&self) {
        self.stats.batch_flush_requested().await;
    }

    /// Sweep expired and stale-version keys out of the durable tier
    pub async fn cleanup(&self) -> CleanupOutcome {
        self.reporter.cleanup().await
    }

    /// Diagnostic report for admin surfaces
    pub fn report(&self) -> CacheReport {
        let stats = self.stats.peek();
        CacheReport {
            generated_at: self.clock.now(),
            cached_entries: self.store.len(),
            hit_ratio: stats.hit_ratio(),
            top_categories: self.usage.most_used_categories(),
            stats,
        }
    }

    /// Entries currently in the in-process index
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when the in-process index is empty
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Configuration this cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
