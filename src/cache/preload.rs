//! Usage-driven cache warming
//!
//! Consults the usage tracker for templates worth having in memory before
//! they are asked for, and fetches them through a caller-supplied fetch
//! function. The batch is bounded, cancellable between fetches, and a single
//! fetch failure never aborts the rest.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cache::entry::TemplateEntry;
use crate::cache::stats::CacheStats;
use crate::cache::store::CacheStore;
use crate::cache::usage::UsageTracker;
use crate::error::{Error, Result};

/// Caller-supplied source of truth for templates
///
/// Must be idempotent and side-effect-free from the cache's perspective.
#[async_trait]
pub trait TemplateFetcher: Send + Sync {
    /// Fetch one template by id
    async fn fetch(&self, id: &str) -> Result<TemplateEntry>;

    /// Fetch every template in a category
    ///
    /// Only needed for category preloading; the default declines.
    async fn fetch_category(&self, category: &str) -> Result<Vec<TemplateEntry>> {
        Err(Error::FetchFailed {
            id: format!("category:{}", category),
            reason: "category fetch not supported by this fetcher".to_string(),
        })
    }
}

/// Summary of one preload batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadOutcome {
    /// Candidates considered
    pub requested: usize,
    /// Ids fetched and inserted, in fetch order
    pub loaded: Vec<String>,
    /// Candidates skipped because they were already live
    pub skipped: usize,
    /// Fetches that failed and were passed over
    pub failed: usize,
}

/// Warms the in-process cache ahead of demand
pub struct PreloadScheduler {
    store: Arc<CacheStore>,
    usage: Arc<UsageTracker>,
    stats: Arc<CacheStats>,
    threshold: u64,
    limit: usize,
}

impl PreloadScheduler {
    pub fn new(
        store: Arc<CacheStore>,
        usage: Arc<UsageTracker>,
        stats: Arc<CacheStats>,
        threshold: u64,
        limit: usize,
    ) -> Self {
        Self {
            store,
            usage,
            stats,
            threshold,
            limit,
        }
    }

    /// Fetch and insert high-usage templates, most-used first
    ///
    /// At most `limit` fetches per invocation. Cancellation stops the batch
    /// between fetches; every completed insert stands.
    #[instrument(skip(self, fetcher, cancel))]
    pub async fn preload(
        &self,
        fetcher: &dyn TemplateFetcher,
        cancel: &CancellationToken,
    ) -> PreloadOutcome {
        let candidates = self.usage.preload_candidates(self.threshold);
        let mut outcome = PreloadOutcome {
            requested: candidates.len(),
            ..PreloadOutcome::default()
        };

        let mut fetches = 0;
        for id in candidates {
            if fetches >= self.limit {
                debug!("preload reached its fetch limit of {}", self.limit);
                break;
            }
            if cancel.is_cancelled() {
                debug!("preload cancelled after {} fetches", fetches);
                break;
            }
            if self.store.contains_live(&id) {
                outcome.skipped += 1;
                continue;
            }

            fetches += 1;
            match fetcher.fetch(&id).await {
                Ok(entry) => {
                    self.store.put(entry).await;
                    self.stats.record_preload();
                    outcome.loaded.push(id);
                }
                Err(e) => {
                    warn!("preload fetch of {} failed, continuing: {}", id, e);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    /// Warm every template of one category
    ///
    /// A failed category fetch propagates to the caller; per-entry inserts
    /// cannot fail.
    #[instrument(skip(self, fetcher, cancel))]
    pub async fn preload_category(
        &self,
        fetcher: &dyn TemplateFetcher,
        category: &str,
        cancel: &CancellationToken,
    ) -> Result<PreloadOutcome> {
        let entries = fetcher.fetch_category(category).await?;
        let mut outcome = PreloadOutcome {
            requested: entries.len(),
            ..PreloadOutcome::default()
        };

        for entry in entries {
            if cancel.is_cancelled() {
                debug!("category preload of {} cancelled", category);
                break;
            }
            if self.store.contains_live(&entry.id) {
                outcome.skipped += 1;
                continue;
            }
            let id = entry.id.clone();
            self.store.put(entry).await;
            self.stats.record_preload();
            outcome.loaded.push(id);
        }

        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================
