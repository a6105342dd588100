//! Background task scheduler
//!
//! Explicit `start()`/`stop()` over the cache's periodic duties: stats
//! flush, durable-tier cleanup, and (optionally) usage-driven preload.
//! Tests drive `flush_stats`/`cleanup`/`preload` directly on the service
//! instead of waiting on wall-clock timers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{TemplateCache, TemplateFetcher};

/// Default cadence for the optional preload loop
pub const DEFAULT_PRELOAD_INTERVAL: Duration = Duration::from_secs(10 * 60);

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Drives flush, cleanup, and preload on independent schedules
pub struct CacheScheduler {
    cache: Arc<TemplateCache>,
    fetcher: Option<Arc<dyn TemplateFetcher>>,
    preload_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl CacheScheduler {
    /// Scheduler for flush and cleanup only
    pub fn new(cache: Arc<TemplateCache>) -> Self {
        Self {
            cache,
            fetcher: None,
            preload_interval: DEFAULT_PRELOAD_INTERVAL,
            running: Mutex::new(None),
        }
    }

    /// Also run a periodic preload through `fetcher`
    pub fn with_preloader(mut self, fetcher: Arc<dyn TemplateFetcher>, every: Duration) -> Self {
        self.fetcher = Some(fetcher);
        self.preload_interval = every;
        self
    }

    /// Spawn the background loops; a no-op while already running
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        let config = self.cache.config();

        // Flush: timer plus the early batch trigger
        {
            let cache = self.cache.clone();
            let cancel = cancel.clone();
            let period = config.flush_interval;
            handles.push(tokio::spawn(async move {
                let mut tick = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick.tick() => {
                            cache.flush_stats();
                        }
                        _ = cache.stats_flush_requested() => {
                            debug!("early stats flush on batch threshold");
                            cache.flush_stats();
                        }
                    }
                }
            }));
        }

        // Cleanup sweep over the durable tier
        {
            let cache = self.cache.clone();
            let cancel = cancel.clone();
            let period = config.cleanup_interval;
            handles.push(tokio::spawn(async move {
                let mut tick = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick.tick() => {
                            let outcome = cache.cleanup().await;
                            debug!(
                                "cleanup sweep removed {} of {} keys",
                                outcome.removed, outcome.scanned
                            );
                        }
                    }
                }
            }));
        }

        // Optional preload loop; the shared token also stops a batch mid-flight
        if let Some(fetcher) = self.fetcher.clone() {
            let cache = self.cache.clone();
            let cancel = cancel.clone();
            let period = self.preload_interval;
            handles.push(tokio::spawn(async move {
                let mut tick = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick.tick() => {
                            let outcome = cache
                                .preload_with_cancel(fetcher.as_ref(), &cancel)
                                .await;
                            debug!("preload warmed {} templates", outcome.loaded.len());
                        }
                    }
                }
            }));
        }

        info!("cache scheduler started");
        *running = Some(Running { cancel, handles });
    }

    /// Cancel the loops and wait for them to finish
    pub async fn stop(&self) {
        let running = { self.running.lock().take() };
        if let Some(running) = running {
            running.cancel.cancel();
            futures::future::join_all(running.handles).await;
            info!("cache scheduler stopped");
        }
    }

    /// Whether the background loops are live
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Drop for CacheScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.lock().take() {
            running.cancel.cancel();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TemplateEntry;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::monitor::MonitorSink;
    use crate::persist::InMemoryTier;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct CapturingMonitor {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl MonitorSink for CapturingMonitor {
        fn log_event(&self, name: &str, data: Value) {
            self.events.lock().push((name.to_string(), data));
        }
    }

    fn cache_with_monitor(config: CacheConfig) -> (Arc<CapturingMonitor>, Arc<TemplateCache>) {
        let monitor = Arc::new(CapturingMonitor::default());
        let cache = Arc::new(
            TemplateCache::new(
                config,
                Arc::new(InMemoryTier::new()),
                monitor.clone(),
                Arc::new(ManualClock::new()),
            )
            .unwrap(),
        );
        (monitor, cache)
    }

    #[tokio::test]
    async fn test_start_stop_is_idempotent() {
        let (_monitor, cache) = cache_with_monitor(CacheConfig::default());
        let scheduler = CacheScheduler::new(cache);

        assert!(!scheduler.is_running());
        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        scheduler.stop().await;

        // Restartable after a stop
        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flush_emits_event() {
        let (monitor, cache) = cache_with_monitor(CacheConfig::default());
        cache.put(TemplateEntry::new("tpl1", json!("x"))).await;
        cache.get("tpl1").await;

        let scheduler = CacheScheduler::new(cache.clone());
        scheduler.start();

        // Paused time fast-forwards through the 5-minute flush tick
        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        scheduler.stop().await;

        let events = monitor.events.lock();
        let flush = events
            .iter()
            .find(|(name, _)| name == "template_cache_flush")
            .expect("flush event emitted");
        assert_eq!(flush.1["hits"], json!(1));

        // The flush reset the window
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_threshold_flushes_early() {
        let mut config = CacheConfig::default();
        config.flush_batch_size = 3;
        let (monitor, cache) = cache_with_monitor(config);

        let scheduler = CacheScheduler::new(cache.clone());
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache.put(TemplateEntry::new("tpl1", json!("x"))).await;
        cache.get("tpl1").await;
        cache.get("tpl1").await;

        // Well before the 5-minute timer
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop().await;

        let events = monitor.events.lock();
        assert!(events.iter().any(|(name, _)| name == "template_cache_flush"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_loop_emits_event() {
        let (monitor, cache) = cache_with_monitor(CacheConfig::default());
        let scheduler = CacheScheduler::new(cache);
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(61 * 60)).await;
        scheduler.stop().await;

        let events = monitor.events.lock();
        assert!(events
            .iter()
            .any(|(name, _)| name == "template_cache_cleanup"));
    }
}
