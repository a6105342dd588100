//! Trousseau - Two-Tier Template Cache
//!
//! A library-level cache for reusable content templates, sitting in front of
//! an expensive fetch. An in-process index serves hot reads; a durable
//! key-value tier provides write-through persistence and warm starts across
//! restarts. Usage counts drive both pre-warming and eviction.
//!
//! # Architecture
//!
//! ```text
//! request ──► CacheStore ──miss──► PersistentTier ──miss──► caller's fetch
//!                │  ▲
//!     UsageTracker  └── EvictionPolicy (bounds memory)
//!          │
//!     PreloadScheduler (warms ahead of demand)
//! ```
//!
//! Background duties (stats flush, durable-tier cleanup, preload) run under
//! an explicit [`CacheScheduler`] with `start()`/`stop()` so tests can drive
//! them deterministically.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use trousseau::{CacheConfig, InMemoryTier, NullMonitor, SystemClock, TemplateCache, TemplateEntry};
//!
//! # async fn demo() -> trousseau::Result<()> {
//! let cache = TemplateCache::new(
//!     CacheConfig::default(),
//!     Arc::new(InMemoryTier::new()),
//!     Arc::new(NullMonitor),
//!     Arc::new(SystemClock),
//! )?;
//!
//! cache
//!     .put(TemplateEntry::new("welcome", json!({"subject": "Hi!"})).with_category("email"))
//!     .await;
//! let hit = cache.get("welcome").await;
//! assert!(hit.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Store, usage tracking, eviction, preload, stats
//! - [`clock`] - Injectable time source
//! - [`config`] - Named tunables with defaults
//! - [`error`] - Error types
//! - [`monitor`] - Fire-and-forget monitoring contract
//! - [`persist`] - Durable tier trait and implementations
//! - [`scheduler`] - Background flush/cleanup/preload loops

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod persist;
pub mod scheduler;

// Re-export commonly used types
pub use cache::{
    CacheHit, CacheReport, CacheSnapshot, CacheStats, CleanupOutcome, EvictionPolicy, ListLookup,
    PreloadOutcome, StatsSnapshot, TemplateCache, TemplateFetcher, TemplateEntry, TierSource,
    UsageRecord, UsageTracker,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, UNCATEGORIZED};
pub use error::{Error, Result};
pub use monitor::{MonitorSink, NullMonitor, TracingMonitor};
pub use persist::{FileTier, InMemoryTier, KeyKind, Keyspace, PersistentTier};
pub use scheduler::CacheScheduler;
