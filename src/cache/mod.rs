//! Two-Tier Template Cache
//!
//! In-process index in front of a durable key-value tier, with usage-driven
//! preloading and bounded eviction.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        TemplateCache                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  CacheStore              │ UsageTracker      │ StatsReporter     │
//! │  ┌────────────────────┐  │ ┌──────────────┐  │ ┌──────────────┐  │
//! │  │ id / category /    │  │ │ per-id count │  │ │ flush + sweep│  │
//! │  │ snapshot indices   │  │ │ + timestamps │  │ │ counters     │  │
//! │  └─────────┬──────────┘  │ └──────┬───────┘  │ └──────┬───────┘  │
//! │            │ write-through        │ ranks           │ cleans     │
//! │            ▼                      ▼                 ▼            │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │            PersistentTier (file / in-memory / …)           │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - One coarse lock over the in-process indices, never held across I/O
//! - Durable-tier failures degrade to misses, never to caller errors
//! - Usage history is independent of cache contents and outlives them
//! - Eviction bounds memory only; the durable tier keeps its copy

mod entry;
mod eviction;
mod preload;
mod service;
mod stats;
mod store;
mod usage;

pub use entry::{CacheSnapshot, TemplateEntry};
pub use eviction::EvictionPolicy;
pub use preload::{PreloadOutcome, PreloadScheduler, TemplateFetcher};
pub use service::TemplateCache;
pub use stats::{CacheReport, CacheStats, CleanupOutcome, StatsReporter, StatsSnapshot};
pub use store::{CacheHit, CacheStore, ListLookup, TierSource};
pub use usage::{UsageRecord, UsageTracker};
