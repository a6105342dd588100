//! In-process cache store
//!
//! Single source of truth for "is this value cached and live". Keeps three
//! structures behind one coarse lock: the id index, the category index, and
//! the full-list snapshot. Writes go through to the durable tier; reads fall
//! back to it on a miss and repopulate memory from what they find.
//!
//! # Locking
//!
//! One `parking_lot::RwLock` covers all three structures, sized for a few
//! hundred entries. The lock is never held across durable-tier I/O; the
//! usage tracker's lock may be taken while holding this one (eviction
//! ranking), never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use crate::cache::entry::{CacheSnapshot, TemplateEntry};
use crate::cache::eviction::EvictionPolicy;
use crate::cache::stats::CacheStats;
use crate::cache::usage::UsageTracker;
use crate::clock::Clock;
use crate::config::{CacheConfig, UNCATEGORIZED};
use crate::error::{Error, Result};
use crate::persist::{with_timeout, KeyKind, Keyspace, PersistentTier};

/// Which tier served a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierSource {
    /// In-process index
    Memory,
    /// Durable tier
    Persistent,
}

impl std::fmt::Display for TierSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierSource::Memory => write!(f, "memory"),
            TierSource::Persistent => write!(f, "persistent"),
        }
    }
}

/// A successful lookup
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: TemplateEntry,
    pub source: TierSource,
}

/// Result of a list-shaped lookup (`get_all`, `get_by_category`)
///
/// `from_cache=false` with non-empty entries means the data is stale: usable
/// as a fallback while the caller refetches.
#[derive(Debug, Clone, Default)]
pub struct ListLookup {
    pub entries: Vec<TemplateEntry>,
    pub from_cache: bool,
}

// =============================================================================
// Indexes
// =============================================================================

struct Indexed {
    entry: TemplateEntry,
    seq: u64,
}

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, Indexed>,
    /// Category -> ids, in insertion order; always a partition of `by_id`
    by_category: HashMap<String, Vec<String>>,
    snapshot: Option<CacheSnapshot>,
    next_seq: u64,
}

impl Indexes {
    /// Upsert into both indices; a replaced entry keeps its insertion order
    fn insert(&mut self, entry: TemplateEntry) {
        let seq = match self.by_id.get(&entry.id) {
            Some(prev) => {
                if prev.entry.category != entry.category {
                    Self::drop_category_member(
                        &mut self.by_category,
                        &prev.entry.category,
                        &entry.id,
                    );
                }
                prev.seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };

        let members = self.by_category.entry(entry.category.clone()).or_default();
        if !members.contains(&entry.id) {
            members.push(entry.id.clone());
        }
        self.by_id.insert(entry.id.clone(), Indexed { entry, seq });
    }

    /// Remove from every in-process structure
    fn remove(&mut self, id: &str) -> bool {
        let Some(removed) = self.by_id.remove(id) else {
            return false;
        };
        Self::drop_category_member(&mut self.by_category, &removed.entry.category, id);
        if let Some(snapshot) = &mut self.snapshot {
            snapshot.entries.retain(|e| e.id != id);
        }
        true
    }

    fn drop_category_member(
        by_category: &mut HashMap<String, Vec<String>>,
        category: &str,
        id: &str,
    ) {
        if let Some(members) = by_category.get_mut(category) {
            members.retain(|member| member != id);
            if members.is_empty() {
                by_category.remove(category);
            }
        }
    }

    /// Replace everything with the given full-list snapshot
    fn replace_all(&mut self, snapshot: CacheSnapshot) {
        self.by_id.clear();
        self.by_category.clear();
        for entry in &snapshot.entries {
            self.insert(entry.clone());
        }
        self.snapshot = Some(snapshot);
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_category.clear();
        self.snapshot = None;
    }
}

// =============================================================================
// Store
// =============================================================================

/// TTL-aware two-tier store with write-through persistence
pub struct CacheStore {
    indexes: RwLock<Indexes>,
    tier: Arc<dyn PersistentTier>,
    keyspace: Keyspace,
    clock: Arc<dyn Clock>,
    stats: Arc<CacheStats>,
    usage: Arc<UsageTracker>,
    eviction: EvictionPolicy,
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(
        config: CacheConfig,
        tier: Arc<dyn PersistentTier>,
        clock: Arc<dyn Clock>,
        stats: Arc<CacheStats>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        let keyspace = Keyspace::new(config.key_prefix.as_str(), config.schema_version.as_str());
        let eviction = EvictionPolicy::new(config.max_size, config.eviction_fraction);
        Self {
            indexes: RwLock::new(Indexes::default()),
            tier,
            keyspace,
            clock,
            stats,
            usage,
            eviction,
            config,
        }
    }

    /// Look up one template by id
    ///
    /// Memory first, then the durable tier. A persistent hit repopulates the
    /// in-process index. Tier failures degrade to a miss.
    pub async fn get(&self, id: &str) -> Option<CacheHit> {
        let now = self.clock.now();

        let mut stale_seen = false;
        {
            let indexes = self.indexes.read();
            if let Some(indexed) = indexes.by_id.get(id) {
                if self.entry_is_live(&indexed.entry, now) {
                    self.stats.record_hit(Some(&indexed.entry.category));
                    return Some(CacheHit {
                        entry: indexed.entry.clone(),
                        source: TierSource::Memory,
                    });
                }
                stale_seen = true;
            }
        }
        if stale_seen {
            // Lazy removal; re-check so a concurrent fresh put survives
            let mut indexes = self.indexes.write();
            let still_stale = indexes
                .by_id
                .get(id)
                .map(|ix| !self.entry_is_live(&ix.entry, now))
                .unwrap_or(false);
            if still_stale {
                indexes.remove(id);
            }
        }

        match self.load_persistent_entry(id, now).await {
            Ok(Some(entry)) => {
                {
                    let mut indexes = self.indexes.write();
                    indexes.insert(entry.clone());
                    self.run_eviction_locked(&mut indexes);
                }
                self.stats.record_hit(Some(&entry.category));
                Some(CacheHit {
                    entry,
                    source: TierSource::Persistent,
                })
            }
            Ok(None) => {
                self.stats.record_miss();
                None
            }
            Err(e) => {
                // Stale versions and malformed values are routine degradations
                if e.is_degradable() {
                    debug!("persistent read of {} degraded to miss: {}", id, e);
                } else {
                    warn!("persistent read of {} degraded to miss: {}", id, e);
                }
                self.stats.record_miss();
                None
            }
        }
    }

    /// Look up the full template list
    ///
    /// Freshness is judged on the snapshot's `fetched_at` against the
    /// in-process TTL regardless of which tier served it, so a warm start
    /// never resurrects a list the memory tier would call stale.
    pub async fn get_all(&self) -> ListLookup {
        let now = self.clock.now();

        let mut fallback: Option<Vec<TemplateEntry>> = None;
        {
            let indexes = self.indexes.read();
            if let Some(snapshot) = &indexes.snapshot {
                if snapshot.is_fresh(now, self.config.ttl) {
                    self.stats.record_hit(None);
                    return ListLookup {
                        entries: snapshot.entries.clone(),
                        from_cache: true,
                    };
                }
                fallback = Some(snapshot.entries.clone());
            }
        }

        match self.load_persistent_snapshot().await {
            Ok(Some(snapshot)) => {
                if snapshot.is_fresh(now, self.config.ttl) {
                    let entries = snapshot.entries.clone();
                    {
                        let mut indexes = self.indexes.write();
                        indexes.replace_all(snapshot);
                        self.run_eviction_locked(&mut indexes);
                    }
                    self.stats.record_hit(None);
                    return ListLookup {
                        entries,
                        from_cache: true,
                    };
                }
                if fallback.is_none() {
                    fallback = Some(snapshot.entries);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("persistent snapshot read degraded to miss: {}", e),
        }

        self.stats.record_miss();
        ListLookup {
            entries: fallback.unwrap_or_default(),
            from_cache: false,
        }
    }

    /// Look up every live template in one category
    ///
    /// Prefers the maintained category index; otherwise derives the list
    /// from a live snapshot and backfills both indices.
    pub async fn get_by_category(&self, category: &str) -> ListLookup {
        let now = self.clock.now();

        {
            let indexes = self.indexes.read();
            if let Some(members) = indexes.by_category.get(category) {
                let entries: Vec<TemplateEntry> = members
                    .iter()
                    .filter_map(|id| indexes.by_id.get(id))
                    .filter(|ix| self.entry_is_live(&ix.entry, now))
                    .map(|ix| ix.entry.clone())
                    .collect();
                if !entries.is_empty() {
                    self.stats.record_hit(Some(category));
                    return ListLookup {
                        entries,
                        from_cache: true,
                    };
                }
            }
        }

        // Lazy materialization from the in-memory snapshot
        if let Some(entries) = self.derive_category_locked(category, now) {
            self.stats.record_hit(Some(category));
            return ListLookup {
                entries,
                from_cache: true,
            };
        }

        // Last resort: a live durable snapshot (warm start)
        match self.load_persistent_snapshot().await {
            Ok(Some(snapshot)) if snapshot.is_fresh(now, self.config.ttl) => {
                {
                    let mut indexes = self.indexes.write();
                    indexes.replace_all(snapshot);
                    self.run_eviction_locked(&mut indexes);
                }
                if let Some(entries) = self.derive_category_locked(category, now) {
                    self.stats.record_hit(Some(category));
                    return ListLookup {
                        entries,
                        from_cache: true,
                    };
                }
            }
            Ok(_) => {}
            Err(e) => warn!("persistent snapshot read degraded to miss: {}", e),
        }

        self.stats.record_miss();
        ListLookup::default()
    }

    /// Derive a category list from a live snapshot and backfill the indices
    fn derive_category_locked(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Option<Vec<TemplateEntry>> {
        let mut indexes = self.indexes.write();
        let snapshot = indexes.snapshot.as_ref()?;
        if !snapshot.is_fresh(now, self.config.ttl) {
            return None;
        }
        let entries: Vec<TemplateEntry> = snapshot
            .entries
            .iter()
            .filter(|e| e.category == category && self.entry_is_live(e, now))
            .cloned()
            .collect();
        if entries.is_empty() {
            return None;
        }
        for entry in &entries {
            indexes.insert(entry.clone());
        }
        self.run_eviction_locked(&mut indexes);
        Some(entries)
    }

    /// Upsert one template into both tiers
    ///
    /// Stamps `inserted_at` and the running schema version, then writes
    /// through. A failed durable write is logged and the in-process write
    /// stands.
    #[instrument(skip(self, entry), fields(id = %entry.id))]
    pub async fn put(&self, entry: TemplateEntry) -> TemplateEntry {
        let entry = self.stamp(entry);

        {
            let mut indexes = self.indexes.write();
            indexes.insert(entry.clone());
            self.run_eviction_locked(&mut indexes);
        }
        self.stats.record_save();

        self.save_entry_through(&entry).await;
        entry
    }

    /// Replace the full snapshot and rebuild all indices
    pub async fn put_all(&self, entries: Vec<TemplateEntry>) -> CacheSnapshot {
        let now = self.clock.now();
        let entries: Vec<TemplateEntry> = entries.into_iter().map(|e| self.stamp(e)).collect();
        let snapshot = CacheSnapshot {
            entries,
            fetched_at: now,
        };

        {
            let mut indexes = self.indexes.write();
            indexes.replace_all(snapshot.clone());
            self.run_eviction_locked(&mut indexes);
        }
        self.stats.record_save();

        match serde_json::to_value(&snapshot) {
            Ok(value) => {
                let key = self.keyspace.snapshot_key();
                if let Err(e) = with_timeout(self.config.tier_timeout, self.tier.save(&key, value))
                    .await
                {
                    warn!("snapshot write-through not durable: {}", e);
                }
            }
            Err(e) => warn!("snapshot failed to serialize: {}", e),
        }
        for entry in &snapshot.entries {
            self.save_entry_through(entry).await;
        }

        snapshot
    }

    /// Remove one id from all in-process indices and the durable tier
    ///
    /// No-op (returns false) if the id is cached nowhere.
    pub async fn invalidate(&self, id: &str) -> bool {
        let removed = self.indexes.write().remove(id);

        let key = self.keyspace.entry_key(id);
        match with_timeout(self.config.tier_timeout, self.tier.delete(&key)).await {
            Ok(deleted) => removed || deleted,
            Err(e) => {
                warn!("invalidate could not reach durable tier for {}: {}", key, e);
                removed
            }
        }
    }

    /// Clear every in-process structure and purge the cache's durable keys
    ///
    /// Usage history lives under its own kind and is not touched.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self) {
        self.indexes.write().clear();

        for kind in [KeyKind::Entry, KeyKind::Snapshot] {
            let prefix = self.keyspace.kind_prefix(kind);
            let keys =
                match with_timeout(self.config.tier_timeout, self.tier.enumerate(&prefix)).await {
                    Ok(keys) => keys,
                    Err(e) => {
                        warn!("invalidate_all enumerate of {} failed: {}", prefix, e);
                        continue;
                    }
                };
            for key in keys {
                if let Err(e) = with_timeout(self.config.tier_timeout, self.tier.delete(&key)).await
                {
                    warn!("invalidate_all delete of {} failed: {}", key, e);
                }
            }
        }
    }

    /// Whether `id` is live in the in-process index right now
    pub fn contains_live(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.indexes
            .read()
            .by_id
            .get(id)
            .map(|ix| self.entry_is_live(&ix.entry, now))
            .unwrap_or(false)
    }

    /// Entries currently held in the id index, live or not
    pub fn len(&self) -> usize {
        self.indexes.read().by_id.len()
    }

    /// True when the id index is empty
    pub fn is_empty(&self) -> bool {
        self.indexes.read().by_id.is_empty()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn stamp(&self, mut entry: TemplateEntry) -> TemplateEntry {
        entry.inserted_at = self.clock.now();
        entry.schema_version = self.config.schema_version.clone();
        if entry.category.is_empty() {
            entry.category = UNCATEGORIZED.to_string();
        }
        entry
    }

    fn entry_is_live(&self, entry: &TemplateEntry, now: DateTime<Utc>) -> bool {
        entry.is_live(now, self.config.ttl, &self.config.schema_version)
    }

    async fn save_entry_through(&self, entry: &TemplateEntry) {
        let key = self.keyspace.entry_key(&entry.id);
        match serde_json::to_value(entry) {
            Ok(value) => {
                if let Err(e) = with_timeout(self.config.tier_timeout, self.tier.save(&key, value))
                    .await
                {
                    warn!("write-through of {} not durable: {}", key, e);
                }
            }
            Err(e) => warn!("entry {} failed to serialize: {}", entry.id, e),
        }
    }

    /// Load and validate one entry from the durable tier
    ///
    /// Revalidated against the durable window (`persist_ttl`), which is
    /// deliberately looser than the in-process TTL. Every error this returns
    /// is degradable; callers log it and treat the entry as absent.
    async fn load_persistent_entry(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TemplateEntry>> {
        let key = self.keyspace.entry_key(id);
        let Some(value) = with_timeout(self.config.tier_timeout, self.tier.load(&key)).await?
        else {
            return Ok(None);
        };

        let entry: TemplateEntry =
            serde_json::from_value(value).map_err(|e| Error::MalformedEntry {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        if entry.schema_version != self.config.schema_version {
            return Err(Error::VersionMismatch {
                stored: entry.schema_version,
                running: self.config.schema_version.clone(),
            });
        }
        if entry.is_expired(now, self.config.persist_ttl) {
            debug!("durable copy of {} is past the persist window", id);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn load_persistent_snapshot(&self) -> Result<Option<CacheSnapshot>> {
        let key = self.keyspace.snapshot_key();
        let Some(value) = with_timeout(self.config.tier_timeout, self.tier.load(&key)).await?
        else {
            return Ok(None);
        };
        let snapshot = serde_json::from_value(value).map_err(|e| Error::MalformedEntry {
            key,
            reason: e.to_string(),
        })?;
        Ok(Some(snapshot))
    }

    /// Evict least-used ids while the id index exceeds capacity
    fn run_eviction_locked(&self, indexes: &mut Indexes) {
        if !self.eviction.over_capacity(indexes.by_id.len()) {
            return;
        }
        let counts = self.usage.counts();
        let population: Vec<(String, u64)> = indexes
            .by_id
            .iter()
            .map(|(id, ix)| (id.clone(), ix.seq))
            .collect();
        let victims = self.eviction.victims(&population, &counts);
        debug!(
            "evicting {} of {} cached entries",
            victims.len(),
            population.len()
        );
        for id in victims {
            indexes.remove(&id);
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
    use crate::error::{Error, Result};
    use crate::persist::InMemoryTier;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn harness() -> (Arc<InMemoryTier>, Arc<ManualClock>, CacheStore) {
        harness_with(CacheConfig::default())
    }

    fn harness_with(config: CacheConfig) -> (Arc<InMemoryTier>, Arc<ManualClock>, CacheStore) {
        let tier = Arc::new(InMemoryTier::new());
        let clock = Arc::new(ManualClock::new());
        let store = store_over(config, tier.clone(), clock.clone());
        (tier, clock, store)
    }

    fn store_over(
        config: CacheConfig,
        tier: Arc<InMemoryTier>,
        clock: Arc<ManualClock>,
    ) -> CacheStore {
        let keyspace = Keyspace::new(config.key_prefix.as_str(), config.schema_version.as_str());
        let usage = Arc::new(UsageTracker::new(
            tier.clone(),
            keyspace,
            clock.clone(),
            config.tier_timeout,
        ));
        CacheStore::new(
            config,
            tier,
            clock,
            Arc::new(CacheStats::new(0)),
            usage,
        )
    }

    fn template(id: &str, category: &str) -> TemplateEntry {
        TemplateEntry::new(id, json!({"body": format!("body of {}", id)}))
            .with_category(category)
    }

    #[tokio::test]
    async fn test_put_then_get_hits_memory() {
        let (_tier, _clock, store) = harness();
        store.put(template("tpl1", "wedding")).await;

        let hit = store.get("tpl1").await.expect("hit");
        assert_eq!(hit.source, TierSource::Memory);
        assert_eq!(hit.entry.id, "tpl1");
        assert_eq!(hit.entry.category, "wedding");
        assert_eq!(hit.entry.payload, json!({"body": "body of tpl1"}));
    }

    #[tokio::test]
    async fn test_miss_on_unknown_id() {
        let (_tier, _clock, store) = harness();
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_persistent_fallback_repopulates_memory() {
        let (tier, clock, store) = harness();
        store.put(template("tpl1", "wedding")).await;

        // Fresh store over the same tier: memory cold, durable warm
        let restarted = store_over(CacheConfig::default(), tier, clock);
        let hit = restarted.get("tpl1").await.expect("persistent hit");
        assert_eq!(hit.source, TierSource::Persistent);

        // Second read now comes from memory
        let hit = restarted.get("tpl1").await.expect("memory hit");
        assert_eq!(hit.source, TierSource::Memory);
    }

    #[tokio::test]
    async fn test_ttl_expiry_in_memory_with_looser_durable_window() {
        let (_tier, clock, store) = harness();
        store.put(template("tpl1", "wedding")).await;

        // Past the memory TTL but inside the durable window
        clock.advance(Duration::from_secs(31 * 60));
        let hit = store.get("tpl1").await.expect("still in durable window");
        assert_eq!(hit.source, TierSource::Persistent);

        // Past the durable window too
        clock.advance(Duration::from_secs(25 * 60 * 60));
        assert!(store.get("tpl1").await.is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_a_miss() {
        let (tier, clock, store) = harness();
        store.put(template("tpl1", "wedding")).await;

        let mut config = CacheConfig::default();
        config.schema_version = "2".to_string();
        let upgraded = store_over(config, tier, clock);
        assert!(upgraded.get("tpl1").await.is_none());
    }

    #[tokio::test]
    async fn test_tier_failure_degrades_to_miss() {
        struct FailingTier;

        #[async_trait]
        impl PersistentTier for FailingTier {
            async fn load(&self, _key: &str) -> Result<Option<Value>> {
                Err(Error::TierUnavailable("disk on fire".into()))
            }
            async fn save(&self, _key: &str, _value: Value) -> Result<()> {
                Err(Error::TierUnavailable("disk on fire".into()))
            }
            async fn delete(&self, _key: &str) -> Result<bool> {
                Err(Error::TierUnavailable("disk on fire".into()))
            }
            async fn enumerate(&self, _prefix: &str) -> Result<Vec<String>> {
                Err(Error::TierUnavailable("disk on fire".into()))
            }
        }

        let config = CacheConfig::default();
        let tier = Arc::new(FailingTier);
        let clock = Arc::new(ManualClock::new());
        let keyspace = Keyspace::new(config.key_prefix.as_str(), config.schema_version.as_str());
        let usage = Arc::new(UsageTracker::new(
            tier.clone(),
            keyspace,
            clock.clone(),
            config.tier_timeout,
        ));
        let store = CacheStore::new(
            config,
            tier,
            clock,
            Arc::new(CacheStats::new(0)),
            usage,
        );

        // Write is accepted in memory even though write-through failed
        store.put(template("tpl1", "wedding")).await;
        let hit = store.get("tpl1").await.expect("memory hit");
        assert_eq!(hit.source, TierSource::Memory);

        // A cold id degrades to a plain miss, no panic, no error
        assert!(store.get("cold").await.is_none());
        store.invalidate_all().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_durable_value_is_a_miss() {
        let (tier, _clock, store) = harness();
        tier.save("tpl-cache:entry:bad:1", json!(["not", "an", "entry"]))
            .await
            .unwrap();
        assert!(store.get("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_get_all_freshness() {
        let (_tier, clock, store) = harness();
        store
            .put_all(vec![template("a", "wedding"), template("b", "email")])
            .await;

        let lookup = store.get_all().await;
        assert!(lookup.from_cache);
        assert_eq!(lookup.entries.len(), 2);

        // Stale snapshot is still returned as fallback data
        clock.advance(Duration::from_secs(31 * 60));
        let lookup = store.get_all().await;
        assert!(!lookup.from_cache);
        assert_eq!(lookup.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_get_all_warm_starts_from_durable_snapshot() {
        let (tier, clock, store) = harness();
        store.put_all(vec![template("a", "wedding")]).await;

        let restarted = store_over(CacheConfig::default(), tier, clock);
        let lookup = restarted.get_all().await;
        assert!(lookup.from_cache);
        assert_eq!(lookup.entries.len(), 1);
        assert_eq!(restarted.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_category_uses_index() {
        let (_tier, _clock, store) = harness();
        store.put(template("a", "wedding")).await;
        store.put(template("b", "wedding")).await;
        store.put(template("c", "email")).await;

        let lookup = store.get_by_category("wedding").await;
        assert!(lookup.from_cache);
        let ids: Vec<&str> = lookup.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let lookup = store.get_by_category("unknown").await;
        assert!(!lookup.from_cache);
        assert!(lookup.entries.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_category_lazy_materializes_from_snapshot() {
        let (tier, clock, store) = harness();
        store
            .put_all(vec![template("a", "wedding"), template("b", "email")])
            .await;

        // Fresh store: no category index yet, durable snapshot is live
        let restarted = store_over(CacheConfig::default(), tier, clock);
        let lookup = restarted.get_by_category("wedding").await;
        assert!(lookup.from_cache);
        assert_eq!(lookup.entries.len(), 1);
        assert_eq!(lookup.entries[0].id, "a");

        // The derived list was backfilled into the id index
        assert!(restarted.contains_live("a"));
    }

    #[tokio::test]
    async fn test_category_moves_with_replacement() {
        let (_tier, _clock, store) = harness();
        store.put(template("a", "wedding")).await;
        store.put(template("a", "email")).await;

        assert!(!store.get_by_category("wedding").await.from_cache);
        let lookup = store.get_by_category("email").await;
        assert_eq!(lookup.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_category_defaults_to_sentinel() {
        let (_tier, _clock, store) = harness();
        let mut entry = template("a", "wedding");
        entry.category = String::new();
        let stamped = store.put(entry).await;
        assert_eq!(stamped.category, UNCATEGORIZED);
    }

    #[tokio::test]
    async fn test_invalidate_removes_both_tiers() {
        let (tier, _clock, store) = harness();
        store.put(template("a", "wedding")).await;

        assert!(store.invalidate("a").await);
        assert!(store.get("a").await.is_none());
        assert_eq!(tier.load("tpl-cache:entry:a:1").await.unwrap(), None);

        // Second call is a no-op, not an error
        assert!(!store.invalidate("a").await);
    }

    #[tokio::test]
    async fn test_invalidate_all_is_idempotent() {
        let (tier, _clock, store) = harness();
        store.put(template("a", "wedding")).await;
        store.put_all(vec![template("b", "email")]).await;

        store.invalidate_all().await;
        assert!(store.is_empty());
        assert!(tier.enumerate("tpl-cache:entry:").await.unwrap().is_empty());
        assert!(tier
            .enumerate("tpl-cache:snapshot:")
            .await
            .unwrap()
            .is_empty());

        store.invalidate_all().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_all_keeps_usage_records() {
        let (tier, _clock, store) = harness();
        store.put(template("a", "wedding")).await;
        store.usage.register_use("a", "wedding").await;

        store.invalidate_all().await;
        assert_eq!(
            tier.enumerate("tpl-cache:usage:").await.unwrap().len(),
            1
        );
        assert_eq!(store.usage.counts()["a"], 1);
    }

    #[tokio::test]
    async fn test_eviction_bound_after_overflow() {
        let mut config = CacheConfig::default();
        config.max_size = 10;
        let (_tier, _clock, store) = harness_with(config);

        // Give the first three ids usage so they survive
        for id in ["tpl-0", "tpl-1", "tpl-2"] {
            store.usage.register_use(id, "wedding").await;
            store.usage.register_use(id, "wedding").await;
        }

        for i in 0..15 {
            store
                .put(template(&format!("tpl-{}", i), "wedding"))
                .await;
        }

        assert!(store.len() <= 10);
        for id in ["tpl-0", "tpl-1", "tpl-2"] {
            assert!(store.contains_live(id), "{} should survive eviction", id);
        }
    }

    #[tokio::test]
    async fn test_evicted_id_repopulates_from_durable_tier() {
        let mut config = CacheConfig::default();
        config.max_size = 5;
        let (_tier, _clock, store) = harness_with(config);

        for i in 0..7 {
            store
                .put(template(&format!("tpl-{}", i), "wedding"))
                .await;
        }
        assert!(store.len() <= 5);

        // tpl-0 was evicted (lowest usage, earliest insertion) but the
        // durable tier still holds it
        assert!(!store.contains_live("tpl-0"));
        let hit = store.get("tpl-0").await.expect("durable repopulation");
        assert_eq!(hit.source, TierSource::Persistent);
        assert!(store.contains_live("tpl-0"));
    }

    #[tokio::test]
    async fn test_category_consistency_for_live_entries() {
        let (_tier, clock, store) = harness();
        store.put(template("a", "wedding")).await;
        clock.advance(Duration::from_secs(31 * 60));
        store.put(template("b", "wedding")).await;

        // a expired in memory, b is live: the category lookup returns
        // exactly the live members
        let lookup = store.get_by_category("wedding").await;
        let ids: Vec<&str> = lookup.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        assert!(!store.contains_live("a"));
        assert!(store.contains_live("b"));
    }
}
