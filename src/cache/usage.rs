//! Per-template usage tracking
//!
//! Usage history is independent of cache contents: counts survive TTL
//! expiry, eviction, and invalidation, and are cleared only by an explicit
//! [`UsageTracker::reset`]. The in-memory map is the source of truth and is
//! persisted write-behind so a restart warm-starts from the durable tier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::persist::{with_timeout, Keyspace, PersistentTier};

/// Cumulative usage of one template id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub entry_id: String,
    /// Monotonically increasing; never decremented
    pub count: u64,
    pub last_used_at: DateTime<Utc>,
    /// Denormalized copy of the entry's category at time of use
    pub category: String,
}

/// Tracks access counts and timestamps per entry id
pub struct UsageTracker {
    records: RwLock<HashMap<String, UsageRecord>>,
    tier: Arc<dyn PersistentTier>,
    keyspace: Keyspace,
    clock: Arc<dyn Clock>,
    tier_timeout: Duration,
}

impl UsageTracker {
    pub fn new(
        tier: Arc<dyn PersistentTier>,
        keyspace: Keyspace,
        clock: Arc<dyn Clock>,
        tier_timeout: Duration,
    ) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            tier,
            keyspace,
            clock,
            tier_timeout,
        }
    }

    /// Warm-start the record map from the durable tier
    ///
    /// Failures leave the tracker empty; usage then rebuilds from live
    /// traffic.
    pub async fn hydrate(&self) {
        let key = self.keyspace.usage_key();
        match with_timeout(self.tier_timeout, self.tier.load(&key)).await {
            Ok(Some(value)) => match serde_json::from_value::<HashMap<String, UsageRecord>>(value) {
                Ok(map) => {
                    debug!("hydrated {} usage records", map.len());
                    *self.records.write() = map;
                }
                Err(e) => warn!("usage map under {} is malformed: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => warn!("usage hydrate failed: {}", e),
        }
    }

    /// Record one use of `id`, returning the updated count
    ///
    /// The whole map is persisted write-behind; persistence failures are
    /// logged and never surfaced.
    pub async fn register_use(&self, id: &str, category: &str) -> u64 {
        let now = self.clock.now();
        let (count, persisted) = {
            let mut records = self.records.write();
            let count = {
                let record = records
                    .entry(id.to_string())
                    .and_modify(|r| {
                        r.count += 1;
                        r.last_used_at = now;
                        r.category = category.to_string();
                    })
                    .or_insert_with(|| UsageRecord {
                        entry_id: id.to_string(),
                        count: 1,
                        last_used_at: now,
                        category: category.to_string(),
                    });
                record.count
            };
            (count, records.clone())
        };

        match serde_json::to_value(&persisted) {
            Ok(value) => {
                let key = self.keyspace.usage_key();
                if let Err(e) = with_timeout(self.tier_timeout, self.tier.save(&key, value)).await {
                    warn!("usage persist failed: {}", e);
                }
            }
            Err(e) => warn!("usage map failed to serialize: {}", e),
        }

        count
    }

    /// Ids with `count >= threshold`, most-used first
    ///
    /// Equal counts are ordered by id for a stable result.
    pub fn preload_candidates(&self, threshold: u64) -> Vec<String> {
        let records = self.records.read();
        let mut qualified: Vec<(&String, u64)> = records
            .iter()
            .filter(|(_, r)| r.count >= threshold)
            .map(|(id, r)| (id, r.count))
            .collect();
        qualified.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        qualified.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Categories by cumulative usage count, descending
    pub fn most_used_categories(&self) -> Vec<(String, u64)> {
        let records = self.records.read();
        let mut by_category: HashMap<String, u64> = HashMap::new();
        for record in records.values() {
            *by_category.entry(record.category.clone()).or_insert(0) += record.count;
        }
        let mut categories: Vec<(String, u64)> = by_category.into_iter().collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        categories
    }

    /// Current count per id, for eviction ranking
    pub fn counts(&self) -> HashMap<String, u64> {
        self.records
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), r.count))
            .collect()
    }

    /// Number of tracked ids
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when nothing has been tracked
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Clear all usage history, in memory and in the durable tier
    ///
    /// The only path that destroys usage records.
    pub async fn reset(&self) {
        self.records.write().clear();
        let key = self.keyspace.usage_key();
        if let Err(e) = with_timeout(self.tier_timeout, self.tier.delete(&key)).await {
            warn!("usage reset could not delete {}: {}", key, e);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
