//! In-memory durable tier
//!
//! Backs tests and deployments that only want the in-process cache with the
//! same code path as a real durable tier. Lock-free via DashMap.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::PersistentTier;
use crate::error::Result;

/// DashMap-backed tier
#[derive(Debug, Default)]
pub struct InMemoryTier {
    storage: DashMap<String, Value>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryTier {
    /// Create an empty tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// True when no keys are stored
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Read operations served
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Write operations served
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Delete operations served
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PersistentTier for InMemoryTier {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.get(key).map(|v| v.clone()))
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.storage.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.remove(key).is_some())
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut keys: Vec<String> = self
            .storage
            .iter()
            .filter(|kv| kv.key().starts_with(prefix))
            .map(|kv| kv.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// =============================================================================
// Tests
// =============================================================================
