//! Durable tier abstraction
//!
//! A generic key-value store used as a warm-start layer across process
//! restarts. Treated as fallible and slow relative to the in-process index:
//! callers wrap every operation in [`with_timeout`] and degrade errors to
//! absence instead of propagating them.
//!
//! Keys are namespaced as `{prefix}:{kind}:{identifier}:{schemaVersion}` so
//! deploying a new schema version naturally orphans old entries; the orphans
//! are removed lazily by the cleanup sweep.

mod file;
mod memory;

pub use file::FileTier;
pub use memory::InMemoryTier;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Durable key-value store behind the cache
#[async_trait]
pub trait PersistentTier: Send + Sync {
    /// Load the value stored under `key`, if any
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    async fn save(&self, key: &str, value: Value) -> Result<()>;

    /// Delete the value under `key`; returns whether a value was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List all keys starting with `prefix`
    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Await a tier operation under a time budget
///
/// A timeout is reported as [`Error::TierTimeout`] and handled exactly like
/// any other tier failure.
pub async fn with_timeout<T, F>(budget: Duration, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, op).await {
        Ok(result) => result,
        Err(_) => Err(Error::TierTimeout(budget)),
    }
}

// =============================================================================
// Keyspace
// =============================================================================

/// Kind segment of a namespaced key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// A single cached template
    Entry,
    /// The full-list snapshot
    Snapshot,
    /// The usage record map
    Usage,
}

impl KeyKind {
    fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Entry => "entry",
            KeyKind::Snapshot => "snapshot",
            KeyKind::Usage => "usage",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(KeyKind::Entry),
            "snapshot" => Some(KeyKind::Snapshot),
            "usage" => Some(KeyKind::Usage),
            _ => None,
        }
    }
}

/// A parsed namespaced key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub kind: KeyKind,
    pub identifier: String,
    pub version: String,
}

/// Builds and parses the cache's namespaced keys
#[derive(Debug, Clone)]
pub struct Keyspace {
    prefix: String,
    version: String,
}

impl Keyspace {
    /// Create a keyspace for `prefix` at schema `version`
    ///
    /// Both segments must be colon-free; `CacheConfig::validate` enforces
    /// this before a keyspace is built.
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
        }
    }

    /// Running schema version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Key for a single template entry
    pub fn entry_key(&self, id: &str) -> String {
        self.key(KeyKind::Entry, id)
    }

    /// Key for the full-list snapshot
    pub fn snapshot_key(&self) -> String {
        self.key(KeyKind::Snapshot, "full")
    }

    /// Key for the usage record map
    pub fn usage_key(&self) -> String {
        self.key(KeyKind::Usage, "records")
    }

    /// Prefix covering every key of one kind, across all schema versions
    pub fn kind_prefix(&self, kind: KeyKind) -> String {
        format!("{}:{}:", self.prefix, kind.as_str())
    }

    /// Prefix covering every key in this cache's namespace
    pub fn namespace_prefix(&self) -> String {
        format!("{}:", self.prefix)
    }

    fn key(&self, kind: KeyKind, identifier: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.prefix,
            kind.as_str(),
            identifier,
            self.version
        )
    }

    /// Parse a key from this namespace
    ///
    /// Identifiers may themselves contain `:`; the version is the segment
    /// after the last colon.
    pub fn parse(&self, key: &str) -> Option<ParsedKey> {
        let rest = key.strip_prefix(&format!("{}:", self.prefix))?;
        let (kind_str, rest) = rest.split_once(':')?;
        let kind = KeyKind::parse(kind_str)?;
        let (identifier, version) = rest.rsplit_once(':')?;
        if identifier.is_empty() || version.is_empty() {
            return None;
        }
        Some(ParsedKey {
            kind,
            identifier: identifier.to_string(),
            version: version.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
