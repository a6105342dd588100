//! File-backed durable tier
//!
//! One JSON file per key inside a root directory. Keys are percent-encoded
//! into file names, so the namespaced `:` separators survive round-trips on
//! any filesystem. Suited to the few hundred entries this cache holds; not
//! a general-purpose embedded store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::PersistentTier;
use crate::error::{Error, Result};

const FILE_SUFFIX: &str = ".json";

/// Directory-of-JSON-files tier
#[derive(Debug)]
pub struct FileTier {
    root: PathBuf,
}

impl FileTier {
    /// Open a tier rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = urlencoding::encode(key);
        self.root.join(format!("{}{}", encoded, FILE_SUFFIX))
    }

    fn key_from_file_name(name: &str) -> Option<String> {
        let encoded = name.strip_suffix(FILE_SUFFIX)?;
        urlencoding::decode(encoded).ok().map(|s| s.into_owned())
    }
}

#[async_trait]
impl PersistentTier for FileTier {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::TierUnavailable(format!("read {}: {}", key, e))),
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| Error::MalformedEntry {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key);
        let bytes = serde_json::to_vec(&value)?;
        // Write-then-rename so readers never observe a half-written value
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::TierUnavailable(format!("write {}: {}", key, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::TierUnavailable(format!("rename {}: {}", key, e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::TierUnavailable(format!("delete {}: {}", key, e))),
        }
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::TierUnavailable(format!("read_dir: {}", e)))?;

        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Error::TierUnavailable(format!("read_dir entry: {}", e)))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                debug!("skipping non-utf8 file name in {}", self.root.display());
                continue;
            };
            if let Some(key) = Self::key_from_file_name(name) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// =============================================================================
// Tests
// =============================================================================
