//! Cache store abstraction
//!
//! Defines the `CacheStore` trait the action steps talk to. The steps only
//! ever see this seam, so the storage engine can be swapped (or faked in
//! tests) without touching the save/restore decision logic.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Longest key a store will accept
pub const MAX_KEY_LENGTH: usize = 512;

/// Result of a successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEntry {
    /// Key the paths were stored under
    pub key: String,
    /// Size of the stored archive in bytes
    pub archive_size: u64,
}

/// Result of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredEntry {
    /// Key of the entry that was extracted
    pub key: String,
    /// Whether `key` is the primary key rather than a restore-key match
    pub exact: bool,
    /// Number of regular files written
    pub files: usize,
}

/// Cache store trait for pluggable storage implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Persist `paths` under `key`
    ///
    /// # Errors
    /// Returns an error if the key or paths are invalid, the key is already
    /// taken, or the backend fails to write the entry.
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<SavedEntry>;

    /// Restore `paths` from the entry stored under `primary_key`, falling back
    /// to the newest entry whose key starts with one of `restore_keys`
    ///
    /// Returns `Ok(None)` on a cache miss.
    async fn restore(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<RestoredEntry>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Check that a key can be stored
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation("Cache key must not be empty"));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(Error::validation(format!(
            "Key Validation Error: {key} cannot be larger than {MAX_KEY_LENGTH} characters."
        )));
    }
    if key.contains(',') {
        return Err(Error::validation(format!(
            "Key Validation Error: {key} cannot contain commas."
        )));
    }
    Ok(())
}

/// Check the path list handed to `save` or `restore`
///
/// With `must_exist`, every path has to be present on disk.
pub fn validate_paths(paths: &[PathBuf], must_exist: bool) -> Result<()> {
    if paths.is_empty() {
        return Err(Error::validation(
            "Path Validation Error: At least one directory or file path is required",
        ));
    }
    if must_exist {
        let missing: Vec<String> = paths
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "Path Validation Error: Path(s) specified in the action for caching do(es) not exist, hence no cache is being saved: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}
