//! Local file-based cache store
//!
//! Entries live at `{root}/{h[0:2]}/{h[2:4]}/{h}/` where `h` is the sha256 of
//! the cache key. Each entry holds `archive.tar.zst` and `entry.json`.
//! Entries are immutable once written.

use crate::archive::{extract_archive, file_digest, write_archive};
use crate::backend::{CacheStore, RestoredEntry, SavedEntry, validate_key, validate_paths};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const ENTRY_FILE: &str = "entry.json";
const ARCHIVE_FILE: &str = "archive.tar.zst";
const STAGING_PREFIX: &str = ".staging-";
/// Staging directories older than this belong to a save that died
const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Metadata stored next to each archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    /// The cache key as given by the caller
    pub key: String,
    /// Paths that were archived, in archive order
    pub paths: Vec<String>,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// Archive size in bytes
    pub archive_size: u64,
    /// Hex sha256 of the archive
    pub archive_sha256: String,
    /// Version of keepcache that wrote the entry
    pub keepcache_version: String,
}

/// Inputs for determining the cache root directory
#[derive(Debug, Clone)]
struct CacheInputs {
    keepcache_cache_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) KEEPCACHE_CACHE_DIR (explicit override)
    // 2) XDG_CACHE_HOME/keepcache
    // 3) OS cache dir/keepcache
    // 4) ~/.keepcache/cache
    // 5) TMPDIR/keepcache
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs
        .keepcache_cache_dir
        .filter(|p| !p.as_os_str().is_empty())
    {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("keepcache"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("keepcache"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".keepcache/cache"));
    }
    candidates.push(inputs.temp_dir.join("keepcache"));

    for path in candidates {
        // Runners sometimes mount read-only cache directories under $HOME.
        if path.exists() {
            let probe = path.join(".write_probe");
            match fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
            {
                Ok(_) => {
                    let _ = fs::remove_file(&probe);
                    return Ok(path);
                }
                Err(_) => continue,
            }
        }
        if fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}

fn non_empty_env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the default cache root from the environment
pub fn default_cache_root() -> Result<PathBuf> {
    cache_root_from_inputs(CacheInputs {
        keepcache_cache_dir: non_empty_env_path("KEEPCACHE_CACHE_DIR"),
        xdg_cache_home: non_empty_env_path("XDG_CACHE_HOME"),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    })
}

/// Local file-based cache store
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store at the first writable default location
    pub fn from_env() -> Result<Self> {
        default_cache_root().map(Self::new)
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the entry for `key`
    #[must_use]
    pub fn entry_dir(&self, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(&hash[..2]).join(&hash[2..4]).join(&hash)
    }

    /// Load the metadata for `key`, if stored
    pub fn lookup(&self, key: &str) -> Result<Option<EntryMeta>> {
        let dir = self.entry_dir(key);
        if !dir.join(ENTRY_FILE).exists() {
            return Ok(None);
        }
        read_meta(&dir).map(Some)
    }

    /// All complete entries in the store
    fn entries(&self) -> Vec<(PathBuf, EntryMeta)> {
        if !self.root.exists() {
            return Vec::new();
        }
        walkdir::WalkDir::new(&self.root)
            .min_depth(4)
            .max_depth(4)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() == ENTRY_FILE)
            .filter_map(|e| {
                let dir = e.path().parent()?.to_path_buf();
                match read_meta(&dir) {
                    Ok(meta) => Some((dir, meta)),
                    Err(err) => {
                        tracing::warn!(
                            path = %dir.display(),
                            error = %err,
                            "Skipping unreadable cache entry"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn save_blocking(&self, paths: &[PathBuf], key: &str) -> Result<SavedEntry> {
        validate_key(key)?;
        validate_paths(paths, true)?;

        let dir = self.entry_dir(key);
        if dir.join(ENTRY_FILE).exists() {
            return Err(Error::already_exists(key));
        }

        fs::create_dir_all(&self.root).map_err(|e| Error::io(e, &self.root, "create_dir_all"))?;
        self.sweep_staging(STALE_STAGING_AGE);
        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging).map_err(|e| Error::io(e, &staging, "create_dir_all"))?;

        let result = Self::stage_entry(&staging, paths, key)
            .and_then(|meta| Self::publish(&staging, &dir, key).map(|()| meta));
        if result.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        let meta = result?;

        tracing::debug!(
            key = %key,
            path = %dir.display(),
            size = meta.archive_size,
            "Cache entry stored"
        );
        Ok(SavedEntry {
            key: meta.key,
            archive_size: meta.archive_size,
        })
    }

    /// Remove staging directories left behind for longer than `max_age`
    ///
    /// Returns how many were removed. Failures are logged and skipped.
    fn sweep_staging(&self, max_age: Duration) -> usize {
        let Ok(read_dir) = fs::read_dir(&self.root) else {
            return 0;
        };
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in read_dir.filter_map(|e| e.ok()) {
            if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_none_or(|age| age < max_age) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed stale staging directory");
                    removed += 1;
                }
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to remove stale staging directory"
                ),
            }
        }
        removed
    }

    fn stage_entry(staging: &Path, paths: &[PathBuf], key: &str) -> Result<EntryMeta> {
        let archive = staging.join(ARCHIVE_FILE);
        write_archive(paths, &archive)?;

        let archive_size = fs::metadata(&archive)
            .map_err(|e| Error::io(e, &archive, "stat"))?
            .len();
        let meta = EntryMeta {
            key: key.to_string(),
            paths: paths.iter().map(|p| p.display().to_string()).collect(),
            created_at: Utc::now(),
            archive_size,
            archive_sha256: file_digest(&archive)?,
            keepcache_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let meta_path = staging.join(ENTRY_FILE);
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| Error::serialization(format!("Failed to serialize entry: {e}")))?;
        fs::write(&meta_path, json).map_err(|e| Error::io(e, &meta_path, "write"))?;
        Ok(meta)
    }

    fn publish(staging: &Path, dir: &Path, key: &str) -> Result<()> {
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }
        // A directory without entry.json is a leftover from an interrupted write.
        if dir.exists() && !dir.join(ENTRY_FILE).exists() {
            fs::remove_dir_all(dir).map_err(|e| Error::io(e, dir, "remove_dir_all"))?;
        }
        fs::rename(staging, dir).map_err(|e| {
            if dir.join(ENTRY_FILE).exists() {
                Error::already_exists(key)
            } else {
                Error::io(e, dir, "rename")
            }
        })
    }

    /// Find the entry to restore: exact key first, then newest prefix match
    fn find(
        &self,
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<(PathBuf, EntryMeta, bool)>> {
        if let Some(meta) = self.lookup(primary_key)? {
            return Ok(Some((self.entry_dir(primary_key), meta, true)));
        }
        if restore_keys.is_empty() {
            return Ok(None);
        }

        let entries = self.entries();
        for prefix in restore_keys {
            let newest = entries
                .iter()
                .filter(|(_, meta)| meta.key.starts_with(prefix.as_str()))
                .max_by_key(|(_, meta)| meta.created_at);
            if let Some((dir, meta)) = newest {
                tracing::debug!(prefix = %prefix, key = %meta.key, "Restore key matched");
                return Ok(Some((dir.clone(), meta.clone(), false)));
            }
        }
        Ok(None)
    }

    fn restore_blocking(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<RestoredEntry>> {
        validate_key(primary_key)?;
        for key in restore_keys {
            validate_key(key)?;
        }
        validate_paths(paths, false)?;

        let Some((dir, meta, exact)) = self.find(primary_key, restore_keys)? else {
            tracing::debug!(key = %primary_key, "Cache miss");
            return Ok(None);
        };

        let archive = dir.join(ARCHIVE_FILE);
        let actual = file_digest(&archive)?;
        if actual != meta.archive_sha256 {
            return Err(Error::Integrity {
                expected: meta.archive_sha256,
                actual,
            });
        }

        let files = extract_archive(&archive, paths)?;
        tracing::debug!(key = %meta.key, files, exact, "Restored cache entry");
        Ok(Some(RestoredEntry {
            key: meta.key,
            exact,
            files,
        }))
    }
}

fn read_meta(dir: &Path) -> Result<EntryMeta> {
    let path = dir.join(ENTRY_FILE);
    let content = fs::read_to_string(&path).map_err(|e| Error::io(e, &path, "read"))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::serialization(format!("Failed to parse {}: {e}", path.display())))
}

fn join_error(e: &tokio::task::JoinError) -> Error {
    Error::io_no_path(std::io::Error::other(e.to_string()), "run blocking task")
}

#[async_trait]
impl CacheStore for LocalStore {
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<SavedEntry> {
        let store = self.clone();
        let paths = paths.to_vec();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.save_blocking(&paths, &key))
            .await
            .map_err(|e| join_error(&e))?
    }

    async fn restore(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<RestoredEntry>> {
        let store = self.clone();
        let paths = paths.to_vec();
        let primary_key = primary_key.to_string();
        let restore_keys = restore_keys.to_vec();
        tokio::task::spawn_blocking(move || {
            store.restore_blocking(&paths, &primary_key, &restore_keys)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_dir(root: &Path) -> PathBuf {
        let dir = root.join("payload");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("one.txt"), "1").unwrap();
        fs::write(dir.join("sub/two.txt"), "2").unwrap();
        dir
    }

    // ==========================================================================
    // cache root resolution
    // ==========================================================================

    #[test]
    fn cache_root_respects_override() {
        let tmp = TempDir::new().unwrap();
        let override_dir = tmp.path().join("override");
        let inputs = CacheInputs {
            keepcache_cache_dir: Some(override_dir.clone()),
            xdg_cache_home: None,
            os_cache_dir: None,
            home_dir: None,
            temp_dir: std::env::temp_dir(),
        };
        let dir = cache_root_from_inputs(inputs).expect("cache_root should use override");
        assert_eq!(dir, override_dir);
        assert!(dir.exists());
    }

    #[test]
    fn cache_root_prefers_xdg_over_home() {
        let tmp = TempDir::new().unwrap();
        let inputs = CacheInputs {
            keepcache_cache_dir: None,
            xdg_cache_home: Some(tmp.path().join("xdg")),
            os_cache_dir: None,
            home_dir: Some(tmp.path().join("home")),
            temp_dir: std::env::temp_dir(),
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert_eq!(dir, tmp.path().join("xdg/keepcache"));
    }

    #[test]
    fn cache_root_ignores_empty_override() {
        let tmp = TempDir::new().unwrap();
        let inputs = CacheInputs {
            keepcache_cache_dir: Some(PathBuf::new()),
            xdg_cache_home: None,
            os_cache_dir: None,
            home_dir: None,
            temp_dir: tmp.path().to_path_buf(),
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert_eq!(dir, tmp.path().join("keepcache"));
    }

    // ==========================================================================
    // entry layout
    // ==========================================================================

    #[test]
    fn entry_dir_is_two_level_sharded() {
        let store = LocalStore::new("/cache");
        let dir = store.entry_dir("abc");
        let hash = hex::encode(Sha256::digest(b"abc"));
        assert_eq!(
            dir,
            PathBuf::from("/cache")
                .join(&hash[..2])
                .join(&hash[2..4])
                .join(&hash)
        );
    }

    #[tokio::test]
    async fn save_writes_archive_and_metadata() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let payload = sample_dir(work.path());
        let store = LocalStore::new(cache.path());

        let saved = store.save(&[payload.clone()], "deps-1").await.unwrap();
        assert_eq!(saved.key, "deps-1");
        assert!(saved.archive_size > 0);

        let dir = store.entry_dir("deps-1");
        assert!(dir.join(ARCHIVE_FILE).exists());
        let meta = store.lookup("deps-1").unwrap().unwrap();
        assert_eq!(meta.key, "deps-1");
        assert_eq!(meta.paths, vec![payload.display().to_string()]);
        assert_eq!(meta.archive_size, saved.archive_size);

        let leftovers: Vec<_> = fs::read_dir(cache.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "staging directory must be moved away");
    }

    #[test]
    fn sweep_removes_only_old_staging_dirs() {
        let cache = TempDir::new().unwrap();
        let store = LocalStore::new(cache.path());
        let stale = cache.path().join(format!("{STAGING_PREFIX}dead"));
        fs::create_dir_all(stale.join("partial")).unwrap();
        let unrelated = cache.path().join("ab");
        fs::create_dir_all(&unrelated).unwrap();

        assert_eq!(store.sweep_staging(STALE_STAGING_AGE), 0);
        assert!(stale.exists());

        assert_eq!(store.sweep_staging(Duration::ZERO), 1);
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn save_leaves_fresh_staging_dirs_of_other_writers() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let payload = sample_dir(work.path());
        let store = LocalStore::new(cache.path());
        let in_flight = cache.path().join(format!("{STAGING_PREFIX}other"));
        fs::create_dir_all(&in_flight).unwrap();

        store.save(&[payload], "deps-1").await.unwrap();

        assert!(in_flight.exists());
    }

    #[tokio::test]
    async fn save_refuses_existing_key() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let payload = sample_dir(work.path());
        let store = LocalStore::new(cache.path());

        store.save(&[payload.clone()], "deps-1").await.unwrap();
        let err = store.save(&[payload], "deps-1").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn save_rejects_missing_path() {
        let cache = TempDir::new().unwrap();
        let store = LocalStore::new(cache.path());
        let err = store
            .save(&[cache.path().join("missing")], "deps-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(store.lookup("deps-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_restore_exact_key() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let payload = sample_dir(work.path());
        let store = LocalStore::new(cache.path());
        store.save(&[payload], "deps-1").await.unwrap();

        let target = TempDir::new().unwrap();
        let dest = target.path().join("restored");
        let restored = store
            .restore(&[dest.clone()], "deps-1", &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(restored.key, "deps-1");
        assert!(restored.exact);
        assert_eq!(restored.files, 2);
        assert_eq!(fs::read_to_string(dest.join("one.txt")).unwrap(), "1");
        assert_eq!(fs::read_to_string(dest.join("sub/two.txt")).unwrap(), "2");
    }

    #[tokio::test]
    async fn restore_miss_returns_none() {
        let cache = TempDir::new().unwrap();
        let store = LocalStore::new(cache.path());
        let result = store
            .restore(&[cache.path().join("dest")], "nothing", &["noth".to_string()])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn restore_key_prefix_picks_newest_entry() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = LocalStore::new(cache.path());

        let old = work.path().join("old");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("v.txt"), "old").unwrap();
        store.save(&[old], "deps-linux-aaa").await.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));

        let new = work.path().join("new");
        fs::create_dir_all(&new).unwrap();
        fs::write(new.join("v.txt"), "new").unwrap();
        store.save(&[new], "deps-linux-bbb").await.unwrap();

        let dest = work.path().join("dest");
        let restored = store
            .restore(
                &[dest.clone()],
                "deps-linux-ccc",
                &["deps-windows-".to_string(), "deps-linux-".to_string()],
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(restored.key, "deps-linux-bbb");
        assert!(!restored.exact);
        assert_eq!(fs::read_to_string(dest.join("v.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn restore_detects_tampered_archive() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let payload = sample_dir(work.path());
        let store = LocalStore::new(cache.path());
        store.save(&[payload], "deps-1").await.unwrap();

        let archive = store.entry_dir("deps-1").join(ARCHIVE_FILE);
        fs::write(&archive, b"not an archive").unwrap();

        let err = store
            .restore(&[work.path().join("dest")], "deps-1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[tokio::test]
    async fn entries_skip_corrupt_metadata() {
        let cache = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let payload = sample_dir(work.path());
        let store = LocalStore::new(cache.path());
        store.save(&[payload], "deps-good").await.unwrap();

        let bad = store.entry_dir("deps-bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join(ENTRY_FILE), "{").unwrap();

        let keys: Vec<String> = store.entries().into_iter().map(|(_, m)| m.key).collect();
        assert_eq!(keys, vec!["deps-good".to_string()]);
    }
}
