//! Archive-backed cache storage for keepcache
//!
//! This crate provides the storage side of the keepcache action steps:
//! - The `CacheStore` trait the steps are written against
//! - `LocalStore`, a local-filesystem implementation
//! - tar + zstd archiving of the cached paths
//!
//! # Entry layout
//!
//! `LocalStore` keeps one directory per key, sharded by the key's sha256:
//! - `archive.tar.zst` with the cached paths
//! - `entry.json` with the key, archived paths, timestamp and archive digest
//!
//! Entries are immutable; a key can be written once.

mod archive;
mod backend;
mod error;
mod local;

// Re-export error types at crate root
pub use error::{Error, Result};

pub use archive::{extract_archive, file_digest, write_archive};
pub use backend::{
    CacheStore, MAX_KEY_LENGTH, RestoredEntry, SavedEntry, validate_key, validate_paths,
};
pub use local::{EntryMeta, LocalStore, default_cache_root};
