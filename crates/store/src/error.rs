//! Error types for the cache store

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache store operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while reading or writing cache entries
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(keepcache::store::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// The key or the paths handed to the store are unusable
    #[error("Validation error: {message}")]
    #[diagnostic(code(keepcache::store::validation))]
    Validation {
        /// What was wrong with the request
        message: String,
    },

    /// An entry with this key is already stored
    #[error("Unable to reserve cache with key {key}, another job may be creating this cache.")]
    #[diagnostic(
        code(keepcache::store::already_exists),
        help("Cache entries are immutable; change the key to store new contents")
    )]
    AlreadyExists {
        /// The key that is already taken
        key: String,
    },

    /// Stored archive does not match the digest recorded at save time
    #[error("Archive digest mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(keepcache::store::integrity),
        help("The cache entry is corrupt; delete it from the cache directory")
    )]
    Integrity {
        /// Digest recorded in the entry metadata
        expected: String,
        /// Digest of the archive on disk
        actual: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(keepcache::store::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// Configuration error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(keepcache::store::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Backend could not be reached or refused the operation
    #[error("Cache service unavailable: {message}")]
    #[diagnostic(code(keepcache::store::unavailable))]
    Unavailable {
        /// Reason reported by the backend
        message: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an already-exists error
    #[must_use]
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an unavailable error
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable {
            message: msg.into(),
        }
    }
}

/// Result type for cache store operations
pub type Result<T> = std::result::Result<T, Error>;
