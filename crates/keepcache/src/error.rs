//! Error types for the action steps

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for the save and restore steps
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failure reported by the cache store
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] keepcache_store::Error),

    /// Cross-stage state could not be read or written
    #[error("State error: {message}")]
    #[diagnostic(code(keepcache::state))]
    State {
        /// What went wrong
        message: String,
        /// Underlying I/O error, if any
        #[source]
        source: Option<std::io::Error>,
    },

    /// An action input has an unusable value
    #[error("Input '{name}' is invalid: {message}")]
    #[diagnostic(
        code(keepcache::input),
        help("Check the step inputs or the matching INPUT_* environment variable")
    )]
    Input {
        /// Input name as written in the workflow (e.g. `enable-cache`)
        name: String,
        /// What is wrong with the value
        message: String,
    },
}

impl Error {
    /// Create a state error from an I/O failure on `path`
    #[must_use]
    pub fn state_io(source: std::io::Error, path: &Path, operation: &str) -> Self {
        Self::State {
            message: format!("{operation} {} failed", path.display()),
            source: Some(source),
        }
    }

    /// Create a state error without an underlying cause
    #[must_use]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
            source: None,
        }
    }

    /// Create an input error
    #[must_use]
    pub fn input(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Input {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type for the action steps
pub type Result<T> = std::result::Result<T, Error>;

/// Render an error and its `source()` chain as one line
///
/// Messages repeated verbatim by a wrapper are only printed once.
#[must_use]
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = cause.source();
    }
    message
}
