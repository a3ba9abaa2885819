//! Save step
//!
//! Persists the cache path under the key computed by the restore step,
//! unless restore already matched that exact key. Caching is best-effort:
//! every error ends up as a failure annotation and [`SaveStep::run`] always
//! returns normally.

use crate::error::error_chain;
use crate::inputs::SaveInputs;
use crate::report::Reporter;
use crate::state::{STATE_CACHE_KEY, STATE_CACHE_MATCHED_KEY, StateStore};
use crate::{Error, Result};
use keepcache_store::CacheStore;

/// What the save step should do for a pair of keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// No key was recorded; restore never ran or failed
    MissingKey,
    /// Restore matched the current key, so the cache is already up to date
    CacheHit,
    /// Store the path under the current key
    Save,
}

/// Decide whether a save is needed
#[must_use]
pub fn decide(cache_key: &str, matched_key: &str) -> SaveDecision {
    if cache_key.is_empty() {
        SaveDecision::MissingKey
    } else if matched_key == cache_key {
        SaveDecision::CacheHit
    } else {
        SaveDecision::Save
    }
}

/// What a save run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Caching is turned off
    Disabled,
    /// No cache key in state; warned and skipped
    MissingKey,
    /// Restore already matched `key`; skipped
    CacheHit {
        /// The matched key
        key: String,
    },
    /// Path stored under `key`
    Saved {
        /// Key the cache was saved under
        key: String,
        /// Size of the stored archive in bytes
        archive_size: u64,
    },
    /// Something failed; reported as a failure annotation
    Failed {
        /// The reported message
        message: String,
    },
}

/// The save step, wired to its collaborators
pub struct SaveStep<'a> {
    inputs: &'a SaveInputs,
    state: &'a dyn StateStore,
    store: &'a dyn CacheStore,
    reporter: &'a dyn Reporter,
}

impl<'a> SaveStep<'a> {
    /// Wire up a save step
    #[must_use]
    pub fn new(
        inputs: &'a SaveInputs,
        state: &'a dyn StateStore,
        store: &'a dyn CacheStore,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            inputs,
            state,
            store,
            reporter,
        }
    }

    /// Run the step; never fails
    pub async fn run(&self) -> SaveOutcome {
        if !self.inputs.enable_cache {
            tracing::debug!("Caching disabled, nothing to save");
            return SaveOutcome::Disabled;
        }
        match self.save_cache().await {
            Ok(outcome) => outcome,
            Err(err) => fail(self.reporter, &err),
        }
    }

    async fn save_cache(&self) -> Result<SaveOutcome> {
        let cache_key = self.state.get(STATE_CACHE_KEY)?;
        let matched_key = self.state.get(STATE_CACHE_MATCHED_KEY)?;
        tracing::debug!(
            cache_key = %cache_key,
            matched_key = %matched_key,
            "Loaded cache keys from state"
        );

        match decide(&cache_key, &matched_key) {
            SaveDecision::MissingKey => {
                self.reporter
                    .warning("Error retrieving cache key from state.");
                Ok(SaveOutcome::MissingKey)
            }
            SaveDecision::CacheHit => {
                // no change in the cached path
                self.reporter.info(&format!(
                    "Cache hit occurred on key {cache_key}, not saving cache."
                ));
                Ok(SaveOutcome::CacheHit { key: cache_key })
            }
            SaveDecision::Save => {
                let path = &self.inputs.cache_local_path;
                self.reporter
                    .info(&format!("Saving cache path: {}", path.display()));
                let saved = self
                    .store
                    .save(std::slice::from_ref(path), &cache_key)
                    .await?;
                tracing::debug!(
                    backend = self.store.name(),
                    size = saved.archive_size,
                    "Cache archive written"
                );
                self.reporter
                    .info(&format!("cache saved with the key: {}", saved.key));
                Ok(SaveOutcome::Saved {
                    key: saved.key,
                    archive_size: saved.archive_size,
                })
            }
        }
    }
}

/// Report `err` as a failure annotation and turn it into an outcome
///
/// Also used by the binary for errors raised before the step is built.
pub fn fail(reporter: &dyn Reporter, err: &Error) -> SaveOutcome {
    let message = error_chain(err);
    tracing::debug!(error = ?err, "Saving cache failed");
    reporter.failure(&message);
    SaveOutcome::Failed { message }
}
