//! Restore step
//!
//! Extracts a cached path and records the keys the save step later compares.
//! Like saving, restoring is best-effort: errors become warnings.

use crate::error::error_chain;
use crate::inputs::RestoreInputs;
use crate::report::Reporter;
use crate::state::{STATE_CACHE_KEY, STATE_CACHE_MATCHED_KEY, StateWriter};
use crate::{Error, Result};
use keepcache_store::CacheStore;

/// Step output telling later steps whether the primary key matched
pub const OUTPUT_CACHE_HIT: &str = "cache-hit";

/// What a restore run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Caching is turned off
    Disabled,
    /// An entry was extracted
    Hit {
        /// Key of the extracted entry
        key: String,
        /// Whether it was the primary key
        exact: bool,
    },
    /// No entry matched
    Miss,
    /// Something failed; reported as a warning
    Failed {
        /// The reported message
        message: String,
    },
}

/// The restore step, wired to its collaborators
pub struct RestoreStep<'a> {
    inputs: &'a RestoreInputs,
    state: &'a dyn StateWriter,
    outputs: Option<&'a dyn StateWriter>,
    store: &'a dyn CacheStore,
    reporter: &'a dyn Reporter,
}

impl<'a> RestoreStep<'a> {
    /// Wire up a restore step; `outputs` receives the `cache-hit` output
    #[must_use]
    pub fn new(
        inputs: &'a RestoreInputs,
        state: &'a dyn StateWriter,
        outputs: Option<&'a dyn StateWriter>,
        store: &'a dyn CacheStore,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            inputs,
            state,
            outputs,
            store,
            reporter,
        }
    }

    /// Run the step; never fails
    pub async fn run(&self) -> RestoreOutcome {
        if !self.inputs.enable_cache {
            tracing::debug!("Caching disabled, nothing to restore");
            return RestoreOutcome::Disabled;
        }
        match self.restore_cache().await {
            Ok(outcome) => outcome,
            Err(err) => warn_failed(self.reporter, &err),
        }
    }

    fn set_output(&self, hit: bool) -> Result<()> {
        match self.outputs {
            Some(outputs) => outputs.set(OUTPUT_CACHE_HIT, if hit { "true" } else { "false" }),
            None => Ok(()),
        }
    }

    async fn restore_cache(&self) -> Result<RestoreOutcome> {
        let key = &self.inputs.key;
        if key.is_empty() {
            return Err(Error::input("cache-key", "a cache key is required"));
        }
        // Recorded first so the save step still runs if the lookup fails.
        self.state.set(STATE_CACHE_KEY, key)?;

        let path = &self.inputs.cache_local_path;
        self.reporter.info(&format!(
            "Trying to restore cache path {} from key {key}",
            path.display()
        ));
        let restored = self
            .store
            .restore(
                std::slice::from_ref(path),
                key,
                &self.inputs.restore_keys,
            )
            .await?;

        match restored {
            Some(entry) => {
                self.state.set(STATE_CACHE_MATCHED_KEY, &entry.key)?;
                self.set_output(entry.exact)?;
                tracing::debug!(files = entry.files, exact = entry.exact, "Cache extracted");
                self.reporter
                    .info(&format!("Cache restored from key: {}", entry.key));
                Ok(RestoreOutcome::Hit {
                    key: entry.key,
                    exact: entry.exact,
                })
            }
            None => {
                // The state file may outlive a job on self-hosted runners.
                self.state.set(STATE_CACHE_MATCHED_KEY, "")?;
                self.set_output(false)?;
                self.reporter.info(&format!("No cache found for key: {key}"));
                Ok(RestoreOutcome::Miss)
            }
        }
    }
}

/// Report `err` as a warning and turn it into an outcome
pub fn warn_failed(reporter: &dyn Reporter, err: &Error) -> RestoreOutcome {
    let message = error_chain(err);
    tracing::debug!(error = ?err, "Restoring cache failed");
    reporter.warning(&format!("Failed to restore cache: {message}"));
    RestoreOutcome::Failed { message }
}
