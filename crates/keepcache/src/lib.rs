//! Best-effort save and restore steps for CI path caches
//!
//! A pipeline restores a cached path early on and saves it at the end. The
//! restore step records two values in cross-stage state: the key computed
//! for this run and the key it actually matched. The save step reads both
//! back and only stores the path when they differ, so an unchanged cache is
//! never uploaded twice.
//!
//! Neither step ever fails the pipeline: problems are reported as workflow
//! annotations and the process exits successfully.

pub mod cli;
mod error;
pub mod inputs;
pub mod report;
pub mod restore;
pub mod save;
pub mod state;
pub mod tracing;

pub use error::{Error, Result, error_chain};
pub use inputs::{EnableCache, RestoreInputs, SaveInputs};
pub use report::{RecordingReporter, Reporter, Severity, WorkflowReporter};
pub use restore::{RestoreOutcome, RestoreStep};
pub use save::{SaveDecision, SaveOutcome, SaveStep, decide};
pub use state::{
    CommandFile, EnvState, MemoryState, STATE_CACHE_KEY, STATE_CACHE_MATCHED_KEY, StateStore,
    StateWriter,
};
