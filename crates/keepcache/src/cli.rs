//! Command-line interface
//!
//! Every flag falls back to the environment variable the runner sets for the
//! matching action input, so the binary can be called with no arguments from
//! an action's `main`/`post` entry points.

use crate::inputs::{RestoreInputs, SaveInputs, resolve_state_file};
use crate::report::Reporter;
use crate::restore::{RestoreOutcome, RestoreStep, warn_failed};
use crate::save::{SaveOutcome, SaveStep, fail};
use crate::state::{CommandFile, EnvState, StateStore, StateWriter};
use crate::tracing::{LogLevel, TracingFormat};
use crate::{Error, Result};
use clap::{Args, Parser, Subcommand};
use keepcache_store::LocalStore;
use std::path::PathBuf;

/// Exit code for every completed run; cache problems never fail the pipeline
pub const EXIT_OK: i32 = 0;

/// Best-effort path caching for CI pipelines
#[derive(Parser, Debug)]
#[command(name = "keepcache", version, about)]
pub struct Cli {
    /// The step to run
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level
    #[arg(
        short = 'L',
        long,
        global = true,
        default_value = "warn",
        value_enum,
        env = "KEEPCACHE_LOG_LEVEL"
    )]
    pub level: LogLevel,

    /// Diagnostic log format (written to stderr)
    #[arg(
        long,
        global = true,
        default_value = "compact",
        value_enum,
        env = "KEEPCACHE_LOG_FORMAT"
    )]
    pub log_format: TracingFormat,
}

/// Available steps
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore the cache path and record the keys for the save step
    Restore(RestoreArgs),
    /// Save the cache path unless restore already matched the current key
    Save(SaveArgs),
}

/// Inputs shared by both steps
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Whether to cache: true, false or auto (GitHub-hosted runners only)
    #[arg(long, env = "INPUT_ENABLE-CACHE", default_value = "auto")]
    pub enable_cache: String,

    /// Path to cache [default: $RUNNER_TEMP/keepcache-cache]
    #[arg(long, env = "INPUT_CACHE-LOCAL-PATH")]
    pub cache_local_path: Option<PathBuf>,

    /// Cache store root directory
    #[arg(long, env = "KEEPCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// File the keys are handed over in [default: $RUNNER_TEMP/keepcache-state]
    #[arg(long, env = "KEEPCACHE_STATE_FILE")]
    pub state_file: Option<PathBuf>,
}

impl CommonArgs {
    fn store(&self) -> Result<LocalStore> {
        match &self.cache_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(LocalStore::new(dir)),
            _ => Ok(LocalStore::from_env()?),
        }
    }

    fn state(&self) -> Option<CommandFile> {
        resolve_state_file(self.state_file.clone()).map(CommandFile::new)
    }
}

/// Arguments of `keepcache save`
#[derive(Args, Debug, Clone)]
pub struct SaveArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments of `keepcache restore`
#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Key computed for the current run
    #[arg(long, env = "INPUT_CACHE-KEY", default_value = "")]
    pub key: String,

    /// Newline-separated key prefixes to fall back to
    #[arg(long, env = "INPUT_RESTORE-KEYS", default_value = "")]
    pub restore_keys: String,

    /// File the `cache-hit` output is written to
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub output_file: Option<PathBuf>,
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Run the save step from CLI arguments
///
/// Input and store setup happen inside the same error boundary as the step
/// itself, so a bad input is reported the same way as a failed save.
pub async fn run_save(args: &SaveArgs, reporter: &dyn Reporter) -> SaveOutcome {
    let inputs = match SaveInputs::resolve(
        &args.common.enable_cache,
        args.common.cache_local_path.clone(),
    ) {
        Ok(inputs) => inputs,
        Err(err) => return fail(reporter, &err),
    };
    if !inputs.enable_cache {
        return SaveOutcome::Disabled;
    }
    let store = match args.common.store() {
        Ok(store) => store,
        Err(err) => return fail(reporter, &err),
    };
    tracing::debug!(root = %store.root().display(), "Using local cache store");

    // STATE_* variables are only filled for an action's post step
    let file_state = args.common.state();
    let state: &dyn StateStore = match &file_state {
        Some(file) => file,
        None => &EnvState,
    };
    SaveStep::new(&inputs, state, &store, reporter).run().await
}

/// Run the restore step from CLI arguments
pub async fn run_restore(args: &RestoreArgs, reporter: &dyn Reporter) -> RestoreOutcome {
    let inputs = match RestoreInputs::resolve(
        &args.common.enable_cache,
        args.common.cache_local_path.clone(),
        &args.key,
        &args.restore_keys,
    ) {
        Ok(inputs) => inputs,
        Err(err) => return warn_failed(reporter, &err),
    };
    if !inputs.enable_cache {
        return RestoreOutcome::Disabled;
    }
    let Some(state_file) = args.common.state() else {
        let err = Error::input(
            "state-file",
            "RUNNER_TEMP is not set; pass --state-file to record the cache keys",
        );
        return warn_failed(reporter, &err);
    };
    let store = match args.common.store() {
        Ok(store) => store,
        Err(err) => return warn_failed(reporter, &err),
    };
    tracing::debug!(root = %store.root().display(), "Using local cache store");

    let output_file = args.output_file.as_ref().map(CommandFile::new);
    let outputs = output_file.as_ref().map(|f| f as &dyn StateWriter);
    RestoreStep::new(&inputs, &state_file, outputs, &store, reporter)
        .run()
        .await
}
