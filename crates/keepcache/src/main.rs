//! keepcache binary
//!
//! Always exits with [`EXIT_OK`]: a cache that cannot be restored or saved
//! is reported on the run but never fails it.

// Tracing may not be installed yet when reporting its own setup failure
#![allow(clippy::print_stderr)]

use keepcache::WorkflowReporter;
use keepcache::cli::{self, Commands, EXIT_OK};
use keepcache::tracing::{TracingConfig, init_tracing};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = cli::parse();

    let config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        filter: None,
    };
    if let Err(e) = init_tracing(config) {
        eprintln!("{e:?}");
    }

    let reporter = WorkflowReporter::stdout();
    match &cli.command {
        Commands::Save(args) => {
            let outcome = cli::run_save(args, &reporter).await;
            tracing::debug!(?outcome, "Save step finished");
        }
        Commands::Restore(args) => {
            let outcome = cli::run_restore(args, &reporter).await;
            tracing::debug!(?outcome, "Restore step finished");
        }
    }

    std::process::exit(EXIT_OK);
}
