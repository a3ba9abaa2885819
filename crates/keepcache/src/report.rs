//! User-facing log and annotation sink
//!
//! Steps report through the [`Reporter`] trait. [`WorkflowReporter`] renders
//! GitHub workflow commands so warnings and failures show up as annotations
//! on the run; [`RecordingReporter`] keeps messages in memory for tests.

use std::io::Write;
use std::sync::Mutex;

/// Severity of a reported message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Plain log line
    Info,
    /// Warning annotation
    Warning,
    /// Failure annotation
    Failure,
}

/// Sink for user-facing messages
pub trait Reporter: Send + Sync {
    /// Emit a message at `severity`
    fn report(&self, severity: Severity, message: &str);

    /// Emit a plain log line
    fn info(&self, message: &str) {
        self.report(Severity::Info, message);
    }

    /// Emit a warning annotation
    fn warning(&self, message: &str) {
        self.report(Severity::Warning, message);
    }

    /// Emit a failure annotation
    fn failure(&self, message: &str) {
        self.report(Severity::Failure, message);
    }
}

/// Escape command data the way the runner expects
#[must_use]
pub fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Render one message as a workflow command line (without newline)
#[must_use]
pub fn workflow_command(severity: Severity, message: &str) -> String {
    match severity {
        Severity::Info => message.to_string(),
        Severity::Warning => format!("::warning::{}", escape_data(message)),
        Severity::Failure => format!("::error::{}", escape_data(message)),
    }
}

/// Writes workflow commands to a writer (stdout by default)
pub struct WorkflowReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl WorkflowReporter {
    /// Reporter writing to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Reporter writing to `out`
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl std::fmt::Debug for WorkflowReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowReporter").finish_non_exhaustive()
    }
}

impl Reporter for WorkflowReporter {
    fn report(&self, severity: Severity, message: &str) {
        let line = workflow_command(severity, message);
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "Failed to write workflow command");
        }
    }
}

/// Keeps every reported message, in order
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl RecordingReporter {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages reported so far
    #[must_use]
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Messages reported at `severity`
    #[must_use]
    pub fn at(&self, severity: Severity) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, severity: Severity, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((severity, message.to_string()));
        }
    }
}
