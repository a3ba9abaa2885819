//! Cross-stage state shared between the restore and save steps
//!
//! The restore step records the key it computed and the key it actually
//! matched; the save step reads both back. The binary hands them over in a
//! [`CommandFile`] under `$RUNNER_TEMP`, which every step of a job shares.
//! An action's post step can also read them as `STATE_{name}` environment
//! variables through [`EnvState`].

use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// State name holding the key computed for the current run
pub const STATE_CACHE_KEY: &str = "cache-key";

/// State name holding the key that restore actually matched
pub const STATE_CACHE_MATCHED_KEY: &str = "cache-matched-key";

/// Read access to cross-stage state
pub trait StateStore: Send + Sync {
    /// Value stored under `name`, or an empty string when absent
    fn get(&self, name: &str) -> Result<String>;
}

/// Write access to cross-stage state (also used for step outputs)
pub trait StateWriter: Send + Sync {
    /// Record `value` under `name`
    fn set(&self, name: &str, value: &str) -> Result<()>;
}

/// State exposed by the runner as `STATE_{name}` environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvState;

impl StateStore for EnvState {
    fn get(&self, name: &str) -> Result<String> {
        Ok(std::env::var(format!("STATE_{name}")).unwrap_or_default())
    }
}

/// A runner file-command file (`$GITHUB_STATE`, `$GITHUB_OUTPUT`)
///
/// Entries are `name=value` lines or `name<<DELIM` blocks terminated by a
/// line holding only `DELIM`. Later entries override earlier ones.
#[derive(Debug, Clone)]
pub struct CommandFile {
    path: PathBuf,
}

impl CommandFile {
    /// Use the file at `path`; it does not have to exist yet
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every entry in the file
    pub fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| Error::state_io(e, &self.path, "read"))?;
        parse_command_file(&content)
    }
}

impl StateStore for CommandFile {
    fn get(&self, name: &str) -> Result<String> {
        Ok(self.read_all()?.remove(name).unwrap_or_default())
    }
}

impl StateWriter for CommandFile {
    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::state_io(e, &self.path, "open"))?;
        file.write_all(format_entry(name, value)?.as_bytes())
            .map_err(|e| Error::state_io(e, &self.path, "write"))
    }
}

/// In-memory state, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryState {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryState {
    /// Empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State pre-filled with `entries`
    #[must_use]
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }

    /// Copy of every stored value
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

impl StateStore for MemoryState {
    fn get(&self, name: &str) -> Result<String> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::state("state lock poisoned"))?;
        Ok(values.get(name).cloned().unwrap_or_default())
    }
}

impl StateWriter for MemoryState {
    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::state("state lock poisoned"))?;
        values.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

fn parse_command_file(content: &str) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }
        let eq = line.find('=');
        let heredoc = line.find("<<");
        match (eq, heredoc) {
            (Some(eq), h) if h.is_none_or(|h| eq < h) => {
                values.insert(line[..eq].to_string(), line[eq + 1..].to_string());
            }
            (_, Some(h)) => {
                let name = &line[..h];
                let delimiter = &line[h + 2..];
                if name.is_empty() || delimiter.is_empty() {
                    return Err(Error::state(format!("invalid state entry: {line}")));
                }
                let mut body: Vec<&str> = Vec::new();
                loop {
                    match lines.next() {
                        Some(l) if l == delimiter => break,
                        Some(l) => body.push(l),
                        None => {
                            return Err(Error::state(format!(
                                "unterminated value for '{name}': missing delimiter {delimiter}"
                            )));
                        }
                    }
                }
                values.insert(name.to_string(), body.join("\n"));
            }
            _ => return Err(Error::state(format!("invalid state entry: {line}"))),
        }
    }
    Ok(values)
}

fn format_entry(name: &str, value: &str) -> Result<String> {
    if name.is_empty() || name.contains('=') || name.contains("<<") || name.contains('\n') {
        return Err(Error::state(format!("invalid state name: {name:?}")));
    }
    if !value.contains('\n') && !value.contains('\r') {
        return Ok(format!("{name}={value}\n"));
    }
    let mut n = 0u32;
    let delimiter = loop {
        let candidate = format!("KEEPCACHE_EOF_{n}");
        if !value.contains(&candidate) {
            break candidate;
        }
        n += 1;
    };
    Ok(format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"))
}
