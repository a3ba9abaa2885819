//! Action inputs
//!
//! Raw values arrive through the CLI (with `INPUT_*` environment fallbacks,
//! see [`crate::cli`]) and are resolved here. Resolution happens inside the
//! steps' error boundary so a bad value never fails the pipeline.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory name used under the runner temp dir when no path is given
pub const DEFAULT_CACHE_DIR_NAME: &str = "keepcache-cache";

/// File name of the key hand-over file under the runner temp dir
pub const DEFAULT_STATE_FILE_NAME: &str = "keepcache-state";

/// Raw value of the `enable-cache` input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableCache {
    /// Always cache
    True,
    /// Never cache
    False,
    /// Cache only on GitHub-hosted runners
    Auto,
}

impl FromStr for EnableCache {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // YAML 1.2 core schema booleans, as accepted by getBooleanInput
        match s.trim() {
            "true" | "True" | "TRUE" => Ok(Self::True),
            "false" | "False" | "FALSE" => Ok(Self::False),
            "" | "auto" => Ok(Self::Auto),
            other => Err(Error::input(
                "enable-cache",
                format!(
                    "`{other}` is not one of: true | True | TRUE | false | False | FALSE | auto"
                ),
            )),
        }
    }
}

impl EnableCache {
    /// Collapse to a flag given the runner's `RUNNER_ENVIRONMENT`
    #[must_use]
    pub fn resolve(self, runner_environment: Option<&str>) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Auto => runner_environment == Some("github-hosted"),
        }
    }
}

/// Local path to cache when `cache-local-path` is not set
#[must_use]
pub fn default_cache_local_path(runner_temp: Option<&Path>) -> PathBuf {
    runner_temp
        .map_or_else(std::env::temp_dir, Path::to_path_buf)
        .join(DEFAULT_CACHE_DIR_NAME)
}

/// File the restore step records keys in and the save step reads them from
///
/// The runner's `GITHUB_STATE` file is recreated for every step, so two
/// separate steps of a job only share `RUNNER_TEMP`.
#[must_use]
pub fn default_state_file(runner_temp: Option<&Path>) -> Option<PathBuf> {
    runner_temp.map(|dir| dir.join(DEFAULT_STATE_FILE_NAME))
}

/// An explicit non-empty state file, else [`default_state_file`]
#[must_use]
pub fn resolve_state_file(state_file: Option<PathBuf>) -> Option<PathBuf> {
    state_file
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| {
            let runner_temp = env_non_empty("RUNNER_TEMP").map(PathBuf::from);
            default_state_file(runner_temp.as_deref())
        })
}

/// Split the newline-separated `restore-keys` input
#[must_use]
pub fn parse_restore_keys(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_enabled(enable_cache: &str) -> Result<bool> {
    let runner_environment = env_non_empty("RUNNER_ENVIRONMENT");
    Ok(enable_cache
        .parse::<EnableCache>()?
        .resolve(runner_environment.as_deref()))
}

fn resolve_local_path(cache_local_path: Option<PathBuf>) -> PathBuf {
    cache_local_path
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| {
            let runner_temp = env_non_empty("RUNNER_TEMP").map(PathBuf::from);
            default_cache_local_path(runner_temp.as_deref())
        })
}

/// Resolved inputs of the save step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveInputs {
    /// Whether caching is enabled at all
    pub enable_cache: bool,
    /// Path whose contents are cached
    pub cache_local_path: PathBuf,
}

impl SaveInputs {
    /// Resolve raw input values against the runner environment
    pub fn resolve(enable_cache: &str, cache_local_path: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            enable_cache: resolve_enabled(enable_cache)?,
            cache_local_path: resolve_local_path(cache_local_path),
        })
    }
}

/// Resolved inputs of the restore step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreInputs {
    /// Whether caching is enabled at all
    pub enable_cache: bool,
    /// Path the cache is extracted into
    pub cache_local_path: PathBuf,
    /// Key computed for the current run
    pub key: String,
    /// Prefixes tried, in order, when `key` has no entry
    pub restore_keys: Vec<String>,
}

impl RestoreInputs {
    /// Resolve raw input values against the runner environment
    pub fn resolve(
        enable_cache: &str,
        cache_local_path: Option<PathBuf>,
        key: &str,
        restore_keys: &str,
    ) -> Result<Self> {
        Ok(Self {
            enable_cache: resolve_enabled(enable_cache)?,
            cache_local_path: resolve_local_path(cache_local_path),
            key: key.trim().to_string(),
            restore_keys: parse_restore_keys(restore_keys),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_cache_boolean_spellings() {
        for raw in ["true", "True", "TRUE"] {
            assert_eq!(raw.parse::<EnableCache>().unwrap(), EnableCache::True);
        }
        for raw in ["false", "False", "FALSE"] {
            assert_eq!(raw.parse::<EnableCache>().unwrap(), EnableCache::False);
        }
        assert_eq!("auto".parse::<EnableCache>().unwrap(), EnableCache::Auto);
        assert_eq!("".parse::<EnableCache>().unwrap(), EnableCache::Auto);
    }

    #[test]
    fn test_enable_cache_rejects_other_values() {
        let err = "yes".parse::<EnableCache>().unwrap_err();
        assert!(err.to_string().contains("enable-cache"));
        assert!("tRuE".parse::<EnableCache>().is_err());
    }

    #[test]
    fn test_auto_follows_runner_environment() {
        assert!(EnableCache::Auto.resolve(Some("github-hosted")));
        assert!(!EnableCache::Auto.resolve(Some("self-hosted")));
        assert!(!EnableCache::Auto.resolve(None));
        assert!(EnableCache::True.resolve(None));
        assert!(!EnableCache::False.resolve(Some("github-hosted")));
    }

    #[test]
    fn test_default_local_path_uses_runner_temp() {
        assert_eq!(
            default_cache_local_path(Some(Path::new("/runner/_temp"))),
            PathBuf::from("/runner/_temp/keepcache-cache")
        );
        assert!(default_cache_local_path(None).ends_with(DEFAULT_CACHE_DIR_NAME));
    }

    #[test]
    fn test_state_file_defaults_to_runner_temp() {
        temp_env::with_var("RUNNER_TEMP", Some("/runner/_temp"), || {
            assert_eq!(
                resolve_state_file(None),
                Some(PathBuf::from("/runner/_temp/keepcache-state"))
            );
            assert_eq!(
                resolve_state_file(Some(PathBuf::new())),
                Some(PathBuf::from("/runner/_temp/keepcache-state"))
            );
            assert_eq!(
                resolve_state_file(Some(PathBuf::from("/tmp/state"))),
                Some(PathBuf::from("/tmp/state"))
            );
        });
    }

    #[test]
    fn test_state_file_absent_outside_runner() {
        temp_env::with_var_unset("RUNNER_TEMP", || {
            assert_eq!(resolve_state_file(None), None);
        });
    }

    #[test]
    fn test_parse_restore_keys() {
        assert_eq!(
            parse_restore_keys("deps-linux-\n\n  deps-  \n"),
            vec!["deps-linux-".to_string(), "deps-".to_string()]
        );
        assert!(parse_restore_keys("").is_empty());
    }

    #[test]
    fn test_save_inputs_resolve_from_runner_env() {
        temp_env::with_vars(
            [
                ("RUNNER_ENVIRONMENT", Some("github-hosted")),
                ("RUNNER_TEMP", Some("/runner/_temp")),
            ],
            || {
                let inputs = SaveInputs::resolve("auto", None).unwrap();
                assert!(inputs.enable_cache);
                assert_eq!(
                    inputs.cache_local_path,
                    PathBuf::from("/runner/_temp/keepcache-cache")
                );
            },
        );
    }

    #[test]
    fn test_save_inputs_explicit_path_wins() {
        temp_env::with_var("RUNNER_ENVIRONMENT", None::<&str>, || {
            let inputs = SaveInputs::resolve("auto", Some(PathBuf::from("/work/.deps"))).unwrap();
            assert!(!inputs.enable_cache);
            assert_eq!(inputs.cache_local_path, PathBuf::from("/work/.deps"));
        });
    }

    #[test]
    fn test_restore_inputs_resolve() {
        let inputs = RestoreInputs::resolve(
            "true",
            Some(PathBuf::from("/deps")),
            " deps-abc ",
            "deps-\n",
        )
        .unwrap();
        assert!(inputs.enable_cache);
        assert_eq!(inputs.key, "deps-abc");
        assert_eq!(inputs.restore_keys, vec!["deps-".to_string()]);
    }
}
