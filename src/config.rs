//! Runtime configuration resolved from the environment.
//!
//! | Variable            | Meaning                              | Default          |
//! |---------------------|--------------------------------------|------------------|
//! | `HOMEBREW_PREFIX`   | Homebrew installation prefix         | discovered       |
//! | `BREWERY_HOME`      | state directory (cache + logs)       | `~/.brewery`     |
//! | `BREWERY_CACHE_DIR` | cache root                           | `<home>/cache`   |
//! | `BREWERY_TIMEOUT`   | per-command timeout, seconds         | 30               |
//! | `BREWERY_LIST_TTL`  | lifetime of backend listings, secs   | 3600             |
//! | `BREWERY_BREW`      | brew executable                      | `brew`           |

use crate::error::{BreweryError, Result};
use crate::repository::DEFAULT_LIST_TTL;
use crate::retry::RetryPolicy;
use crate::shell::{DEFAULT_TIMEOUT, Shell};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File under the cache root remembering the last discovered prefix
pub const PREFIX_FILE: &str = "brew_prefix.txt";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub prefix: PathBuf,
    pub cellar: PathBuf,
    pub caskroom: PathBuf,
    pub home: PathBuf,
    pub cache_root: PathBuf,
    pub log_file: PathBuf,
    pub timeout: Duration,
    pub list_ttl: Duration,
    pub brew: String,
}

/// Prefix used when nothing else is known
pub fn default_prefix() -> PathBuf {
    #[cfg(target_arch = "aarch64")]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        PathBuf::from("/usr/local")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(env: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    match non_empty(env(key)) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(event = "config_invalid", key, value = %raw, default = default.as_secs());
                default
            }
        },
    }
}

/// Brewery state directory: `BREWERY_HOME`, else `~/.brewery`
pub fn state_home(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    match non_empty(env("BREWERY_HOME")) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let user_home = non_empty(env("HOME")).unwrap_or_else(|| ".".to_string());
            PathBuf::from(user_home).join(".brewery")
        }
    }
}

/// Log file location under a state directory
pub fn log_file(home: &Path) -> PathBuf {
    home.join("logs").join("backend.log")
}

impl Config {
    /// Resolve configuration from the process environment
    pub async fn discover() -> Result<Self> {
        Self::discover_with(|key| std::env::var(key).ok()).await
    }

    /// Resolve configuration from an arbitrary variable lookup
    pub async fn discover_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = state_home(&env);
        let cache_root = non_empty(env("BREWERY_CACHE_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("cache"));
        let timeout = env_secs(&env, "BREWERY_TIMEOUT", DEFAULT_TIMEOUT);
        let list_ttl = env_secs(&env, "BREWERY_LIST_TTL", DEFAULT_LIST_TTL);
        let brew = non_empty(env("BREWERY_BREW")).unwrap_or_else(|| "brew".to_string());

        let prefix = match non_empty(env("HOMEBREW_PREFIX")) {
            Some(prefix) => PathBuf::from(prefix),
            None => discover_prefix(&cache_root, &brew, timeout).await,
        };

        Ok(Self {
            cellar: prefix.join("Cellar"),
            caskroom: prefix.join("Caskroom"),
            log_file: log_file(&home),
            prefix,
            home,
            cache_root,
            timeout,
            list_ttl,
            brew,
        })
    }

    /// Shell configured with this timeout and the default retry policy
    pub fn shell(&self) -> Shell {
        Shell::new(self.timeout, RetryPolicy::default())
    }

    /// Create the state directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.cache_root, &self.home.join("logs")] {
            std::fs::create_dir_all(dir)
                .map_err(|e| BreweryError::io(format!("creating {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// Remembered prefix, then `brew --prefix`, then the architecture default
async fn discover_prefix(cache_root: &Path, brew: &str, timeout: Duration) -> PathBuf {
    let remembered = cache_root.join(PREFIX_FILE);
    if let Some(prefix) = non_empty(std::fs::read_to_string(&remembered).ok()) {
        return PathBuf::from(prefix);
    }

    let shell = Shell::new(timeout, RetryPolicy::none());
    match shell.run_capture(&[brew, "--prefix"]).await {
        Ok(out) if out.success() && !out.stdout.is_empty() => {
            let prefix = out.stdout.lines().next().unwrap_or_default().trim().to_string();
            let written = std::fs::create_dir_all(cache_root)
                .and_then(|_| std::fs::write(&remembered, &prefix));
            if let Err(e) = written {
                tracing::warn!(event = "prefix_not_remembered", path = %remembered.display(), error = %e);
            }
            PathBuf::from(prefix)
        }
        Ok(out) => {
            tracing::warn!(event = "prefix_discovery_failed", returncode = out.code, error = %out.stderr);
            default_prefix()
        }
        Err(e) => {
            tracing::warn!(event = "prefix_discovery_failed", error = %e);
            default_prefix()
        }
    }
}
