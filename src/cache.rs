//! File-persisted, namespaced cache with TTL and update-token invalidation.
//!
//! Each key lives in its own file, `<root>/<namespace>/<key>.json`:
//!
//! ```text
//! {"_ts": 1718000000, "_token": "9f2c…", "value": …}
//! ```
//!
//! An entry is valid for [`Cache::get_or_set`] when it is younger than the
//! requested TTL **and** its token equals the current update token, so a
//! `brew install` invalidates everything even if the TTL has not elapsed.
//! [`Cache::get`] is softer and only checks the token.
//!
//! Writers replace whole files (temp file + rename). There is no locking:
//! concurrent refreshes of one key both write fresh data and the last one
//! wins.

use crate::clock::Clock;
use crate::error::{BreweryError, CacheOp, Result};
use crate::token::UpdateTokens;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// On-disk entry layout. Renaming these fields breaks existing caches.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    #[serde(rename = "_ts")]
    ts: i64,
    #[serde(rename = "_token")]
    token: String,
    value: T,
}

/// Result of a plain cache read
#[derive(Debug)]
pub enum Lookup<T> {
    /// Present and written under the current update token
    Hit(T),
    /// Absent, corrupted, or written under an older token
    Miss,
    /// The entry could not be read
    Failed(BreweryError),
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// Collapse into `Result<Option<T>>` for callers without a fallback path
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Lookup::Hit(v) => Ok(Some(v)),
            Lookup::Miss => Ok(None),
            Lookup::Failed(e) => Err(e),
        }
    }
}

/// Size summary of one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

pub struct Cache {
    dir: PathBuf,
    namespace: String,
    tokens: Arc<UpdateTokens>,
    clock: Arc<dyn Clock>,
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl Cache {
    pub fn new(
        root: impl AsRef<Path>,
        namespace: impl Into<String>,
        tokens: Arc<UpdateTokens>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            dir: root.as_ref().join(&namespace),
            namespace,
            tokens,
            clock,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current update token (memoized by the token source)
    pub fn token(&self) -> String {
        self.tokens.current()
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !valid_key(key) {
            return Err(BreweryError::cache(
                CacheOp::Key,
                key,
                &self.namespace,
                &self.dir,
                None,
            ));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn error(&self, op: CacheOp, key: &str, path: &Path, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> BreweryError {
        BreweryError::cache(op, key, &self.namespace, path, Some(source.into()))
    }

    /// Read an entry without judging its validity
    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Lookup<CacheEntry<T>> {
        let path = match self.path_for(key) {
            Ok(p) => p,
            Err(e) => return Lookup::Failed(e),
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Lookup::Miss,
            Err(e) => return Lookup::Failed(self.error(CacheOp::Read, key, &path, e)),
        };

        match serde_json::from_str(&content) {
            Ok(entry) => Lookup::Hit(entry),
            Err(e) => {
                tracing::warn!(
                    event = "cache_corrupted",
                    namespace = %self.namespace,
                    key,
                    path = %path.display(),
                    error = %e,
                );
                Lookup::Miss
            }
        }
    }

    /// Token-checked read. The TTL is not consulted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        match self.read_entry::<T>(key) {
            Lookup::Hit(entry) if entry.token == self.token() => {
                tracing::debug!(event = "cache_hit", namespace = %self.namespace, key);
                Lookup::Hit(entry.value)
            }
            Lookup::Hit(_) | Lookup::Miss => {
                tracing::debug!(event = "cache_miss", namespace = %self.namespace, key);
                Lookup::Miss
            }
            Lookup::Failed(e) => Lookup::Failed(e),
        }
    }

    /// Write `value` unconditionally with the current time and token
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let token = self.token();
        self.write_entry(key, value, token)
    }

    fn write_entry<T: Serialize>(&self, key: &str, value: &T, token: String) -> Result<()> {
        let path = self.path_for(key)?;
        let entry = CacheEntry {
            ts: self.clock.unix_secs(),
            token,
            value,
        };

        let json = serde_json::to_vec(&entry).map_err(|e| self.error(CacheOp::Write, key, &path, e))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| self.error(CacheOp::Write, key, &path, e))?;

        // Other processes may be reading this key; never expose a half-written file
        let tmp = self
            .dir
            .join(format!(".{key}.{}.tmp", std::process::id()));
        std::fs::write(&tmp, json).map_err(|e| self.error(CacheOp::Write, key, &tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.error(CacheOp::Write, key, &path, e)
        })?;

        Ok(())
    }

    /// Return the cached value for `key` or compute it with `loader`.
    ///
    /// An entry is reused while it is younger than `ttl` (any age when
    /// `ttl` is `None`) and carries the current update token. Otherwise the
    /// loader runs and its result replaces the entry. With `allow_stale`, a
    /// transient loader failure falls back to the invalid entry's value
    /// instead of failing.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        allow_stale: bool,
        loader: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.token();
        let now = self.clock.unix_secs();
        let mut stale = None;

        match self.read_entry::<T>(key) {
            Lookup::Hit(entry) => {
                let fresh = ttl.is_none_or(|ttl| now - entry.ts < ttl.as_secs() as i64);
                if fresh && entry.token == token {
                    tracing::debug!(event = "cache_hit", namespace = %self.namespace, key);
                    return Ok(entry.value);
                }
                tracing::debug!(
                    event = "cache_miss",
                    namespace = %self.namespace,
                    key,
                    expired = !fresh,
                    token_changed = entry.token != token,
                );
                if allow_stale {
                    stale = Some(entry.value);
                }
            }
            Lookup::Miss => {
                tracing::debug!(event = "cache_miss", namespace = %self.namespace, key);
            }
            Lookup::Failed(e) => return Err(e),
        }

        match loader().await {
            Ok(value) => {
                self.write_entry(key, &value, token)?;
                Ok(value)
            }
            Err(e) if e.is_transient() => match stale {
                Some(value) => {
                    tracing::warn!(
                        event = "cache_stale_fallback",
                        namespace = %self.namespace,
                        key,
                        error = %e,
                    );
                    Ok(value)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Count entries and bytes in this namespace
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        if !self.dir.exists() {
            return Ok(stats);
        }

        for entry in walkdir::WalkDir::new(&self.dir).max_depth(1) {
            let entry = entry.map_err(|e| self.error(CacheOp::Read, "*", &self.dir, e))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                stats.entries += 1;
                stats.bytes += entry
                    .metadata()
                    .map_err(|e| self.error(CacheOp::Read, "*", path, e))?
                    .len();
            }
        }

        Ok(stats)
    }

    /// Remove every entry in this namespace. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| self.error(CacheOp::Clear, "*", &self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| self.error(CacheOp::Clear, "*", &self.dir, e))?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path).map_err(|e| self.error(CacheOp::Clear, "*", &path, e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
