//! Update token: a cheap fingerprint of the installed package state.
//!
//! The token is derived from the modification times of the Cellar and the
//! Caskroom. Installing, upgrading or removing anything touches one of them,
//! so two equal tokens mean nothing changed. Recomputation is memoized for a
//! short window to avoid a `stat()` storm when many cache lookups happen
//! back to back.

use crate::clock::Clock;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long a computed token is reused before the directories are stat'ed again
pub const TOKEN_MEMO_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct Memo {
    token: String,
    computed_at: SystemTime,
}

/// Computes and memoizes the update token for a set of watched directories
pub struct UpdateTokens {
    watched: Vec<PathBuf>,
    window: Duration,
    clock: Arc<dyn Clock>,
    memo: Mutex<Option<Memo>>,
}

impl UpdateTokens {
    pub fn new(cellar: impl Into<PathBuf>, caskroom: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            watched: vec![cellar.into(), caskroom.into()],
            window: TOKEN_MEMO_WINDOW,
            clock,
            memo: Mutex::new(None),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Current token, recomputed at most once per memo window
    pub fn current(&self) -> String {
        let now = self.clock.now();
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(m) = memo.as_ref() {
            // A clock that went backwards counts as expired
            let fresh = now
                .duration_since(m.computed_at)
                .is_ok_and(|age| age < self.window);
            if fresh {
                return m.token.clone();
            }
        }

        let token = compute_token(&self.watched);
        *memo = Some(Memo {
            token: token.clone(),
            computed_at: now,
        });
        token
    }

    /// Drop the memo so the next call stats the directories again
    pub fn invalidate(&self) {
        *self.memo.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

fn mtime_marker(dir: &Path) -> String {
    match std::fs::metadata(dir).and_then(|m| m.modified()) {
        Ok(modified) => match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => format!("{}.{:09}", d.as_secs(), d.subsec_nanos()),
            Err(_) => "pre-epoch".to_string(),
        },
        Err(_) => "absent".to_string(),
    }
}

/// Hash the modification times of `dirs` into a hex token
pub fn compute_token(dirs: &[PathBuf]) -> String {
    let mut hasher = Sha256::new();
    for dir in dirs {
        hasher.update(dir.to_string_lossy().as_bytes());
        hasher.update(b"=");
        hasher.update(mtime_marker(dir).as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
