//! Error taxonomy for brewery.
//!
//! Every failure belongs to exactly one [`ErrorKind`]:
//!
//! - **Transient**: ephemeral conditions (timeouts, a `brew` invocation that may
//!   succeed on retry). Safe to retry; operations raising it are idempotent.
//! - **User**: invalid input such as an unknown package name. Never retried.
//! - **System**: local environment problems (unreadable cache, permissions,
//!   missing `brew` binary). Needs external remediation.
//!
//! Each error also carries an [`ErrorContext`], an ordered string map that
//! callers may enrich with [`BreweryError::with_context`] as the error
//! propagates.

use crate::package::PackageKind;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code for a successful run
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for user-caused failures
pub const EXIT_USER_ERROR: u8 = 1;
/// Exit code for system-caused failures
pub const EXIT_SYSTEM_ERROR: u8 = 2;
/// Exit code for transient failures that exhausted their retries
pub const EXIT_TRANSIENT_ERROR: u8 = 3;

/// Top-level classification driving retry and exit-code policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    User,
    System,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Transient => EXIT_TRANSIENT_ERROR,
            ErrorKind::User => EXIT_USER_ERROR,
            ErrorKind::System => EXIT_SYSTEM_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Transient => "transient",
            ErrorKind::User => "user",
            ErrorKind::System => "system",
        })
    }
}

/// Cache operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Read,
    Write,
    Clear,
    Key,
}

impl fmt::Display for CacheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheOp::Read => "read",
            CacheOp::Write => "write",
            CacheOp::Clear => "clear",
            CacheOp::Key => "key",
        })
    }
}

/// Open, string-keyed context accumulated while an error propagates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext(BTreeMap<String, String>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing an existing value for the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `other` into self; entries already present win
    fn merge_missing(&mut self, other: &ErrorContext) {
        for (k, v) in &other.0 {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum BreweryError {
    /// `brew` exited non-zero or produced unusable output
    #[error("{message}")]
    Command {
        message: String,
        command: String,
        code: Option<i32>,
        output: String,
        kind: ErrorKind,
        context: ErrorContext,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Command timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        command: String,
        timeout: Duration,
        context: ErrorContext,
    },

    /// The process could not be started at all (e.g. `brew` missing)
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        context: ErrorContext,
        #[source]
        source: std::io::Error,
    },

    #[error("Package {kind} '{package}' not found")]
    PackageNotFound {
        package: String,
        kind: PackageKind,
        context: ErrorContext,
        #[source]
        source: Option<Box<BreweryError>>,
    },

    #[error("Cache {operation} operation failed for '{key}'")]
    Cache {
        operation: CacheOp,
        key: String,
        namespace: String,
        path: PathBuf,
        context: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {what}")]
    Io {
        what: String,
        context: ErrorContext,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BreweryError>;

/// Output fragments that mean the user named something brew does not know
const NOT_FOUND_MARKERS: &[&str] = &[
    "no available formula",
    "no available cask",
    "no formulae or casks found",
    "no such keg",
    "not installed",
    "unknown formula",
    "no cask with this name exists",
];

/// Decide whether a failed `brew` invocation is the user's fault.
///
/// Not-found style messages are [`ErrorKind::User`]; every other non-zero
/// exit is treated as [`ErrorKind::Transient`] and retried.
pub fn classify_command_failure(output: &str) -> ErrorKind {
    let lower = output.to_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorKind::User
    } else {
        ErrorKind::Transient
    }
}

impl BreweryError {
    /// Non-zero exit from a command, classified by its output
    pub fn command_failed(command: impl Into<String>, code: i32, output: impl Into<String>) -> Self {
        let output = output.into();
        Self::Command {
            message: format!("Brew command failed with exit code {code}"),
            command: command.into(),
            code: Some(code),
            kind: classify_command_failure(&output),
            output,
            context: ErrorContext::new(),
            source: None,
        }
    }

    /// Command output that could not be parsed. Always transient.
    pub fn malformed_output(
        command: impl Into<String>,
        output: &str,
        source: serde_json::Error,
    ) -> Self {
        let preview: String = output.chars().take(200).collect();
        let mut context = ErrorContext::new();
        context.insert("output_preview", preview);
        Self::Command {
            message: "Failed to parse JSON output".to_string(),
            command: command.into(),
            code: None,
            output: String::new(),
            kind: ErrorKind::Transient,
            context,
            source: Some(source),
        }
    }

    pub fn timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout,
            context: ErrorContext::new(),
        }
    }

    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            context: ErrorContext::new(),
            source,
        }
    }

    pub fn not_found(package: impl Into<String>, kind: PackageKind) -> Self {
        Self::PackageNotFound {
            package: package.into(),
            kind,
            context: ErrorContext::new(),
            source: None,
        }
    }

    /// Not-found error chaining the failure that ended the search
    pub fn not_found_caused_by(
        package: impl Into<String>,
        kind: PackageKind,
        cause: BreweryError,
    ) -> Self {
        Self::PackageNotFound {
            package: package.into(),
            kind,
            context: ErrorContext::new(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn cache(
        operation: CacheOp,
        key: impl Into<String>,
        namespace: impl Into<String>,
        path: impl Into<PathBuf>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Cache {
            operation,
            key: key.into(),
            namespace: namespace.into(),
            path: path.into(),
            context: ErrorContext::new(),
            source,
        }
    }

    pub fn io(what: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            what: what.into(),
            context: ErrorContext::new(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Command { kind, .. } => *kind,
            Self::Timeout { .. } => ErrorKind::Transient,
            Self::Spawn { .. } => ErrorKind::System,
            Self::PackageNotFound { .. } => ErrorKind::User,
            Self::Cache { .. } => ErrorKind::System,
            Self::Io { .. } => ErrorKind::System,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    fn extra_context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Command { context, .. }
            | Self::Timeout { context, .. }
            | Self::Spawn { context, .. }
            | Self::PackageNotFound { context, .. }
            | Self::Cache { context, .. }
            | Self::Io { context, .. } => context,
        }
    }

    /// Add a context entry, keeping everything recorded so far
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra_context_mut().insert(key, value);
        self
    }

    /// Structured fields of the variant merged with caller-added context
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new();
        match self {
            Self::Command {
                command,
                code,
                output,
                context,
                ..
            } => {
                ctx.insert("command", command);
                if let Some(code) = code {
                    ctx.insert("returncode", code);
                }
                if !output.is_empty() {
                    ctx.insert("error", output);
                }
                ctx.merge_missing(context);
            }
            Self::Timeout {
                command,
                timeout,
                context,
            } => {
                ctx.insert("command", command);
                ctx.insert("timeout", timeout.as_secs_f64());
                ctx.merge_missing(context);
            }
            Self::Spawn {
                command, context, ..
            } => {
                ctx.insert("command", command);
                ctx.merge_missing(context);
            }
            Self::PackageNotFound {
                package,
                kind,
                context,
                ..
            } => {
                ctx.insert("package", package);
                ctx.insert("kind", kind);
                ctx.merge_missing(context);
            }
            Self::Cache {
                operation,
                key,
                namespace,
                path,
                context,
                ..
            } => {
                ctx.insert("operation", operation);
                ctx.insert("key", key);
                ctx.insert("namespace", namespace);
                ctx.insert("path", path.display());
                ctx.merge_missing(context);
            }
            Self::Io { what, context, .. } => {
                ctx.insert("what", what);
                ctx.merge_missing(context);
            }
        }
        ctx
    }
}
