//! Asynchronous command execution with timeouts and JSON decoding.
//!
//! [`Shell::run_capture`] never treats a non-zero exit as an error; it only
//! fails when the process cannot be started or does not finish in time.
//! [`Shell::run_json`] layers exit-code and output checks on top and is
//! retried on transient failures.

use crate::error::{BreweryError, Result};
use crate::retry::{RetryPolicy, with_retry};
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Default per-command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment forced on every child so output is parseable
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("LANG", "C"),
    ("HOMEBREW_NO_COLOR", "1"),
    ("HOMEBREW_NO_AUTO_UPDATE", "1"),
    ("HOMEBREW_NO_ENV_HINTS", "1"),
];

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone)]
pub struct Shell {
    timeout: Duration,
    retry: RetryPolicy,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, RetryPolicy::default())
    }
}

fn display_command(args: &[&str]) -> String {
    args.join(" ")
}

impl Shell {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `args[0]` with the remaining arguments and capture its output.
    ///
    /// The child is killed if it outlives the timeout.
    pub async fn run_capture(&self, args: &[&str]) -> Result<CommandOutput> {
        let command = display_command(args);
        let Some((program, rest)) = args.split_first() else {
            return Err(BreweryError::spawn(
                command,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            ));
        };

        let start = Instant::now();
        tracing::debug!(event = "command_start", command = %command, timeout = self.timeout.as_secs_f64());

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in ENV_OVERRIDES {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .map_err(|e| BreweryError::spawn(command.clone(), e))?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| BreweryError::spawn(command.clone(), e))?,
            Err(_) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::error!(
                    event = "command_timeout",
                    command = %command,
                    timeout = self.timeout.as_secs_f64(),
                    duration_ms,
                );
                return Err(BreweryError::timeout(command, self.timeout)
                    .with_context("duration_ms", duration_ms));
            }
        };

        let code = output.status.code().unwrap_or(-1);
        tracing::info!(
            event = "command_complete",
            command = %command,
            returncode = code,
            duration_ms = start.elapsed().as_millis() as u64,
        );

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            code,
        })
    }

    /// Run a command once and decode stdout as JSON.
    ///
    /// Non-zero exits become [`BreweryError::Command`] classified by their
    /// output; unparseable stdout is a transient command error.
    pub async fn run_json_once(&self, args: &[&str]) -> Result<Value> {
        let command = display_command(args);
        let start = Instant::now();
        let out = self.run_capture(args).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !out.success() {
            let detail = if out.stderr.is_empty() {
                out.stdout
            } else {
                out.stderr
            };
            tracing::error!(
                event = "command_failed",
                command = %command,
                error = %detail,
                returncode = out.code,
            );
            return Err(BreweryError::command_failed(command, out.code, detail)
                .with_context("duration_ms", duration_ms));
        }

        match serde_json::from_str(&out.stdout) {
            Ok(value) => {
                tracing::debug!(event = "json_parsed", command = %command, duration_ms);
                Ok(value)
            }
            Err(e) => {
                tracing::error!(event = "json_parse_failed", command = %command, error = %e);
                Err(BreweryError::malformed_output(command, &out.stdout, e))
            }
        }
    }

    /// [`Shell::run_json_once`] wrapped in the retry policy
    pub async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let command = display_command(args);
        with_retry(&self.retry, &command, || self.run_json_once(args)).await
    }

    /// Run a command and return its non-empty stdout lines, with retry
    pub async fn run_lines(&self, args: &[&str]) -> Result<Vec<String>> {
        let command = display_command(args);
        with_retry(&self.retry, &command, || async {
            let out = self.run_capture(args).await?;
            if !out.success() {
                let detail = if out.stderr.is_empty() {
                    out.stdout
                } else {
                    out.stderr
                };
                return Err(BreweryError::command_failed(command.clone(), out.code, detail));
            }
            Ok(out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect())
        })
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn quick() -> Shell {
        Shell::new(Duration::from_secs(5), RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_run_capture_returns_nonzero_exit_without_error() {
        let out = quick()
            .run_capture(&["sh", "-c", "echo out; echo err >&2; exit 3"])
            .await
            .unwrap();

        assert_eq!(out.stdout, "out");
        assert_eq!(out.stderr, "err");
        assert_eq!(out.code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_run_capture_times_out() {
        let shell = Shell::new(Duration::from_millis(100), RetryPolicy::none());
        let err = shell.run_capture(&["sleep", "5"]).await.unwrap_err();

        assert!(matches!(err, BreweryError::Timeout { .. }));
        assert!(err.is_transient());
        assert_eq!(err.context().get("command"), Some("sleep 5"));
        assert_eq!(err.context().get("timeout"), Some("0.1"));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_system_error() {
        let err = quick()
            .run_capture(&["brewery-definitely-not-a-real-program"])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::System);
    }

    #[tokio::test]
    async fn test_run_json_parses_stdout() {
        let value = quick()
            .run_json(&["sh", "-c", r#"echo '{"formulae": [], "casks": []}'"#])
            .await
            .unwrap();
        assert!(value["formulae"].is_array());
    }

    #[tokio::test]
    async fn test_run_json_nonzero_exit_is_command_error() {
        let err = quick()
            .run_json(&["sh", "-c", "echo 'boom' >&2; exit 1"])
            .await
            .unwrap_err();

        match &err {
            BreweryError::Command { code, output, .. } => {
                assert_eq!(*code, Some(1));
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_run_json_not_found_output_is_user_error() {
        let err = quick()
            .run_json(&["sh", "-c", "echo 'Error: No available formula with the name \"nope\".' >&2; exit 1"])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[tokio::test]
    async fn test_run_lines_skips_blank_lines() {
        let lines = quick()
            .run_lines(&["sh", "-c", "printf 'firefox\\n\\n  iterm2  \\n'"])
            .await
            .unwrap();
        assert_eq!(lines, vec!["firefox", "iterm2"]);
    }

    #[tokio::test]
    async fn test_run_json_malformed_output() {
        let err = quick()
            .run_json(&["sh", "-c", "echo 'not json at all'"])
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.context().get("output_preview"), Some("not json at all"));
    }

    #[tokio::test]
    async fn test_run_json_retries_transient_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("count");
        let script = format!(
            "echo x >> {0}; if [ $(wc -l < {0}) -lt 2 ]; then exit 1; fi; echo '[1]'",
            marker.display()
        );
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        };
        let shell = Shell::new(Duration::from_secs(5), retry);

        let value = shell.run_json(&["sh", "-c", &script]).await.unwrap();
        assert_eq!(value, serde_json::json!([1]));
    }
}
