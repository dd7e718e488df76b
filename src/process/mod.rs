//! External process execution
//!
//! Every external binary (docker, mutagen) is invoked through
//! [`CommandRunner`]: bounded by a timeout, killed on expiry, and killed
//! when the user interrupts the CLI so no orphaned children are left
//! behind.

use crate::error::{OrodcError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Number of trailing stderr lines kept for error reporting
const STDERR_TAIL_LINES: usize = 10;

/// Default bound on external invocations
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Captured result of an external invocation
#[derive(Debug)]
pub struct Output {
    /// Process exit code (-1 when killed by a signal)
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Map a failed invocation to [`OrodcError::ExternalTool`], returning
    /// stdout on success.
    pub fn check(self, command: &str) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(OrodcError::ExternalTool {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr_tail: stderr_tail(&self.stderr),
            })
        }
    }
}

/// Last few lines of stderr, for diagnostics
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Timeout- and interrupt-aware runner for external binaries
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a command and capture its output. Non-zero exit codes are not
    /// errors here; callers inspect the returned [`Output`].
    pub async fn capture(
        &self,
        program: &str,
        args: &[String],
        envs: &BTreeMap<String, String>,
        cwd: Option<&Path>,
    ) -> Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!("Running: {} {}", program, args.join(" "));

        let mut child = cmd.spawn()?;
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = self.wait_bounded(&mut child, program).await?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(Output {
            exit_code: status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Run a command with inherited stdio (interactive or streaming
    /// invocations: `up`, `logs -f`, `exec`). Returns the exit code.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        envs: &BTreeMap<String, String>,
        cwd: Option<&Path>,
    ) -> Result<i32> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!("Running: {} {}", program, args.join(" "));

        let mut child = cmd.spawn()?;
        self.wait_bounded(&mut child, program).await
    }

    /// Run a command with inherited stdin/stdout but captured stderr, for
    /// callers that inspect failure output. Captured stderr is echoed to
    /// the parent's stderr afterwards so nothing is swallowed.
    pub async fn run_capturing_stderr(
        &self,
        program: &str,
        args: &[String],
        envs: &BTreeMap<String, String>,
        cwd: Option<&Path>,
    ) -> Result<(i32, String)> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!("Running: {} {}", program, args.join(" "));

        let mut child = cmd.spawn()?;
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let code = self.wait_bounded(&mut child, program).await?;
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
        if !stderr.is_empty() {
            eprint!("{}", stderr);
        }
        Ok((code, stderr))
    }

    /// Wait for the child, enforcing the timeout and propagating user
    /// interrupts by killing the child first.
    async fn wait_bounded(&self, child: &mut Child, program: &str) -> Result<i32> {
        tokio::select! {
            status = child.wait() => {
                Ok(status?.code().unwrap_or(-1))
            }
            _ = tokio::time::sleep(self.timeout) => {
                child.kill().await.ok();
                Err(OrodcError::Timeout {
                    command: program.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, terminating {}", program);
                child.kill().await.ok();
                Err(OrodcError::Interrupted)
            }
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}
