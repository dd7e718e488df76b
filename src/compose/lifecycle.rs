//! Compose lifecycle verbs
//!
//! Translates high-level verbs into `docker compose` invocations and runs
//! them. Errors from the external tool propagate as
//! [`OrodcError::ExternalTool`]. There are no retries by default; `logs`
//! opts into a short bounded retry, taken only when docker's stderr shows
//! the container is still coming up. Interactive verbs never retry, so a
//! command is never re-run after it already reached the container.

use super::command::{invocation, ComposeInvocation, DOCKER_BIN};
use crate::env::EnvironmentDescriptor;
use crate::error::{OrodcError, Result};
use crate::process::{stderr_tail, CommandRunner};
use std::time::Duration;

/// Delay between opt-in retry attempts
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Stderr fragments docker emits while a container is still coming up.
/// Any other failure is final.
const TRANSIENT_STDERR: &[&str] = &[
    "is not running",
    "is restarting",
    "no such container",
    "no container found",
];

fn is_transient(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_STDERR.iter().any(|needle| lower.contains(needle))
}

/// High-level compose verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeVerb {
    Up,
    Down,
    Restart,
    Rebuild,
    Logs,
    Exec,
    Purge,
}

impl ComposeVerb {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "up" => Some(ComposeVerb::Up),
            "down" => Some(ComposeVerb::Down),
            "restart" => Some(ComposeVerb::Restart),
            "rebuild" => Some(ComposeVerb::Rebuild),
            "logs" => Some(ComposeVerb::Logs),
            "exec" => Some(ComposeVerb::Exec),
            "purge" => Some(ComposeVerb::Purge),
            _ => None,
        }
    }

    /// Extra attempts for verbs that tolerate a container still starting.
    /// `exec` stays at zero: the command may not be idempotent.
    fn retries(self) -> u32 {
        match self {
            ComposeVerb::Logs => 2,
            _ => 0,
        }
    }
}

/// Executes compose verbs against the resolved environment
pub struct ComposeLifecycle {
    runner: CommandRunner,
    binary: String,
}

impl ComposeLifecycle {
    pub fn new(runner: CommandRunner) -> Self {
        Self::with_binary(runner, DOCKER_BIN.to_string())
    }

    /// Use a docker binary other than the one on PATH
    /// (`ORODC_DOCKER_BIN`).
    pub fn with_binary(runner: CommandRunner, binary: String) -> Self {
        Self { runner, binary }
    }

    /// Execute a verb with passthrough args. Returns 0 on success; a
    /// non-zero external exit becomes [`OrodcError::ExternalTool`].
    pub async fn execute(
        &self,
        verb: ComposeVerb,
        descriptor: &EnvironmentDescriptor,
        args: &[String],
    ) -> Result<i32> {
        match verb {
            ComposeVerb::Rebuild => {
                // rebuild = image rebuild without cache, then a detached up
                let build = compose_args(&["build", "--no-cache"], &[]);
                self.run_once(descriptor, &build).await?;
                let up = compose_args(&["up", "-d"], args);
                self.run_once(descriptor, &up).await
            }
            ComposeVerb::Exec => {
                if args.is_empty() {
                    return Err(OrodcError::Usage(
                        "exec requires a service name, e.g. `orodc exec cli bash`".to_string(),
                    ));
                }
                let full = compose_args(&["exec"], args);
                self.run_once(descriptor, &full).await
            }
            ComposeVerb::Logs => {
                let full = compose_args(&["logs"], args);
                self.run_retrying(descriptor, &full, verb.retries()).await
            }
            ComposeVerb::Up => {
                let full = compose_args(&["up"], args);
                self.run_once(descriptor, &full).await
            }
            ComposeVerb::Down => {
                let full = compose_args(&["down"], args);
                self.run_once(descriptor, &full).await
            }
            ComposeVerb::Restart => {
                let full = compose_args(&["restart"], args);
                self.run_once(descriptor, &full).await
            }
            ComposeVerb::Purge => {
                // down including volumes and orphans; destructive on purpose
                let full = compose_args(&["down", "--volumes", "--remove-orphans"], args);
                self.run_once(descriptor, &full).await
            }
        }
    }

    /// Run a one-off command in a fresh service container:
    /// `docker compose run --rm <service> <command...>`.
    pub async fn run_one_off(
        &self,
        descriptor: &EnvironmentDescriptor,
        service: &str,
        command: &[String],
    ) -> Result<i32> {
        let mut args = vec!["run".to_string(), "--rm".to_string(), service.to_string()];
        args.extend(command.iter().cloned());
        self.run_once(descriptor, &args).await
    }

    /// List services for diagnostics: `docker compose ps --format json`.
    pub async fn ps_json(&self, descriptor: &EnvironmentDescriptor) -> Result<String> {
        let inv = self.invocation_for(
            descriptor,
            &["ps".to_string(), "--format".to_string(), "json".to_string()],
        );
        let output = self
            .runner
            .capture(&inv.program, &inv.args, &inv.env, Some(&descriptor.base_dir))
            .await?;
        output.check("docker compose ps")
    }

    fn invocation_for(
        &self,
        descriptor: &EnvironmentDescriptor,
        args: &[String],
    ) -> ComposeInvocation {
        let mut inv = invocation(descriptor, args);
        inv.program = self.binary.clone();
        inv
    }

    /// Single attempt with fully inherited stdio (interactive and
    /// streaming invocations).
    async fn run_once(&self, descriptor: &EnvironmentDescriptor, args: &[String]) -> Result<i32> {
        let inv = self.invocation_for(descriptor, args);
        let code = self
            .runner
            .run(&inv.program, &inv.args, &inv.env, Some(&descriptor.base_dir))
            .await?;
        if code == 0 {
            return Ok(0);
        }
        Err(OrodcError::ExternalTool {
            command: "docker compose".to_string(),
            exit_code: code,
            stderr_tail: String::new(),
        })
    }

    /// Bounded retries, taken only while stderr shows the container is
    /// still starting. Stderr is captured for the transient check and
    /// echoed through, so this path is for non-interactive verbs.
    async fn run_retrying(
        &self,
        descriptor: &EnvironmentDescriptor,
        args: &[String],
        retries: u32,
    ) -> Result<i32> {
        let inv = self.invocation_for(descriptor, args);
        let mut attempt = 0;
        loop {
            let (code, stderr) = self
                .runner
                .run_capturing_stderr(&inv.program, &inv.args, &inv.env, Some(&descriptor.base_dir))
                .await?;
            if code == 0 {
                return Ok(0);
            }
            if attempt < retries && is_transient(&stderr) {
                attempt += 1;
                tracing::warn!(
                    "docker compose exited with {} while the container is starting, retrying ({}/{})",
                    code,
                    attempt,
                    retries
                );
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
            return Err(OrodcError::ExternalTool {
                command: "docker compose".to_string(),
                exit_code: code,
                stderr_tail: stderr_tail(&stderr),
            });
        }
    }
}

fn compose_args(verb: &[&str], passthrough: &[String]) -> Vec<String> {
    let mut args: Vec<String> = verb.iter().map(|s| s.to_string()).collect();
    args.extend(passthrough.iter().cloned());
    args
}
