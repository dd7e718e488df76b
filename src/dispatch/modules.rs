//! Module handlers
//!
//! Each handler covers one family of subcommands. Handlers receive the
//! verb, the remaining argv tokens verbatim, and the resolved environment
//! descriptor; they hold no parsing or routing logic beyond their own
//! flags.

use crate::compose::{ComposeLifecycle, ComposeVerb};
use crate::diag;
use crate::env::{EnvironmentDescriptor, EnvironmentMode};
use crate::error::{OrodcError, Result};
use crate::port::{published_ports, PortAllocator};
use crate::process::CommandRunner;
use crate::sync::{MutagenEngine, SyncManager, SyncState};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Variable selecting the service used for shell access and sync
const CLI_SERVICE_VAR: &str = "ORODC_CLI_SERVICE";
const DEFAULT_CLI_SERVICE: &str = "cli";

/// Default find-free-port probe window
const DEFAULT_PORT_MIN: u16 = 20000;
const DEFAULT_PORT_MAX: u16 = 65535;

fn cli_service(env: &EnvironmentDescriptor) -> String {
    env.variables
        .get(CLI_SERVICE_VAR)
        .cloned()
        .unwrap_or_else(|| DEFAULT_CLI_SERVICE.to_string())
}

/// Build a sync manager bound to this environment's engine daemon.
fn sync_manager(
    runner: &CommandRunner,
    binary: &str,
    env: &EnvironmentDescriptor,
) -> SyncManager<MutagenEngine> {
    let container = format!("{}-{}-1", env.project, cli_service(env));
    let mut engine_env = BTreeMap::new();
    if let EnvironmentMode::Remote { ref host } = env.mode {
        engine_env.insert("DOCKER_HOST".to_string(), format!("ssh://{}", host));
    }
    let engine = MutagenEngine::new(
        runner.clone(),
        binary.to_string(),
        env.project.clone(),
        container,
        engine_env,
    );
    SyncManager::new(engine)
}

/// Compose lifecycle verbs: up, down, restart, rebuild, logs, exec, purge
pub struct ComposeModule {
    lifecycle: ComposeLifecycle,
}

impl ComposeModule {
    pub fn new(runner: CommandRunner, docker_binary: String) -> Self {
        Self {
            lifecycle: ComposeLifecycle::with_binary(runner, docker_binary),
        }
    }

    pub async fn handle(
        &self,
        verb: &str,
        args: &[String],
        env: &EnvironmentDescriptor,
    ) -> Result<i32> {
        let verb = ComposeVerb::parse(verb)
            .ok_or_else(|| OrodcError::Usage(format!("unknown compose verb '{verb}'")))?;
        self.lifecycle.execute(verb, env, args).await
    }
}

/// Shell and application-console access into the cli container
pub struct ShellModule {
    lifecycle: ComposeLifecycle,
}

impl ShellModule {
    pub fn new(runner: CommandRunner, docker_binary: String) -> Self {
        Self {
            lifecycle: ComposeLifecycle::with_binary(runner, docker_binary),
        }
    }

    pub async fn handle(
        &self,
        verb: &str,
        args: &[String],
        env: &EnvironmentDescriptor,
    ) -> Result<i32> {
        match verb {
            "ssh" => {
                let mut exec_args = vec![cli_service(env)];
                if args.is_empty() {
                    exec_args.push("bash".to_string());
                } else {
                    exec_args.extend(args.iter().cloned());
                }
                self.lifecycle
                    .execute(ComposeVerb::Exec, env, &exec_args)
                    .await
            }
            "console" => {
                // one-off container, so the command works before `up`
                let mut command = vec!["php".to_string(), "bin/console".to_string()];
                command.extend(args.iter().cloned());
                self.lifecycle
                    .run_one_off(env, &cli_service(env), &command)
                    .await
            }
            other => Err(OrodcError::Usage(format!("unknown shell verb '{other}'"))),
        }
    }
}

/// Sync session control: sync-start, sync-stop, sync-status, sync-pause,
/// sync-resume
pub struct SyncModule {
    runner: CommandRunner,
    binary: String,
}

impl SyncModule {
    pub fn new(runner: CommandRunner, binary: String) -> Self {
        Self { runner, binary }
    }

    pub async fn handle(
        &self,
        verb: &str,
        args: &[String],
        env: &EnvironmentDescriptor,
    ) -> Result<i32> {
        let manager = sync_manager(&self.runner, &self.binary, env);
        match verb {
            "sync-start" => {
                let (host, container) = match args {
                    [host, container] => (host, container),
                    _ => {
                        return Err(OrodcError::Usage(
                            "usage: orodc sync-start <host-path> <container-path>".to_string(),
                        ))
                    }
                };
                let host = canonical(Path::new(host));
                let session = manager.start(&host, container).await?;
                println!(
                    "{} {} -> {} ({})",
                    session.id,
                    session.host_path.display(),
                    session.container_path,
                    session.state
                );
                Ok(0)
            }
            "sync-stop" => match args {
                [] => {
                    let sessions = manager.list().await?;
                    let mut stopped = 0;
                    for session in sessions {
                        if session.state.stoppable() {
                            manager.stop(&session.id).await?;
                            println!("{} stopped", session.id);
                            stopped += 1;
                        }
                    }
                    if stopped == 0 {
                        println!("No sync sessions to stop");
                    }
                    Ok(0)
                }
                [id] => {
                    manager.stop(id).await?;
                    println!("{} stopped", id);
                    Ok(0)
                }
                _ => Err(OrodcError::Usage(
                    "usage: orodc sync-stop [session-id]".to_string(),
                )),
            },
            "sync-status" => match args {
                [] => {
                    let sessions = manager.list().await?;
                    if sessions.is_empty() {
                        println!("No sync sessions");
                    }
                    for session in sessions {
                        print_status_line(&session.id, session.state, session.last_error.as_deref());
                    }
                    Ok(0)
                }
                [id] => {
                    let (state, detail) = manager.status(id).await?;
                    print_status_line(id, state, detail.as_deref());
                    Ok(0)
                }
                _ => Err(OrodcError::Usage(
                    "usage: orodc sync-status [session-id]".to_string(),
                )),
            },
            "sync-pause" => {
                let id = self.single_session_id(&manager, args, verb).await?;
                manager.pause(&id).await?;
                println!("{} paused", id);
                Ok(0)
            }
            "sync-resume" => {
                let id = self.single_session_id(&manager, args, verb).await?;
                manager.resume(&id).await?;
                println!("{} resumed", id);
                Ok(0)
            }
            other => Err(OrodcError::Usage(format!("unknown sync verb '{other}'"))),
        }
    }

    /// Accept an explicit session id, or default to the only session.
    async fn single_session_id(
        &self,
        manager: &SyncManager<MutagenEngine>,
        args: &[String],
        verb: &str,
    ) -> Result<String> {
        match args {
            [id] => Ok(id.clone()),
            [] => {
                let sessions = manager.list().await?;
                match sessions.as_slice() {
                    [only] => Ok(only.id.clone()),
                    _ => Err(OrodcError::Usage(format!(
                        "usage: orodc {verb} <session-id>"
                    ))),
                }
            }
            _ => Err(OrodcError::Usage(format!("usage: orodc {verb} <session-id>"))),
        }
    }
}

fn print_status_line(id: &str, state: SyncState, detail: Option<&str>) {
    match detail {
        Some(reason) => println!("{} {} (sync failure: {})", id, state, reason),
        None => println!("{} {}", id, state),
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Free TCP port lookup
#[derive(Default)]
pub struct PortModule;

impl PortModule {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, args: &[String], env: &EnvironmentDescriptor) -> Result<i32> {
        let reservation = self.find(args, env)?;
        println!("{}", reservation.port);
        Ok(0)
    }

    /// Parse flags and allocate; split from `handle` so the chosen port
    /// is observable in tests.
    pub fn find(
        &self,
        args: &[String],
        env: &EnvironmentDescriptor,
    ) -> Result<crate::port::PortReservation> {
        let (min, max, service) = parse_port_flags(args)?;

        // ports already published by other services count as taken even
        // when their containers are currently down
        let mut excluded = Vec::new();
        for overlay in &env.overlays {
            if overlay.is_file() {
                excluded.extend(published_ports(overlay, service.as_deref())?);
            }
        }

        let holder = format!("orodc:{}", env.project);
        PortAllocator::new()
            .exclude(excluded)
            .allocate(min, max, &holder)
    }
}

fn parse_port_flags(args: &[String]) -> Result<(u16, u16, Option<String>)> {
    let mut min = DEFAULT_PORT_MIN;
    let mut max = DEFAULT_PORT_MAX;
    let mut service = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--min" => min = parse_port_value(iter.next(), "--min")?,
            "--max" => max = parse_port_value(iter.next(), "--max")?,
            "--service" => {
                service = Some(
                    iter.next()
                        .ok_or_else(|| OrodcError::Usage("--service requires a value".into()))?
                        .clone(),
                )
            }
            other => {
                return Err(OrodcError::Usage(format!(
                    "unknown find-free-port argument '{other}'"
                )))
            }
        }
    }

    Ok((min, max, service))
}

fn parse_port_value(value: Option<&String>, flag: &str) -> Result<u16> {
    let value = value.ok_or_else(|| OrodcError::Usage(format!("{flag} requires a value")))?;
    value
        .parse()
        .map_err(|_| OrodcError::Usage(format!("{flag}: invalid port '{value}'")))
}

/// Diagnostics: resolved environment, services, sync sessions
pub struct DiagModule {
    runner: CommandRunner,
    docker_binary: String,
    sync_binary: String,
}

impl DiagModule {
    pub fn new(runner: CommandRunner, docker_binary: String, sync_binary: String) -> Self {
        Self {
            runner,
            docker_binary,
            sync_binary,
        }
    }

    pub async fn handle(&self, env: &EnvironmentDescriptor) -> Result<i32> {
        let lifecycle =
            ComposeLifecycle::with_binary(self.runner.clone(), self.docker_binary.clone());
        let manager = sync_manager(&self.runner, &self.sync_binary, env);
        diag::print_status(env, &lifecycle, &manager).await?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};
    use std::os::unix::fs::PermissionsExt;

    fn descriptor_with_overlays(overlays: Vec<PathBuf>) -> EnvironmentDescriptor {
        EnvironmentDescriptor {
            name: "local".into(),
            project: "shop".into(),
            base_dir: PathBuf::from("/tmp"),
            overlays,
            variables: BTreeMap::new(),
            mode: EnvironmentMode::Local,
        }
    }

    #[test]
    fn test_parse_port_flags() {
        let args: Vec<String> = ["--min", "20000", "--max", "20010"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (min, max, service) = parse_port_flags(&args).unwrap();
        assert_eq!((min, max), (20000, 20010));
        assert!(service.is_none());
    }

    #[test]
    fn test_parse_port_flags_rejects_junk() {
        let args = vec!["--min".to_string(), "notaport".to_string()];
        assert!(matches!(
            parse_port_flags(&args).unwrap_err(),
            OrodcError::Usage(_)
        ));
        let args = vec!["extra".to_string()];
        assert!(matches!(
            parse_port_flags(&args).unwrap_err(),
            OrodcError::Usage(_)
        ));
    }

    #[test]
    fn test_find_free_port_skips_occupied_head() {
        // occupy the first ports of a free window, expect the next one
        let mut base = 42000u16;
        let held: Vec<TcpListener> = loop {
            let attempt: Vec<_> = (base..base + 5)
                .map(|p| TcpListener::bind((Ipv4Addr::UNSPECIFIED, p)))
                .collect();
            if attempt.iter().all(|r| r.is_ok()) {
                break attempt.into_iter().take(3).map(|r| r.unwrap()).collect();
            }
            base += 5;
        };

        let module = PortModule::new();
        let env = descriptor_with_overlays(vec![PathBuf::from("/nonexistent/compose.yml")]);
        let args: Vec<String> = [
            "--min",
            &base.to_string(),
            "--max",
            &(base + 4).to_string(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let reservation = module.find(&args, &env).unwrap();
        assert_eq!(reservation.port, base + 3);
        drop(held);
    }

    #[test]
    fn test_find_free_port_honors_published_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("compose.yml");

        let mut base = 43000u16;
        while TcpListener::bind((Ipv4Addr::UNSPECIFIED, base)).is_err()
            || TcpListener::bind((Ipv4Addr::UNSPECIFIED, base + 1)).is_err()
        {
            base += 2;
        }
        std::fs::write(
            &overlay,
            format!("services:\n  web:\n    ports:\n      - \"{base}:80\"\n"),
        )
        .unwrap();

        let module = PortModule::new();
        let env = descriptor_with_overlays(vec![overlay]);
        let args: Vec<String> = [
            "--min",
            &base.to_string(),
            "--max",
            &(base + 1).to_string(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        // base is free to bind but published in the overlay, so skipped
        let reservation = module.find(&args, &env).unwrap();
        assert_eq!(reservation.port, base + 1);
    }

    #[tokio::test]
    async fn test_console_runs_one_off_cli_container() {
        let dir = tempfile::tempdir().unwrap();
        let argv_file = dir.path().join("argv");
        let script = dir.path().join("docker");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" >> {}\nexit 0\n", argv_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let module = ShellModule::new(CommandRunner::default(), script.display().to_string());
        let mut env = descriptor_with_overlays(vec![PathBuf::from("/share/compose.yml")]);
        env.base_dir = dir.path().to_path_buf();

        let code = module
            .handle("console", &["cache:clear".to_string()], &env)
            .await
            .unwrap();
        assert_eq!(code, 0);

        let argv = std::fs::read_to_string(&argv_file).unwrap();
        assert!(argv.contains("run --rm cli php bin/console cache:clear"));
        // one invocation only
        assert_eq!(argv.lines().count(), 1);
    }

    #[test]
    fn test_cli_service_override() {
        let mut env = descriptor_with_overlays(vec![]);
        assert_eq!(cli_service(&env), "cli");
        env.variables
            .insert(CLI_SERVICE_VAR.to_string(), "ssh".to_string());
        assert_eq!(cli_service(&env), "ssh");
    }
}
