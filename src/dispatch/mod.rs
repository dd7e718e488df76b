//! Command dispatch
//!
//! The dispatcher parses global flags, resolves the environment, routes
//! the subcommand through the module registry and translates errors into
//! exit codes. It holds no business logic of its own.

pub mod modules;
pub mod registry;

pub use registry::{ModuleDescriptor, ModuleHandler, ModuleRegistry};

use crate::env::{resolve, ConfigLoader, Overrides};
use crate::error::{OrodcError, Result};
use crate::process::{CommandRunner, DEFAULT_TIMEOUT_SECS};
use clap::error::ErrorKind;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// OroDC - Docker Compose development environments for OroPlatform
#[derive(Parser, Debug)]
#[command(name = "orodc")]
#[command(version)]
#[command(about = "Manage Docker Compose based OroPlatform environments", long_about = None)]
pub struct Cli {
    /// Environment name
    #[arg(short, long)]
    pub env: Option<String>,

    /// Compose project name (defaults to the project directory name)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Additional compose overlay, applied after configured overlays
    #[arg(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    /// Remote docker host (ssh target)
    #[arg(long)]
    pub remote: Option<String>,

    /// Timeout for external commands, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Subcommand and arguments, passed verbatim to the selected module
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Routes one command invocation to completion
pub struct Dispatcher {
    share_dir: PathBuf,
    project_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(share_dir: PathBuf, project_dir: PathBuf) -> Self {
        Self {
            share_dir,
            project_dir,
        }
    }

    /// Construct from the process environment: `ORODC_SHARE_DIR` or the
    /// installed data directory, and the current working directory.
    pub fn from_env() -> Result<Self> {
        let share_dir = match std::env::var_os("ORODC_SHARE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/usr/local/share"))
                .join("orodc"),
        };
        let project_dir = std::env::current_dir()?;
        Ok(Self::new(share_dir, project_dir))
    }

    /// Run one invocation and return the process exit code.
    pub async fn dispatch(&self, argv: &[String]) -> i32 {
        match self.run(argv).await {
            Ok(code) => code,
            Err(err) => {
                eprintln!("orodc: {}", err);
                err.exit_code()
            }
        }
    }

    async fn run(&self, argv: &[String]) -> Result<i32> {
        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err)
                if err.kind() == ErrorKind::DisplayHelp
                    || err.kind() == ErrorKind::DisplayVersion =>
            {
                print!("{}", err);
                return Ok(0);
            }
            Err(err) => return Err(OrodcError::Usage(err.to_string())),
        };

        init_logging(cli.debug);

        let runner = CommandRunner::new(Duration::from_secs(
            cli.timeout
                .or_else(|| env_var("ORODC_TIMEOUT_SECS").and_then(|v| v.parse().ok()))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ));
        let docker_binary = env_var("ORODC_DOCKER_BIN").unwrap_or_else(|| "docker".to_string());
        let sync_binary = env_var("ORODC_SYNC_BIN").unwrap_or_else(|| "mutagen".to_string());
        let registry = ModuleRegistry::new(runner, docker_binary, sync_binary);

        let Some((subcommand, rest)) = cli.args.split_first() else {
            return Err(OrodcError::Usage(usage(&registry)));
        };

        let Some((descriptor, handler)) = registry.lookup(subcommand) else {
            return Err(OrodcError::Usage(format!(
                "unknown command '{}'\n\n{}",
                subcommand,
                usage(&registry)
            )));
        };

        let env_name = cli
            .env
            .or_else(|| env_var("ORODC_ENV"))
            .unwrap_or_else(|| "local".to_string());
        let project = cli
            .project
            .or_else(|| env_var("ORODC_PROJECT_NAME"))
            .unwrap_or_else(|| {
                self.project_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "orodc".to_string())
            });

        let overrides = Overrides {
            extra_overlays: self.extra_overlays(&cli.files),
            variables: BTreeMap::new(),
            remote_host: cli.remote.or_else(|| env_var("ORODC_REMOTE_HOST")),
            base_dir: None,
        };

        let layers = ConfigLoader::new(self.share_dir.clone(), self.project_dir.clone()).load()?;
        let environment = resolve(&layers, &env_name, &project, &overrides)?;

        tracing::debug!(
            "Dispatching '{}' to module '{}' (environment {})",
            subcommand,
            descriptor.name,
            environment.name
        );

        handler.handle(subcommand, rest, &environment).await
    }

    /// Overlays from `-f` flags plus `ORODC_COMPOSE_FILES`
    /// (colon-separated), appended last so they override everything.
    fn extra_overlays(&self, flags: &[PathBuf]) -> Vec<PathBuf> {
        let mut overlays: Vec<PathBuf> = flags.to_vec();
        if let Some(value) = env_var("ORODC_COMPOSE_FILES") {
            overlays.extend(value.split(':').filter(|s| !s.is_empty()).map(PathBuf::from));
        }
        overlays
            .into_iter()
            .map(|p| {
                if p.is_relative() {
                    self.project_dir.join(p)
                } else {
                    p
                }
            })
            .collect()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    // repeated init is a no-op (tests dispatch more than once)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn usage(registry: &ModuleRegistry) -> String {
    let mut text = String::from("usage: orodc [OPTIONS] <COMMAND> [ARGS]...\n\nCommands:");
    for descriptor in registry.descriptors() {
        text.push_str(&format!(
            "\n  {:<8} {}",
            descriptor.name,
            descriptor.subcommands.join(" ")
        ));
    }
    text.push_str("\n\nSee 'orodc --help' for global options.");
    text
}
