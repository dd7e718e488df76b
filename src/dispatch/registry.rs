//! Module registry
//!
//! A closed set of module handlers behind one `handle(verb, args, env)`
//! surface, registered once at startup into a table keyed by subcommand
//! name. The dispatcher routes by lookup; it never reaches into a module.

use super::modules::{ComposeModule, DiagModule, PortModule, ShellModule, SyncModule};
use crate::env::EnvironmentDescriptor;
use crate::error::Result;
use crate::process::CommandRunner;

/// Describes one module: its name and the subcommands it accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Module name
    pub name: &'static str,
    /// Subcommands routed to this module
    pub subcommands: &'static [&'static str],
}

/// The closed set of module handlers
pub enum ModuleHandler {
    Compose(ComposeModule),
    Sync(SyncModule),
    Port(PortModule),
    Shell(ShellModule),
    Diag(DiagModule),
}

impl ModuleHandler {
    /// Handle a verb with verbatim args against the resolved environment.
    pub async fn handle(
        &self,
        verb: &str,
        args: &[String],
        env: &EnvironmentDescriptor,
    ) -> Result<i32> {
        match self {
            ModuleHandler::Compose(m) => m.handle(verb, args, env).await,
            ModuleHandler::Sync(m) => m.handle(verb, args, env).await,
            ModuleHandler::Port(m) => m.handle(args, env),
            ModuleHandler::Shell(m) => m.handle(verb, args, env).await,
            ModuleHandler::Diag(m) => m.handle(env).await,
        }
    }
}

const COMPOSE_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "compose",
    subcommands: &["up", "down", "restart", "rebuild", "logs", "exec", "purge"],
};

const SYNC_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "sync",
    subcommands: &[
        "sync-start",
        "sync-stop",
        "sync-status",
        "sync-pause",
        "sync-resume",
    ],
};

const PORT_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "port",
    subcommands: &["find-free-port"],
};

const SHELL_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "shell",
    subcommands: &["ssh", "console"],
};

const DIAG_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "diag",
    subcommands: &["status"],
};

/// Lookup table from subcommand to module, built once at startup and
/// read-only thereafter
pub struct ModuleRegistry {
    entries: Vec<(ModuleDescriptor, ModuleHandler)>,
}

impl ModuleRegistry {
    pub fn new(runner: CommandRunner, docker_binary: String, sync_binary: String) -> Self {
        let entries = vec![
            (
                COMPOSE_DESCRIPTOR,
                ModuleHandler::Compose(ComposeModule::new(
                    runner.clone(),
                    docker_binary.clone(),
                )),
            ),
            (
                SYNC_DESCRIPTOR,
                ModuleHandler::Sync(SyncModule::new(runner.clone(), sync_binary.clone())),
            ),
            (PORT_DESCRIPTOR, ModuleHandler::Port(PortModule::new())),
            (
                SHELL_DESCRIPTOR,
                ModuleHandler::Shell(ShellModule::new(runner.clone(), docker_binary.clone())),
            ),
            (
                DIAG_DESCRIPTOR,
                ModuleHandler::Diag(DiagModule::new(runner, docker_binary, sync_binary)),
            ),
        ];
        Self { entries }
    }

    /// Find the module accepting `subcommand`.
    pub fn lookup(&self, subcommand: &str) -> Option<(&ModuleDescriptor, &ModuleHandler)> {
        self.entries
            .iter()
            .find(|(descriptor, _)| descriptor.subcommands.contains(&subcommand))
            .map(|(descriptor, handler)| (descriptor, handler))
    }

    /// All registered descriptors, for usage output.
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.iter().map(|(descriptor, _)| descriptor)
    }
}
