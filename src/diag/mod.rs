//! Environment diagnostics
//!
//! `orodc status` shows the resolved environment, the compose services
//! reported by docker, and the sync sessions reported by the engine.

use crate::compose::ComposeLifecycle;
use crate::env::{EnvironmentDescriptor, EnvironmentMode};
use crate::error::Result;
use crate::sync::{SyncEngine, SyncManager};
use serde::Deserialize;

/// One service row from `docker compose ps --format json`
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Publishers", default)]
    publishers: Vec<Publisher>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    #[serde(rename = "PublishedPort", default)]
    published_port: u16,
    #[serde(rename = "TargetPort", default)]
    target_port: u16,
}

/// Summary of one running service
#[derive(Debug)]
pub struct ServiceStatus {
    pub name: String,
    pub service: String,
    pub state: String,
    pub ports: Vec<String>,
}

/// Parse compose ps output. Docker emits either a JSON array or one
/// object per line depending on version; both are accepted.
pub fn parse_ps(raw: &str) -> Result<Vec<ServiceStatus>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<PsEntry> = if raw.starts_with('[') {
        serde_json::from_str(raw)?
    } else {
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?
    };

    Ok(entries
        .into_iter()
        .map(|e| {
            let ports = e
                .publishers
                .iter()
                .filter(|p| p.published_port != 0)
                .map(|p| format!("{}->{}", p.published_port, p.target_port))
                .collect();
            ServiceStatus {
                name: e.name,
                service: e.service,
                state: e.state,
                ports,
            }
        })
        .collect())
}

/// Print the full status report for an environment.
pub async fn print_status<E: SyncEngine>(
    descriptor: &EnvironmentDescriptor,
    lifecycle: &ComposeLifecycle,
    sync: &SyncManager<E>,
) -> Result<()> {
    println!("Environment: {} (project {})", descriptor.name, descriptor.project);
    match descriptor.mode {
        EnvironmentMode::Local => println!("Mode:        local"),
        EnvironmentMode::Remote { ref host } => println!("Mode:        remote ({})", host),
    }
    println!("Base dir:    {}", descriptor.base_dir.display());
    println!("Overlays:");
    for overlay in &descriptor.overlays {
        println!("  - {}", overlay.display());
    }

    println!();
    let raw = lifecycle.ps_json(descriptor).await?;
    let services = parse_ps(&raw)?;
    if services.is_empty() {
        println!("No services running");
    } else {
        println!(
            "{:<24} {:<12} {:<10} {:<20}",
            "NAME", "SERVICE", "STATE", "PORTS"
        );
        for s in services {
            println!(
                "{:<24} {:<12} {:<10} {:<20}",
                s.name,
                s.service,
                s.state,
                s.ports.join(", ")
            );
        }
    }

    println!();
    let sessions = sync.list().await?;
    if sessions.is_empty() {
        println!("No sync sessions");
    } else {
        println!("{:<16} {:<10} {}", "SESSION", "STATE", "PATHS");
        for s in sessions {
            let detail = match s.last_error {
                Some(ref reason) => format!(" ({})", reason),
                None => String::new(),
            };
            println!(
                "{:<16} {:<10} {} -> {}{}",
                s.id,
                s.state.to_string(),
                s.host_path.display(),
                s.container_path,
                detail
            );
        }
    }

    Ok(())
}
