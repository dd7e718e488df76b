//! Free TCP port discovery
//!
//! Allocation is advisory: a candidate port is bound once to prove it is
//! free and released immediately so the caller can hand it to an external
//! process. Another process may grab the port in between; callers are
//! expected to use the result promptly. Probing is sequential ascending,
//! which keeps results reproducible.

use crate::error::{OrodcError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;

/// A transient record of one allocation, for logging only. No socket is
/// held once the allocator returns.
#[derive(Debug, Clone)]
pub struct PortReservation {
    /// Requested range (min, max)
    pub range: (u16, u16),
    /// The chosen port
    pub port: u16,
    /// Logical holder identity
    pub holder: String,
}

/// Free-port allocator with an optional exclusion set
#[derive(Debug, Default)]
pub struct PortAllocator {
    excluded: HashSet<u16>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude ports already claimed elsewhere (e.g. published by other
    /// compose services) before probing.
    pub fn exclude<I: IntoIterator<Item = u16>>(mut self, ports: I) -> Self {
        self.excluded.extend(ports);
        self
    }

    /// Find the lowest bindable TCP port in `[min, max]`.
    pub fn allocate(&self, min: u16, max: u16, holder: &str) -> Result<PortReservation> {
        if min == 0 || min > max {
            return Err(OrodcError::Usage(format!(
                "invalid port range {min}-{max}: expected 1 <= min <= max <= 65535"
            )));
        }

        for port in min..=max {
            if self.excluded.contains(&port) {
                continue;
            }
            // transient bind on the wildcard address, so a listener on any
            // interface counts as taken; released immediately so the
            // caller can use the port (inherent race with other processes)
            if TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok() {
                let reservation = PortReservation {
                    range: (min, max),
                    port,
                    holder: holder.to_string(),
                };
                tracing::debug!(
                    "Allocated port {} in {}-{} for {}",
                    port,
                    min,
                    max,
                    holder
                );
                return Ok(reservation);
            }
        }

        Err(OrodcError::NoFreePort { min, max })
    }
}

/// Collect ports published by compose services in an overlay file,
/// skipping `skip_service` so a service can re-resolve its own port.
/// Both short (`"8080:80"`, `"127.0.0.1:8080:80"`) and long
/// (`published: 8080`) syntax are handled; unparsable entries are ignored.
pub fn published_ports(overlay: &Path, skip_service: Option<&str>) -> Result<Vec<u16>> {
    let content = std::fs::read_to_string(overlay)?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&content)?;
    let mut ports = Vec::new();

    let Some(services) = doc.get("services").and_then(|s| s.as_mapping()) else {
        return Ok(ports);
    };

    let short_syntax = Regex::new(r"^(?:[^:]+:)?(\d+):\d+").unwrap();

    for (name, service) in services {
        if let (Some(skip), Some(name)) = (skip_service, name.as_str()) {
            if name == skip {
                continue;
            }
        }
        let Some(entries) = service.get("ports").and_then(|p| p.as_sequence()) else {
            continue;
        };
        for entry in entries {
            match entry {
                serde_yaml::Value::String(s) => {
                    if let Some(caps) = short_syntax.captures(s) {
                        if let Ok(port) = caps[1].parse() {
                            ports.push(port);
                        }
                    }
                }
                serde_yaml::Value::Mapping(_) => {
                    if let Some(published) = entry.get("published") {
                        let parsed = match published {
                            serde_yaml::Value::Number(n) => {
                                n.as_u64().and_then(|n| u16::try_from(n).ok())
                            }
                            serde_yaml::Value::String(s) => s.parse().ok(),
                            _ => None,
                        };
                        if let Some(port) = parsed {
                            ports.push(port);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Ok(ports)
}
