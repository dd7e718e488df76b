//! OroDC - Docker Compose development environment orchestrator
//!
//! OroDC manages docker-compose based OroPlatform environments. It
//! provides:
//!
//! - Compose lifecycle verbs (up, down, restart, rebuild, logs, exec)
//! - Layered environment configuration (base, project, command line)
//! - Host/container file synchronization via a mutagen-style daemon
//! - Free TCP port discovery for exposing services
//! - Shell access and environment diagnostics
//!
//! The container runtime and the sync daemon are external collaborators;
//! OroDC talks to them over argument vectors, stdout and exit codes only.

pub mod compose;
pub mod diag;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod port;
pub mod process;
pub mod sync;

pub use error::{OrodcError, Result};
