//! Compose lifecycle orchestration
//!
//! Verbs are translated into `docker compose` invocations scoped to the
//! resolved environment; the container runtime itself is an external
//! collaborator.

pub mod command;
pub mod lifecycle;

pub use command::{invocation, ComposeInvocation};
pub use lifecycle::{ComposeLifecycle, ComposeVerb};
