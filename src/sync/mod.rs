//! File synchronization between host and container
//!
//! Wraps a mutagen-style sync daemon: session lifecycle (start, pause,
//! resume, stop) and status reporting. The daemon outlives the CLI
//! process; the adapter only tracks session identifiers.

pub mod engine;
pub mod manager;
pub mod session;

pub use engine::{EngineSession, MutagenEngine, SyncEngine};
pub use manager::SyncManager;
pub use session::{SyncSession, SyncState};
