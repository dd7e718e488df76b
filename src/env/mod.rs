//! Layered environment configuration and resolution
//!
//! Config is read from three sources: the installed share directory
//! (base), the project directory (project config plus dotenv files), and
//! explicit overrides from the command line. The resolver merges them
//! into one immutable [`EnvironmentDescriptor`].

pub mod config;
pub mod resolver;

pub use config::{ConfigFile, ConfigLayers, ConfigLoader};
pub use resolver::{resolve, EnvironmentDescriptor, EnvironmentMode, Overrides};
