//! dockgrid-core: shared types for DockGrid.
//!
//! The normalized project and service definitions live here, since every
//! other crate passes them around. The `dockgrid.toml` schema and its
//! duration syntax are here as well.

pub mod config;
pub mod duration;
pub mod error;
pub mod types;

pub use config::DaemonConfig;
pub use duration::{parse_duration, parse_interval};
pub use error::CoreError;
pub use types::*;
