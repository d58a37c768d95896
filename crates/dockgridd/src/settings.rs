//! Effective daemon settings: CLI and environment over config file over
//! defaults.

use std::path::PathBuf;

use anyhow::Context;

use dockgrid_controller::ReconcilerConfig;
use dockgrid_core::config::{ControllerConfig, ServerConfig, StoreConfig};
use dockgrid_core::DaemonConfig;

use crate::cli::ServeArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Interval as given, kept for display.
    pub interval: String,
    pub controller: ReconcilerConfig,
}

impl Settings {
    /// Load the optional config file and layer the CLI on top.
    /// An invalid interval is an error.
    pub fn resolve(args: &ServeArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("reading config file {}", path.display()))?,
            None => DaemonConfig::default(),
        };
        Self::merge(args, &file)
    }

    fn merge(args: &ServeArgs, file: &DaemonConfig) -> anyhow::Result<Self> {
        let interval = args
            .interval
            .clone()
            .unwrap_or_else(|| file.interval().to_string());
        let unhealthy_threshold = args
            .unhealthy_threshold
            .or(file.controller.unhealthy_threshold);
        let controller = ReconcilerConfig::parse(&interval, unhealthy_threshold)
            .with_context(|| format!("invalid controller interval {interval:?}"))?;

        Ok(Self {
            port: args.port.unwrap_or_else(|| file.port()),
            data_dir: args.data_dir.clone().unwrap_or_else(|| file.data_dir()),
            interval,
            controller,
        })
    }

    /// The settings expressed as a complete config file.
    pub fn to_daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            controller: ControllerConfig {
                interval: Some(self.interval.clone()),
                unhealthy_threshold: self.controller.unhealthy_threshold,
            },
            server: ServerConfig {
                port: Some(self.port),
            },
            store: StoreConfig {
                data_dir: Some(self.data_dir.clone()),
            },
        }
    }
}
