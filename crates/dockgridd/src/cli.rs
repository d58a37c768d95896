//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "dockgridd", about = "DockGrid daemon")]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the controller and the API server.
    Serve(ServeArgs),
    /// Resolve the configuration, print it as TOML, and exit.
    CheckConfig(ServeArgs),
}

/// Settings shared by `serve` and `check-config`. Unset flags fall back to
/// the config file, then to built-in defaults.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port to listen on [default: 8080].
    #[arg(long)]
    pub port: Option<u16>,

    /// Data directory for persistent state [default: /var/lib/dockgrid].
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Controller tick interval, e.g. "10s" or "1m30s" [default: 10s].
    #[arg(long, env = "DOCKGRID_CONTROLLER_INTERVAL")]
    pub interval: Option<String>,

    /// Failing observations in a row before a container is recreated.
    /// Self-healing is off when unset.
    #[arg(long, env = "DOCKGRID_UNHEALTHY_THRESHOLD")]
    pub unhealthy_threshold: Option<u32>,

    /// Path to a dockgrid.toml file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
