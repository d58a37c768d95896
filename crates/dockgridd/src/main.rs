//! dockgridd: the DockGrid daemon.
//!
//! Single binary that assembles all DockGrid subsystems:
//! - State store (redb)
//! - Runtime client (Docker Engine)
//! - Reconciliation controller
//! - REST API
//!
//! # Usage
//!
//! ```text
//! dockgridd serve --port 8080 --data-dir /var/lib/dockgrid --interval 10s
//! dockgridd check-config --config /etc/dockgrid/dockgrid.toml
//! ```

mod cli;
mod serve;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LogFormat};
use crate::settings::Settings;

const DEFAULT_LOG_FILTER: &str = "info,dockgridd=debug,dockgrid=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve(args) => {
            let settings = Settings::resolve(&args)?;
            serve::run(settings).await
        }
        Command::CheckConfig(args) => {
            let settings = Settings::resolve(&args)?;
            print!("{}", settings.to_daemon_config().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
