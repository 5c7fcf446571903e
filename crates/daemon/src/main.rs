//! Realmgate Daemon
//!
//! Loads the backend, portal and authenticator configuration and serves the
//! authenticator endpoints over HTTP.

use anyhow::Context;
use clap::Parser;
use realmgate_web::WebServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod app;
mod config;

use app::App;
use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "realmgate")]
#[command(about = "Realmgate - realm-scoped authentication backends and portals")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "REALMGATE_CONFIG", default_value = "/etc/realmgate/config.toml")]
    config: PathBuf,

    /// HTTP listen address (overrides the configuration file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    init: bool,

    /// Apply the configuration, print the serving backends and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    info!("Realmgate v{}", realmgate_common::VERSION);

    if cli.init {
        if cli.config.exists() {
            anyhow::bail!("{} already exists", cli.config.display());
        }
        DaemonConfig::default().save(&cli.config)?;
        info!("Wrote default configuration to {}", cli.config.display());
        return Ok(());
    }

    let mut config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen))?;

    let app = App::build(&config);
    for e in &app.errors {
        error!("configuration error: {}", e);
    }

    if cli.check {
        println!("{}", app.describe());
        if !app.errors.is_empty() {
            anyhow::bail!("{} configuration error(s)", app.errors.len());
        }
        return Ok(());
    }

    WebServer::new(app.realms, app.portals)
        .with_endpoints(app.endpoints)
        .serve(addr)
        .await?;

    info!("Realmgate shutdown complete");
    Ok(())
}
