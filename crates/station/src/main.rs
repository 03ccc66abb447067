//! CentralStation hub binary.
//!
//! Loads layered configuration, assembles the hub, and serves the
//! WebSocket endpoint until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use station_core::logging::init_logging;
use station_server::{StationConfig, StationHub, websocket};

#[derive(Debug, Parser)]
#[command(name = "station", about = "Real-time pub/sub and state hub")]
struct Args {
    /// Path to a JSON config file (deep-merged over compiled defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port (overrides config and STATION_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (overrides config).
    #[arg(long)]
    bind: Option<String>,

    /// Directory modules are served from (overrides config).
    #[arg(long)]
    modules_dir: Option<PathBuf>,

    /// Directory the JSON store writes into (overrides config).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Restrict the state store to this entity; repeatable. With no
    /// restriction every entity is served.
    #[arg(long = "entity")]
    entities: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info");
    let args = Args::parse();

    let mut config =
        StationConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = args.modules_dir {
        config.modules.dir = dir;
    }
    if let Some(dir) = args.data_dir {
        config.data.dir = dir;
    }
    config.data.entities.extend(args.entities);

    let hub = StationHub::from_config(&config)
        .await
        .context("failed to assemble hub")?;

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tokio::select! {
        result = websocket::serve(listener, hub) => {
            result.context("server stopped unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
