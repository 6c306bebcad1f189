//! # relay
//!
//! Realtime relay binary: `serve` runs the broadcast hub, `listen` connects
//! a client and prints every envelope it receives.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_client::{ClientConfig, RealtimeClient};
use relay_server::metrics;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;
use serde_json::Value;

/// Realtime event relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Realtime event relay")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket hub.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect to a hub and print received envelopes as JSON lines.
    Listen {
        /// Event types to subscribe to.
        topics: Vec<String>,

        /// Server URL (overrides settings).
        #[arg(long)]
        url: Option<String>,

        /// Identity to authenticate as.
        #[arg(long)]
        user: Option<String>,
    },
}

fn load(path: Option<&PathBuf>) -> Result<RelaySettings> {
    match path {
        Some(p) => relay_settings::load_settings_from_path(p)
            .with_context(|| format!("failed to load settings from {}", p.display())),
        None => relay_settings::load_settings().context("failed to load settings"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(cli.settings.as_ref())?;
    relay_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    match cli.command {
        Command::Serve { host, port } => serve(&settings, host, port).await,
        Command::Listen { topics, url, user } => listen(&settings, topics, url, user).await,
    }
}

async fn serve(settings: &RelaySettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let metrics_handle = match metrics::install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics will be empty");
            metrics::detached_handle()
        }
    };

    let server = RelayServer::new(config, metrics_handle);
    let (addr, handle) = server
        .listen()
        .await
        .context("failed to bind relay server")?;
    tracing::info!(%addr, "relay ready");

    let shutdown = server.shutdown().clone();
    shutdown.shutdown_on_ctrl_c().await;
    shutdown.graceful_shutdown(vec![handle], None).await;
    tracing::info!("relay stopped");
    Ok(())
}

async fn listen(
    settings: &RelaySettings,
    topics: Vec<String>,
    url: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let mut config = ClientConfig::from(&settings.client);
    if let Some(url) = url {
        config.url = url;
    }

    let client = RealtimeClient::new(config);
    let _printer = client.on("*", |envelope: &Value| println!("{envelope}"));
    client.set_user_id(user);
    for topic in topics {
        let _ = client.subscribe_to_topic(&topic);
    }
    client.connect();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    client.disconnect();
    Ok(())
}
