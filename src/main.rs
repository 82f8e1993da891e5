//! node-relay
//!
//! ```text
//!     Client ──▶ node A ──(nodeId=B)──▶ node B ──▶ local routes
//!                  │
//!                  └──(no nodeId / own id)──▶ local routes
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use node_relay::config::{load_config, watcher::ConfigWatcher, RelayNodeConfig};
use node_relay::directory::StaticDirectory;
use node_relay::http::HttpServer;
use node_relay::lifecycle::{wait_for_signal, Shutdown};
use node_relay::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "node-relay", version, about = "Node-addressed HTTP/WebSocket relay")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayNodeConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }

    logging::init_logging(&config.observability);
    tracing::info!("node-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        nodes = config.directory.nodes.len(),
        request_timeout_secs = config.relay.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let directory = Arc::new(StaticDirectory::from_nodes(&config.directory.nodes));
    let shutdown = Shutdown::new();

    // Reloaded configs refresh the directory here before reaching the server.
    let (server_tx, server_rx) = mpsc::unbounded_channel();
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let directory = Arc::clone(&directory);
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => {
                            let Some(update) = update else { break };
                            directory.replace(&update.directory.nodes);
                            tracing::info!(nodes = directory.len(), "Node directory reloaded");
                            if server_tx.send(update).is_err() {
                                break;
                            }
                        }
                        _ = stop.recv() => break,
                    }
                }
            });
            tracing::info!(path = ?path, "Watching configuration file");
            Some(watcher)
        }
        _ => {
            drop(server_tx);
            None
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, directory);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, server_rx, server_shutdown));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
