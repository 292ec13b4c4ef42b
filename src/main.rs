//! Admin UI server
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                   ADMIN UI SERVER                    │
//!                  │                                                      │
//!  Browser ───────▶│  http::server ──▶ entry ─┬─▶ http::dispatch          │
//!                  │  (trace, request id,     │     └─▶ module routers    │
//!                  │   timeout)               │         api ─▶ proxy ─────┼──▶ Backend
//!                  │                          │         client, config    │    admin API
//!                  │                          │                           │
//!                  │                          └─▶ http::websocket         │
//!                  │                                └─▶ pre-upgrade       │
//!                  │                                    └─▶ relay ────────┼──▶ Backend
//!                  │                                                      │    socket
//!                  │  ┌────────────────────────────────────────────────┐  │
//!                  │  │ config (live reload) · security (gate)          │  │
//!                  │  │ observability · lifecycle                       │  │
//!                  │  └────────────────────────────────────────────────┘  │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use admin_ui_server::config::watcher::ConfigWatcher;
use admin_ui_server::lifecycle::{load_initial_config, wait_for_signal};
use admin_ui_server::net::tls::load_listener_tls;
use admin_ui_server::observability::{logging, metrics};
use admin_ui_server::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "admin-ui-server", version, about = "Admin UI backend-for-frontend")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_initial_config(cli.config.as_deref())?;
    logging::init_logging(&config.logging.level)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "admin-ui-server starting");
    tracing::info!(
        bind_address = %config.bind_address(),
        backend = %format!("{}:{}", config.proxy.hostname, config.proxy.port),
        enabled_modules = ?config.modules.enabled().collect::<Vec<_>>(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server for updates to keep flowing.
    let (_watcher, updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let tls = if config.client.transport.is_enabled() {
        Some(load_listener_tls(&config.client.transport).await?)
    } else {
        None
    };
    let bind_address = config.bind_address();
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let serve = async {
        match tls {
            Some(tls) => {
                let addr: SocketAddr = tokio::net::lookup_host(&bind_address)
                    .await?
                    .next()
                    .ok_or_else(|| std::io::Error::other(format!("cannot resolve {bind_address}")))?;
                server.run_tls(addr, tls, updates, &shutdown).await?;
            }
            None => {
                let listener = TcpListener::bind(&bind_address).await?;
                tracing::info!(address = %listener.local_addr()?, "Listening for connections");
                server.run(listener, updates, &shutdown).await?;
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    };
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => result?,
        _ = wait_for_signal() => {
            shutdown.trigger();
            serve.await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
