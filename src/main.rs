//! coachgate: admin request-governance gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                        COACHGATE                         │
//!                    │                                                          │
//!  Client Request    │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────┐ │
//!  ──────────────────┼─▶│   rate   │──▶│  token   │──▶│ identity │──▶│ screen │ │
//!                    │  │  limit   │   │  verify  │   │ authorize│   │        │ │
//!                    │  └──────────┘   └──────────┘   └────┬─────┘   └───┬────┘ │
//!                    │                                     │ IdentityStore│      │
//!                    │                                     ▼              ▼      │
//!  Client Response   │                             ┌──────────────────────────┐ │
//!  ◀─────────────────┼─────────────────────────────│ audit hook ◀── handler   │ │
//!                    │                             └───────────┬──────────────┘ │
//!                    │                                         │ after send     │
//!                    │                                         ▼                │
//!                    │                                     AuditStore           │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use coachgate::config::{load_config, parse_config, watcher::ConfigWatcher};
use coachgate::lifecycle::{shutdown_signal, Shutdown};
use coachgate::observability::{logging, metrics};
use coachgate::store::{AuditStore, JsonlAuditStore, MemoryAuditStore, MemoryIdentityStore};
use coachgate::HttpServer;

#[derive(Parser)]
#[command(name = "coachgate")]
#[command(about = "Admin request-governance gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "COACHGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Without a file, defaults apply and the secret must come from the
    // environment; validation refuses to start otherwise.
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => parse_config("")?,
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "coachgate starting");
    if args.config.is_none() {
        tracing::warn!("No configuration file given, running with defaults and the bootstrap identity disabled");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let identity_store = Arc::new(MemoryIdentityStore::from_seed(&config.admins));
    let audit_store: Arc<dyn AuditStore> = match &config.audit.log_path {
        Some(path) => {
            tracing::info!(path = %path, "Audit entries go to JSON-lines file");
            Arc::new(JsonlAuditStore::new(path))
        }
        None => Arc::new(MemoryAuditStore::new()),
    };

    let server = HttpServer::new(&config, identity_store, audit_store)?;

    // Keep the watcher alive for the life of the server.
    let (updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(updates), Some(handle)),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start, hot reload disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on(shutdown_signal());
    server.run(listener, updates, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
