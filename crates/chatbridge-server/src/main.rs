//! # chatbridge-server
//!
//! Chat bridge backend.
//!
//! This binary provides:
//! - **Event ingestion**: decoded transport events are normalized, stored in
//!   SQLite and forwarded to a webhook when eligible
//! - **History backfill** for conversations delivered in bulk
//! - **Media cache** downloading attachments on first request
//! - **REST API** (axum) for listing chats and messages, fetching media and
//!   sending messages
//!
//! Without a paired session the bridge runs on the offline transport: stored
//! data and ingested events are served, sends and downloads are refused.

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chatbridge_gateway::EventGateway;
use chatbridge_net::OfflineTransport;
use chatbridge_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,chatbridge_server=debug,chatbridge_gateway=debug")
        }))
        .init();

    info!("Starting chat bridge v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.allow_list.is_empty() {
        info!("No sender allow-list configured, admitting all senders");
    }

    // -----------------------------------------------------------------------
    // 3. Open the store and build the gateway
    // -----------------------------------------------------------------------
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::create_dir_all(&config.media_root).await?;

    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Opened message store");

    let gateway = EventGateway::new(config.gateway_config(), db, Arc::new(OfflineTransport));
    let app_state = AppState {
        gateway: Arc::new(gateway),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server until shutdown
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
