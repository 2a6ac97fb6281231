//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the bridge starts with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chatbridge_gateway::GatewayConfig;
use chatbridge_shared::constants::{DEFAULT_HTTP_PORT, QUERY_TIMEOUT_SECS};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`, or `PORT` for the port alone
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file holding chats and messages.
    /// Env: `DATABASE_PATH`
    /// Default: `store/messages.db`
    pub database_path: PathBuf,

    /// Root of the per-chat media folders.
    /// Env: `MEDIA_ROOT`
    /// Default: `store`
    pub media_root: PathBuf,

    /// Endpoint receiving eligible inbound events.
    /// Env: `WEBHOOK_URL`
    /// Default: unset
    pub webhook_url: Option<String>,

    /// Sender user ids admitted; empty admits everyone.
    /// Env: `WHATSAPP_WHITELIST` (comma-separated)
    pub allow_list: Vec<String>,

    /// Env: `QUERY_TIMEOUT_SECS`
    /// Default: 30
    pub query_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("store/messages.db"),
            media_root: PathBuf::from("store"),
            webhook_url: None,
            allow_list: Vec::new(),
            query_timeout: Duration::from_secs(QUERY_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.http_addr.set_port(port),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, using default"),
            }
        }

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = var("MEDIA_ROOT").filter(|p| !p.is_empty()) {
            config.media_root = PathBuf::from(path);
        }

        config.webhook_url = var("WEBHOOK_URL").filter(|u| !u.trim().is_empty());

        if let Some(list) = var("WHATSAPP_WHITELIST") {
            config.allow_list = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(val) = var("QUERY_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.query_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid QUERY_TIMEOUT_SECS, using default"),
            }
        }

        config
    }

    /// The subset handed to the event gateway.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            allow_list: self.allow_list.clone(),
            webhook_url: self.webhook_url.clone(),
            media_root: self.media_root.clone(),
            query_timeout: self.query_timeout,
        }
    }
}
