use std::path::PathBuf;
use std::time::Duration;

use chatbridge_shared::constants::QUERY_TIMEOUT_SECS;

/// Settings the event gateway needs; loaded by the binary.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Sender user ids admitted when non-empty
    pub allow_list: Vec<String>,
    pub webhook_url: Option<String>,
    /// Root of the per-chat media folders
    pub media_root: PathBuf,
    pub query_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allow_list: Vec::new(),
            webhook_url: None,
            media_root: PathBuf::from("store"),
            query_timeout: Duration::from_secs(QUERY_TIMEOUT_SECS),
        }
    }
}
