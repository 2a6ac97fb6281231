//! Event gateway: turns decoded transport events into stored rows and
//! webhook notifications.

pub mod access;
pub mod classify;
pub mod config;
mod error;
pub mod gateway;
pub mod history;
pub mod names;
pub mod normalize;
pub mod outbound;
pub mod webhook;

pub use access::SenderFilter;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{EventGateway, Outcome, Processed};
pub use names::{ChatNameSource, ChatNamer};
pub use normalize::{normalize, ExtractedMedia, NormalizedContent};
pub use outbound::{SendOutcome, SendRequest};
pub use webhook::{WebhookNotifier, WebhookPayload};
