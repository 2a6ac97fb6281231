//! Records persisted in the local message database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatbridge_shared::{Jid, MediaKind, MediaReference};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation, individual or group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub key: Jid,
    /// Display name; may be empty until a name source is seen.
    pub name: String,
    pub last_message_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A normalized message row.  Identity is `(id, chat)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub chat: Jid,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media_kind: Option<MediaKind>,
    pub filename: String,
    #[serde(skip)]
    pub media: MediaReference,
    pub quoted_preview: String,
}

impl StoredMessage {
    /// Rows with neither text nor media are never written.
    pub fn is_storable(&self) -> bool {
        !self.content.is_empty() || self.media_kind.is_some()
    }
}

/// Media columns of a single row, as needed by the media cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub kind: Option<MediaKind>,
    pub filename: String,
    pub reference: MediaReference,
}
