//! Seams to the secure messaging transport.
//!
//! The transport owns the session, encryption and wire framing.  The bridge
//! only sees the narrow capabilities below: send a raw query node, fetch or
//! upload an attachment, send a built message, and look up names.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatbridge_shared::protocol::MediaAttachment;
use chatbridge_shared::{Jid, MediaKind, MediaReference, MessagePayload, Node, TransportError};

/// Result of a successful attachment upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedMedia {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

impl UploadedMedia {
    /// Attachment descriptor to embed in an outbound payload.
    pub fn into_attachment(self, mimetype: &str) -> MediaAttachment {
        MediaAttachment {
            url: self.url,
            direct_path: Some(self.direct_path),
            mimetype: Some(mimetype.to_string()),
            media_key: self.media_key,
            file_sha256: self.file_sha256,
            file_enc_sha256: self.file_enc_sha256,
            file_length: self.file_length,
        }
    }
}

/// Server acknowledgement of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Group metadata as known to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub jid: Option<Jid>,
    pub name: String,
}

/// Address-book entry as known to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub full_name: Option<String>,
    pub push_name: Option<String>,
}

/// One-way primitive for raw query nodes.
#[async_trait]
pub trait NodeSender: Send + Sync {
    async fn send_node(&self, node: Node) -> Result<(), TransportError>;
}

/// Downloads and verifies an encrypted attachment.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Returns the verified plaintext, or a verification/transport error.
    async fn download(&self, media: &MediaReference, kind: MediaKind)
        -> Result<Bytes, TransportError>;
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, data: Bytes, kind: MediaKind) -> Result<UploadedMedia, TransportError>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(
        &self,
        to: &Jid,
        payload: MessagePayload,
    ) -> Result<SendReceipt, TransportError>;
}

/// Name lookups.  Every method defaults to "unknown".
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn group_info(&self, _jid: &Jid) -> Option<GroupInfo> {
        None
    }

    async fn contact_info(&self, _jid: &Jid) -> Option<ContactInfo> {
        None
    }

    /// The paired account, once known.
    fn own_jid(&self) -> Option<Jid> {
        None
    }
}

/// Everything the gateway needs from a live session.
pub trait Transport:
    NodeSender + MediaFetcher + MediaUploader + MessageSender + ContactDirectory
{
}

impl<T> Transport for T where
    T: NodeSender + MediaFetcher + MediaUploader + MessageSender + ContactDirectory
{
}

/// Transport used when no session is paired: every network operation fails
/// with [`TransportError::Disconnected`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

#[async_trait]
impl NodeSender for OfflineTransport {
    async fn send_node(&self, _node: Node) -> Result<(), TransportError> {
        Err(TransportError::Disconnected)
    }
}

#[async_trait]
impl MediaFetcher for OfflineTransport {
    async fn download(
        &self,
        _media: &MediaReference,
        _kind: MediaKind,
    ) -> Result<Bytes, TransportError> {
        Err(TransportError::Disconnected)
    }
}

#[async_trait]
impl MediaUploader for OfflineTransport {
    async fn upload(&self, _data: Bytes, _kind: MediaKind) -> Result<UploadedMedia, TransportError> {
        Err(TransportError::Disconnected)
    }
}

#[async_trait]
impl MessageSender for OfflineTransport {
    async fn send_message(
        &self,
        _to: &Jid,
        _payload: MessagePayload,
    ) -> Result<SendReceipt, TransportError> {
        Err(TransportError::Disconnected)
    }
}

impl ContactDirectory for OfflineTransport {}
