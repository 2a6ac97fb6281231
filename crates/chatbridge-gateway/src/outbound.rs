//! Outbound send: text or a local media file.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use chatbridge_media::analyze_ogg_opus;
use chatbridge_net::{ContactDirectory, MediaUploader, MessageSender};
use chatbridge_shared::{Jid, MediaKind, MessageEvent, MessageInfo, MessagePayload};

use crate::error::{GatewayError, Result};
use crate::gateway::EventGateway;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Full JID or bare phone number
    pub recipient: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub media_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub id: String,
    pub recipient: Jid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// `None` for plain text
    pub kind: Option<MediaKind>,
}

impl EventGateway {
    /// Send a message and store it as a self-originated event.
    pub async fn send(&self, request: &SendRequest) -> Result<SendOutcome> {
        let recipient = request.recipient.trim();
        if recipient.is_empty() {
            return Err(GatewayError::InvalidRequest("recipient is required".into()));
        }
        let media_path = request
            .media_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty());
        if request.message.is_empty() && media_path.is_none() {
            return Err(GatewayError::InvalidRequest(
                "message or media_path is required".into(),
            ));
        }

        let to = Jid::from_recipient(recipient);
        let payload = match media_path {
            Some(path) => self.media_payload(path, &request.message).await?,
            None => MessagePayload::text(request.message.clone()),
        };
        let kind = payload.media_kind();

        let receipt = self.transport.send_message(&to, payload.clone()).await?;
        info!(to = %to, id = %receipt.id, kind = ?kind, "message sent");

        let event = MessageEvent {
            info: MessageInfo {
                id: receipt.id.clone(),
                chat: to.clone(),
                sender: self.transport.own_jid().unwrap_or_else(|| Jid::new("")),
                is_from_me: true,
                is_group: to.is_group(),
                timestamp: receipt.timestamp,
                push_name: None,
            },
            message: payload,
        };
        if let Err(e) = self.handle_message(&event).await {
            warn!(id = %receipt.id, error = %e, "failed to store sent message");
        }

        Ok(SendOutcome {
            id: receipt.id,
            recipient: to,
            timestamp: receipt.timestamp,
            kind,
        })
    }

    async fn media_payload(&self, path: &Path, caption: &str) -> Result<MessagePayload> {
        let data = Bytes::from(tokio::fs::read(path).await?);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let (kind, mimetype) = MediaKind::from_extension(ext);

        // analysed before upload so a bad voice note never leaves the host
        let analysis = match kind {
            MediaKind::Audio => Some(analyze_ogg_opus(&data)?),
            _ => None,
        };

        let uploaded = self.transport.upload(data, kind).await?;
        debug!(kind = %kind, bytes = uploaded.file_length, "media uploaded");
        let media = uploaded.into_attachment(mimetype);
        let caption = Some(caption.to_string()).filter(|c| !c.is_empty());

        Ok(match (kind, analysis) {
            (MediaKind::Image, _) => MessagePayload::Image { caption, media },
            (MediaKind::Video, _) => MessagePayload::Video { caption, media },
            (MediaKind::Audio, analysis) => MessagePayload::Audio {
                media,
                seconds: analysis.as_ref().map(|a| a.duration_secs),
                waveform: analysis.map(|a| a.waveform),
                ptt: true,
            },
            (MediaKind::Document, _) => {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string);
                MessagePayload::Document {
                    caption,
                    file_name: name.clone(),
                    title: name,
                    media,
                }
            }
        })
    }
}
