//! Flatten a [`MessagePayload`] into the columns the store keeps.
//!
//! Everything here is a pure function of the payload and the event
//! timestamp.

use chrono::{DateTime, Utc};

use chatbridge_shared::constants::{DELETED_MARKER, EDITED_PREFIX, GENERIC_QUOTE_PLACEHOLDER};
use chatbridge_shared::protocol::{MediaAttachment, ProtocolAction};
use chatbridge_shared::{MediaKind, MediaReference, MessagePayload};

/// Displayable parts of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContent {
    pub text: String,
    pub quoted_preview: String,
    pub media: Option<ExtractedMedia>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMedia {
    pub kind: MediaKind,
    pub filename: String,
    pub reference: MediaReference,
}

pub fn normalize(payload: &MessagePayload, timestamp: DateTime<Utc>) -> NormalizedContent {
    NormalizedContent {
        text: extract_text(payload),
        quoted_preview: extract_quote(payload),
        media: extract_media(payload, timestamp),
    }
}

/// Body text, caption, or the rendered form of an edit/revoke.
pub fn extract_text(payload: &MessagePayload) -> String {
    match payload {
        MessagePayload::Protocol { action, .. } => match action {
            ProtocolAction::Edit { edited } => match edited.as_ref() {
                MessagePayload::Conversation { text } if !text.is_empty() => {
                    format!("{EDITED_PREFIX}{text}")
                }
                MessagePayload::ExtendedText { text, .. } => format!("{EDITED_PREFIX}{text}"),
                _ => String::new(),
            },
            ProtocolAction::Revoke => DELETED_MARKER.to_string(),
            ProtocolAction::Other => String::new(),
        },
        other => plain_text(other).unwrap_or_default(),
    }
}

/// Conversation text, then extended text, then a caption.
fn plain_text(payload: &MessagePayload) -> Option<String> {
    let text = match payload {
        MessagePayload::Conversation { text } => text,
        MessagePayload::ExtendedText { text, .. } => text,
        MessagePayload::Image { caption, .. }
        | MessagePayload::Video { caption, .. }
        | MessagePayload::Document { caption, .. } => caption.as_ref()?,
        _ => return None,
    };
    Some(text.clone()).filter(|t| !t.is_empty())
}

/// Preview of the message being replied to, or `""` when not a reply.
pub fn extract_quote(payload: &MessagePayload) -> String {
    let MessagePayload::ExtendedText {
        quoted: Some(quoted),
        ..
    } = payload
    else {
        return String::new();
    };

    if let Some(text) = plain_text(quoted) {
        return text;
    }

    let placeholder = match quoted.as_ref() {
        MessagePayload::Image { .. } => "[Image]",
        MessagePayload::Video { .. } => "[Video]",
        MessagePayload::Audio { .. } => "[Audio]",
        MessagePayload::Document { .. } => "[Document]",
        MessagePayload::Sticker { .. } => "[Sticker]",
        MessagePayload::Contact { .. } => "[Contact]",
        MessagePayload::Location { .. } => "[Location]",
        _ => GENERIC_QUOTE_PLACEHOLDER,
    };
    placeholder.to_string()
}

/// Attachment descriptor with a stable filename.
///
/// Payloads without their own name get `<kind>_<YYYYMMDD_HHMMSS>[.ext]`
/// from the event timestamp.
pub fn extract_media(payload: &MessagePayload, timestamp: DateTime<Utc>) -> Option<ExtractedMedia> {
    let (kind, media, own_name) = match payload {
        MessagePayload::Image { media, .. } => (MediaKind::Image, media, None),
        MessagePayload::Video { media, .. } => (MediaKind::Video, media, None),
        MessagePayload::Audio { media, .. } => (MediaKind::Audio, media, None),
        MessagePayload::Document {
            media, file_name, ..
        } => (
            MediaKind::Document,
            media,
            file_name.as_deref().filter(|n| !n.is_empty()),
        ),
        _ => return None,
    };

    let filename = match own_name {
        Some(name) => name.to_string(),
        None => generated_filename(kind, timestamp),
    };

    Some(ExtractedMedia {
        kind,
        filename,
        reference: reference_of(media),
    })
}

fn generated_filename(kind: MediaKind, timestamp: DateTime<Utc>) -> String {
    let stamp = timestamp.format("%Y%m%d_%H%M%S");
    match kind.default_extension() {
        Some(ext) => format!("{}_{stamp}.{ext}", kind.file_prefix()),
        None => format!("{}_{stamp}", kind.file_prefix()),
    }
}

fn reference_of(media: &MediaAttachment) -> MediaReference {
    MediaReference {
        locator: media.url.clone(),
        media_key: media.media_key.clone(),
        digest_plain: media.file_sha256.clone(),
        digest_enc: media.file_enc_sha256.clone(),
        length: media.file_length,
    }
}
