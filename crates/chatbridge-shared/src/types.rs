use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{GROUP_SERVER, LIMITED_SERVER_SUFFIX, USER_SERVER};

// Chat / user identity = "<user>@<server>", optionally with ":<device>" on the user part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Jid(pub String);

impl Jid {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build a personal-chat JID from a bare phone number.
    pub fn user_jid(user: &str) -> Self {
        Self(format!("{user}@{USER_SERVER}"))
    }

    /// Parse a recipient given either as a full JID or as a bare number.
    pub fn from_recipient(recipient: &str) -> Self {
        if recipient.contains('@') {
            Self(recipient.to_string())
        } else {
            Self::user_jid(recipient)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`, with any device suffix stripped.
    pub fn user(&self) -> &str {
        let user = self.0.split('@').next().unwrap_or("");
        user.split(':').next().unwrap_or(user)
    }

    pub fn server(&self) -> &str {
        self.0.split_once('@').map(|(_, s)| s).unwrap_or("")
    }

    pub fn is_group(&self) -> bool {
        self.server() == GROUP_SERVER
    }

    /// Limited / anonymous identities are never forwarded to the webhook.
    pub fn is_limited(&self) -> bool {
        self.0.ends_with(LIMITED_SERVER_SUFFIX)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Directory-safe form used for the per-chat media folder.
    pub fn to_dir_name(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of binary attachment carried by a message.  "No media" is `None`
/// wherever a `MediaKind` is optional.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    /// Filename prefix used when the payload carries no name of its own.
    pub fn file_prefix(&self) -> &'static str {
        self.as_str()
    }

    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("jpg"),
            Self::Video => Some("mp4"),
            Self::Audio => Some("ogg"),
            Self::Document => None,
        }
    }

    /// Infer kind and MIME type from a file extension (outbound media).
    pub fn from_extension(ext: &str) -> (Self, &'static str) {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => (Self::Image, "image/jpeg"),
            "png" => (Self::Image, "image/png"),
            "gif" => (Self::Image, "image/gif"),
            "webp" => (Self::Image, "image/webp"),
            "ogg" => (Self::Audio, "audio/ogg; codecs=opus"),
            "mp4" => (Self::Video, "video/mp4"),
            "avi" => (Self::Video, "video/avi"),
            "mov" => (Self::Video, "video/quicktime"),
            _ => (Self::Document, "application/octet-stream"),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown media kind: {0}")]
pub struct UnknownMediaKind(pub String);

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            other => Err(UnknownMediaKind(other.to_string())),
        }
    }
}

/// The subset of a stored message needed to fetch and verify an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub locator: String,
    pub media_key: Vec<u8>,
    pub digest_plain: Vec<u8>,
    pub digest_enc: Vec<u8>,
    pub length: u64,
}

impl MediaReference {
    /// A fetch may only proceed when every field is present and non-zero.
    pub fn is_complete(&self) -> bool {
        !self.locator.is_empty()
            && !self.media_key.is_empty()
            && !self.digest_plain.is_empty()
            && !self.digest_enc.is_empty()
            && self.length > 0
    }

    /// Server-relative path of the encrypted blob, derived from the locator.
    ///
    /// `https://mmg.whatsapp.net/v/t62/abc.enc?ccb=11` -> `/v/t62/abc.enc`
    pub fn direct_path(&self) -> String {
        match self.locator.split_once(".net/") {
            Some((_, rest)) => {
                let path = rest.split('?').next().unwrap_or(rest);
                format!("/{path}")
            }
            None => self.locator.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jid_parts() {
        let jid = Jid::new("4915123:12@s.whatsapp.net");
        assert_eq!(jid.user(), "4915123");
        assert_eq!(jid.server(), "s.whatsapp.net");
        assert!(!jid.is_group());
        assert_eq!(jid.to_dir_name(), "4915123_12@s.whatsapp.net");

        assert!(Jid::new("1203630@g.us").is_group());
        assert!(Jid::new("99887766@lid").is_limited());
    }

    #[test]
    fn recipient_without_server_becomes_user_jid() {
        assert_eq!(Jid::from_recipient("4915123").as_str(), "4915123@s.whatsapp.net");
        assert_eq!(Jid::from_recipient("1203630@g.us").as_str(), "1203630@g.us");
    }

    #[test]
    fn media_kind_parse() {
        assert_eq!("audio".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        let err = "sticker".parse::<MediaKind>().unwrap_err();
        assert_eq!(err, UnknownMediaKind("sticker".into()));
        assert_eq!(err.to_string(), "unknown media kind: sticker");
        assert_eq!(MediaKind::from_extension("JPG").0, MediaKind::Image);
        assert_eq!(MediaKind::from_extension("pdf").0, MediaKind::Document);
    }

    #[test]
    fn incomplete_reference_detected() {
        let mut reference = MediaReference {
            locator: "https://mmg.whatsapp.net/v/t62/abc.enc?ccb=11-4".into(),
            media_key: vec![1],
            digest_plain: vec![2],
            digest_enc: vec![3],
            length: 10,
        };
        assert!(reference.is_complete());
        assert_eq!(reference.direct_path(), "/v/t62/abc.enc");

        reference.digest_enc.clear();
        assert!(!reference.is_complete());
    }

    #[test]
    fn direct_path_falls_back_to_locator() {
        let reference = MediaReference {
            locator: "/already/a/path".into(),
            ..Default::default()
        };
        assert_eq!(reference.direct_path(), "/already/a/path");
    }
}
