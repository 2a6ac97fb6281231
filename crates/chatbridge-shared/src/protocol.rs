use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Jid, MediaKind};

// ---------------------------------------------------------------------------
// Message payloads
// ---------------------------------------------------------------------------

/// Every message shape the bridge understands, as decoded by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain conversation text
    Conversation { text: String },

    /// Text with optional embedded quoted message
    ExtendedText {
        text: String,
        #[serde(default)]
        quoted: Option<Box<MessagePayload>>,
    },

    Image {
        #[serde(default)]
        caption: Option<String>,
        media: MediaAttachment,
    },

    Video {
        #[serde(default)]
        caption: Option<String>,
        media: MediaAttachment,
    },

    /// Audio clip or push-to-talk voice note
    Audio {
        media: MediaAttachment,
        #[serde(default)]
        seconds: Option<u32>,
        #[serde(default)]
        waveform: Option<Vec<u8>>,
        #[serde(default)]
        ptt: bool,
    },

    Document {
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        title: Option<String>,
        media: MediaAttachment,
    },

    Sticker { media: MediaAttachment },

    Contact {
        #[serde(default)]
        display_name: Option<String>,
    },

    Location { latitude: f64, longitude: f64 },

    /// Control message acting on a previously delivered message
    Protocol {
        #[serde(default)]
        target_id: Option<String>,
        action: ProtocolAction,
    },

    /// Reference to a commerce order, resolved with an extra query
    Order {
        #[serde(default)]
        order_id: Option<String>,
        #[serde(default)]
        token: Option<String>,
    },

    /// Anything else the transport hands us
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolAction {
    Edit { edited: Box<MessagePayload> },
    Revoke,
    Other,
}

/// Transport descriptor of an encrypted attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaAttachment {
    pub url: String,
    pub direct_path: Option<String>,
    pub mimetype: Option<String>,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

impl MessagePayload {
    /// Media kind of a payload, for the four kinds the store tracks.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Image { .. } => Some(MediaKind::Image),
            Self::Video { .. } => Some(MediaKind::Video),
            Self::Audio { .. } => Some(MediaKind::Audio),
            Self::Document { .. } => Some(MediaKind::Document),
            _ => None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Conversation { text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Metadata the transport attaches to every delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub push_name: Option<String>,
}

/// A live message event, already decrypted and authenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub info: MessageInfo,
    pub message: MessagePayload,
}

/// Backfill batch delivered after pairing or on request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySync {
    #[serde(default)]
    pub conversations: Vec<HistoryConversation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConversation {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub name: Option<String>,
    /// Newest first
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryMessage {
    pub key: Option<MessageKey>,
    /// Unix seconds; zero or absent means unknown
    pub timestamp: Option<i64>,
    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageKey {
    pub id: Option<String>,
    pub from_me: Option<bool>,
    pub participant: Option<String>,
}

// ---------------------------------------------------------------------------
// Query nodes
// ---------------------------------------------------------------------------

/// A node of the binary query protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub content: NodeContent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeContent {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Children(Vec<Node>),
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.content = NodeContent::Bytes(bytes.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.content = NodeContent::Children(children);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn children(&self) -> &[Node] {
        match &self.content {
            NodeContent::Children(children) => children,
            _ => &[],
        }
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Node> {
        self.children().iter().find(|c| c.tag == tag)
    }

    /// Byte content decoded as UTF-8 (lossy).
    pub fn text(&self) -> Option<String> {
        match &self.content {
            NodeContent::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Get,
    Set,
    Result,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
        }
    }
}

/// An outbound `iq` request before it is framed as a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoQuery {
    pub namespace: String,
    pub kind: QueryType,
    /// Correlation id; generated by the correlator when `None`
    pub id: Option<String>,
    pub to: Option<Jid>,
    pub target: Option<Jid>,
    pub smax_id: Option<String>,
    pub content: Vec<Node>,
}

impl InfoQuery {
    pub fn new(namespace: impl Into<String>, kind: QueryType) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            id: None,
            to: None,
            target: None,
            smax_id: None,
            content: Vec::new(),
        }
    }

    /// Frame the query as an `iq` node carrying the given correlation id.
    pub fn to_node(&self, id: &str) -> Node {
        let mut node = Node::new("iq")
            .with_attr("id", id)
            .with_attr("xmlns", self.namespace.clone())
            .with_attr("type", self.kind.as_str());

        if let Some(smax_id) = self.smax_id.as_deref().filter(|s| !s.is_empty()) {
            node = node.with_attr("smax_id", smax_id);
        }
        if let Some(to) = self.to.as_ref().filter(|j| !j.is_empty()) {
            node = node.with_attr("to", to.as_str());
        }
        if let Some(target) = self.target.as_ref().filter(|j| !j.is_empty()) {
            node = node.with_attr("target", target.as_str());
        }

        node.with_children(self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_query_framing() {
        let mut query = InfoQuery::new("fb:thrift_iq", QueryType::Get);
        query.to = Some(Jid::new("s.whatsapp.net"));
        query.smax_id = Some("5".into());
        query.content = vec![Node::new("order").with_attr("op", "get")];

        let node = query.to_node("1700000000.42");
        assert_eq!(node.tag, "iq");
        assert_eq!(node.attr("id"), Some("1700000000.42"));
        assert_eq!(node.attr("xmlns"), Some("fb:thrift_iq"));
        assert_eq!(node.attr("type"), Some("get"));
        assert_eq!(node.attr("to"), Some("s.whatsapp.net"));
        assert_eq!(node.attr("target"), None);
        assert_eq!(node.child("order").and_then(|o| o.attr("op")), Some("get"));
    }

    #[test]
    fn payload_json_shape() {
        let json = r#"{
            "type": "extended_text",
            "text": "sure",
            "quoted": { "type": "image", "media": { "url": "https://x.net/a" } }
        }"#;
        let payload: MessagePayload = serde_json::from_str(json).unwrap();
        match payload {
            MessagePayload::ExtendedText { text, quoted } => {
                assert_eq!(text, "sure");
                assert_eq!(quoted.unwrap().media_kind(), Some(MediaKind::Image));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn protocol_edit_json_shape() {
        let json = r#"{
            "type": "protocol",
            "target_id": "ABC",
            "action": { "kind": "edit", "edited": { "type": "conversation", "text": "fixed" } }
        }"#;
        let payload: MessagePayload = serde_json::from_str(json).unwrap();
        assert!(matches!(
            payload,
            MessagePayload::Protocol { action: ProtocolAction::Edit { .. }, .. }
        ));
    }
}
