//! Per-event orchestration: filter, normalize, classify, persist, notify.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use chatbridge_media::{MediaCache, ResolvedMedia};
use chatbridge_net::{QueryCorrelator, Transport};
use chatbridge_shared::{Jid, MessageEvent, MessageInfo, Node};
use chatbridge_store::{Chat, Database, StoreError, StoredMessage};

use crate::access::SenderFilter;
use crate::classify::{detect_mutation, process_order, should_skip, Mutation, OrderOutcome};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::names::ChatNamer;
use crate::normalize::{normalize, NormalizedContent};
use crate::webhook::{is_eligible, WebhookNotifier, WebhookPayload};

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Sender not on the allow-list
    Filtered,
    /// Nothing worth storing
    Skipped,
    /// `written` is false when the row had neither text nor media
    Stored { written: bool },
    /// `applied` is false when the original was never stored
    Edited { original_id: String, applied: bool },
    Revoked { original_id: String, applied: bool },
}

/// Outcome plus the webhook body, when the event is eligible.
#[derive(Debug, Clone)]
pub struct Processed {
    pub outcome: Outcome,
    pub webhook: Option<WebhookPayload>,
}

impl Processed {
    fn silent(outcome: Outcome) -> Self {
        Self {
            outcome,
            webhook: None,
        }
    }
}

pub struct EventGateway {
    pub(crate) store: Arc<Mutex<Database>>,
    pub(crate) transport: Arc<dyn Transport>,
    correlator: QueryCorrelator<dyn Transport>,
    media: MediaCache<dyn Transport>,
    pub(crate) filter: SenderFilter,
    notifier: WebhookNotifier,
}

impl EventGateway {
    pub fn new(config: GatewayConfig, store: Database, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(Mutex::new(store));
        let correlator = QueryCorrelator::with_timeout(Arc::clone(&transport), config.query_timeout);
        let media = MediaCache::new(
            config.media_root.clone(),
            Arc::clone(&store),
            Arc::clone(&transport),
        );

        if config.webhook_url.is_none() {
            info!("no webhook configured, eligible events will only be stored");
        }

        Self {
            store,
            transport,
            correlator,
            media,
            filter: SenderFilter::new(config.allow_list),
            notifier: WebhookNotifier::new(config.webhook_url),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<Database>> {
        &self.store
    }

    pub fn correlator(&self) -> &QueryCorrelator<dyn Transport> {
        &self.correlator
    }

    /// Hand an inbound query response to whoever is waiting for it.
    pub fn deliver_node(&self, node: Node) -> bool {
        self.correlator.deliver(node)
    }

    /// Run one live event through the pipeline and post the webhook on a
    /// separate task.
    pub async fn handle_message(&self, event: &MessageEvent) -> Result<Outcome> {
        let processed = self.process_message(event).await?;

        if let Some(payload) = processed.webhook {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                notifier.notify(&payload).await;
            });
        }

        Ok(processed.outcome)
    }

    /// The pipeline without the webhook side effect.
    pub async fn process_message(&self, event: &MessageEvent) -> Result<Processed> {
        let info = &event.info;
        let sender = info.sender.user().to_string();

        if !self.filter.admits(info.is_from_me, &sender) {
            return Ok(Processed::silent(Outcome::Filtered));
        }

        let name_hint = if info.is_from_me { "" } else { sender.as_str() };
        let name = ChatNamer::new(&self.store, self.transport.as_ref())
            .resolve(&info.chat, None, name_hint)
            .await?;
        self.with_store(|db| {
            db.upsert_chat(&Chat {
                key: info.chat.clone(),
                name,
                last_message_time: Some(info.timestamp),
            })
        })?;

        let mutation = detect_mutation(&event.message);
        let mut content = normalize(&event.message, info.timestamp);
        let order = process_order(&self.correlator, &event.message, &mut content.text).await;

        if should_skip(
            &content.text,
            content.media.is_some(),
            &mutation,
            order.as_ref(),
        ) {
            return Ok(Processed::silent(Outcome::Skipped));
        }

        let outcome = match mutation.target() {
            Some(original) if mutation.is_revoke => {
                let applied =
                    self.with_store(|db| db.apply_revoke(original, &info.chat, info.timestamp))?;
                log_mutation("revoke", original, applied);
                Outcome::Revoked {
                    original_id: original.to_string(),
                    applied,
                }
            }
            Some(original) => {
                let applied = self.with_store(|db| {
                    db.apply_edit(original, &info.chat, &content.text, info.timestamp)
                })?;
                log_mutation("edit", original, applied);
                Outcome::Edited {
                    original_id: original.to_string(),
                    applied,
                }
            }
            None => {
                let record = to_record(
                    &info.id,
                    &info.chat,
                    &sender,
                    info.timestamp,
                    info.is_from_me,
                    &content,
                );
                let written = self.with_store(|db| db.upsert_message(&record))?;
                if written {
                    log_stored(info, &sender, &content);
                }
                Outcome::Stored { written }
            }
        };

        let webhook = is_eligible(info, mutation.is_revoke)
            .then(|| webhook_payload(info, &sender, &content, &mutation, order.as_ref()));

        Ok(Processed { outcome, webhook })
    }

    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        self.with_store(|db| db.list_chats())
    }

    /// Most recent messages of a known chat; an unknown chat is `NotFound`.
    pub fn list_messages(&self, chat: &Jid, limit: u32) -> Result<Vec<StoredMessage>> {
        self.with_store(|db| {
            if !db.chat_exists(chat)? {
                return Err(StoreError::NotFound);
            }
            db.list_messages(chat, limit)
        })
    }

    /// Local copy of a message's attachment, downloading it on a miss.
    pub async fn download(&self, message_id: &str, chat: &Jid) -> Result<ResolvedMedia> {
        Ok(self.media.resolve(message_id, chat).await?)
    }

    pub async fn media_by_filename(&self, chat: &Jid, filename: &str) -> Result<PathBuf> {
        Ok(self.media.resolve_by_filename(chat, filename).await?)
    }

    /// Run `f` under the store lock.  Never call across an `.await`.
    pub(crate) fn with_store<T>(
        &self,
        f: impl FnOnce(&Database) -> std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let db = self
            .store
            .lock()
            .map_err(|e| GatewayError::Lock(e.to_string()))?;
        Ok(f(&db)?)
    }
}

pub(crate) fn to_record(
    id: &str,
    chat: &Jid,
    sender: &str,
    timestamp: DateTime<Utc>,
    is_from_me: bool,
    content: &NormalizedContent,
) -> StoredMessage {
    let (media_kind, filename, media) = match &content.media {
        Some(m) => (Some(m.kind), m.filename.clone(), m.reference.clone()),
        None => (None, String::new(), Default::default()),
    };
    StoredMessage {
        id: id.to_string(),
        chat: chat.clone(),
        sender: sender.to_string(),
        content: content.text.clone(),
        timestamp,
        is_from_me,
        media_kind,
        filename,
        media,
        quoted_preview: content.quoted_preview.clone(),
    }
}

fn webhook_payload(
    info: &MessageInfo,
    sender: &str,
    content: &NormalizedContent,
    mutation: &Mutation,
    order: Option<&OrderOutcome>,
) -> WebhookPayload {
    let media = content.media.as_ref();
    WebhookPayload {
        id: info.id.clone(),
        chat_jid: info.chat.to_string(),
        sender: sender.to_string(),
        content: content.text.clone(),
        timestamp: info.timestamp,
        is_from_me: info.is_from_me,
        media_type: media.map(|m| m.kind.as_str().to_string()).unwrap_or_default(),
        filename: media.map(|m| m.filename.clone()).unwrap_or_default(),
        url: media.map(|m| m.reference.locator.clone()).unwrap_or_default(),
        quoted_message: content.quoted_preview.clone(),
        is_edited: mutation.is_edit,
        original_message_id: mutation
            .is_edit
            .then(|| mutation.original_id.clone().unwrap_or_default()),
        is_order: order.map(|_| true),
        order_id: order.map(|o| o.order_id.clone()),
        order_formatted: order
            .map(|o| o.formatted.clone())
            .filter(|f| !f.is_empty()),
    }
}

fn log_mutation(kind: &str, original_id: &str, applied: bool) {
    if applied {
        info!(kind, original_id, "applied message mutation");
    } else {
        // original predates the bridge or was never stored
        debug!(kind, original_id, "mutation target not found, dropping");
    }
}

fn log_stored(info: &MessageInfo, sender: &str, content: &NormalizedContent) {
    let direction = if info.is_from_me { "out" } else { "in" };
    match &content.media {
        Some(media) => info!(
            chat = %info.chat,
            sender,
            direction,
            kind = %media.kind,
            filename = %media.filename,
            content = %content.text,
            "stored message"
        ),
        None => info!(
            chat = %info.chat,
            sender,
            direction,
            content = %content.text,
            "stored message"
        ),
    }
    if !content.quoted_preview.is_empty() {
        debug!(quoted = %content.quoted_preview, "message is a reply");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::TimeZone;

    use chatbridge_net::{
        ContactDirectory, MediaFetcher, MediaUploader, MessageSender, NodeSender, SendReceipt,
        UploadedMedia,
    };
    use chatbridge_shared::protocol::{MediaAttachment, ProtocolAction};
    use chatbridge_shared::{MediaKind, MediaReference, MessagePayload, TransportError};

    use super::*;

    /// Transport that rejects every network operation.
    struct Unplugged;

    #[async_trait]
    impl NodeSender for Unplugged {
        async fn send_node(&self, _node: Node) -> std::result::Result<(), TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    #[async_trait]
    impl MediaFetcher for Unplugged {
        async fn download(
            &self,
            _media: &MediaReference,
            _kind: MediaKind,
        ) -> std::result::Result<Bytes, TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    #[async_trait]
    impl MediaUploader for Unplugged {
        async fn upload(
            &self,
            _data: Bytes,
            _kind: MediaKind,
        ) -> std::result::Result<UploadedMedia, TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    #[async_trait]
    impl MessageSender for Unplugged {
        async fn send_message(
            &self,
            _to: &Jid,
            _payload: MessagePayload,
        ) -> std::result::Result<SendReceipt, TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    impl ContactDirectory for Unplugged {}

    fn gateway(allow_list: &[&str]) -> EventGateway {
        let config = GatewayConfig {
            allow_list: allow_list.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        EventGateway::new(config, Database::open_in_memory().unwrap(), Arc::new(Unplugged))
    }

    fn event(id: &str, message: MessagePayload) -> MessageEvent {
        MessageEvent {
            info: MessageInfo {
                id: id.into(),
                chat: Jid::new("4915123@s.whatsapp.net"),
                sender: Jid::new("4915123@s.whatsapp.net"),
                is_from_me: false,
                is_group: false,
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                push_name: None,
            },
            message,
        }
    }

    #[tokio::test]
    async fn plain_text_is_stored_with_webhook() {
        let gw = gateway(&[]);
        let processed = gw
            .process_message(&event("M1", MessagePayload::text("hello")))
            .await
            .unwrap();

        assert_eq!(processed.outcome, Outcome::Stored { written: true });
        let hook = processed.webhook.unwrap();
        assert_eq!(hook.sender, "4915123");
        assert_eq!(hook.content, "hello");
        assert!(!hook.is_edited);

        let chats = gw.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name, "4915123");
    }

    #[tokio::test]
    async fn empty_message_is_skipped() {
        let gw = gateway(&[]);
        let processed = gw
            .process_message(&event("M1", MessagePayload::Unknown))
            .await
            .unwrap();
        assert_eq!(processed.outcome, Outcome::Skipped);
        assert!(processed.webhook.is_none());
    }

    #[tokio::test]
    async fn edit_of_unknown_message_is_dropped() {
        let gw = gateway(&[]);
        let edit = MessagePayload::Protocol {
            target_id: Some("GONE".into()),
            action: ProtocolAction::Edit {
                edited: Box::new(MessagePayload::text("new")),
            },
        };
        let processed = gw.process_message(&event("E1", edit)).await.unwrap();

        assert_eq!(
            processed.outcome,
            Outcome::Edited {
                original_id: "GONE".into(),
                applied: false
            }
        );
        assert_eq!(
            processed.webhook.unwrap().original_message_id.as_deref(),
            Some("GONE")
        );
        let chat = Jid::new("4915123@s.whatsapp.net");
        assert!(gw.list_messages(&chat, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_with_failed_lookup_keeps_flag() {
        let gw = gateway(&[]);
        let order = MessagePayload::Order {
            order_id: Some("ORD-9".into()),
            token: Some("dG9r".into()),
        };
        let processed = gw.process_message(&event("O1", order)).await.unwrap();

        assert_eq!(processed.outcome, Outcome::Stored { written: false });
        let hook = processed.webhook.unwrap();
        assert_eq!(hook.is_order, Some(true));
        assert_eq!(hook.order_id.as_deref(), Some("ORD-9"));
        assert_eq!(hook.order_formatted, None);
    }

    #[tokio::test]
    async fn media_message_row_and_webhook() {
        let gw = gateway(&[]);
        let image = MessagePayload::Image {
            caption: None,
            media: MediaAttachment {
                url: "https://mmg.whatsapp.net/v/t62/p.enc".into(),
                file_length: 5,
                ..Default::default()
            },
        };
        let processed = gw.process_message(&event("I1", image)).await.unwrap();

        let hook = processed.webhook.unwrap();
        assert_eq!(hook.media_type, "image");
        assert_eq!(hook.filename, "image_20231114_221320.jpg");
        assert_eq!(hook.url, "https://mmg.whatsapp.net/v/t62/p.enc");

        let chat = Jid::new("4915123@s.whatsapp.net");
        let rows = gw.list_messages(&chat, 5).unwrap();
        assert_eq!(rows[0].media_kind, Some(MediaKind::Image));
        assert_eq!(rows[0].content, "");
    }

    #[tokio::test]
    async fn unknown_chat_listing_is_not_found() {
        let gw = gateway(&[]);
        let err = gw
            .list_messages(&Jid::new("nobody@s.whatsapp.net"), 5)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Store(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn deliver_without_waiter_is_ignored() {
        let gw = gateway(&[]);
        assert!(!gw.deliver_node(Node::new("iq").with_attr("id", "1.2")));
    }
}
