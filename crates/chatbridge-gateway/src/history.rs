//! History backfill: conversations delivered in bulk after pairing.

use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use chatbridge_net::ContactDirectory;
use chatbridge_shared::protocol::{HistoryConversation, HistoryMessage, HistorySync};
use chatbridge_shared::{Jid, MessagePayload};
use chatbridge_store::Chat;

use crate::error::Result;
use crate::gateway::{to_record, EventGateway};
use crate::names::ChatNamer;
use crate::normalize::normalize;

impl EventGateway {
    /// Store every usable message of a history batch and return how many
    /// rows were written.
    ///
    /// Rows that already exist keep their content, since a live edit or
    /// revoke may have reached them first; only a complete media
    /// descriptor is backfilled onto them.
    pub async fn handle_history_sync(&self, sync: &HistorySync) -> Result<usize> {
        info!(conversations = sync.conversations.len(), "received history sync");

        let mut stored = 0;
        for conversation in &sync.conversations {
            stored += self.sync_conversation(conversation).await?;
        }

        info!(stored, "history sync complete");
        Ok(stored)
    }

    async fn sync_conversation(&self, conversation: &HistoryConversation) -> Result<usize> {
        let Some(chat) = conversation
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(Jid::new)
        else {
            return Ok(0);
        };

        let name = ChatNamer::new(&self.store, self.transport.as_ref())
            .resolve(&chat, Some(conversation), "")
            .await?;

        // newest first
        let Some(latest) = conversation
            .messages
            .first()
            .and_then(|m| m.timestamp)
            .filter(|ts| *ts > 0)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        else {
            debug!(chat = %chat, "conversation has no dated messages");
            return Ok(0);
        };

        self.with_store(|db| {
            db.upsert_chat(&Chat {
                key: chat.clone(),
                name,
                last_message_time: Some(latest),
            })
        })?;

        let own_user = self
            .transport
            .own_jid()
            .map(|jid| jid.user().to_string())
            .unwrap_or_default();

        let mut stored = 0;
        for message in &conversation.messages {
            match self.sync_message(&chat, message, &own_user) {
                Ok(true) => stored += 1,
                Ok(false) => {}
                Err(e) => warn!(chat = %chat, error = %e, "failed to store history message"),
            }
        }

        info!(chat = %chat, stored, "stored history messages");
        Ok(stored)
    }

    fn sync_message(&self, chat: &Jid, message: &HistoryMessage, own_user: &str) -> Result<bool> {
        let Some(payload) = message.message.as_ref() else {
            return Ok(false);
        };
        // edits and revokes in a backfill refer to rows the batch already
        // carries in their final form
        if matches!(payload, MessagePayload::Protocol { .. }) {
            return Ok(false);
        }
        let Some(timestamp) = message
            .timestamp
            .filter(|ts| *ts > 0)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        else {
            return Ok(false);
        };

        let key = message.key.clone().unwrap_or_default();
        let Some(id) = key.id.filter(|id| !id.is_empty()) else {
            return Ok(false);
        };
        let is_from_me = key.from_me.unwrap_or(false);

        let sender = match key.participant.as_deref().filter(|p| !p.is_empty()) {
            Some(participant) => Jid::new(participant).user().to_string(),
            None if is_from_me && !own_user.is_empty() => own_user.to_string(),
            None => chat.user().to_string(),
        };
        if !self.filter.admits(is_from_me, &sender) {
            return Ok(false);
        }

        let content = normalize(payload, timestamp);
        if content.text.is_empty() && content.media.is_none() {
            return Ok(false);
        }

        let record = to_record(&id, chat, &sender, timestamp, is_from_me, &content);
        self.with_store(|db| {
            if !db.message_exists(&id, chat)? {
                return db.upsert_message(&record);
            }
            match &content.media {
                Some(media) if media.reference.is_complete() => {
                    db.store_media_info(&id, chat, &media.reference)?;
                }
                _ => {}
            }
            Ok(false)
        })
    }
}
