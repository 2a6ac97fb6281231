//! Chat display-name resolution.

use std::sync::Mutex;

use tracing::debug;

use chatbridge_net::{ContactDirectory, ContactInfo, GroupInfo};
use chatbridge_shared::protocol::HistoryConversation;
use chatbridge_shared::Jid;
use chatbridge_store::Database;

use crate::error::{GatewayError, Result};

/// Anything that may carry a human-readable chat name.
pub trait ChatNameSource {
    fn display_name(&self) -> Option<&str>;
}

impl ChatNameSource for HistoryConversation {
    fn display_name(&self) -> Option<&str> {
        non_empty(self.display_name.as_deref()).or_else(|| non_empty(self.name.as_deref()))
    }
}

impl ChatNameSource for GroupInfo {
    fn display_name(&self) -> Option<&str> {
        non_empty(Some(self.name.as_str()))
    }
}

impl ChatNameSource for ContactInfo {
    fn display_name(&self) -> Option<&str> {
        non_empty(self.full_name.as_deref())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Picks the name stored for a chat.  A non-empty stored name always wins.
pub struct ChatNamer<'a, D: ?Sized> {
    store: &'a Mutex<Database>,
    directory: &'a D,
}

impl<'a, D: ContactDirectory + ?Sized> ChatNamer<'a, D> {
    pub fn new(store: &'a Mutex<Database>, directory: &'a D) -> Self {
        Self { store, directory }
    }

    /// Groups: `source`, then the directory, then `"Group <user>"`.
    /// Individuals: the contact's full name, then `sender`, then the JID user.
    pub async fn resolve(
        &self,
        chat: &Jid,
        source: Option<&(dyn ChatNameSource + Sync)>,
        sender: &str,
    ) -> Result<String> {
        if let Some(existing) = self.stored_name(chat)? {
            debug!(chat = %chat, name = %existing, "using existing chat name");
            return Ok(existing);
        }

        let name = if chat.is_group() {
            match source.and_then(|s| s.display_name()) {
                Some(name) => name.to_string(),
                None => match self.directory.group_info(chat).await {
                    Some(info) if info.display_name().is_some() => info.name,
                    _ => format!("Group {}", chat.user()),
                },
            }
        } else {
            let contact = self.directory.contact_info(chat).await;
            match contact.as_ref().and_then(|c| c.display_name()) {
                Some(name) => name.to_string(),
                None if !sender.is_empty() => sender.to_string(),
                None => chat.user().to_string(),
            }
        };

        debug!(chat = %chat, name = %name, "resolved chat name");
        Ok(name)
    }

    fn stored_name(&self, chat: &Jid) -> Result<Option<String>> {
        let db = self
            .store
            .lock()
            .map_err(|e| GatewayError::Lock(e.to_string()))?;
        Ok(db.chat_name(chat)?)
    }
}
