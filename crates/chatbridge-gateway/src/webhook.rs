//! Best-effort webhook notification: one POST per eligible event, no retry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chatbridge_shared::MessageInfo;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media_type: String,
    pub filename: String,
    pub url: String,
    pub quoted_message: String,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_formatted: Option<String>,
}

/// Only inbound, non-revoked, one-to-one messages from non-limited
/// identities are forwarded.
pub fn is_eligible(info: &MessageInfo, is_revoke: bool) -> bool {
    if info.is_from_me || is_revoke {
        return false;
    }
    if info.is_group || info.chat.is_group() {
        return false;
    }
    if info.chat.is_limited() || info.sender.is_limited() {
        info!(chat = %info.chat, "skipping webhook for limited identity");
        return false;
    }
    true
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.filter(|u| !u.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// POST `payload` once.  Returns whether the endpoint accepted it;
    /// failures are only logged.
    pub async fn notify(&self, payload: &WebhookPayload) -> bool {
        let Some(url) = self.url.as_deref() else {
            warn!(id = %payload.id, "WEBHOOK_URL is not set");
            return false;
        };

        match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(id = %payload.id, url, "sent to webhook");
                true
            }
            Ok(resp) => {
                warn!(id = %payload.id, url, status = %resp.status(), "webhook rejected event");
                false
            }
            Err(e) => {
                warn!(id = %payload.id, url, error = %e, "failed to POST to webhook");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use httpmock::prelude::*;

    use chatbridge_shared::Jid;

    use super::*;

    fn info(chat: &str, sender: &str) -> MessageInfo {
        MessageInfo {
            id: "M1".into(),
            chat: Jid::new(chat),
            sender: Jid::new(sender),
            is_from_me: false,
            is_group: false,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            push_name: None,
        }
    }

    fn payload() -> WebhookPayload {
        WebhookPayload {
            id: "M1".into(),
            chat_jid: "4915123@s.whatsapp.net".into(),
            sender: "4915123".into(),
            content: "hello".into(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            is_from_me: false,
            media_type: String::new(),
            filename: String::new(),
            url: String::new(),
            quoted_message: String::new(),
            is_edited: false,
            original_message_id: None,
            is_order: None,
            order_id: None,
            order_formatted: None,
        }
    }

    #[test]
    fn eligibility_rules() {
        let direct = info("4915123@s.whatsapp.net", "4915123@s.whatsapp.net");
        assert!(is_eligible(&direct, false));
        assert!(!is_eligible(&direct, true));

        let mine = MessageInfo {
            is_from_me: true,
            ..direct.clone()
        };
        assert!(!is_eligible(&mine, false));

        assert!(!is_eligible(&info("1203630@g.us", "4915123@s.whatsapp.net"), false));
        assert!(!is_eligible(&info("998877@lid", "998877@lid"), false));
        assert!(!is_eligible(&info("4915123@s.whatsapp.net", "998877@lid"), false));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_value(payload()).unwrap();
        assert_eq!(json["id"], "M1");
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
        assert!(json.get("is_order").is_none());
        assert!(json.get("original_message_id").is_none());
    }

    #[tokio::test]
    async fn posts_json_once() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .header("content-type", "application/json")
                .body_includes("\"content\":\"hello\"");
            then.status(200);
        });

        let notifier = WebhookNotifier::new(Some(server.url("/hook")));
        assert!(notifier.notify(&payload()).await);
        hook.assert_calls(1);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(500);
        });

        let notifier = WebhookNotifier::new(Some(server.url("/hook")));
        assert!(!notifier.notify(&payload()).await);
        hook.assert_calls(1);

        let unconfigured = WebhookNotifier::new(None);
        assert!(!unconfigured.is_configured());
        assert!(!unconfigured.notify(&payload()).await);
    }
}
