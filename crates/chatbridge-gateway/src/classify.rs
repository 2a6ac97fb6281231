//! Edit, revoke and order detection, plus the skip policy.

use tracing::{info, warn};

use chatbridge_net::{fetch_order_details, NodeSender, QueryCorrelator};
use chatbridge_shared::protocol::ProtocolAction;
use chatbridge_shared::MessagePayload;

/// Whether a message mutates an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    pub is_edit: bool,
    pub is_revoke: bool,
    pub original_id: Option<String>,
}

impl Mutation {
    /// Target id of an edit or revoke, when one was given.
    pub fn target(&self) -> Option<&str> {
        if self.is_edit || self.is_revoke {
            self.original_id.as_deref().filter(|id| !id.is_empty())
        } else {
            None
        }
    }
}

pub fn detect_mutation(payload: &MessagePayload) -> Mutation {
    let MessagePayload::Protocol { target_id, action } = payload else {
        return Mutation::default();
    };

    let mutation = Mutation {
        is_edit: matches!(action, ProtocolAction::Edit { .. }),
        is_revoke: matches!(action, ProtocolAction::Revoke),
        original_id: target_id.clone(),
    };
    if mutation.is_edit {
        info!(original_id = ?mutation.original_id, "processing edited message");
    } else if mutation.is_revoke {
        info!(original_id = ?mutation.original_id, "processing revoked message");
    }
    mutation
}

/// Order id and token carried by an order-reference message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReference {
    pub order_id: String,
    pub token: String,
}

pub fn detect_order(payload: &MessagePayload) -> Option<OrderReference> {
    match payload {
        MessagePayload::Order {
            order_id: Some(order_id),
            token: Some(token),
        } => Some(OrderReference {
            order_id: order_id.clone(),
            token: token.clone(),
        }),
        _ => None,
    }
}

/// An order that was detected, whether or not its details resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOutcome {
    pub order_id: String,
    /// `""` when the lookup failed or listed no product
    pub formatted: String,
}

/// Resolve an order reference and append its line to `text`.
///
/// A failed lookup is logged; the order still counts as detected.
pub async fn process_order<S: NodeSender + ?Sized>(
    correlator: &QueryCorrelator<S>,
    payload: &MessagePayload,
    text: &mut String,
) -> Option<OrderOutcome> {
    let order = detect_order(payload)?;
    info!(order_id = %order.order_id, "detected order message");

    let formatted = match fetch_order_details(correlator, &order.order_id, &order.token).await {
        Ok(details) => details.format_line(),
        Err(e) => {
            warn!(order_id = %order.order_id, error = %e, "failed to get order details");
            String::new()
        }
    };

    if !formatted.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&formatted);
        info!(order_id = %order.order_id, formatted = %formatted, "formatted order");
    }

    Some(OrderOutcome {
        order_id: order.order_id,
        formatted,
    })
}

/// Nothing to store: no text, no media, and neither a revoke nor an order.
pub fn should_skip(
    text: &str,
    has_media: bool,
    mutation: &Mutation,
    order: Option<&OrderOutcome>,
) -> bool {
    if !text.is_empty() || has_media || mutation.is_revoke || order.is_some() {
        return false;
    }
    if mutation.is_edit {
        info!(original_id = ?mutation.original_id, "skipping edited message with no content");
    } else {
        info!("skipping message with no content or media");
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use chatbridge_shared::{Node, TransportError};

    use super::*;

    struct ChannelSender(mpsc::UnboundedSender<Node>);

    #[async_trait]
    impl NodeSender for ChannelSender {
        async fn send_node(&self, node: Node) -> Result<(), TransportError> {
            self.0
                .send(node)
                .map_err(|e| TransportError::Send(e.to_string()))
        }
    }

    struct DeadSender;

    #[async_trait]
    impl NodeSender for DeadSender {
        async fn send_node(&self, _node: Node) -> Result<(), TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    fn order_payload() -> MessagePayload {
        MessagePayload::Order {
            order_id: Some("ORD-1".into()),
            token: Some("dG9r".into()),
        }
    }

    /// Correlator whose queries are answered with the given products.
    fn answering(products: Vec<(&'static str, &'static str)>) -> QueryCorrelator<ChannelSender> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Node>();
        let correlator =
            QueryCorrelator::with_timeout(Arc::new(ChannelSender(tx)), Duration::from_secs(5));
        let responder = correlator.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let products = products
                    .iter()
                    .map(|(name, qty)| {
                        Node::new("product").with_children(vec![
                            Node::new("name").with_bytes(*name),
                            Node::new("quantity").with_bytes(*qty),
                        ])
                    })
                    .collect();
                let response = Node::new("iq")
                    .with_attr("id", request.attr("id").unwrap_or_default())
                    .with_children(vec![Node::new("order").with_children(products)]);
                responder.deliver(response);
            }
        });
        correlator
    }

    #[test]
    fn mutation_detection() {
        let edit = MessagePayload::Protocol {
            target_id: Some("ABC".into()),
            action: ProtocolAction::Edit {
                edited: Box::new(MessagePayload::text("x")),
            },
        };
        let mutation = detect_mutation(&edit);
        assert!(mutation.is_edit && !mutation.is_revoke);
        assert_eq!(mutation.target(), Some("ABC"));

        let other = MessagePayload::Protocol {
            target_id: Some("ABC".into()),
            action: ProtocolAction::Other,
        };
        assert_eq!(detect_mutation(&other).target(), None);
        assert_eq!(detect_mutation(&MessagePayload::text("hi")), Mutation::default());
    }

    #[test]
    fn order_needs_id_and_token() {
        assert!(detect_order(&order_payload()).is_some());
        assert!(detect_order(&MessagePayload::Order {
            order_id: Some("ORD-1".into()),
            token: None
        })
        .is_none());
    }

    #[tokio::test]
    async fn resolved_order_is_appended() {
        let correlator = answering(vec![("Bun", "2")]);
        let mut text = String::from("hello");

        let outcome = process_order(&correlator, &order_payload(), &mut text)
            .await
            .unwrap();

        assert_eq!(outcome.formatted, "我想购买: Bun x2");
        assert_eq!(text, "hello\n我想购买: Bun x2");
    }

    #[tokio::test]
    async fn empty_order_leaves_text_alone() {
        let correlator = answering(vec![]);
        let mut text = String::from("hello");

        let outcome = process_order(&correlator, &order_payload(), &mut text)
            .await
            .unwrap();

        assert_eq!(outcome.formatted, "");
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn failed_lookup_still_flags_order() {
        let correlator = QueryCorrelator::new(Arc::new(DeadSender));
        let mut text = String::new();

        let outcome = process_order(&correlator, &order_payload(), &mut text)
            .await
            .unwrap();

        assert_eq!(outcome.order_id, "ORD-1");
        assert!(outcome.formatted.is_empty());
        assert!(text.is_empty());
        assert!(!should_skip(&text, false, &Mutation::default(), Some(&outcome)));
    }

    #[test]
    fn skip_policy() {
        let none = Mutation::default();
        assert!(should_skip("", false, &none, None));
        assert!(!should_skip("hi", false, &none, None));
        assert!(!should_skip("", true, &none, None));

        let revoke = Mutation {
            is_revoke: true,
            ..Default::default()
        };
        assert!(!should_skip("", false, &revoke, None));

        let edit = Mutation {
            is_edit: true,
            ..Default::default()
        };
        assert!(should_skip("", false, &edit, None));
    }
}
