//! Request/response matching for `iq` queries.
//!
//! The transport can only send nodes one way.  The correlator registers a
//! one-shot slot per correlation id, sends the framed query and waits for
//! [`QueryCorrelator::deliver`] to hand back the first inbound node carrying
//! the same id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use chatbridge_shared::constants::QUERY_TIMEOUT_SECS;
use chatbridge_shared::protocol::InfoQuery;
use chatbridge_shared::{Node, QueryError};

use crate::transport::NodeSender;

type PendingMap = HashMap<String, oneshot::Sender<Node>>;

/// Correlates outbound queries with their responses.
pub struct QueryCorrelator<S: ?Sized> {
    sender: Arc<S>,
    pending: Arc<Mutex<PendingMap>>,
    timeout: Duration,
}

impl<S: ?Sized> Clone for QueryCorrelator<S> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        }
    }
}

impl<S: NodeSender + ?Sized> QueryCorrelator<S> {
    pub fn new(sender: Arc<S>) -> Self {
        Self::with_timeout(sender, Duration::from_secs(QUERY_TIMEOUT_SECS))
    }

    pub fn with_timeout(sender: Arc<S>, timeout: Duration) -> Self {
        Self {
            sender,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Send `query` and wait for its response.
    ///
    /// A send failure returns immediately as [`QueryError::Send`]; no
    /// response within the timeout is [`QueryError::Timeout`].  In both cases
    /// the slot is gone when this returns, and dropping the future early
    /// removes it as well.
    pub async fn send(&self, query: InfoQuery) -> Result<Node, QueryError> {
        let id = query.id.clone().unwrap_or_else(generate_request_id);
        let mut rx = self.register(&id)?;
        let mut slot = PendingSlot {
            pending: &self.pending,
            id: &id,
            armed: true,
        };

        debug!(id = %id, namespace = %query.namespace, "sending query");
        if let Err(e) = self.sender.send_node(query.to_node(&id)).await {
            warn!(id = %id, error = %e, "query send failed");
            return Err(QueryError::Send(e));
        }

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(node)) => {
                slot.armed = false;
                Ok(node)
            }
            Ok(Err(_)) => {
                slot.armed = false;
                Err(QueryError::Cancelled { id: id.clone() })
            }
            Err(_) => {
                // Deregister and check under one lock so a concurrent deliver
                // either lands in `rx` or finds no slot.
                let removed = lock(&self.pending).remove(&id);
                slot.armed = false;
                if removed.is_none() {
                    if let Ok(node) = rx.try_recv() {
                        return Ok(node);
                    }
                }
                warn!(id = %id, timeout = ?self.timeout, "query timed out");
                Err(QueryError::Timeout { id: id.clone() })
            }
        }
    }

    /// Route an inbound node to the query waiting on its `id`.
    ///
    /// Returns `false` (and drops the node) when nobody is waiting.
    pub fn deliver(&self, node: Node) -> bool {
        let Some(id) = node.attr("id").map(str::to_string) else {
            debug!(tag = %node.tag, "ignoring node without id");
            return false;
        };

        let waiter = lock(&self.pending).remove(&id);
        match waiter {
            Some(tx) => tx.send(node).is_ok(),
            None => {
                debug!(id = %id, "ignoring response for unknown or expired query");
                false
            }
        }
    }

    /// Number of queries currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    fn register(&self, id: &str) -> Result<oneshot::Receiver<Node>, QueryError> {
        let mut pending = lock(&self.pending);
        if pending.contains_key(id) {
            return Err(QueryError::DuplicateId(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id.to_string(), tx);
        Ok(rx)
    }
}

/// Removes the registration when the waiting future goes away early.
struct PendingSlot<'a> {
    pending: &'a Mutex<PendingMap>,
    id: &'a str,
    armed: bool,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.pending).remove(self.id);
        }
    }
}

fn lock(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    // The map holds no invariants a panicking holder could break.
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wall-clock seconds plus random bits: unique within any timeout window.
pub fn generate_request_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{secs}.{}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use chatbridge_shared::protocol::QueryType;
    use chatbridge_shared::TransportError;

    use super::*;

    /// Hands every sent node to the test through a channel.
    struct ChannelSender(mpsc::UnboundedSender<Node>);

    #[async_trait]
    impl NodeSender for ChannelSender {
        async fn send_node(&self, node: Node) -> Result<(), TransportError> {
            self.0
                .send(node)
                .map_err(|e| TransportError::Send(e.to_string()))
        }
    }

    struct FailingSender;

    #[async_trait]
    impl NodeSender for FailingSender {
        async fn send_node(&self, _node: Node) -> Result<(), TransportError> {
            Err(TransportError::Send("socket closed".into()))
        }
    }

    fn query() -> InfoQuery {
        InfoQuery::new("fb:thrift_iq", QueryType::Get)
    }

    fn response_to(request: &Node) -> Node {
        Node::new("iq")
            .with_attr("id", request.attr("id").unwrap_or_default())
            .with_attr("type", "result")
    }

    #[tokio::test]
    async fn response_is_matched_by_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let correlator = QueryCorrelator::new(Arc::new(ChannelSender(tx)));

        let responder = correlator.clone();
        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert!(!responder.deliver(Node::new("iq").with_attr("id", "someone-else")));
            assert!(responder.deliver(response_to(&request)));
        });

        let response = correlator.send(query()).await.unwrap();
        assert_eq!(response.attr("type"), Some("result"));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_queries_answered_out_of_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let correlator = QueryCorrelator::new(Arc::new(ChannelSender(tx)));

        let callers: Vec<_> = (0..4)
            .map(|n| {
                let correlator = correlator.clone();
                let mut q = query();
                q.id = Some(format!("q{n}"));
                tokio::spawn(async move { (n, correlator.send(q).await) })
            })
            .collect();

        let mut requests = Vec::new();
        for _ in 0..4 {
            requests.push(rx.recv().await.unwrap());
        }
        for request in requests.iter().rev() {
            let id = request.attr("id").unwrap_or_default().to_string();
            assert!(correlator.deliver(response_to(request).with_attr("answer", id)));
        }

        for caller in callers {
            let (n, response) = caller.await.unwrap();
            let expected = format!("q{n}");
            assert_eq!(response.unwrap().attr("answer"), Some(expected.as_str()));
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_failure_is_immediate_and_deregisters() {
        let correlator = QueryCorrelator::new(Arc::new(FailingSender));

        let started = std::time::Instant::now();
        let err = correlator.send(query()).await.unwrap_err();

        assert!(matches!(err, QueryError::Send(TransportError::Send(_))));
        assert!(started.elapsed() < Duration::from_secs(QUERY_TIMEOUT_SECS));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_removes_slot_and_late_response_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let correlator =
            QueryCorrelator::with_timeout(Arc::new(ChannelSender(tx)), Duration::from_millis(50));

        let err = correlator.send(query()).await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout { .. }));
        assert_eq!(correlator.pending_count(), 0);

        let request = rx.recv().await.unwrap();
        assert!(!correlator.deliver(response_to(&request)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_pending_id_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let correlator =
            QueryCorrelator::with_timeout(Arc::new(ChannelSender(tx)), Duration::from_millis(200));

        let mut first = query();
        first.id = Some("fixed".into());
        let second = first.clone();

        let waiting = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.send(first).await })
        };
        while correlator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let err = correlator.send(second).await.unwrap_err();
        assert_eq!(err, QueryError::DuplicateId("fixed".into()));

        assert!(matches!(
            waiting.await.unwrap(),
            Err(QueryError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn dropped_query_releases_its_slot() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let correlator = QueryCorrelator::new(Arc::new(ChannelSender(tx)));

        let pending = correlator.send(query());
        let _ = tokio::time::timeout(Duration::from_millis(20), pending).await;

        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn request_ids_do_not_repeat() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(a.contains('.'));
        assert_ne!(a, b);
    }
}
