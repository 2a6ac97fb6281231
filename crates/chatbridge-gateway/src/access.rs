use std::collections::HashSet;

use tracing::{debug, info};

/// Sender allow-list.  Empty means everyone is admitted; self-originated
/// messages are always admitted.
#[derive(Debug, Clone, Default)]
pub struct SenderFilter {
    allowed: HashSet<String>,
}

impl SenderFilter {
    pub fn new<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: HashSet<String> = senders
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                s.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
        if !allowed.is_empty() {
            info!(senders = allowed.len(), "sender allow-list enabled");
        }
        Self { allowed }
    }

    /// Parse a comma-separated list such as `"4915123, 4477700"`.
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn admits(&self, is_from_me: bool, sender: &str) -> bool {
        if is_from_me || self.allowed.is_empty() {
            return true;
        }
        if self.allowed.contains(sender) {
            debug!(sender, "processing allow-listed sender");
            true
        } else {
            info!(sender, "ignoring message from sender not on allow-list");
            false
        }
    }
}
