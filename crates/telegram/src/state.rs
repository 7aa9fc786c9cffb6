use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

/// Polls remembered for vote updates.
const POLL_INDEX_CAPACITY: usize = 1024;

/// Maps Telegram poll ids to the message that carries the poll.
///
/// Poll updates from the Bot API only name the poll, so the message
/// coordinates are recorded when the poll message is first seen. The
/// oldest entries are forgotten once the index is full.
#[derive(Debug, Default)]
pub struct PollIndex {
    // std Mutex: never held across `.await`.
    inner: Mutex<PollIndexInner>,
}

#[derive(Debug, Default)]
struct PollIndexInner {
    by_poll: HashMap<String, (String, String)>,
    order: VecDeque<String>,
}

impl PollIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, poll_id: &str, chat_id: &str, message_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let location = (chat_id.to_string(), message_id.to_string());
        if inner.by_poll.insert(poll_id.to_string(), location).is_none() {
            inner.order.push_back(poll_id.to_string());
        }
        while inner.order.len() > POLL_INDEX_CAPACITY {
            if let Some(oldest) = inner.order.pop_front() {
                inner.by_poll.remove(&oldest);
            }
        }
    }

    /// `(chat_id, message_id)` of the poll message.
    #[must_use]
    pub fn lookup(&self, poll_id: &str) -> Option<(String, String)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_poll.get(poll_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_poll.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
