use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// A queued message. Identity and content are fixed at creation; only
/// `sent_attempts` changes while the message is pending.
///
/// All timestamps are nanoseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub queue: String,
    pub sub_queue: Option<String>,
    pub headers: HashMap<String, String>,
    pub payload: Vec<u8>,
    pub sent_at: u64,
    pub deliver_by: Option<u64>,
    pub max_attempts: Option<u32>,
    pub sent_attempts: u32,
    /// Target endpoint address, set on outgoing messages.
    pub destination: Option<String>,
}

impl Message {
    /// Create a message for `queue` with a fresh id, stamped with the current time.
    pub fn new(queue: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Self::new_id(),
            queue: queue.into(),
            sub_queue: None,
            headers: HashMap::new(),
            payload: payload.into(),
            sent_at: now_ns(),
            deliver_by: None,
            max_attempts: None,
            sent_attempts: 0,
            destination: None,
        }
    }

    /// Generate a new UUIDv7 message ID.
    pub fn new_id() -> Uuid {
        Uuid::now_v7()
    }

    /// Whether the delivery deadline has been reached at `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.deliver_by.is_some_and(|deadline| now >= deadline)
    }

    /// Whether `attempts` recorded failures use up the attempt budget.
    pub fn attempts_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
