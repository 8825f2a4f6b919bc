//! Key encoding and sub-store naming.
//!
//! Message keys are the raw 16 bytes of the message UUID. Index keys put an
//! 8-byte big-endian timestamp first so lexicographic order is time order.
//! Every queue owns three sub-stores: `q:{queue}:out`, `q:{queue}:in` and
//! `q:{queue}:out_by_sent`.

use uuid::Uuid;

const QUEUE_PREFIX: &str = "q:";
const OUTGOING_SUFFIX: &str = ":out";
const INCOMING_SUFFIX: &str = ":in";
const OUTGOING_INDEX_SUFFIX: &str = ":out_by_sent";

/// Length of an encoded message key.
pub const MESSAGE_KEY_LEN: usize = 16;

/// Length of an encoded sent-time index key.
pub const SENT_INDEX_KEY_LEN: usize = 8 + MESSAGE_KEY_LEN;

pub fn outgoing_store(queue: &str) -> String {
    format!("{QUEUE_PREFIX}{queue}{OUTGOING_SUFFIX}")
}

pub fn incoming_store(queue: &str) -> String {
    format!("{QUEUE_PREFIX}{queue}{INCOMING_SUFFIX}")
}

pub fn outgoing_index_store(queue: &str) -> String {
    format!("{QUEUE_PREFIX}{queue}{OUTGOING_INDEX_SUFFIX}")
}

/// Recover the queue name from an incoming sub-store name.
///
/// Only the incoming store is matched so each queue is reported once.
pub fn queue_from_incoming_store(store: &str) -> Option<&str> {
    store
        .strip_prefix(QUEUE_PREFIX)?
        .strip_suffix(INCOMING_SUFFIX)
        .filter(|queue| !queue.is_empty())
}

/// Build a message key: the UUID's raw bytes.
pub fn message_key(id: &Uuid) -> [u8; MESSAGE_KEY_LEN] {
    *id.as_bytes()
}

pub fn parse_message_key(key: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(key).ok()
}

/// Build a sent-time index key: `{sent_at_ns}{msg_id}`.
pub fn sent_index_key(sent_at: u64, id: &Uuid) -> [u8; SENT_INDEX_KEY_LEN] {
    let mut key = [0u8; SENT_INDEX_KEY_LEN];
    key[..8].copy_from_slice(&sent_at.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

/// Split a sent-time index key back into `(sent_at, msg_id)`.
pub fn parse_sent_index_key(key: &[u8]) -> Option<(u64, Uuid)> {
    if key.len() != SENT_INDEX_KEY_LEN {
        return None;
    }
    let (ts, id) = key.split_at(8);
    let ts: [u8; 8] = ts.try_into().ok()?;
    Some((u64::from_be_bytes(ts), Uuid::from_slice(id).ok()?))
}
