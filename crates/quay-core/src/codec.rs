//! Conversion between `Message` and its stored key/value form.
//!
//! The key is the message id's 16 raw bytes. The value is a versioned JSON
//! envelope carrying every other field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::message::Message;
use crate::storage::keys::{self, MESSAGE_KEY_LEN};

/// Current envelope format version.
pub const FORMAT_VERSION: u8 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u8,
    queue: &'a str,
    sub_queue: Option<&'a str>,
    headers: &'a HashMap<String, String>,
    payload: &'a [u8],
    sent_at: u64,
    deliver_by: Option<u64>,
    max_attempts: Option<u32>,
    sent_attempts: u32,
    destination: Option<&'a str>,
}

#[derive(Deserialize)]
struct Envelope {
    version: u8,
    queue: String,
    #[serde(default)]
    sub_queue: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    payload: Vec<u8>,
    sent_at: u64,
    #[serde(default)]
    deliver_by: Option<u64>,
    #[serde(default)]
    max_attempts: Option<u32>,
    sent_attempts: u32,
    #[serde(default)]
    destination: Option<String>,
}

/// Encode a message into its `(key, value)` storage form.
pub fn encode(message: &Message) -> StoreResult<([u8; MESSAGE_KEY_LEN], Vec<u8>)> {
    let envelope = EnvelopeRef {
        version: FORMAT_VERSION,
        queue: &message.queue,
        sub_queue: message.sub_queue.as_deref(),
        headers: &message.headers,
        payload: &message.payload,
        sent_at: message.sent_at,
        deliver_by: message.deliver_by,
        max_attempts: message.max_attempts,
        sent_attempts: message.sent_attempts,
        destination: message.destination.as_deref(),
    };
    let value =
        serde_json::to_vec(&envelope).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok((keys::message_key(&message.id), value))
}

/// Decode a stored `(key, value)` pair back into a message.
///
/// Any failure is reported as `CorruptRecord`.
pub fn decode(key: &[u8], value: &[u8]) -> StoreResult<Message> {
    let id = keys::parse_message_key(key).ok_or_else(|| corrupt(key, "malformed message key"))?;
    let envelope: Envelope =
        serde_json::from_slice(value).map_err(|e| corrupt(key, &e.to_string()))?;
    if envelope.version != FORMAT_VERSION {
        return Err(corrupt(
            key,
            &format!("unsupported format version {}", envelope.version),
        ));
    }

    Ok(Message {
        id,
        queue: envelope.queue,
        sub_queue: envelope.sub_queue,
        headers: envelope.headers,
        payload: envelope.payload,
        sent_at: envelope.sent_at,
        deliver_by: envelope.deliver_by,
        max_attempts: envelope.max_attempts,
        sent_attempts: envelope.sent_attempts,
        destination: envelope.destination,
    })
}

pub(crate) fn corrupt(key: &[u8], reason: &str) -> StoreError {
    let key = match keys::parse_message_key(key) {
        Some(id) => id.to_string(),
        None => key.iter().map(|b| format!("{b:02x}")).collect(),
    };
    StoreError::CorruptRecord {
        key,
        reason: reason.to_string(),
    }
}
