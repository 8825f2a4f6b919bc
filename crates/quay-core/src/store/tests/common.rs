use super::*;

/// How long to wait for a message that should arrive.
pub(super) const ARRIVAL: Duration = Duration::from_secs(2);

/// How long to wait before concluding nothing more will arrive.
pub(super) const QUIET: Duration = Duration::from_millis(50);

pub(super) fn test_config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig {
        data_dir: dir.path().to_path_buf(),
        sync_writes: false,
        ..Default::default()
    }
}

/// A store with the `outgoing` queue already created.
pub(super) fn test_store() -> (MessageStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = MessageStore::open(&test_config(&dir)).unwrap();
    store.create_queue("outgoing").unwrap();
    (store, dir)
}

pub(super) fn test_message(queue: &str) -> Message {
    let mut msg = Message::new(queue, b"test".to_vec());
    msg.destination = Some("lq.tcp://localhost:5050".to_string());
    msg
}

/// Helper: store outgoing messages in one committed transaction.
pub(super) fn commit_outgoing(store: &MessageStore, messages: &[Message]) {
    let mut tx = store.begin_transaction().unwrap();
    for msg in messages {
        store.store_outgoing(&mut tx, msg).unwrap();
    }
    tx.commit().unwrap();
}

/// Helper: store incoming messages in one committed transaction.
pub(super) fn commit_incoming(store: &MessageStore, messages: &[Message]) {
    let mut tx = store.begin_transaction().unwrap();
    for msg in messages {
        store.store_incoming(&mut tx, msg).unwrap();
    }
    tx.commit().unwrap();
}

/// Helper: drain a subscription until it goes quiet.
pub(super) fn drain(feed: &mut OutgoingMessages) -> Vec<Message> {
    let mut received = Vec::new();
    while let Ok(msg) = feed.recv_timeout(QUIET) {
        received.push(msg);
    }
    received
}

pub(super) fn ids(messages: &[Message]) -> Vec<Uuid> {
    messages.iter().map(|m| m.id).collect()
}
