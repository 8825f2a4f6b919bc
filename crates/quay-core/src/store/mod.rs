use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::config::StoreConfig;
use crate::error::{StorageError, StoreError, StoreResult};
use crate::message::{now_ns, Message};
use crate::notify::{OutgoingMessages, Publisher};
use crate::storage::{keys, Environment};
use crate::transaction::Transaction;

/// Result of recording a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The message stays pending after `attempts` recorded failures.
    Pending { attempts: u32 },
    /// The final allowed attempt failed; the message was removed.
    Exhausted { attempts: u32 },
    /// The delivery deadline had passed; the message was removed without
    /// counting the attempt.
    Expired,
    /// No record existed, e.g. it was already acknowledged or purged.
    Absent,
}

impl SendFailure {
    /// The updated attempt count, or 0 when the message expired or was absent.
    pub fn attempts(&self) -> u32 {
        match self {
            SendFailure::Pending { attempts } | SendFailure::Exhausted { attempts } => *attempts,
            SendFailure::Expired | SendFailure::Absent => 0,
        }
    }

    /// Whether the message is no longer stored.
    pub fn is_removed(&self) -> bool {
        !matches!(self, SendFailure::Pending { .. })
    }
}

/// Durable store for a queue's outgoing and incoming messages.
///
/// Writers are serialized through the environment's single writer slot;
/// reads and the outgoing feed work from snapshots.
pub struct MessageStore {
    env: Arc<Environment>,
    publisher: Publisher,
}

impl MessageStore {
    /// Open a RocksDB-backed store as described by `config`.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let env = Environment::open(config)?;
        Ok(Self::new(Arc::new(env)))
    }

    /// Build a store over an already opened environment.
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            publisher: Publisher::default(),
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    // --- Queues ---

    /// Create the sub-stores backing `name`. Idempotent.
    #[tracing::instrument(skip(self))]
    pub fn create_queue(&self, name: &str) -> StoreResult<()> {
        if name.is_empty() {
            return Err(StoreError::InvalidQueueName(name.to_string()));
        }
        // The incoming store marks a complete queue, so it is created last.
        for store in [
            keys::outgoing_store(name),
            keys::outgoing_index_store(name),
            keys::incoming_store(name),
        ] {
            self.env.open_sub_store(&store)?;
        }
        info!(queue = name, "queue ready");
        Ok(())
    }

    /// Names of all created queues, sorted.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self
            .env
            .sub_stores()
            .iter()
            .filter_map(|store| keys::queue_from_incoming_store(store))
            .map(str::to_string)
            .collect();
        queues.sort();
        queues
    }

    // --- Transactions ---

    /// Begin a transaction, waiting for any active writer to finish.
    ///
    /// The writer slot is not reentrant: a thread holding a transaction must
    /// not call `create_queue`, `successfully_sent`, `failed_to_send` or
    /// `close` until it commits or rolls back.
    pub fn begin_transaction(&self) -> StoreResult<Transaction<'_>> {
        let writer = self.env.begin_write()?;
        Ok(Transaction::new(writer, &self.publisher))
    }

    /// Stage `message` into its queue's outgoing store.
    pub fn store_outgoing(&self, tx: &mut Transaction<'_>, message: &Message) -> StoreResult<()> {
        self.require_queue(&message.queue)?;
        let (key, value) = codec::encode(message)?;
        let out = keys::outgoing_store(&message.queue);
        let index = keys::outgoing_index_store(&message.queue);

        self.ensure_unique(tx, &message.id, &out)?;

        let writer = tx.writer();
        // Re-storing an id must not leave a stale index entry behind.
        if let Some(previous) = writer.get(&out, &key)? {
            let previous = codec::decode(&key, &previous)?;
            if previous.sent_at != message.sent_at {
                writer.delete(&index, &keys::sent_index_key(previous.sent_at, &message.id))?;
            }
        }
        writer.put(&out, &key, value)?;
        writer.put(
            &index,
            &keys::sent_index_key(message.sent_at, &message.id),
            Vec::new(),
        )?;
        tx.announce(message.clone());
        debug!(queue = %message.queue, msg_id = %message.id, "outgoing message staged");
        Ok(())
    }

    /// Stage `message` into its queue's incoming store.
    pub fn store_incoming(&self, tx: &mut Transaction<'_>, message: &Message) -> StoreResult<()> {
        self.require_queue(&message.queue)?;
        let (key, value) = codec::encode(message)?;
        let store = keys::incoming_store(&message.queue);
        self.ensure_unique(tx, &message.id, &store)?;
        tx.writer().put(&store, &key, value)?;
        debug!(queue = %message.queue, msg_id = %message.id, "incoming message staged");
        Ok(())
    }

    /// Stage removal of an incoming message the receiver has processed.
    /// Removing an absent message is a no-op.
    pub fn successfully_received(
        &self,
        tx: &mut Transaction<'_>,
        message: &Message,
    ) -> StoreResult<()> {
        self.require_queue(&message.queue)?;
        tx.writer().delete(
            &keys::incoming_store(&message.queue),
            &keys::message_key(&message.id),
        )?;
        Ok(())
    }

    /// Stage a move of a pending incoming message into `sub_queue` of its
    /// queue. Returns the message as it will be stored.
    pub fn move_to_sub_queue(
        &self,
        tx: &mut Transaction<'_>,
        message: &Message,
        sub_queue: &str,
    ) -> StoreResult<Message> {
        self.require_queue(&message.queue)?;
        let store = keys::incoming_store(&message.queue);
        let key = keys::message_key(&message.id);

        let writer = tx.writer();
        let stored = writer
            .get(&store, &key)?
            .ok_or(StoreError::MessageNotFound(message.id))?;
        let mut moved = codec::decode(&key, &stored)?;
        moved.sub_queue = Some(sub_queue.to_string());
        let (_, value) = codec::encode(&moved)?;
        writer.put(&store, &key, value)?;
        debug!(queue = %moved.queue, msg_id = %moved.id, sub_queue, "incoming message moved");
        Ok(moved)
    }

    // --- Delivery outcomes ---

    /// Acknowledge delivery: remove the outgoing record. Acknowledging a
    /// message that is already gone, including one whose queue does not
    /// exist, succeeds without doing anything.
    #[tracing::instrument(skip_all, fields(queue = %message.queue, msg_id = %message.id))]
    pub fn successfully_sent(&self, message: &Message) -> StoreResult<()> {
        let mut tx = self.begin_transaction()?;
        if !self.has_queue(&message.queue) {
            tx.rollback()?;
            debug!("queue unknown, nothing to acknowledge");
            return Ok(());
        }
        let removed = self.remove_outgoing(&mut tx, &message.queue, &message.id)?;
        tx.commit()?;
        if removed.is_some() {
            debug!("outgoing message delivered");
        } else {
            debug!("outgoing message already absent");
        }
        Ok(())
    }

    /// Record a failed delivery attempt and apply the retry policy.
    ///
    /// Works from the stored record rather than `message`, so interleaved
    /// failure reports never lose an increment. A message past its deadline
    /// is removed without counting the attempt; otherwise the attempt is
    /// counted and the message is removed once it reaches `max_attempts`.
    #[tracing::instrument(skip_all, fields(queue = %message.queue, msg_id = %message.id))]
    pub fn failed_to_send(&self, message: &Message) -> StoreResult<SendFailure> {
        let out = keys::outgoing_store(&message.queue);
        let key = keys::message_key(&message.id);

        let mut tx = self.begin_transaction()?;
        if !self.has_queue(&message.queue) {
            tx.rollback()?;
            debug!("queue unknown, failed message absent");
            return Ok(SendFailure::Absent);
        }
        let Some(value) = tx.writer().get(&out, &key)? else {
            tx.rollback()?;
            debug!("failed message already absent");
            return Ok(SendFailure::Absent);
        };
        let mut stored = codec::decode(&key, &value)?;

        let outcome = if stored.is_expired_at(now_ns()) {
            self.remove_outgoing(&mut tx, &stored.queue, &stored.id)?;
            SendFailure::Expired
        } else {
            stored.sent_attempts = stored.sent_attempts.saturating_add(1);
            let attempts = stored.sent_attempts;
            let (_, value) = codec::encode(&stored)?;
            tx.writer().put(&out, &key, value)?;

            if stored.attempts_exhausted(attempts) {
                self.remove_outgoing(&mut tx, &stored.queue, &stored.id)?;
                SendFailure::Exhausted { attempts }
            } else {
                SendFailure::Pending { attempts }
            }
        };
        tx.commit()?;

        match outcome {
            SendFailure::Pending { attempts } => debug!(attempts, "delivery failed, will retry"),
            SendFailure::Exhausted { attempts } => {
                warn!(attempts, "delivery attempts exhausted, message dropped")
            }
            SendFailure::Expired => warn!("delivery deadline passed, message dropped"),
            SendFailure::Absent => {}
        }
        Ok(outcome)
    }

    // --- Reads ---

    /// Subscribe to committed outgoing messages across every queue: first
    /// those pending right now in sent order, then each new commit as it
    /// happens.
    pub fn persisted_outgoing_messages(&self) -> StoreResult<OutgoingMessages> {
        // Register before scanning so nothing committed in between is missed;
        // the subscription drops the resulting duplicates.
        let live = self
            .publisher
            .subscribe()
            .ok_or(StorageError::StoreClosed)?;
        let backlog = self.scan_outgoing()?;
        debug!(backlog = backlog.len(), "outgoing subscription opened");
        Ok(OutgoingMessages::new(backlog, live))
    }

    /// Pending incoming messages of `queue`, in id order.
    pub fn persisted_incoming_messages(&self, queue: &str) -> StoreResult<Vec<Message>> {
        self.require_queue(queue)?;
        let store = keys::incoming_store(queue);
        self.env.read(|read| -> StoreResult<Vec<Message>> {
            read.scan(&store)?
                .iter()
                .map(|(key, value)| codec::decode(key, value))
                .collect()
        })
    }

    pub fn get_outgoing(&self, queue: &str, id: &Uuid) -> StoreResult<Option<Message>> {
        self.get(queue, &keys::outgoing_store(queue), id)
    }

    pub fn get_incoming(&self, queue: &str, id: &Uuid) -> StoreResult<Option<Message>> {
        self.get(queue, &keys::incoming_store(queue), id)
    }

    /// Shut the store down: wait for the active writer, flush and release the
    /// storage, and end every outgoing subscription. Later operations fail
    /// with `StoreClosed`; the data directory can be reopened right away.
    pub fn close(&self) -> StoreResult<()> {
        self.env.close()?;
        self.publisher.close();
        info!("message store closed");
        Ok(())
    }

    fn get(&self, queue: &str, store: &str, id: &Uuid) -> StoreResult<Option<Message>> {
        self.require_queue(queue)?;
        let key = keys::message_key(id);
        self.env.read(|read| -> StoreResult<Option<Message>> {
            read.get(store, &key)?
                .map(|value| codec::decode(&key, &value))
                .transpose()
        })
    }

    /// Fail if `id` is already stored anywhere in the store other than
    /// `target`. Re-storing into `target` rewrites the record in place.
    fn ensure_unique(
        &self,
        tx: &mut Transaction<'_>,
        id: &Uuid,
        target: &str,
    ) -> StoreResult<()> {
        let key = keys::message_key(id);
        let writer = tx.writer();
        for queue in self.queues() {
            for store in [keys::outgoing_store(&queue), keys::incoming_store(&queue)] {
                if store != target && writer.get(&store, &key)?.is_some() {
                    return Err(StoreError::DuplicateMessage { id: *id, queue });
                }
            }
        }
        Ok(())
    }

    /// Stage removal of an outgoing record and its index entry. Returns the
    /// removed record, or `None` if it was not stored.
    fn remove_outgoing(
        &self,
        tx: &mut Transaction<'_>,
        queue: &str,
        id: &Uuid,
    ) -> StoreResult<Option<Message>> {
        self.require_queue(queue)?;
        let out = keys::outgoing_store(queue);
        let key = keys::message_key(id);

        let writer = tx.writer();
        let Some(value) = writer.get(&out, &key)? else {
            return Ok(None);
        };
        let stored = codec::decode(&key, &value)?;
        writer.delete(&out, &key)?;
        writer.delete(
            &keys::outgoing_index_store(queue),
            &keys::sent_index_key(stored.sent_at, id),
        )?;
        tx.withdraw(id);
        Ok(Some(stored))
    }

    fn scan_outgoing(&self) -> StoreResult<Vec<Message>> {
        let queues = self.queues();
        let mut pending = self.env.read(|read| -> StoreResult<Vec<_>> {
            let mut pending = Vec::new();
            for queue in &queues {
                let out = keys::outgoing_store(queue);
                for (index_key, _) in read.scan(&keys::outgoing_index_store(queue))? {
                    let (sent_at, id) = keys::parse_sent_index_key(&index_key).ok_or_else(|| {
                        codec::corrupt(&index_key, "malformed sent-time index key")
                    })?;
                    let key = keys::message_key(&id);
                    let value = read
                        .get(&out, &key)?
                        .ok_or_else(|| codec::corrupt(&key, "index entry without record"))?;
                    pending.push(((sent_at, id), codec::decode(&key, &value)?));
                }
            }
            Ok(pending)
        })?;
        pending.sort_by_key(|(order, _)| *order);
        Ok(pending.into_iter().map(|(_, msg)| msg).collect())
    }

    fn has_queue(&self, queue: &str) -> bool {
        self.env.has_sub_store(&keys::incoming_store(queue))
    }

    fn require_queue(&self, queue: &str) -> StoreResult<()> {
        if !self.has_queue(queue) {
            return Err(StoreError::QueueNotFound(queue.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
