//! Live feed of committed outgoing messages.
//!
//! A subscription merges a one-shot catch-up scan with a per-subscriber
//! channel fed at commit time, de-duplicating by id across the two.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::debug;
use uuid::Uuid;

use crate::message::Message;

/// Fan-out of committed outgoing messages to every live subscriber.
#[derive(Default)]
pub(crate) struct Publisher {
    subscribers: Mutex<Subscribers>,
}

#[derive(Default)]
struct Subscribers {
    senders: Vec<Sender<Message>>,
    closed: bool,
}

impl Publisher {
    /// Register a subscriber. Everything published from now on reaches it.
    /// Returns `None` once the publisher is closed.
    pub(crate) fn subscribe(&self) -> Option<Receiver<Message>> {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.closed {
            return None;
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        subscribers.senders.push(tx);
        Some(rx)
    }

    /// Deliver `messages`, in order, to every subscriber. Subscribers whose
    /// receiving end has been dropped are pruned.
    pub(crate) fn publish(&self, messages: &[Message]) {
        if messages.is_empty() {
            return;
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let senders = &mut subscribers.senders;
        let before = senders.len();
        senders.retain(|tx| messages.iter().all(|msg| tx.send(msg.clone()).is_ok()));
        if senders.len() < before {
            debug!(pruned = before - senders.len(), "dropped closed subscribers");
        }
    }

    /// Disconnect every subscriber and refuse new ones; existing sequences
    /// end once drained.
    pub(crate) fn close(&self) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.closed = true;
        subscribers.senders.clear();
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }
}

/// An unbounded sequence of committed outgoing messages: first everything
/// pending when the subscription began, then each message as it commits.
///
/// Iterating blocks until the next message arrives and ends only when the
/// store closes. Dropping the subscription unsubscribes.
pub struct OutgoingMessages {
    backlog: VecDeque<Message>,
    /// Ids from the catch-up scan not yet seen on the live channel.
    backlog_ids: HashSet<Uuid>,
    live: Receiver<Message>,
}

impl OutgoingMessages {
    pub(crate) fn new(backlog: Vec<Message>, live: Receiver<Message>) -> Self {
        let backlog_ids = backlog.iter().map(|msg| msg.id).collect();
        Self {
            backlog: backlog.into(),
            backlog_ids,
            live,
        }
    }

    /// Next message without blocking.
    pub fn try_next(&mut self) -> Result<Message, TryRecvError> {
        if let Some(msg) = self.backlog.pop_front() {
            return Ok(msg);
        }
        loop {
            let msg = self.live.try_recv()?;
            if self.is_fresh(&msg) {
                return Ok(msg);
            }
        }
    }

    /// Next message, waiting at most `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Message, RecvTimeoutError> {
        if let Some(msg) = self.backlog.pop_front() {
            return Ok(msg);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let msg = self.live.recv_deadline(deadline)?;
            if self.is_fresh(&msg) {
                return Ok(msg);
            }
        }
    }

    /// Number of catch-up messages not yet yielded.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn is_fresh(&mut self, msg: &Message) -> bool {
        // Ids are never reused, so each backlog id is skipped at most once.
        !self.backlog_ids.remove(&msg.id)
    }
}

impl Iterator for OutgoingMessages {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }
        loop {
            let msg = self.live.recv().ok()?;
            if self.is_fresh(&msg) {
                return Some(msg);
            }
        }
    }
}
