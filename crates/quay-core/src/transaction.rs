use uuid::Uuid;

use crate::error::StoreResult;
use crate::message::Message;
use crate::notify::Publisher;
use crate::storage::WriteTransaction;

/// A unit of work spanning any number of queue operations. Everything staged
/// becomes visible atomically on `commit`; `rollback`, or dropping the
/// transaction uncommitted, discards it all.
///
/// A transaction owns the store's single writer slot until it is closed.
/// Once committed or rolled back every further call fails with
/// `TransactionClosed`.
pub struct Transaction<'s> {
    writer: WriteTransaction<'s>,
    publisher: &'s Publisher,
    /// Outgoing messages to announce on commit, in staging order.
    outgoing: Vec<Message>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(writer: WriteTransaction<'s>, publisher: &'s Publisher) -> Self {
        Self {
            writer,
            publisher,
            outgoing: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_active()
    }

    /// Make every staged operation durable, then announce the committed
    /// outgoing messages to subscribers.
    pub fn commit(&mut self) -> StoreResult<()> {
        let committed = std::mem::take(&mut self.outgoing);
        let publisher = self.publisher;
        self.writer.commit_then(|| publisher.publish(&committed))?;
        Ok(())
    }

    pub fn rollback(&mut self) -> StoreResult<()> {
        self.outgoing.clear();
        self.writer.rollback()?;
        Ok(())
    }

    pub(crate) fn writer(&mut self) -> &mut WriteTransaction<'s> {
        &mut self.writer
    }

    /// Queue `message` for announcement on commit, replacing an earlier
    /// staging of the same id.
    pub(crate) fn announce(&mut self, message: Message) {
        match self.outgoing.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.outgoing.push(message),
        }
    }

    /// Withdraw an announcement for a message removed in this transaction.
    pub(crate) fn withdraw(&mut self, id: &Uuid) {
        self.outgoing.retain(|m| m.id != *id);
    }
}
