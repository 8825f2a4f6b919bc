use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::rocksdb::RocksDbStorage;
use crate::storage::traits::{Snapshot, Storage, WriteBatchOp};

/// Process-wide handle over a `Storage`. Serializes writers and hands out
/// snapshot readers. Must be closed explicitly on shutdown; afterwards no
/// transaction can begin.
pub struct Environment {
    storage: Arc<dyn Storage>,
    /// Held by the active write transaction from begin to commit/rollback.
    writer: Mutex<()>,
    closed: AtomicBool,
}

impl Environment {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            writer: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Open the RocksDB-backed environment described by `config`.
    pub fn open(config: &StoreConfig) -> StorageResult<Self> {
        let storage = RocksDbStorage::open_with_config(config)?;
        Ok(Self::new(Arc::new(storage)))
    }

    /// Create or open a named sub-store. Idempotent.
    pub fn open_sub_store(&self, name: &str) -> StorageResult<()> {
        let _guard = self.lock_writer()?;
        self.storage.create_sub_store(name)
    }

    pub fn has_sub_store(&self, name: &str) -> bool {
        self.storage.has_sub_store(name)
    }

    pub fn sub_stores(&self) -> Vec<String> {
        self.storage.sub_stores()
    }

    /// Run `read` against a snapshot taken now. Snapshot reads never block
    /// on, and never block, a writer; `close` waits for them to finish.
    pub fn read<T, E>(
        &self,
        read: impl FnOnce(&ReadTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        self.ensure_open()?;
        let mut read = Some(read);
        let mut result = None;
        self.storage.with_snapshot(&mut |snapshot: &dyn Snapshot| {
            if let Some(read) = read.take() {
                result = Some(read(&ReadTransaction { snapshot }));
            }
            Ok(())
        })?;
        result.unwrap_or_else(|| Err(StorageError::StoreClosed.into()))
    }

    /// Begin a write transaction, blocking until the active writer finishes.
    pub fn begin_write(&self) -> StorageResult<WriteTransaction<'_>> {
        let guard = self.lock_writer()?;
        Ok(WriteTransaction {
            env: self,
            guard: Some(guard),
            ops: Vec::new(),
            staged: HashMap::new(),
        })
    }

    /// Wait for the active writer and in-flight reads, then flush and
    /// release the storage so its directory can be reopened. Further
    /// transactions fail with `StoreClosed`. Closing twice is a no-op.
    ///
    /// Must not be called from a thread that holds a write transaction or is
    /// inside `read`.
    pub fn close(&self) -> StorageResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.storage.close()?;
        info!("storage environment closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::StoreClosed);
        }
        Ok(())
    }

    fn lock_writer(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.ensure_open()?;
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // The environment may have closed while we waited.
        self.ensure_open()?;
        Ok(guard)
    }
}

/// A point-in-time view of the environment, valid for one `read` call.
pub struct ReadTransaction<'a> {
    snapshot: &'a dyn Snapshot,
}

impl ReadTransaction<'_> {
    pub fn get(&self, store: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.snapshot.get(store, key)
    }

    pub fn scan(&self, store: &str) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.snapshot.scan(store)
    }
}

/// The single active writer. Mutations are staged in memory and applied as
/// one atomic batch on commit; reads see the transaction's own staged writes.
/// Dropping an active transaction rolls it back.
pub struct WriteTransaction<'env> {
    env: &'env Environment,
    guard: Option<MutexGuard<'env, ()>>,
    ops: Vec<WriteBatchOp>,
    /// Latest staged value per `(store, key)`; `None` marks a staged delete.
    staged: HashMap<(String, Vec<u8>), Option<Vec<u8>>>,
}

impl WriteTransaction<'_> {
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    pub fn get(&self, store: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.ensure_active()?;
        if let Some(value) = self.staged.get(&(store.to_string(), key.to_vec())) {
            return Ok(value.clone());
        }
        self.env.storage.get(store, key)
    }

    pub fn put(&mut self, store: &str, key: &[u8], value: Vec<u8>) -> StorageResult<()> {
        self.stage(WriteBatchOp::Put {
            store: store.to_string(),
            key: key.to_vec(),
            value,
        })
    }

    pub fn delete(&mut self, store: &str, key: &[u8]) -> StorageResult<()> {
        self.stage(WriteBatchOp::Delete {
            store: store.to_string(),
            key: key.to_vec(),
        })
    }

    /// Apply every staged operation atomically and release the writer slot.
    /// The transaction is closed afterwards whether or not the write succeeded.
    pub fn commit(&mut self) -> StorageResult<()> {
        self.commit_then(|| {})
    }

    /// Like `commit`, running `on_commit` after the batch is durable but
    /// before the writer slot is released, so hooks observe commit order.
    pub fn commit_then(&mut self, on_commit: impl FnOnce()) -> StorageResult<()> {
        let guard = self.guard.take().ok_or(StorageError::TransactionClosed)?;
        self.staged.clear();
        let ops = std::mem::take(&mut self.ops);
        let count = ops.len();
        if !ops.is_empty() {
            self.env.storage.write_batch(ops)?;
        }
        on_commit();
        drop(guard);
        debug!(ops = count, "transaction committed");
        Ok(())
    }

    /// Discard every staged operation and release the writer slot.
    pub fn rollback(&mut self) -> StorageResult<()> {
        let guard = self.guard.take().ok_or(StorageError::TransactionClosed)?;
        let count = self.ops.len();
        self.ops.clear();
        self.staged.clear();
        drop(guard);
        debug!(ops = count, "transaction rolled back");
        Ok(())
    }

    fn stage(&mut self, op: WriteBatchOp) -> StorageResult<()> {
        self.ensure_active()?;
        if !self.env.storage.has_sub_store(op.store()) {
            return Err(StorageError::SubStoreNotFound(op.store().to_string()));
        }
        let value = match &op {
            WriteBatchOp::Put { value, .. } => Some(value.clone()),
            WriteBatchOp::Delete { .. } => None,
        };
        self.staged
            .insert((op.store().to_string(), op.key().to_vec()), value);
        self.ops.push(op);
        Ok(())
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.guard.is_none() {
            return Err(StorageError::TransactionClosed);
        }
        Ok(())
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.guard.is_some() && !self.ops.is_empty() {
            debug!(ops = self.ops.len(), "transaction dropped without commit, rolling back");
        }
    }
}
