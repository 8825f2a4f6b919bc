use crate::error::StorageResult;

/// Represents a single operation in an atomic write batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteBatchOp {
    Put {
        store: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        store: String,
        key: Vec<u8>,
    },
}

impl WriteBatchOp {
    pub fn store(&self) -> &str {
        match self {
            WriteBatchOp::Put { store, .. } | WriteBatchOp::Delete { store, .. } => store,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            WriteBatchOp::Put { key, .. } | WriteBatchOp::Delete { key, .. } => key,
        }
    }
}

/// Durable, ordered key-value engine with named sub-stores.
/// Implementations must be thread-safe.
pub trait Storage: Send + Sync {
    // --- Sub-store operations ---

    /// Create a named sub-store. No-op if it already exists.
    fn create_sub_store(&self, name: &str) -> StorageResult<()>;

    fn has_sub_store(&self, name: &str) -> bool;

    /// Names of all sub-stores, sorted.
    fn sub_stores(&self) -> Vec<String>;

    // --- Reads ---

    /// Read the latest committed value for a key.
    fn get(&self, store: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Run `read` against a point-in-time snapshot. Writes committed after
    /// the snapshot is taken are never visible through it.
    fn with_snapshot(
        &self,
        read: &mut dyn FnMut(&dyn Snapshot) -> StorageResult<()>,
    ) -> StorageResult<()>;

    // --- Writes ---

    /// Atomically apply a batch of write operations across sub-stores.
    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()>;

    // --- Lifecycle ---

    /// Flush the write-ahead log and release the engine, waiting for
    /// in-flight snapshot reads. Afterwards every read and write fails with
    /// `StoreClosed`. Closing twice is a no-op.
    fn close(&self) -> StorageResult<()>;
}

/// A consistent read-only view of a `Storage` at one point in time.
pub trait Snapshot {
    fn get(&self, store: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// All key-value pairs of a sub-store, in key order.
    fn scan(&self, store: &str) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
}
