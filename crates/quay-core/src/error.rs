/// Low-level storage errors (RocksDB, transactions, environment lifecycle).
/// This is the error type for the `Storage` trait and the `Environment` —
/// storage operations can only fail with infrastructure errors, never domain
/// errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The engine could not be opened or failed irrecoverably.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("sub-store not found: {0}")]
    SubStoreNotFound(String),

    #[error("transaction already committed or rolled back")]
    TransactionClosed,

    #[error("store closed")]
    StoreClosed,
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Unavailable(err.into_string())
    }
}

/// Message store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored value could not be decoded. Surfaced rather than skipped.
    #[error("corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(uuid::Uuid),

    /// Ids are unique across every queue of the store.
    #[error("message {id} already stored in queue {queue}")]
    DuplicateMessage { id: uuid::Uuid, queue: String },

    #[error("invalid queue name: {0:?}")]
    InvalidQueueName(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

