pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod notify;
pub mod storage;
pub mod store;
pub mod transaction;

pub use config::StoreConfig;
pub use error::{StorageError, StorageResult, StoreError, StoreResult};
pub use message::Message;
pub use notify::OutgoingMessages;
pub use storage::{Environment, RocksDbStorage, Storage, WriteBatchOp};
pub use store::{MessageStore, SendFailure};
pub use transaction::Transaction;
