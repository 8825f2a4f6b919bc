mod environment;
pub(crate) mod keys;
mod rocksdb;
mod traits;

pub use self::rocksdb::RocksDbStorage;
pub use environment::{Environment, ReadTransaction, WriteTransaction};
pub use traits::{Snapshot, Storage, WriteBatchOp};
