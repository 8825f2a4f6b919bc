use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, SnapshotWithThreadMode, WriteBatch, WriteOptions, DEFAULT_COLUMN_FAMILY_NAME,
};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{Snapshot, Storage, WriteBatchOp};

type DB = DBWithThreadMode<MultiThreaded>;

/// RocksDB-backed storage. Each sub-store is a column family; column
/// families created at runtime are rediscovered when the database reopens.
pub struct RocksDbStorage {
    /// `None` once closed. Snapshot reads hold the read side for their whole
    /// lifetime, so `close` waits for them.
    db: RwLock<Option<DB>>,
    sub_stores: RwLock<BTreeSet<String>>,
    sync_writes: bool,
}

impl RocksDbStorage {
    /// Open or create a database at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_at(path.as_ref(), &StoreConfig::default())
    }

    /// Open or create the database described by `config`.
    pub fn open_with_config(config: &StoreConfig) -> StorageResult<Self> {
        Self::open_at(&config.data_dir, config)
    }

    fn open_at(path: &Path, config: &StoreConfig) -> StorageResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(config.create_if_missing);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);

        // A fresh directory has no column family list yet.
        let existing: BTreeSet<String> = DB::list_cf(&db_opts, path)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name != DEFAULT_COLUMN_FAMILY_NAME)
            .collect();

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = existing
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        info!(path = %path.display(), sub_stores = existing.len(), "storage opened");

        Ok(Self {
            db: RwLock::new(Some(db)),
            sub_stores: RwLock::new(existing),
            sync_writes: config.sync_writes,
        })
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(StorageError::StoreClosed)?;
        f(db)
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> StorageResult<Arc<BoundColumnFamily<'a>>> {
    db.cf_handle(name)
        .ok_or_else(|| StorageError::SubStoreNotFound(name.to_string()))
}

impl Storage for RocksDbStorage {
    fn create_sub_store(&self, name: &str) -> StorageResult<()> {
        let mut sub_stores = self
            .sub_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sub_stores.contains(name) {
            return Ok(());
        }
        self.with_db(|db| Ok(db.create_cf(name, &Options::default())?))?;
        sub_stores.insert(name.to_string());
        debug!(sub_store = name, "sub-store created");
        Ok(())
    }

    fn has_sub_store(&self, name: &str) -> bool {
        self.sub_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    fn sub_stores(&self) -> Vec<String> {
        self.sub_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn get(&self, store: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.with_db(|db| {
            let cf = cf_handle(db, store)?;
            Ok(db.get_cf(&cf, key)?)
        })
    }

    fn with_snapshot(
        &self,
        read: &mut dyn FnMut(&dyn Snapshot) -> StorageResult<()>,
    ) -> StorageResult<()> {
        self.with_db(|db| {
            let snapshot = RocksDbSnapshot {
                db,
                snapshot: db.snapshot(),
            };
            read(&snapshot)
        })
    }

    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()> {
        self.with_db(|db| {
            let mut batch = WriteBatch::default();

            for op in ops {
                match op {
                    WriteBatchOp::Put { store, key, value } => {
                        let cf = cf_handle(db, &store)?;
                        batch.put_cf(&cf, &key, &value);
                    }
                    WriteBatchOp::Delete { store, key } => {
                        let cf = cf_handle(db, &store)?;
                        batch.delete_cf(&cf, &key);
                    }
                }
            }

            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(self.sync_writes);
            db.write_opt(batch, &write_opts)?;
            Ok(())
        })
    }

    fn close(&self) -> StorageResult<()> {
        let db = self
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(db) = db else {
            return Ok(());
        };
        db.flush_wal(true)?;
        // Dropping the handle releases the directory lock.
        drop(db);
        info!("storage closed");
        Ok(())
    }
}

struct RocksDbSnapshot<'a> {
    db: &'a DB,
    snapshot: SnapshotWithThreadMode<'a, DB>,
}

impl Snapshot for RocksDbSnapshot<'_> {
    fn get(&self, store: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let cf = cf_handle(self.db, store)?;
        Ok(self.snapshot.get_cf(&cf, key)?)
    }

    fn scan(&self, store: &str) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = cf_handle(self.db, store)?;
        let mut results = Vec::new();
        for item in self.snapshot.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}
