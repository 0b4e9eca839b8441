//! Key-value stores for the recovery log

use crate::domain::KVStoreError;
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory key-value store.
///
/// Clones share the same map, so a second handle observes what a restarted
/// node would read back.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKVStore {
    data: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.write().remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        // one write lock covers the whole batch
        let mut data = self.data.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.read().contains_key(key))
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::{RocksDbConfig, RocksDbStore};

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::*;
    use rocksdb::{Options, WriteBatch, WriteOptions, DB};

    /// RocksDB configuration
    #[derive(Debug, Clone)]
    pub struct RocksDbConfig {
        /// Path to the database directory
        pub path: String,
        /// Block cache size in bytes (default: 8MB, the log is tiny)
        pub block_cache_size: usize,
        /// Enable fsync after each write (default: true for durability)
        pub sync_writes: bool,
    }

    impl Default for RocksDbConfig {
        fn default() -> Self {
            Self {
                path: "./data/blkverify".to_string(),
                block_cache_size: 8 * 1024 * 1024,
                sync_writes: true,
            }
        }
    }

    impl RocksDbConfig {
        /// Create config for testing (no sync)
        pub fn for_testing(path: impl Into<String>) -> Self {
            Self {
                path: path.into(),
                block_cache_size: 1024 * 1024,
                sync_writes: false,
            }
        }
    }

    /// RocksDB-backed key-value store
    pub struct RocksDbStore {
        db: Arc<RwLock<DB>>,
        config: RocksDbConfig,
    }

    impl RocksDbStore {
        /// Open or create a RocksDB database
        pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

            let mut block_opts = rocksdb::BlockBasedOptions::default();
            block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
            opts.set_block_based_table_factory(&block_opts);

            let db = DB::open(&opts, &config.path).map_err(|e| KVStoreError::IOError {
                message: format!("Failed to open RocksDB: {}", e),
            })?;

            Ok(Self {
                db: Arc::new(RwLock::new(db)),
                config,
            })
        }

        fn write_options(&self) -> WriteOptions {
            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(self.config.sync_writes);
            write_opts
        }
    }

    impl KeyValueStore for RocksDbStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
            let db = self.db.read();
            db.get(key).map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB get failed: {}", e),
            })
        }

        fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
            let db = self.db.write();
            db.put_opt(key, value, &self.write_options())
                .map_err(|e| KVStoreError::IOError {
                    message: format!("RocksDB put failed: {}", e),
                })
        }

        fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
            let db = self.db.write();
            db.delete_opt(key, &self.write_options())
                .map_err(|e| KVStoreError::IOError {
                    message: format!("RocksDB delete failed: {}", e),
                })
        }

        fn atomic_batch_write(
            &mut self,
            operations: Vec<BatchOperation>,
        ) -> Result<(), KVStoreError> {
            let db = self.db.write();
            let mut batch = WriteBatch::default();
            for op in operations {
                match op {
                    BatchOperation::Put { key, value } => batch.put(&key, &value),
                    BatchOperation::Delete { key } => batch.delete(&key),
                }
            }
            db.write_opt(batch, &self.write_options())
                .map_err(|e| KVStoreError::IOError {
                    message: format!("RocksDB batch write failed: {}", e),
                })
        }

        fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
            let db = self.db.read();
            db.get_pinned(key)
                .map(|v| v.is_some())
                .map_err(|e| KVStoreError::IOError {
                    message: format!("RocksDB exists check failed: {}", e),
                })
        }
    }

}
