//! RocksDB-backed user-info store.
//!
//! One column family holds every user aggregate: key is the 8-byte
//! big-endian user id, value is the bincode-encoded [`UserInfo`]. Upserts
//! are read-modify-write cycles serialized by an internal mutex; batches
//! commit through a single `WriteBatch`, so readers observe either the
//! pre-batch or the fully-merged post-batch state and a failed batch leaves
//! nothing behind. No format versioning: a layout change means a rebuild
//! from source logs.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{IpKey, Record, UserId, UserInfo};
use crate::store::UserInfoStore;
use lru::LruCache;
use parking_lot::Mutex;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB,
};
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;
use std::path::Path;

const CF_USERS: &str = "users";

/// Durable store over an exclusively-owned RocksDB handle.
pub struct PersistentStore {
    db: DB,
    /// Read cache for hot user aggregates
    cache: Mutex<LruCache<UserId, UserInfo>>,
    /// Serializes read-modify-write upsert cycles. Readers never take it;
    /// they see the last committed write.
    write_lock: Mutex<()>,
}

impl PersistentStore {
    /// Open (or create) the store at `path` with default tuning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    /// Open (or create) the store at `path`.
    pub fn open_with_config(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let db = open_db(path, config)?;
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1)).expect("cache capacity");
        tracing::debug!(cache_capacity = capacity.get(), "opened user-info store");
        Ok(Self {
            db,
            cache: Mutex::new(LruCache::new(capacity)),
            write_lock: Mutex::new(()),
        })
    }

    fn users_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_USERS)
            .ok_or_else(|| Error::storage("missing users column family"))
    }

    /// Committed aggregate straight from cache or disk.
    fn read_user(&self, user_id: UserId) -> Result<UserInfo> {
        if let Some(info) = self.cache.lock().get(&user_id) {
            return Ok(info.clone());
        }

        let cf = self.users_cf()?;
        match self.db.get_cf(cf, user_id.to_bytes())? {
            Some(bytes) => {
                let info: UserInfo = bincode::deserialize(&bytes)?;
                self.cache.lock().put(user_id, info.clone());
                Ok(info)
            }
            None => Ok(UserInfo::empty(user_id)),
        }
    }
}

impl UserInfoStore for PersistentStore {
    fn upsert(&self, user_id: UserId, ip: IpKey) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut info = self.read_user(user_id)?;
        if !info.observe(ip) {
            // Address already recorded; nothing to write.
            return Ok(());
        }

        let cf = self.users_cf()?;
        let bytes = bincode::serialize(&info)?;
        self.db.put_cf(cf, user_id.to_bytes(), bytes)?;
        self.cache.lock().put(user_id, info);
        Ok(())
    }

    fn bulk_upsert(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();

        // Fold the batch into per-user merged aggregates, reading each
        // user's committed state once.
        let mut merged: FxHashMap<UserId, UserInfo> = FxHashMap::default();
        for record in records {
            if !merged.contains_key(&record.user_id) {
                let info = self.read_user(record.user_id)?;
                merged.insert(record.user_id, info);
            }
            merged
                .get_mut(&record.user_id)
                .expect("just inserted")
                .observe(record.ip);
        }

        let cf = self.users_cf()?;
        let mut batch = WriteBatch::default();
        for (user_id, info) in &merged {
            batch.put_cf(cf, user_id.to_bytes(), bincode::serialize(info)?);
        }
        // Single atomic commit: on failure nothing below reaches the cache
        // and the store keeps its pre-batch state.
        self.db.write(batch)?;

        let mut cache = self.cache.lock();
        for (user_id, info) in merged {
            cache.put(user_id, info);
        }
        Ok(())
    }

    fn user_info(&self, user_id: UserId) -> Result<UserInfo> {
        self.read_user(user_id)
    }

    fn user_count(&self) -> Result<u64> {
        let cf = self.users_cf()?;
        let mut count = 0u64;
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn wipe(&self) -> Result<()> {
        let _guard = self.write_lock.lock();

        let cf = self.users_cf()?;
        let keys: Vec<Vec<u8>> = self
            .db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|entry| entry.map(|(key, _)| key.to_vec()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if !keys.is_empty() {
            let mut batch = WriteBatch::default();
            for key in keys {
                batch.delete_cf(cf, key);
            }
            self.db.write(batch)?;
        }
        self.cache.lock().clear();
        tracing::info!("wiped user-info store");
        Ok(())
    }
}

fn open_db(path: impl AsRef<Path>, config: &StoreConfig) -> Result<DB> {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options.set_paranoid_checks(true);
    options.set_write_buffer_size(config.write_buffer_mb * 1024 * 1024);

    let cache = Cache::new_lru_cache(config.block_cache_mb * 1024 * 1024);
    let mut block_options = BlockBasedOptions::default();
    block_options.set_block_cache(&cache);
    options.set_block_based_table_factory(&block_options);

    let cfs = vec![ColumnFamilyDescriptor::new(CF_USERS, Options::default())];
    Ok(DB::open_cf_descriptors(&options, path, cfs)?)
}
