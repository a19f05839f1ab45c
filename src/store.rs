//! # Store Module
//!
//! The `UserInfoStore` capability trait and an in-memory implementation.
//! The durable RocksDB-backed store lives in [`crate::persistence`].

use crate::error::Result;
use crate::model::{IpKey, Record, UserId, UserInfo};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Storage capability for per-user IP sets.
///
/// Implementations must tolerate concurrent callers: queries arriving while
/// an ingestion pipeline is writing observe either the pre-write or the
/// fully-merged post-write aggregate, never an intermediate state.
pub trait UserInfoStore: Send + Sync {
    /// Create-if-absent-else-merge: add `ip` to the user's set. No-op when
    /// the address is already present. Atomic with respect to concurrent
    /// calls on the same or different users.
    fn upsert(&self, user_id: UserId, ip: IpKey) -> Result<()>;

    /// Apply every record's union-merge inside a single atomic write.
    /// Either the whole batch commits or none of it does.
    fn bulk_upsert(&self, records: &[Record]) -> Result<()>;

    /// The user's aggregate. A user never seen yields an empty set, not an
    /// error; "unknown user" and "user with zero IPs" are indistinguishable.
    fn user_info(&self, user_id: UserId) -> Result<UserInfo>;

    /// Number of users with at least one recorded address.
    fn user_count(&self) -> Result<u64>;

    /// Delete all persisted state. Idempotent; test/reset paths only.
    fn wipe(&self) -> Result<()>;
}

/// In-memory store. Backs service-level tests and short-lived tooling;
/// production ingestion goes through [`crate::persistence::PersistentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, BTreeSet<IpKey>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserInfoStore for MemoryStore {
    fn upsert(&self, user_id: UserId, ip: IpKey) -> Result<()> {
        self.users.write().entry(user_id).or_default().insert(ip);
        Ok(())
    }

    fn bulk_upsert(&self, records: &[Record]) -> Result<()> {
        // Single write-lock scope: the whole batch becomes visible at once.
        let mut users = self.users.write();
        for record in records {
            users.entry(record.user_id).or_default().insert(record.ip);
        }
        Ok(())
    }

    fn user_info(&self, user_id: UserId) -> Result<UserInfo> {
        let users = self.users.read();
        Ok(match users.get(&user_id) {
            Some(ips) => UserInfo {
                user_id,
                ips: ips.clone(),
            },
            None => UserInfo::empty(user_id),
        })
    }

    fn user_count(&self) -> Result<u64> {
        Ok(self.users.read().len() as u64)
    }

    fn wipe(&self) -> Result<()> {
        self.users.write().clear();
        Ok(())
    }
}
