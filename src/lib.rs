//! # Dupcheck
//!
//! Duplicate-account detection over shared IP addresses.
//!
//! Access-log records (user id + source IP) are accumulated into a per-user
//! IP set inside an embedded key-value store; two accounts are flagged as
//! duplicates once their sets share at least a threshold number of distinct
//! addresses. The crate provides the record store, the set-intersection
//! engine, the service façade, and a batched ingestion pipeline. HTTP
//! serving and CLI wiring live outside.

pub mod config;
pub mod dedup;
pub mod error;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod store;

// Re-export main types for convenience
pub use config::{CheckerConfig, DetectConfig, ImportConfig, StoreConfig};
pub use dedup::{has_n_common, DEFAULT_DUPLICATE_THRESHOLD};
pub use error::{Error, Result};
pub use model::{IpKey, Record, UserId, UserInfo};
pub use persistence::PersistentStore;
pub use pipeline::{
    fixture_records, run_import, CancelToken, ImportStats, RecordGenerator, SyntheticParams,
};
pub use store::{MemoryStore, UserInfoStore};

/// Main API for duplicate checking: a thin façade over a store
/// implementation and the detection engine.
///
/// The store is injected as a capability at construction; the service adds
/// no state beyond the threshold and is safe to share across threads
/// (queries during ingestion read committed snapshots and never block on
/// the writer).
pub struct DupChecker {
    store: Box<dyn UserInfoStore>,
    threshold: usize,
}

impl DupChecker {
    /// Create a checker with the default duplicate threshold.
    pub fn new<S>(store: S) -> Self
    where
        S: UserInfoStore + 'static,
    {
        Self::with_threshold(store, DEFAULT_DUPLICATE_THRESHOLD)
    }

    /// Create a checker with an explicit duplicate threshold.
    pub fn with_threshold<S>(store: S, threshold: usize) -> Self
    where
        S: UserInfoStore + 'static,
    {
        Self {
            store: Box::new(store),
            threshold,
        }
    }

    /// The configured duplicate threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Ingest one observed record.
    pub fn ingest(&self, record: Record) -> Result<()> {
        self.store.upsert(record.user_id, record.ip)
    }

    /// Ingest a batch inside a single store transaction. The primary write
    /// path for throughput; batch size is the caller's trade-off.
    pub fn bulk_ingest(&self, records: &[Record]) -> Result<()> {
        self.store.bulk_upsert(records)
    }

    /// Whether two accounts share at least the threshold number of distinct
    /// IP addresses.
    ///
    /// A user never seen reads as an empty set and can only match a
    /// threshold of zero; genuine storage failures propagate. Symmetric in
    /// its arguments, and `is_duplicate(u, u)` is true exactly when `u` has
    /// at least the threshold count of distinct recorded addresses.
    pub fn is_duplicate(&self, u1: UserId, u2: UserId) -> Result<bool> {
        let first = self.store.user_info(u1)?;
        let second = self.store.user_info(u2)?;
        Ok(has_n_common(&first.ips, &second.ips, self.threshold))
    }

    /// The recorded aggregate for one user (empty if never seen).
    pub fn user_info(&self, user_id: UserId) -> Result<UserInfo> {
        self.store.user_info(user_id)
    }

    /// Number of users with recorded addresses, for health reporting.
    pub fn user_count(&self) -> Result<u64> {
        self.store.user_count()
    }

    /// Drop all recorded state. Test/reset paths only.
    pub fn reset(&self) -> Result<()> {
        self.store.wipe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_checker() -> DupChecker {
        let checker = DupChecker::new(MemoryStore::new());
        checker.bulk_ingest(&fixture_records()).unwrap();
        checker
    }

    #[test]
    fn test_fixture_duplicate_matrix() {
        let checker = fixture_checker();
        // (u1, u2, expected) with threshold 2
        let cases = [
            (1, 2, true),
            (1, 3, false),
            (2, 1, true),
            (2, 3, true),
            (3, 2, true),
            (1, 4, false),
            (3, 1, false),
            (1, 1, true),
        ];
        for (u1, u2, expected) in cases {
            assert_eq!(
                checker.is_duplicate(UserId(u1), UserId(u2)).unwrap(),
                expected,
                "users {u1}/{u2}"
            );
        }
    }

    #[test]
    fn test_self_duplicate_needs_threshold_ips() {
        let checker = fixture_checker();
        // user 4 has one address, user 2 has three
        assert!(!checker.is_duplicate(UserId(4), UserId(4)).unwrap());
        assert!(checker.is_duplicate(UserId(2), UserId(2)).unwrap());
    }

    #[test]
    fn test_unknown_users_are_not_duplicates() {
        let checker = fixture_checker();
        assert!(!checker.is_duplicate(UserId(1), UserId(100)).unwrap());
        assert!(!checker.is_duplicate(UserId(100), UserId(101)).unwrap());
    }

    #[test]
    fn test_zero_threshold_matches_everything() {
        let checker = DupChecker::with_threshold(MemoryStore::new(), 0);
        assert!(checker.is_duplicate(UserId(1), UserId(2)).unwrap());
    }

    #[test]
    fn test_single_ingest_matches_bulk() {
        let sequential = DupChecker::new(MemoryStore::new());
        for record in fixture_records() {
            sequential.ingest(record).unwrap();
        }
        let bulk = fixture_checker();
        for user in 1..=4u64 {
            assert_eq!(
                sequential.user_info(UserId(user)).unwrap(),
                bulk.user_info(UserId(user)).unwrap()
            );
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let checker = fixture_checker();
        assert_eq!(checker.user_count().unwrap(), 4);
        checker.reset().unwrap();
        assert_eq!(checker.user_count().unwrap(), 0);
        assert!(!checker.is_duplicate(UserId(1), UserId(2)).unwrap());
    }
}
