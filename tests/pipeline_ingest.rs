//! Full pipeline runs against the persistent store: generator, channel,
//! batch writer, cancellation.

use dupcheck::{
    run_import, CancelToken, DupChecker, ImportConfig, PersistentStore, RecordGenerator,
    SyntheticParams, UserId,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tempfile::tempdir;

fn init_logs() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn small_import_config() -> ImportConfig {
    ImportConfig {
        batch_size: 64,
        channel_capacity: 16,
        ..ImportConfig::default()
    }
}

#[test]
fn test_fixture_import_end_to_end() -> anyhow::Result<()> {
    init_logs();
    let dir = tempdir()?;
    let checker = DupChecker::new(PersistentStore::open(dir.path().join("users.db"))?);

    let stats = run_import(
        &checker,
        RecordGenerator::fixture(),
        &small_import_config(),
        CancelToken::new(),
    )?;

    assert_eq!(stats.records, 8);
    assert_eq!(checker.user_count()?, 4);
    assert!(checker.is_duplicate(UserId(1), UserId(2))?);
    assert!(checker.is_duplicate(UserId(2), UserId(3))?);
    assert!(!checker.is_duplicate(UserId(1), UserId(3))?);
    assert!(!checker.is_duplicate(UserId(1), UserId(4))?);
    Ok(())
}

#[test]
fn test_synthetic_import_persists_exact_union() -> anyhow::Result<()> {
    let params = SyntheticParams {
        users: 40,
        ips_per_user_max: 6,
        requests_per_user_max: 50,
        requests_mean: 20.0,
        ip_ring_size: 30,
    };
    let seed = 1234;

    // replay the same deterministic sequence to compute the expected unions
    let replay =
        RecordGenerator::synthetic(params.clone(), StdRng::seed_from_u64(seed)).spawn(
            16,
            CancelToken::new(),
        );
    let mut expected: BTreeMap<UserId, BTreeSet<_>> = BTreeMap::new();
    let mut total = 0u64;
    for record in replay.records().iter() {
        expected.entry(record.user_id).or_default().insert(record.ip);
        total += 1;
    }
    replay.join();
    assert!(total > 0);

    let dir = tempdir()?;
    let checker = DupChecker::new(PersistentStore::open(dir.path().join("users.db"))?);
    let stats = run_import(
        &checker,
        RecordGenerator::synthetic(params, StdRng::seed_from_u64(seed)),
        &small_import_config(),
        CancelToken::new(),
    )?;

    assert_eq!(stats.records, total);
    assert_eq!(checker.user_count()? as usize, expected.len());
    for (user, ips) in expected {
        assert_eq!(checker.user_info(user)?.ips, ips, "user {user}");
    }
    Ok(())
}

#[test]
fn test_cancellation_terminates_import_cleanly() -> anyhow::Result<()> {
    init_logs();
    let dir = tempdir()?;
    let checker = DupChecker::new(PersistentStore::open(dir.path().join("users.db"))?);

    let params = SyntheticParams {
        users: u64::MAX,
        ..SyntheticParams::default()
    };
    let cancel = CancelToken::new();

    let err = std::thread::scope(|scope| {
        let canceller = cancel.clone();
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });
        run_import(
            &checker,
            RecordGenerator::synthetic(params, StdRng::seed_from_u64(5)),
            &ImportConfig {
                batch_size: 256,
                channel_capacity: 64,
                ..ImportConfig::default()
            },
            cancel,
        )
        .unwrap_err()
    });

    assert!(err.is_cancelled());
    // committed batches stay readable; nothing is torn
    let _ = checker.user_count()?;
    Ok(())
}

#[test]
fn test_queries_run_during_ingestion() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let checker = DupChecker::new(PersistentStore::open(dir.path().join("users.db"))?);

    let params = SyntheticParams {
        users: 60,
        ips_per_user_max: 5,
        requests_per_user_max: 40,
        requests_mean: 15.0,
        ip_ring_size: 25,
    };
    let config = ImportConfig {
        batch_size: 32,
        channel_capacity: 8,
        ..ImportConfig::default()
    };

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let reader = scope.spawn(|| {
            // hammer queries while the writer is committing batches
            for i in 0..200u64 {
                let lhs = UserId(1 + i % 50);
                let rhs = UserId(1 + (i * 7) % 50);
                checker.is_duplicate(lhs, rhs).unwrap();
            }
        });

        run_import(
            &checker,
            RecordGenerator::synthetic(params, StdRng::seed_from_u64(11)),
            &config,
            CancelToken::new(),
        )?;
        reader.join().unwrap();
        Ok(())
    })?;

    assert!(checker.user_count()? > 0);
    Ok(())
}
