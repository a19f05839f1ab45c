//! End-to-end duplicate queries against the persistent store.

use dupcheck::{
    fixture_records, DupChecker, IpKey, PersistentStore, Record, UserId, UserInfoStore,
};
use tempfile::tempdir;

fn open_checker(path: &std::path::Path) -> anyhow::Result<DupChecker> {
    Ok(DupChecker::new(PersistentStore::open(path)?))
}

#[test]
fn test_fixture_matrix_on_persistent_store() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let checker = open_checker(&dir.path().join("users.db"))?;
    checker.bulk_ingest(&fixture_records())?;

    let cases = [
        (1u64, 2u64, true),
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
            checker.is_duplicate(UserId(u1), UserId(u2))?,
            expected,
            "users {u1}/{u2}"
        );
    }
    Ok(())
}

#[test]
fn test_duplicates_survive_reopen() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("users.db");

    {
        let checker = open_checker(&path)?;
        checker.bulk_ingest(&fixture_records())?;
    }

    let checker = open_checker(&path)?;
    assert_eq!(checker.user_count()?, 4);
    assert!(checker.is_duplicate(UserId(1), UserId(2))?);
    assert!(!checker.is_duplicate(UserId(1), UserId(4))?);
    Ok(())
}

#[test]
fn test_bulk_equals_sequential_for_any_permutation() -> anyhow::Result<()> {
    let records = fixture_records();
    let mut reversed = records.clone();
    reversed.reverse();

    let dir = tempdir()?;
    let bulk = PersistentStore::open(dir.path().join("bulk.db"))?;
    bulk.bulk_upsert(&records)?;

    let sequential = PersistentStore::open(dir.path().join("seq.db"))?;
    for record in &reversed {
        sequential.upsert(record.user_id, record.ip)?;
    }

    for user in 1..=4u64 {
        let user = UserId(user);
        assert_eq!(bulk.user_info(user)?, sequential.user_info(user)?);
    }
    Ok(())
}

#[test]
fn test_union_is_order_and_batching_independent() -> anyhow::Result<()> {
    let records = vec![
        Record::new(UserId(9), IpKey(3)),
        Record::new(UserId(9), IpKey(1)),
        Record::new(UserId(9), IpKey(3)),
        Record::new(UserId(9), IpKey(2)),
        Record::new(UserId(9), IpKey(1)),
    ];

    let dir = tempdir()?;
    let split = PersistentStore::open(dir.path().join("split.db"))?;
    split.bulk_upsert(&records[..2])?;
    split.bulk_upsert(&records[2..])?;

    let whole = PersistentStore::open(dir.path().join("whole.db"))?;
    whole.bulk_upsert(&records)?;

    let expected: Vec<IpKey> = vec![IpKey(1), IpKey(2), IpKey(3)];
    for store in [&split, &whole] {
        let ips: Vec<IpKey> = store.user_info(UserId(9))?.ips.into_iter().collect();
        assert_eq!(ips, expected);
    }
    Ok(())
}

#[test]
fn test_reset_wipes_persistent_state() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("users.db");

    let checker = open_checker(&path)?;
    checker.bulk_ingest(&fixture_records())?;
    checker.reset()?;
    checker.reset()?;
    assert_eq!(checker.user_count()?, 0);

    // still usable after a wipe
    checker.ingest(Record::new(UserId(1), IpKey(7)))?;
    assert_eq!(checker.user_count()?, 1);
    Ok(())
}
