use super::*;
use medkit_core::Error;
use medkit_test_utils::{ManualClock, SESSION_1, SESSION_2};
use std::time::Duration;

fn manager(clock: &ManualClock) -> LockManager {
    LockManager::new(LockConfig::default(), Arc::new(clock.clone()))
}

#[test]
fn held_lock_blocks_other_sessions_until_released() {
    let clock = ManualClock::fixed();
    let locks = manager(&clock);
    let id = locks.acquire_lock("bulk-add", SESSION_1).unwrap();
    match locks.acquire_lock("bulk-add", SESSION_2).unwrap_err() {
        Error::LockHeld { operation, holder } => {
            assert_eq!(operation, "bulk-add");
            assert_eq!(holder.as_str(), SESSION_1);
        }
        e => panic!("unexpected error {e:?}"),
    }
    // Other operations are independent
    locks.acquire_lock("bulk-update", SESSION_2).unwrap();

    assert!(!locks.release_lock("bulk-add", SESSION_2).unwrap());
    assert!(locks.release_lock("bulk-add", SESSION_1).unwrap());
    assert!(!locks.release_lock("bulk-add", SESSION_1).unwrap());
    let other = locks.acquire_lock("bulk-add", SESSION_2).unwrap();
    assert_ne!(id, other);
}

#[test]
fn same_session_reenters_without_duplicating() {
    let clock = ManualClock::fixed();
    let locks = manager(&clock);
    let a = locks.acquire_lock("seed-database", SESSION_1).unwrap();
    clock.advance(Duration::from_secs(10));
    let b = locks.acquire_lock("seed-database", SESSION_1).unwrap();
    assert_eq!(a, b);
    let status = locks.lock_status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].id, a);
    assert_eq!(status[0].session_id.as_str(), SESSION_1);
}

#[test]
fn expired_lock_is_reclaimed_by_another_session() {
    let clock = ManualClock::fixed();
    let locks = manager(&clock);
    locks.acquire_lock("clear-all", SESSION_1).unwrap();
    clock.advance(Duration::from_secs(5 * 60 - 1));
    locks.acquire_lock("clear-all", SESSION_2).unwrap_err();
    clock.advance(Duration::from_secs(1));
    let id = locks.acquire_lock("clear-all", SESSION_2).unwrap();
    let status = locks.lock_status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].id, id);
    assert_eq!(status[0].session_id.as_str(), SESSION_2);
    // The previous holder lost it
    assert!(!locks.release_lock("clear-all", SESSION_1).unwrap());
}

#[test]
fn arguments_are_validated() {
    let locks = manager(&ManualClock::fixed());
    for (op, session) in [
        ("", SESSION_1),
        (&*"x".repeat(51), SESSION_1),
        ("bulk add", SESSION_1),
        ("bulk-add", "a"),
        ("bulk-add", "no spaces here"),
    ] {
        assert!(
            matches!(
                locks.acquire_lock(op, session),
                Err(Error::InvalidArgument { .. })
            ),
            "{op:?} / {session:?} was accepted"
        );
    }
    assert!(locks.lock_status().is_empty());
}

#[test]
fn guard_releases_on_drop() {
    let locks = manager(&ManualClock::fixed());
    {
        let guard = locks.lock(Operation::BulkUpdate, SESSION_1).unwrap();
        assert!(!guard.is_reentrant());
        locks.acquire_lock("bulk-update", SESSION_2).unwrap_err();
    }
    assert!(locks.lock_status().is_empty());
    locks.acquire_lock("bulk-update", SESSION_2).unwrap();
}

#[test]
fn reentrant_guard_keeps_the_outer_lock() {
    let locks = manager(&ManualClock::fixed());
    let outer = locks.lock(Operation::SeedDatabase, SESSION_1).unwrap();
    {
        let inner = locks.lock(Operation::SeedDatabase, SESSION_1).unwrap();
        assert!(inner.is_reentrant());
        assert_eq!(inner.id(), outer.id());
    }
    locks.acquire_lock("seed-database", SESSION_2).unwrap_err();
    drop(outer);
    locks.acquire_lock("seed-database", SESSION_2).unwrap();
}

#[test]
fn stale_guard_does_not_release_a_reclaimed_lock() {
    let clock = ManualClock::fixed();
    let locks = manager(&clock);
    let guard = locks.lock(Operation::ClearAll, SESSION_1).unwrap();
    clock.advance(Duration::from_secs(6 * 60));
    let id = locks.acquire_lock("clear-all", SESSION_2).unwrap();
    drop(guard);
    assert_eq!(locks.lock_status()[0].id, id);
}

#[tokio::test]
async fn run_exclusive_releases_whatever_the_outcome() {
    let locks = manager(&ManualClock::fixed());
    let res = locks
        .run_exclusive(Operation::BulkAdd, SESSION_1, async {
            let err = locks.acquire_lock("bulk-add", SESSION_2).unwrap_err();
            assert!(err.is_transient());
            Ok(42)
        })
        .await
        .unwrap();
    assert_eq!(res, 42);
    assert!(locks.lock_status().is_empty());

    let err = locks
        .run_exclusive(Operation::BulkAdd, SESSION_1, async {
            Err::<(), _>(Error::ImportValidationFailed(String::from("boom")))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ImportValidationFailed(_)));
    assert!(locks.lock_status().is_empty());

    // Contention fails before the body runs
    let _held = locks.lock(Operation::BulkAdd, SESSION_2).unwrap();
    let mut ran = false;
    let err = locks
        .run_exclusive(Operation::BulkAdd, SESSION_1, async {
            ran = true;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockHeld { .. }));
    assert!(!ran);
}
