use super::*;
use medkit_core::Error;
use medkit_test_utils::{ManualClock, MemStore, SESSION_1, SESSION_2, SESSION_3};
use std::time::Duration;

fn pool_with(
    store: &MemStore,
    clock: &ManualClock,
    config: PoolConfig,
) -> ConnectionPool<MemStore> {
    ConnectionPool::new(Arc::new(store.clone()), config, Arc::new(clock.clone()))
}

fn pool(store: &MemStore, clock: &ManualClock) -> ConnectionPool<MemStore> {
    pool_with(store, clock, PoolConfig::default())
}

fn session(i: usize) -> String {
    format!("session-tab-{i:010}")
}

#[tokio::test]
async fn repeated_acquire_returns_the_same_connection() {
    let store = MemStore::new();
    let clock = ManualClock::fixed();
    let pool = pool(&store, &clock);
    let a = pool.acquire(SESSION_1).await.unwrap();
    clock.advance(Duration::from_secs(60));
    let b = pool.acquire(SESSION_1).await.unwrap();
    assert_eq!(a.id, b.id);
    assert!(b.last_activity_at > a.last_activity_at);
    assert!(Arc::ptr_eq(a.handle(), b.handle()));
    assert_eq!(store.opens(), 1);
    assert_eq!(
        pool.stats(),
        PoolStats {
            total: 1,
            active: 1,
            max: 10
        }
    );
}

#[tokio::test]
async fn invalid_session_ids_never_touch_the_store() {
    let store = MemStore::new();
    let pool = pool(&store, &ManualClock::fixed());
    let long = "x".repeat(200);
    for bad in ["a", long.as_str(), "has space in it", "semicolon;id"] {
        assert!(
            matches!(pool.acquire(bad).await, Err(Error::InvalidArgument { .. })),
            "{bad:?} was accepted"
        );
    }
    pool.acquire("abcdefghij-123456789").await.unwrap();
    assert_eq!(store.opens(), 1);
}

#[tokio::test]
async fn concurrent_first_acquires_bootstrap_once() {
    let store = MemStore::new();
    store.delay_opens(Duration::from_millis(5));
    store.delay_bootstraps(Duration::from_millis(20));
    let pool = pool(&store, &ManualClock::fixed());
    let sessions = (0..10).map(session).collect::<Vec<_>>();
    let conns = futures::future::join_all(sessions.iter().map(|s| pool.acquire(s))).await;
    for c in conns {
        c.unwrap();
    }
    assert_eq!(store.bootstraps(), 1);
    assert!(pool.is_initialized());
    assert_eq!(pool.stats().active, 10);
}

#[tokio::test]
async fn concurrent_acquires_of_one_session_share_the_opening() {
    let store = MemStore::new();
    store.delay_opens(Duration::from_millis(10));
    let pool = pool(&store, &ManualClock::fixed());
    let (a, b) = tokio::join!(pool.acquire(SESSION_1), pool.acquire(SESSION_1));
    assert_eq!(a.unwrap().id, b.unwrap().id);
    assert_eq!(store.opens(), 1);
    assert_eq!(pool.stats().total, 1);
}

#[tokio::test]
async fn full_pool_rejects_without_side_effects() {
    let store = MemStore::new();
    let config = PoolConfig {
        max_connections: 2,
        ..PoolConfig::default()
    };
    let pool = pool_with(&store, &ManualClock::fixed(), config);
    let a = pool.acquire(SESSION_1).await.unwrap();
    pool.acquire(SESSION_2).await.unwrap();
    let before = pool.stats();
    let err = pool.acquire(SESSION_3).await.unwrap_err();
    assert!(
        matches!(err, Error::ResourceExhausted { max: 2 }),
        "{err:?}"
    );
    assert!(err.is_transient());
    assert_eq!(pool.stats(), before);
    assert_eq!(store.opens(), 2);
    // Existing sessions are still served
    assert_eq!(pool.acquire(SESSION_1).await.unwrap().id, a.id);
}

#[tokio::test]
async fn expired_connections_are_replaced_and_closed() {
    let store = MemStore::new();
    let clock = ManualClock::fixed();
    let pool = pool(&store, &clock);
    let first = pool.acquire(SESSION_1).await.unwrap();
    clock.advance(Duration::from_secs(30 * 60));
    assert_eq!(
        pool.stats(),
        PoolStats {
            total: 1,
            active: 0,
            max: 10
        }
    );
    let second = pool.acquire(SESSION_1).await.unwrap();
    assert_ne!(first.id, second.id);
    assert!(first.handle().is_closed());
    assert!(!second.handle().is_closed());
    assert_eq!(store.closes(), 1);
    assert_eq!(pool.stats().total, 1);
}

#[tokio::test]
async fn purging_expired_connections_frees_capacity() {
    let store = MemStore::new();
    let clock = ManualClock::fixed();
    let config = PoolConfig {
        max_connections: 1,
        ..PoolConfig::default()
    };
    let pool = pool_with(&store, &clock, config);
    pool.acquire(SESSION_1).await.unwrap();
    clock.advance(Duration::from_secs(29 * 60));
    pool.acquire(SESSION_2).await.unwrap_err();
    clock.advance(Duration::from_secs(60));
    pool.acquire(SESSION_2).await.unwrap();
    assert_eq!(store.closes(), 1);

    clock.advance(Duration::from_secs(31 * 60));
    assert_eq!(pool.purge_expired().await, 1);
    assert_eq!(pool.purge_expired().await, 0);
    assert_eq!(pool.stats().total, 0);
}

#[tokio::test]
async fn open_timeout_removes_the_entry() {
    let store = MemStore::new();
    store.hang_opens(true);
    let config = PoolConfig {
        open_timeout: Duration::from_millis(20),
        ..PoolConfig::default()
    };
    let pool = pool_with(&store, &ManualClock::fixed(), config);
    let err = pool.acquire(SESSION_1).await.unwrap_err();
    match err {
        Error::ConnectionFailed { session_id, cause } => {
            assert_eq!(session_id.as_str(), SESSION_1);
            assert_eq!(cause, ConnectionFailure::Timeout(Duration::from_millis(20)));
        }
        e => panic!("unexpected error {e:?}"),
    }
    assert_eq!(pool.stats().total, 0);

    store.hang_opens(false);
    pool.acquire(SESSION_1).await.unwrap();
}

#[tokio::test]
async fn open_failure_removes_the_entry() {
    let store = MemStore::new();
    store.fail_next_opens(1);
    let pool = pool(&store, &ManualClock::fixed());
    let err = pool.acquire(SESSION_1).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::ConnectionFailed {
                cause: ConnectionFailure::Open(_),
                ..
            }
        ),
        "{err:?}"
    );
    assert_eq!(pool.stats().total, 0);
    assert!(!pool.is_initialized());
    pool.acquire(SESSION_1).await.unwrap();
}

#[tokio::test]
async fn failed_bootstrap_is_retried_from_scratch() {
    let store = MemStore::new();
    store.fail_next_bootstraps(1);
    let pool = pool(&store, &ManualClock::fixed());
    let err = pool.acquire(SESSION_1).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::ConnectionFailed {
                cause: ConnectionFailure::Bootstrap(_),
                ..
            }
        ),
        "{err:?}"
    );
    assert!(!pool.is_initialized());
    assert_eq!(pool.stats().total, 0);
    assert_eq!(store.closes(), 1);

    pool.acquire(SESSION_1).await.unwrap();
    assert!(pool.is_initialized());
    assert_eq!(store.bootstraps(), 2);
    pool.acquire(SESSION_2).await.unwrap();
    assert_eq!(store.bootstraps(), 2);
}

#[tokio::test]
async fn concurrent_openers_all_see_a_failed_bootstrap() {
    let store = MemStore::new();
    store.fail_next_bootstraps(1);
    store.delay_bootstraps(Duration::from_millis(20));
    let pool = pool(&store, &ManualClock::fixed());
    let (a, b) = tokio::join!(pool.acquire(SESSION_1), pool.acquire(SESSION_2));
    a.unwrap_err();
    b.unwrap_err();
    assert_eq!(store.bootstraps(), 1);
    assert_eq!(pool.stats().total, 0);
}

#[tokio::test]
async fn release_is_idempotent_and_swallows_close_errors() {
    let store = MemStore::new();
    let pool = pool(&store, &ManualClock::fixed());
    let conn = pool.acquire(SESSION_1).await.unwrap();
    store.fail_closes(true);
    pool.release(SESSION_1).await.unwrap();
    pool.release(SESSION_1).await.unwrap();
    pool.release(SESSION_2).await.unwrap();
    assert!(conn.handle().is_closed());
    assert_eq!(store.closes(), 1);
    assert_eq!(pool.stats().total, 0);

    store.fail_closes(false);
    let again = pool.acquire(SESSION_1).await.unwrap();
    assert_ne!(again.id, conn.id);
}

#[tokio::test]
async fn release_while_opening_fails_the_opening() {
    let store = MemStore::new();
    store.delay_opens(Duration::from_millis(50));
    let pool = pool(&store, &ManualClock::fixed());
    let (res, ()) = tokio::join!(pool.acquire(SESSION_1), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.release(SESSION_1).await.unwrap();
    });
    match res.unwrap_err() {
        Error::ConnectionFailed { cause, .. } => assert_eq!(cause, ConnectionFailure::Released),
        e => panic!("unexpected error {e:?}"),
    }
    assert_eq!(store.closes(), 1);
    assert_eq!(pool.stats().total, 0);
}

#[tokio::test]
async fn release_all_resets_the_pool() {
    let store = MemStore::new();
    let pool = pool(&store, &ManualClock::fixed());
    pool.acquire(SESSION_1).await.unwrap();
    pool.acquire(SESSION_2).await.unwrap();
    assert!(pool.is_initialized());
    pool.release_all().await;
    assert_eq!(pool.stats().total, 0);
    assert_eq!(store.closes(), 2);
    assert!(!pool.is_initialized());

    pool.acquire(SESSION_1).await.unwrap();
    assert!(pool.is_initialized());
    assert_eq!(store.bootstraps(), 2);
}
