use crate::PoolConfig;
use futures::{future::Shared, FutureExt};
use medkit_core::{
    elapsed_between, timer, Clock, ConnectionFailure, ConnectionId, SessionId, Store, StoreHandle,
};
use std::{
    collections::HashMap,
    ops::Deref,
    sync::{Arc, Mutex, Weak},
};
use web_time::SystemTime;

#[cfg(test)]
mod tests;

type Opening<H> = Shared<waaa::BoxFuture<'static, Result<Arc<H>, ConnectionFailure>>>;
type Init = Shared<waaa::BoxFuture<'static, Result<(), ConnectionFailure>>>;

/// A store handle lent to one session
pub struct Connection<H> {
    pub id: ConnectionId,
    pub session_id: SessionId,
    pub last_activity_at: SystemTime,
    handle: Arc<H>,
}

impl<H> Connection<H> {
    pub fn handle(&self) -> &Arc<H> {
        &self.handle
    }
}

impl<H> Clone for Connection<H> {
    fn clone(&self) -> Self {
        Connection {
            id: self.id,
            session_id: self.session_id.clone(),
            last_activity_at: self.last_activity_at,
            handle: self.handle.clone(),
        }
    }
}

impl<H> Deref for Connection<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H> std::fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("last_activity_at", &self.last_activity_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub struct PoolStats {
    /// Every tracked entry, including expired ones not yet purged
    pub total: usize,
    /// Entries being opened or still within their idle timeout
    pub active: usize,
    pub max: usize,
}

enum Status<H> {
    Opening(Opening<H>),
    Ready(Arc<H>),
}

struct Entry<H> {
    id: ConnectionId,
    created_at: SystemTime,
    last_activity_at: SystemTime,
    status: Status<H>,
}

struct PoolState<H> {
    connections: HashMap<SessionId, Entry<H>>,
    // Memoized pool-wide bootstrap, tagged with the generation that started it
    init: Option<(u64, Init)>,
    initialized: bool,
    // Bumped by release_all so that stale bootstraps do not touch the new state
    generation: u64,
}

struct PoolInner<S: Store> {
    store: Arc<S>,
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PoolState<S::Handle>>,
}

enum Begin<H> {
    Ready(Connection<H>),
    Await {
        opening: Opening<H>,
        joined: bool,
    },
}

/// Hands out at most one store handle per session
///
/// Cloning gives another reference to the same pool.
pub struct ConnectionPool<S: Store> {
    inner: Arc<PoolInner<S>>,
}

impl<S: Store> Clone for ConnectionPool<S> {
    fn clone(&self) -> Self {
        ConnectionPool {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Store> ConnectionPool<S> {
    pub fn new(store: Arc<S>, config: PoolConfig, clock: Arc<dyn Clock>) -> ConnectionPool<S> {
        ConnectionPool {
            inner: Arc::new(PoolInner {
                store,
                config,
                clock,
                state: Mutex::new(PoolState {
                    connections: HashMap::new(),
                    init: None,
                    initialized: false,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Returns the connection of `session_id`, opening one if needed
    ///
    /// The first connection opened in the pool also bootstraps the store's default data, and
    /// every concurrent opening waits for that bootstrap to complete.
    pub async fn acquire(&self, session_id: &str) -> medkit_core::Result<Connection<S::Handle>> {
        let session_id = SessionId::parse(session_id)?;
        let (begin, expired) = self.inner.begin(&session_id);
        self.inner.close_all(expired).await;
        match begin? {
            Begin::Ready(conn) => Ok(conn),
            Begin::Await { opening, joined } => {
                if joined {
                    tracing::debug!(%session_id, "joining connection already being opened");
                }
                let handle =
                    opening
                        .await
                        .map_err(|cause| medkit_core::Error::ConnectionFailed {
                            session_id: session_id.clone(),
                            cause,
                        })?;
                self.inner.connection_for(session_id, handle)
            }
        }
    }

    /// Closes and forgets the connection of `session_id`, if any
    pub async fn release(&self, session_id: &str) -> medkit_core::Result<()> {
        let session_id = SessionId::parse(session_id)?;
        let removed = self.inner.state().connections.remove(&session_id);
        match removed {
            None => tracing::debug!(%session_id, "released session had no connection"),
            Some(entry) => {
                tracing::info!(%session_id, connection_id = %entry.id, "releasing connection");
                if let Status::Ready(handle) = entry.status {
                    close_handle(&session_id, &handle).await;
                }
            }
        }
        Ok(())
    }

    /// Closes every connection and forgets about the completed bootstrap
    pub async fn release_all(&self) {
        let entries = {
            let mut state = self.inner.state();
            state.init = None;
            state.initialized = false;
            state.generation += 1;
            state.connections.drain().collect::<Vec<_>>()
        };
        tracing::info!(count = entries.len(), "releasing all connections");
        let handles = entries
            .into_iter()
            .filter_map(|(session_id, entry)| match entry.status {
                Status::Ready(handle) => Some((session_id, handle)),
                Status::Opening(_) => None,
            })
            .collect();
        self.inner.close_all(handles).await;
    }

    pub fn stats(&self) -> PoolStats {
        let now = self.inner.clock.now();
        let state = self.inner.state();
        PoolStats {
            total: state.connections.len(),
            active: state
                .connections
                .values()
                .filter(|e| !self.inner.is_expired(e, now))
                .count(),
            max: self.inner.config.max_connections,
        }
    }

    /// Closes and removes every expired connection, returning how many there were
    pub async fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let expired = self.inner.take_expired(&mut self.inner.state(), now);
        let count = expired.len();
        self.inner.close_all(expired).await;
        count
    }

    /// Whether the store's default data has been bootstrapped through this pool
    pub fn is_initialized(&self) -> bool {
        self.inner.state().initialized
    }
}

impl<S: Store> PoolInner<S> {
    fn state(&self) -> std::sync::MutexGuard<'_, PoolState<S::Handle>> {
        // Nothing panics while holding the lock, and the state stays consistent even if it did
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, entry: &Entry<S::Handle>, now: SystemTime) -> bool {
        match entry.status {
            Status::Opening(_) => false,
            Status::Ready(_) => {
                elapsed_between(entry.last_activity_at, now) >= self.config.connection_timeout
            }
        }
    }

    fn take_expired(
        &self,
        state: &mut PoolState<S::Handle>,
        now: SystemTime,
    ) -> Vec<(SessionId, Arc<S::Handle>)> {
        let expired = state
            .connections
            .iter()
            .filter(|(_, e)| self.is_expired(e, now))
            .map(|(s, _)| s.clone())
            .collect::<Vec<_>>();
        expired
            .into_iter()
            .filter_map(|session_id| {
                let entry = state.connections.remove(&session_id)?;
                tracing::debug!(
                    %session_id,
                    connection_id = %entry.id,
                    idle_for = ?elapsed_between(entry.last_activity_at, now),
                    "purging expired connection",
                );
                match entry.status {
                    Status::Ready(handle) => Some((session_id, handle)),
                    Status::Opening(_) => None,
                }
            })
            .collect()
    }

    async fn close_all(&self, handles: Vec<(SessionId, Arc<S::Handle>)>) {
        for (session_id, handle) in handles {
            close_handle(&session_id, &handle).await;
        }
    }

    /// Decides what `acquire` has to do, along with the expired handles it must close
    #[allow(clippy::type_complexity)]
    fn begin(
        self: &Arc<Self>,
        session_id: &SessionId,
    ) -> (
        medkit_core::Result<Begin<S::Handle>>,
        Vec<(SessionId, Arc<S::Handle>)>,
    ) {
        let now = self.clock.now();
        let mut state = self.state();
        if let Some(entry) = state.connections.get_mut(session_id) {
            match &entry.status {
                Status::Opening(opening) => {
                    let opening = opening.clone();
                    return (
                        Ok(Begin::Await {
                            opening,
                            joined: true,
                        }),
                        Vec::new(),
                    );
                }
                Status::Ready(handle)
                    if elapsed_between(entry.last_activity_at, now)
                        < self.config.connection_timeout =>
                {
                    let handle = handle.clone();
                    entry.last_activity_at = now;
                    tracing::debug!(%session_id, connection_id = %entry.id, "reusing connection");
                    let conn = Connection {
                        id: entry.id,
                        session_id: session_id.clone(),
                        last_activity_at: now,
                        handle,
                    };
                    return (Ok(Begin::Ready(conn)), Vec::new());
                }
                Status::Ready(_) => (),
            }
        }

        let expired = self.take_expired(&mut state, now);
        let max = self.config.max_connections;
        if state.connections.len() >= max {
            tracing::warn!(%session_id, max, "connection pool is full");
            return (
                Err(medkit_core::Error::ResourceExhausted { max }),
                expired,
            );
        }

        let id = ConnectionId::generate(now);
        let opening = self.open(session_id.clone(), id).shared();
        state.connections.insert(
            session_id.clone(),
            Entry {
                id,
                created_at: now,
                last_activity_at: now,
                status: Status::Opening(opening.clone()),
            },
        );
        tracing::debug!(%session_id, connection_id = %id, "opening new connection");
        (
            Ok(Begin::Await {
                opening,
                joined: false,
            }),
            expired,
        )
    }

    /// Opens the store for connection `id` of `session_id`, then runs the pool-wide bootstrap
    ///
    /// Only holds a weak reference to the pool while pending, as the future is itself stored in
    /// the pool.
    fn open(
        self: &Arc<Self>,
        session_id: SessionId,
        id: ConnectionId,
    ) -> waaa::BoxFuture<'static, Result<Arc<S::Handle>, ConnectionFailure>> {
        let weak = Arc::downgrade(self);
        let store = self.store.clone();
        let open_timeout = self.config.open_timeout;
        Box::pin(async move {
            let res = open_and_init(&weak, &store, open_timeout).await;
            match weak.upgrade() {
                Some(inner) => inner.settle(&session_id, id, res).await,
                None => {
                    if let Ok(handle) = res {
                        close_handle(&session_id, &handle).await;
                    }
                    Err(ConnectionFailure::Released)
                }
            }
        })
    }

    /// Records the outcome of an opening in the pool
    async fn settle(
        &self,
        session_id: &SessionId,
        id: ConnectionId,
        res: Result<Arc<S::Handle>, ConnectionFailure>,
    ) -> Result<Arc<S::Handle>, ConnectionFailure> {
        let now = self.clock.now();
        let still_tracked = {
            let mut state = self.state();
            match state.connections.get_mut(session_id) {
                Some(entry) if entry.id == id => match &res {
                    Ok(handle) => {
                        entry.status = Status::Ready(handle.clone());
                        entry.last_activity_at = now;
                        tracing::info!(
                            %session_id,
                            connection_id = %id,
                            open_for = ?elapsed_between(entry.created_at, now),
                            "connection ready",
                        );
                        true
                    }
                    Err(cause) => {
                        state.connections.remove(session_id);
                        tracing::warn!(
                            %session_id,
                            connection_id = %id,
                            %cause,
                            "failed opening connection",
                        );
                        false
                    }
                },
                _ => false,
            }
        };
        match res {
            Ok(handle) if !still_tracked => {
                tracing::info!(
                    %session_id,
                    connection_id = %id,
                    "connection released while opening",
                );
                close_handle(session_id, &handle).await;
                Err(ConnectionFailure::Released)
            }
            res => res,
        }
    }

    fn connection_for(
        &self,
        session_id: SessionId,
        handle: Arc<S::Handle>,
    ) -> medkit_core::Result<Connection<S::Handle>> {
        let now = self.clock.now();
        let mut state = self.state();
        match state.connections.get_mut(&session_id) {
            Some(entry) if matches!(&entry.status, Status::Ready(h) if Arc::ptr_eq(h, &handle)) => {
                entry.last_activity_at = now;
                Ok(Connection {
                    id: entry.id,
                    session_id,
                    last_activity_at: now,
                    handle,
                })
            }
            _ => Err(medkit_core::Error::ConnectionFailed {
                session_id,
                cause: ConnectionFailure::Released,
            }),
        }
    }

    /// The memoized bootstrap, starting it with `handle` if no bootstrap is running or done
    fn init(self: &Arc<Self>, handle: Arc<S::Handle>) -> Init {
        let mut state = self.state();
        if let Some((_, init)) = &state.init {
            return init.clone();
        }
        let generation = state.generation;
        let weak = Arc::downgrade(self);
        let now = self.clock.now();
        let fut: waaa::BoxFuture<'static, Result<(), ConnectionFailure>> = Box::pin(async move {
            tracing::info!("bootstrapping store default data");
            let res = handle.bootstrap(now).await;
            let Some(inner) = weak.upgrade() else {
                return Err(ConnectionFailure::Released);
            };
            let mut state = inner.state();
            let current = state.generation == generation;
            match res {
                Ok(report) => {
                    tracing::info!(?report, "store bootstrap complete");
                    if current {
                        state.initialized = true;
                    }
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(?err, "store bootstrap failed, next acquire will retry it");
                    if current {
                        state.init = None;
                    }
                    Err(ConnectionFailure::Bootstrap(err.to_string()))
                }
            }
        });
        let init = fut.shared();
        state.init = Some((generation, init.clone()));
        init
    }
}

async fn open_and_init<S: Store>(
    pool: &Weak<PoolInner<S>>,
    store: &S,
    open_timeout: std::time::Duration,
) -> Result<Arc<S::Handle>, ConnectionFailure> {
    let handle = match timer::timeout(open_timeout, store.open()).await {
        Err(timer::Elapsed(after)) => return Err(ConnectionFailure::Timeout(after)),
        Ok(Err(err)) => return Err(ConnectionFailure::Open(err.to_string())),
        Ok(Ok(handle)) => Arc::new(handle),
    };
    let init = match pool.upgrade() {
        Some(inner) => inner.init(handle.clone()),
        None => return Err(ConnectionFailure::Released),
    };
    if let Err(cause) = init.await {
        if let Err(err) = handle.close().await {
            tracing::warn!(?err, "failed closing handle after bootstrap failure");
        }
        return Err(cause);
    }
    Ok(handle)
}

async fn close_handle<H: StoreHandle>(session_id: &SessionId, handle: &Arc<H>) {
    if let Err(err) = handle.close().await {
        tracing::warn!(%session_id, ?err, "failed closing store handle, dropping it anyway");
    }
}
