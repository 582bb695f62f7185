use crate::LockConfig;
use medkit_core::{check_operation_name, elapsed_between, Clock, LockId, SessionId};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};
use web_time::SystemTime;

#[cfg(test)]
mod tests;

/// Well-known operations that must not run concurrently across tabs
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    SeedDatabase,
    BulkAdd,
    BulkUpdate,
    ClearAll,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::SeedDatabase => "seed-database",
            Operation::BulkAdd => "bulk-add",
            Operation::BulkUpdate => "bulk-update",
            Operation::ClearAll => "clear-all",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Operation {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub id: LockId,
    pub operation: String,
    pub session_id: SessionId,
    pub acquired_at: SystemTime,
}

/// Named, session-scoped advisory locks
///
/// Locks are re-entrant for the session holding them, and expire after the configured timeout so
/// that a crashed tab cannot block everyone else forever.
pub struct LockManager {
    config: LockConfig,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Lock>>,
}

impl LockManager {
    pub fn new(config: LockConfig, clock: Arc<dyn Clock>) -> LockManager {
        LockManager {
            config,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Lock>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_valid(&self, lock: &Lock, now: SystemTime) -> bool {
        elapsed_between(lock.acquired_at, now) < self.config.lock_timeout
    }

    pub fn acquire_lock(&self, operation: &str, session_id: &str) -> medkit_core::Result<LockId> {
        self.acquire(operation, session_id).map(|(id, _)| id)
    }

    /// Returns the lock id, and whether the session already held the lock
    fn acquire(&self, operation: &str, session_id: &str) -> medkit_core::Result<(LockId, bool)> {
        check_operation_name(operation)?;
        let session_id = SessionId::parse(session_id)?;
        let now = self.clock.now();
        let mut locks = self.locks();
        if let Some(lock) = locks.get(operation) {
            if self.is_valid(lock, now) {
                if lock.session_id == session_id {
                    tracing::debug!(operation, %session_id, "lock re-entered");
                    return Ok((lock.id, true));
                }
                tracing::debug!(
                    operation,
                    %session_id,
                    holder = %lock.session_id,
                    "lock contended",
                );
                return Err(medkit_core::Error::LockHeld {
                    operation: operation.to_string(),
                    holder: lock.session_id.clone(),
                });
            }
            tracing::warn!(
                operation,
                holder = %lock.session_id,
                held_for = ?elapsed_between(lock.acquired_at, now),
                "reclaiming expired lock",
            );
        }
        let id = LockId::generate(now);
        tracing::debug!(operation, %session_id, lock_id = %id, "lock acquired");
        locks.insert(
            operation.to_string(),
            Lock {
                id,
                operation: operation.to_string(),
                session_id,
                acquired_at: now,
            },
        );
        Ok((id, false))
    }

    /// Releases `operation` if `session_id` holds it, returning whether it did
    pub fn release_lock(&self, operation: &str, session_id: &str) -> medkit_core::Result<bool> {
        check_operation_name(operation)?;
        let session_id = SessionId::parse(session_id)?;
        let mut locks = self.locks();
        match locks.get(operation) {
            Some(lock) if lock.session_id == session_id => {
                tracing::debug!(operation, %session_id, lock_id = %lock.id, "lock released");
                locks.remove(operation);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Snapshot of every lock currently tracked, expired ones included, sorted by operation
    pub fn lock_status(&self) -> Vec<Lock> {
        let mut res = self.locks().values().cloned().collect::<Vec<_>>();
        res.sort_by(|a, b| a.operation.cmp(&b.operation));
        res
    }

    /// Takes `operation` for `session_id` until the returned guard is dropped
    pub fn lock(
        &self,
        operation: impl AsRef<str>,
        session_id: &str,
    ) -> medkit_core::Result<LockGuard<'_>> {
        let operation = operation.as_ref();
        let (id, reentered) = self.acquire(operation, session_id)?;
        Ok(LockGuard {
            manager: self,
            id,
            operation: operation.to_string(),
            session_id: session_id.to_string(),
            reentered,
        })
    }

    /// Runs `body` while holding `operation`, releasing it whatever the outcome
    pub async fn run_exclusive<F, T>(
        &self,
        operation: impl AsRef<str>,
        session_id: &str,
        body: F,
    ) -> medkit_core::Result<T>
    where
        F: Future<Output = medkit_core::Result<T>>,
    {
        let _guard = self.lock(operation, session_id)?;
        body.await
    }
}

/// Releases its lock when dropped, unless it was obtained while the session already held it
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    id: LockId,
    operation: String,
    session_id: String,
    reentered: bool,
}

impl LockGuard<'_> {
    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn is_reentrant(&self) -> bool {
        self.reentered
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("session_id", &self.session_id)
            .field("reentered", &self.reentered)
            .finish()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.reentered {
            return;
        }
        let mut locks = self.manager.locks();
        // The lock may have expired and been reclaimed since
        if locks.get(&self.operation).is_some_and(|l| l.id == self.id) {
            tracing::debug!(operation = %self.operation, lock_id = %self.id, "lock guard released");
            locks.remove(&self.operation);
        }
    }
}
