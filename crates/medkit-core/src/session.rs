use crate::{Clock, SessionId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use web_time::SystemTime;

/// Key under which the session id is persisted in tab-scoped storage
pub const SESSION_STORAGE_KEY: &str = "medkit-session-id";

/// Per-tab key-value storage that survives reloads of the same tab, like `window.sessionStorage`
pub trait TabStorage: 'static + waaa::Send + waaa::Sync {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryTabStorage(Arc<Mutex<HashMap<String, String>>>);

impl MemoryTabStorage {
    pub fn new() -> MemoryTabStorage {
        MemoryTabStorage::default()
    }
}

impl MemoryTabStorage {
    fn items(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TabStorage for MemoryTabStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.items().remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub created_at: SystemTime,
}

/// Identity of the current tab
///
/// None of the operations fail: when tab-scoped storage is missing or broken, the id only lives
/// in memory and a reload of the tab will mint a new one.
pub struct SessionIdentity {
    storage: Option<Box<dyn TabStorage>>,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<Session>>,
}

impl SessionIdentity {
    pub fn new(storage: Option<Box<dyn TabStorage>>, clock: Arc<dyn Clock>) -> SessionIdentity {
        SessionIdentity {
            storage,
            clock,
            current: Mutex::new(None),
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> SessionIdentity {
        SessionIdentity::new(None, clock)
    }

    pub fn get_id(&self) -> SessionId {
        self.session().id
    }

    /// The current session, restoring or minting it on first access
    pub fn session(&self) -> Session {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(s) = &*current {
            return s.clone();
        }
        let session = match self.restore_session() {
            Some(s) => s,
            None => {
                let now = self.clock.now();
                let id = SessionId::generate(now);
                self.persist(&id);
                tracing::debug!(session_id = %id, "minted new session id");
                Session {
                    id,
                    created_at: now,
                }
            }
        };
        *current = Some(session.clone());
        session
    }

    /// Recovers a previously persisted id, ignoring anything that is not a valid session id
    pub fn restore(&self) -> Option<SessionId> {
        let session = self.restore_session()?;
        let id = session.id.clone();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        Some(id)
    }

    /// Forgets the id, the next [`Self::get_id`] will mint a fresh one
    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.remove_item(SESSION_STORAGE_KEY) {
                tracing::warn!(?err, "failed removing session id from tab storage");
            }
        }
    }

    fn restore_session(&self) -> Option<Session> {
        let storage = self.storage.as_ref()?;
        let stored = match storage.get_item(SESSION_STORAGE_KEY) {
            Ok(stored) => stored?,
            Err(err) => {
                tracing::warn!(?err, "failed reading session id from tab storage");
                return None;
            }
        };
        match SessionId::parse(&stored) {
            Ok(id) => Some(Session {
                created_at: id.embedded_time().unwrap_or_else(|| self.clock.now()),
                id,
            }),
            Err(err) => {
                tracing::warn!(?err, "ignoring invalid session id found in tab storage");
                None
            }
        }
    }

    fn persist(&self, id: &SessionId) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.set_item(SESSION_STORAGE_KEY, id.as_str()) {
                tracing::warn!(?err, "failed persisting session id, it will not survive a reload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SystemClock;

    struct BrokenStorage;

    impl TabStorage for BrokenStorage {
        fn get_item(&self, _: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("storage disabled"))
        }
        fn set_item(&self, _: &str, _: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("storage disabled"))
        }
        fn remove_item(&self, _: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("storage disabled"))
        }
    }

    fn identity(storage: &MemoryTabStorage) -> SessionIdentity {
        SessionIdentity::new(Some(Box::new(storage.clone())), Arc::new(SystemClock))
    }

    #[test]
    fn id_is_stable_and_survives_reload() {
        let storage = MemoryTabStorage::new();
        let tab = identity(&storage);
        let id = tab.get_id();
        assert_eq!(tab.get_id(), id);
        assert_eq!(
            storage.get_item(SESSION_STORAGE_KEY).unwrap().as_deref(),
            Some(id.as_str())
        );

        // Reloading the tab keeps its storage but loses memory
        let reloaded = identity(&storage);
        assert_eq!(reloaded.restore(), Some(id.clone()));
        assert_eq!(reloaded.get_id(), id);
    }

    #[test]
    fn tabs_get_distinct_ids() {
        let a = identity(&MemoryTabStorage::new());
        let b = identity(&MemoryTabStorage::new());
        assert_ne!(a.get_id(), b.get_id());
    }

    #[test]
    fn clear_mints_a_new_id() {
        let storage = MemoryTabStorage::new();
        let tab = identity(&storage);
        let first = tab.get_id();
        tab.clear();
        assert_eq!(storage.get_item(SESSION_STORAGE_KEY).unwrap(), None);
        assert_eq!(tab.restore(), None);
        assert_ne!(tab.get_id(), first);
    }

    #[test]
    fn invalid_stored_id_is_ignored() {
        let storage = MemoryTabStorage::new();
        storage.set_item(SESSION_STORAGE_KEY, "no spaces allowed").unwrap();
        let tab = identity(&storage);
        assert_eq!(tab.restore(), None);
        let id = tab.get_id();
        assert_eq!(
            storage.get_item(SESSION_STORAGE_KEY).unwrap().as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn broken_storage_degrades_to_memory() {
        let tab = SessionIdentity::new(Some(Box::new(BrokenStorage)), Arc::new(SystemClock));
        assert_eq!(tab.restore(), None);
        let id = tab.get_id();
        assert_eq!(tab.get_id(), id);
        tab.clear();
        assert_ne!(tab.get_id(), id);

        let memory_only = SessionIdentity::in_memory(Arc::new(SystemClock));
        let id = memory_only.get_id();
        assert_eq!(memory_only.get_id(), id);
    }
}
