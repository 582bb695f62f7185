use crate::Config;
use medkit_backup::{CriticalBackup, FullBackup, ImportOptions, ImportReport};
use chrono::NaiveDate;
use medkit_core::{
    medicine_summaries, Batch, BatchId, BootstrapReport, Clock, Filter, Location, LocationTree,
    Medicine, MedicineId, MedicineSummary, Movement, MovementId, MovementKind, ResultExt,
    SessionId, SessionIdentity, Store, StoreHandle, SystemTimeExt,
};
use medkit_pool::{Connection, ConnectionPool, Lock, LockManager, Operation, PoolStats};
use std::{collections::HashSet, sync::Arc};


/// Everything one tab needs to work with the inventory
///
/// Reads go straight through the tab's pooled connection. Whole-database mutations additionally
/// take the matching [`Operation`] lock for the tab's session, so that two tabs cannot reseed or
/// bulk-edit at the same time.
pub struct Inventory<S: Store> {
    config: Config,
    clock: Arc<dyn Clock>,
    session: SessionIdentity,
    pool: ConnectionPool<S>,
    locks: Arc<LockManager>,
}

impl<S: Store> Inventory<S> {
    pub fn new(
        store: Arc<S>,
        session: SessionIdentity,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> medkit_core::Result<Inventory<S>> {
        config.validate()?;
        let pool = ConnectionPool::new(store, config.pool, clock.clone());
        let locks = Arc::new(LockManager::new(config.locks, clock.clone()));
        Ok(Inventory {
            config,
            clock,
            session,
            pool,
            locks,
        })
    }

    /// Another session sharing this inventory's pool and locks, like a second tab would
    pub fn for_session(&self, session: SessionIdentity) -> Inventory<S> {
        Inventory {
            config: self.config.clone(),
            clock: self.clock.clone(),
            session,
            pool: self.pool.clone(),
            locks: self.locks.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_id(&self) -> SessionId {
        self.session.get_id()
    }

    /// The pooled connection of this tab, bootstrapping the store on first use
    pub async fn connection(&self) -> medkit_core::Result<Connection<S::Handle>> {
        self.pool.acquire(self.session_id().as_str()).await
    }

    /// Wipes the store and repopulates the default data
    pub async fn reseed(&self) -> medkit_core::Result<BootstrapReport> {
        let session_id = self.session_id();
        let conn = self.connection().await?;
        self.locks
            .run_exclusive(Operation::SeedDatabase, session_id.as_str(), async {
                conn.clear_all().await?;
                conn.bootstrap(self.clock.now()).await
            })
            .await
    }

    pub async fn clear_all(&self) -> medkit_core::Result<()> {
        let session_id = self.session_id();
        let conn = self.connection().await?;
        self.locks
            .run_exclusive(Operation::ClearAll, session_id.as_str(), conn.clear_all())
            .await?;
        tracing::info!(%session_id, "cleared inventory");
        Ok(())
    }

    /// Receives new batches, recording a `receive` movement for each
    ///
    /// Fails without writing anything if a batch references an unknown medicine, or if its id is
    /// already taken. Existing batches go through [`Inventory::bulk_update_batches`].
    pub async fn bulk_add_batches(&self, batches: Vec<Batch>) -> medkit_core::Result<usize> {
        let session_id = self.session_id();
        let conn = self.connection().await?;
        let _guard = self.locks.lock(Operation::BulkAdd, session_id.as_str())?;
        let known = conn
            .get_all::<Medicine>()
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect::<HashSet<MedicineId>>();
        if let Some(b) = batches.iter().find(|b| !known.contains(&b.medicine_id)) {
            return Err(medkit_core::Error::RecordDoesNotExist {
                table: medkit_core::Table::Medicines,
                key: b.medicine_id.to_string(),
            });
        }
        let mut taken = conn
            .get_all::<Batch>()
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect::<HashSet<BatchId>>();
        if let Some(b) = batches.iter().find(|b| !taken.insert(b.id)) {
            return Err(medkit_core::Error::RecordAlreadyExists {
                table: medkit_core::Table::Batches,
                key: b.id.to_string(),
            });
        }
        let now = self.clock.now();
        let at = now.utc_datetime()?;
        let movements = batches
            .iter()
            .map(|b| Movement {
                id: MovementId::generate(now),
                batch_id: b.id,
                kind: MovementKind::Receive,
                quantity: b.quantity,
                from_location_id: None,
                to_location_id: None,
                user_id: None,
                at,
                note: None,
            })
            .collect::<Vec<_>>();
        let count = batches.len();
        conn.put_many(batches).await?;
        conn.put_many(movements).await?;
        tracing::info!(%session_id, count, "bulk-added batches");
        Ok(count)
    }

    /// Replaces existing batches, recording an `adjust` movement for each quantity change
    ///
    /// Fails without writing anything if one of the batches does not exist yet.
    pub async fn bulk_update_batches(&self, batches: Vec<Batch>) -> medkit_core::Result<usize> {
        let session_id = self.session_id();
        let conn = self.connection().await?;
        let _guard = self
            .locks
            .lock(Operation::BulkUpdate, session_id.as_str())?;
        let now = self.clock.now();
        let at = now.utc_datetime()?;
        let mut movements = Vec::new();
        for b in &batches {
            let before = conn.get_required::<Batch>(b.id).await?;
            if before.quantity != b.quantity {
                movements.push(Movement {
                    id: MovementId::generate(now),
                    batch_id: b.id,
                    kind: MovementKind::Adjust,
                    quantity: before.quantity.abs_diff(b.quantity),
                    from_location_id: None,
                    to_location_id: None,
                    user_id: None,
                    at,
                    note: Some(format!("quantity {} -> {}", before.quantity, b.quantity)),
                });
            }
        }
        let count = batches.len();
        conn.put_many(batches).await?;
        conn.put_many(movements).await?;
        tracing::info!(%session_id, count, "bulk-updated batches");
        Ok(count)
    }

    pub async fn medicine_summaries(&self) -> medkit_core::Result<Vec<MedicineSummary>> {
        let conn = self.connection().await?;
        let medicines = conn.get_all::<Medicine>().await?;
        let batches = conn.get_all::<Batch>().await?;
        Ok(medicine_summaries(
            &medicines,
            &batches,
            self.clock.today()?,
        ))
    }

    /// Batches expiring in the next `days` days or already expired, soonest first
    pub async fn expiring_within(&self, days: u64) -> medkit_core::Result<Vec<Batch>> {
        let today = self.clock.today()?;
        let filter = match today.checked_add_days(chrono::Days::new(days)) {
            Some(limit) => Filter::range("expiryDate", None::<NaiveDate>, Some(limit))
                .wrap_context("filtering batches by expiry date")?,
            None => Filter::everything(),
        };
        let batches = self.connection().await?.query::<Batch>(filter).await?;
        Ok(medkit_core::expiring_within(&batches, today, days)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn batches_of(&self, medicine_id: MedicineId) -> medkit_core::Result<Vec<Batch>> {
        let filter = Filter::eq("medicineId", medicine_id)
            .wrap_context("filtering batches by medicine")?;
        self.connection().await?.query::<Batch>(filter).await
    }

    pub async fn location_tree(&self) -> medkit_core::Result<LocationTree> {
        let conn = self.connection().await?;
        Ok(LocationTree::new(conn.get_all::<Location>().await?))
    }

    /// Inserts or replaces a medicine, stamping its update time
    pub async fn save_medicine(&self, mut medicine: Medicine) -> medkit_core::Result<()> {
        medicine.updated_at = self.clock.now().utc_datetime()?;
        self.connection().await?.put(medicine).await
    }

    pub async fn save_batch(&self, batch: Batch) -> medkit_core::Result<()> {
        let conn = self.connection().await?;
        conn.get_required::<Medicine>(batch.medicine_id).await?;
        conn.put(batch).await
    }

    /// Inserts or moves a location, refusing moves that would create a cycle
    pub async fn save_location(&self, location: Location) -> medkit_core::Result<()> {
        let conn = self.connection().await?;
        LocationTree::new(conn.get_all::<Location>().await?)
            .check_reparent(location.id, location.parent_id)?;
        conn.put(location).await
    }

    pub async fn export_backup(&self) -> medkit_core::Result<FullBackup> {
        let conn = self.connection().await?;
        medkit_backup::export_full(&*conn, &self.config.exported_by, self.clock.now()).await
    }

    pub async fn export_critical(&self) -> medkit_core::Result<CriticalBackup> {
        let conn = self.connection().await?;
        medkit_backup::export_critical(&*conn, self.clock.now()).await
    }

    /// Restores a backup file under the `bulk-add` lock, and the `clear-all` lock when wiping
    pub async fn import_backup(
        &self,
        json: &str,
        options: ImportOptions,
    ) -> medkit_core::Result<ImportReport> {
        let session_id = self.session_id();
        let conn = self.connection().await?;
        let _adding = self.locks.lock(Operation::BulkAdd, session_id.as_str())?;
        let _wiping = options
            .wipe_first
            .then(|| self.locks.lock(Operation::ClearAll, session_id.as_str()))
            .transpose()?;
        medkit_backup::import_backup(&*conn, json, options, self.clock.now()).await
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn lock_status(&self) -> Vec<Lock> {
        self.locks.lock_status()
    }

    /// Returns this tab's connection to the pool, as when the tab is closed
    pub async fn disconnect(&self) -> medkit_core::Result<()> {
        self.pool.release(self.session_id().as_str()).await
    }

    /// Closes every pooled connection
    pub async fn shutdown(&self) {
        tracing::info!(stats = ?self.pool.stats(), "shutting down inventory");
        self.pool.release_all().await;
    }
}

#[cfg(target_arch = "wasm32")]
impl Inventory<medkit_indexed_db::IndexedDbStore> {
    /// Opens the inventory kept in the IndexedDB database `name`, identifying the tab through
    /// `sessionStorage`
    pub fn browser(name: &str, config: Config) -> medkit_core::Result<Self> {
        let storage: Option<Box<dyn medkit_core::TabStorage>> =
            match medkit_indexed_db::BrowserSessionStorage::get() {
                Ok(storage) => Some(Box::new(storage)),
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        "session storage unavailable, ids will not survive reloads",
                    );
                    None
                }
            };
        let clock: Arc<dyn Clock> = Arc::new(medkit_core::SystemClock);
        Inventory::new(
            Arc::new(medkit_indexed_db::IndexedDbStore::new(name)),
            SessionIdentity::new(storage, clock.clone()),
            clock,
            config,
        )
    }
}
