use anyhow::anyhow;
use medkit_core::{timer, BootstrapReport, Filter, Record, ResultExt, Store, StoreHandle, Table};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use web_time::SystemTime;

type Tables = HashMap<Table, BTreeMap<String, Value>>;

#[derive(Default)]
struct Faults {
    open_delay: StdMutex<Option<Duration>>,
    hang_opens: AtomicBool,
    fail_opens: AtomicUsize,
    bootstrap_delay: StdMutex<Option<Duration>>,
    fail_bootstraps: AtomicUsize,
    fail_closes: AtomicBool,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    bootstraps: AtomicUsize,
    closes: AtomicUsize,
}

/// In-memory store with failure injection
///
/// Clones share the same tables, faults and counters, so a test can keep a clone around to
/// inspect what the code under test did with the store.
#[derive(Clone, Default)]
pub struct MemStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
    counters: Arc<Counters>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    /// Every open takes `delay` before completing
    pub fn delay_opens(&self, delay: Duration) {
        *self.faults.open_delay.lock().unwrap() = Some(delay);
    }

    /// Opens never complete, until reset with `false`
    pub fn hang_opens(&self, hang: bool) {
        self.faults.hang_opens.store(hang, Ordering::SeqCst);
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.faults.fail_opens.store(n, Ordering::SeqCst);
    }

    pub fn delay_bootstraps(&self, delay: Duration) {
        *self.faults.bootstrap_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_next_bootstraps(&self, n: usize) {
        self.faults.fail_bootstraps.store(n, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.faults.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn bootstraps(&self) -> usize {
        self.counters.bootstraps.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Number of rows in `table`, without going through a handle
    pub async fn rows(&self, table: Table) -> usize {
        self.tables
            .lock()
            .await
            .get(&table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// Counts down a failure budget, returning whether this call should fail
    fn take_failure(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Store for MemStore {
    type Handle = MemHandle;

    async fn open(&self) -> medkit_core::Result<MemHandle> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *self.faults.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            timer::sleep(delay).await;
        }
        if self.faults.hang_opens.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if MemStore::take_failure(&self.faults.fail_opens) {
            return Err(medkit_core::Error::Other(anyhow!("injected open failure")));
        }
        Ok(MemHandle {
            store: self.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct MemHandle {
    store: MemStore,
    closed: AtomicBool,
}

impl MemHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> medkit_core::Result<()> {
        if self.is_closed() {
            return Err(medkit_core::Error::Other(anyhow!(
                "store handle used after being closed"
            )));
        }
        Ok(())
    }
}

fn decode<R: Record>(v: &Value) -> medkit_core::Result<R> {
    serde_json::from_value(v.clone())
        .wrap_with_context(|| format!("decoding {} record from memory", R::TABLE))
}

fn encode<R: Record>(r: &R) -> medkit_core::Result<(String, Value)> {
    let value = serde_json::to_value(r)
        .wrap_with_context(|| format!("encoding {} record", R::TABLE))?;
    Ok((r.key().to_string(), value))
}

impl StoreHandle for MemHandle {
    async fn get<R: Record>(&self, key: R::Key) -> medkit_core::Result<Option<R>> {
        self.check_open()?;
        let tables = self.store.tables.lock().await;
        tables
            .get(&R::TABLE)
            .and_then(|t| t.get(&key.to_string()))
            .map(decode::<R>)
            .transpose()
    }

    async fn get_all<R: Record>(&self) -> medkit_core::Result<Vec<R>> {
        self.check_open()?;
        let tables = self.store.tables.lock().await;
        tables
            .get(&R::TABLE)
            .into_iter()
            .flat_map(|t| t.values())
            .map(decode::<R>)
            .collect()
    }

    async fn query<R: Record>(&self, filter: Filter) -> medkit_core::Result<Vec<R>> {
        self.check_open()?;
        let tables = self.store.tables.lock().await;
        tables
            .get(&R::TABLE)
            .into_iter()
            .flat_map(|t| t.values())
            .filter(|v| filter.matches_json(v))
            .map(decode::<R>)
            .collect()
    }

    async fn put<R: Record>(&self, record: R) -> medkit_core::Result<()> {
        self.check_open()?;
        let (key, value) = encode(&record)?;
        self.store
            .tables
            .lock()
            .await
            .entry(R::TABLE)
            .or_default()
            .insert(key, value);
        Ok(())
    }

    async fn put_many<R: Record>(&self, records: Vec<R>) -> medkit_core::Result<()> {
        self.check_open()?;
        // Encode everything first so that a failure writes nothing
        let rows = records
            .iter()
            .map(encode::<R>)
            .collect::<medkit_core::Result<Vec<_>>>()?;
        self.store
            .tables
            .lock()
            .await
            .entry(R::TABLE)
            .or_default()
            .extend(rows);
        Ok(())
    }

    async fn delete<R: Record>(&self, key: R::Key) -> medkit_core::Result<()> {
        self.check_open()?;
        if let Some(t) = self.store.tables.lock().await.get_mut(&R::TABLE) {
            t.remove(&key.to_string());
        }
        Ok(())
    }

    async fn count<R: Record>(&self) -> medkit_core::Result<usize> {
        self.check_open()?;
        Ok(self.store.rows(R::TABLE).await)
    }

    async fn clear(&self, tables: &'static [Table]) -> medkit_core::Result<()> {
        self.check_open()?;
        let mut all = self.store.tables.lock().await;
        for table in tables {
            all.remove(table);
        }
        Ok(())
    }

    async fn close(&self) -> medkit_core::Result<()> {
        self.store.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if self.store.faults.fail_closes.load(Ordering::SeqCst) {
            return Err(medkit_core::Error::Other(anyhow!("injected close failure")));
        }
        Ok(())
    }

    async fn bootstrap(&self, now: SystemTime) -> medkit_core::Result<BootstrapReport> {
        self.store
            .counters
            .bootstraps
            .fetch_add(1, Ordering::SeqCst);
        let delay = *self.store.faults.bootstrap_delay.lock().unwrap();
        if let Some(delay) = delay {
            timer::sleep(delay).await;
        }
        if MemStore::take_failure(&self.store.faults.fail_bootstraps) {
            return Err(medkit_core::Error::Other(anyhow!(
                "injected bootstrap failure"
            )));
        }
        medkit_core::populate_defaults(self, now).await
    }
}
