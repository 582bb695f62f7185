#![cfg(all(feature = "_tests", target_arch = "wasm32"))]

use medkit_core::{
    Batch, Clock, Filter, Medicine, SessionIdentity, Setting, Store, StoreHandle, SystemClock,
    TabStorage, Table, BOOTSTRAP_MARKER,
};
use medkit_indexed_db::{BrowserSessionStorage, IndexedDbStore};
use medkit_test_utils::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Once,
};
use wasm_bindgen_test::{wasm_bindgen_test as test, wasm_bindgen_test_configure};

wasm_bindgen_test_configure!(run_in_browser);

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static LOGGING: Once = Once::new();

fn setup() -> IndexedDbStore {
    LOGGING.call_once(|| {
        tracing_wasm::set_as_global_default();
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    });
    IndexedDbStore::new(format!(
        "medkit-test-{}",
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

#[test]
async fn crud_and_query() {
    let store = setup();
    let h = store.open().await.unwrap();
    h.put_many(vec![
        medicine(MEDICINE_ID_1, "Paracetamol"),
        medicine(MEDICINE_ID_2, "Adrenaline"),
    ])
    .await
    .unwrap();
    h.put(batch(MEDICINE_ID_1, "PA-1", 20, date("2025-03-01")))
        .await
        .unwrap();
    h.put(batch(MEDICINE_ID_2, "AD-1", 4, date("2024-08-01")))
        .await
        .unwrap();

    let m = h.get_required::<Medicine>(MEDICINE_ID_2).await.unwrap();
    assert_eq!(m.name, "Adrenaline");
    assert_eq!(h.count::<Medicine>().await.unwrap(), 2);
    let found = h
        .query::<Batch>(Filter::eq("medicineId", MEDICINE_ID_1).unwrap())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].lot_number, "PA-1");

    h.delete::<Medicine>(MEDICINE_ID_1).await.unwrap();
    h.delete::<Medicine>(MEDICINE_ID_1).await.unwrap();
    assert!(h.get::<Medicine>(MEDICINE_ID_1).await.unwrap().is_none());

    h.clear(&[Table::Batches]).await.unwrap();
    assert_eq!(h.count::<Batch>().await.unwrap(), 0);
    assert_eq!(h.count::<Medicine>().await.unwrap(), 1);

    h.clear_all().await.unwrap();
    assert_eq!(h.count::<Medicine>().await.unwrap(), 0);
    assert_eq!(h.count::<Batch>().await.unwrap(), 0);
    h.close().await.unwrap();
}

#[test]
async fn handles_share_tables_and_bootstrap_once() {
    let store = setup();
    let clock = ManualClock::fixed();
    let a = store.open().await.unwrap();
    let b = store.open().await.unwrap();
    let first = a.bootstrap(clock.now()).await.unwrap();
    assert!(!first.already_done);
    assert!(first.medicines > 0);
    let second = b.bootstrap(clock.now()).await.unwrap();
    assert!(second.already_done);
    assert!(b
        .get::<Setting>(BOOTSTRAP_MARKER.to_string())
        .await
        .unwrap()
        .is_some());
    assert_eq!(b.count::<Medicine>().await.unwrap(), first.medicines);
}

#[test]
async fn session_id_survives_reload() {
    setup();
    let storage = || -> Option<Box<dyn TabStorage>> {
        Some(Box::new(BrowserSessionStorage::get().unwrap()))
    };
    let tab = SessionIdentity::new(storage(), Arc::new(SystemClock));
    let id = tab.get_id();

    let reloaded = SessionIdentity::new(storage(), Arc::new(SystemClock));
    assert_eq!(reloaded.get_id(), id);

    reloaded.clear();
    let fresh = SessionIdentity::new(storage(), Arc::new(SystemClock));
    assert_ne!(fresh.get_id(), id);
}
