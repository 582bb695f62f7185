#![cfg(target_arch = "wasm32")]

use anyhow::anyhow;
use indexed_db::{Database, Factory};
use medkit_core::{Filter, Record, ResultExt, Store, StoreHandle, Table, TabStorage};
use serde::Serialize;
use std::convert::Infallible;
use wasm_bindgen::JsValue;

/// Bump along with a migration in `open` when adding tables
const SCHEMA_VERSION: u32 = 1;

fn wrap_idb<T>(res: Result<T, indexed_db::Error<Infallible>>, ctx: &str) -> medkit_core::Result<T> {
    res.map_err(|err| medkit_core::Error::Other(anyhow!("{err:?}").context(ctx.to_string())))
}

fn js_err(err: JsValue) -> anyhow::Error {
    anyhow!("{err:?}")
}

/// An IndexedDB database with one object store per table
pub struct IndexedDbStore {
    name: String,
}

impl IndexedDbStore {
    pub fn new(name: impl Into<String>) -> IndexedDbStore {
        IndexedDbStore { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Store for IndexedDbStore {
    type Handle = IndexedDbHandle;

    async fn open(&self) -> medkit_core::Result<IndexedDbHandle> {
        let factory = wrap_idb(Factory::<Infallible>::get(), "getting IndexedDB factory")?;
        let db = factory
            .open(&self.name, SCHEMA_VERSION, |evt| async move {
                let db = evt.database();
                for table in Table::ALL {
                    db.build_object_store(table.name()).create()?;
                }
                Ok(())
            })
            .await;
        let db = wrap_idb(db, "opening IndexedDB database")?;
        tracing::debug!(name = %self.name, "opened IndexedDB database");
        Ok(IndexedDbHandle { db })
    }
}

pub struct IndexedDbHandle {
    db: Database<Infallible>,
}

fn key_of<R: Record>(key: &R::Key) -> JsValue {
    JsValue::from_str(&key.to_string())
}

fn encode<R: Record>(record: &R) -> medkit_core::Result<(JsValue, JsValue)> {
    let value = record
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| {
            medkit_core::Error::Other(anyhow!("{err}").context(format!("encoding {}", R::TABLE)))
        })?;
    Ok((key_of::<R>(&record.key()), value))
}

fn to_json(value: JsValue) -> medkit_core::Result<serde_json::Value> {
    serde_wasm_bindgen::from_value(value).map_err(|err| {
        medkit_core::Error::Other(anyhow!("{err}").context("reading IndexedDB value"))
    })
}

fn decode<R: Record>(value: serde_json::Value) -> medkit_core::Result<R> {
    serde_json::from_value(value).wrap_with_context(|| format!("decoding {} record", R::TABLE))
}

impl IndexedDbHandle {
    async fn read_all<R: Record>(&self) -> medkit_core::Result<Vec<serde_json::Value>> {
        let values = self
            .db
            .transaction(&[R::TABLE.name()])
            .run(|t| async move { t.object_store(R::TABLE.name())?.get_all(None).await })
            .await;
        wrap_idb(values, "reading IndexedDB table")?
            .into_iter()
            .map(to_json)
            .collect()
    }
}

impl StoreHandle for IndexedDbHandle {
    async fn get<R: Record>(&self, key: R::Key) -> medkit_core::Result<Option<R>> {
        let js_key = key_of::<R>(&key);
        let value = self
            .db
            .transaction(&[R::TABLE.name()])
            .run(move |t| async move { t.object_store(R::TABLE.name())?.get(&js_key).await })
            .await;
        wrap_idb(value, "reading IndexedDB record")?
            .map(|v| decode::<R>(to_json(v)?))
            .transpose()
    }

    async fn get_all<R: Record>(&self) -> medkit_core::Result<Vec<R>> {
        self.read_all::<R>()
            .await?
            .into_iter()
            .map(decode::<R>)
            .collect()
    }

    /// Scans the whole table, as the schema declares no secondary index
    async fn query<R: Record>(&self, filter: Filter) -> medkit_core::Result<Vec<R>> {
        self.read_all::<R>()
            .await?
            .into_iter()
            .filter(|v| filter.matches_json(v))
            .map(decode::<R>)
            .collect()
    }

    async fn put<R: Record>(&self, record: R) -> medkit_core::Result<()> {
        self.put_many(vec![record]).await
    }

    async fn put_many<R: Record>(&self, records: Vec<R>) -> medkit_core::Result<()> {
        let rows = records
            .iter()
            .map(encode::<R>)
            .collect::<medkit_core::Result<Vec<_>>>()?;
        let res = self
            .db
            .transaction(&[R::TABLE.name()])
            .rw()
            .run(move |t| async move {
                let store = t.object_store(R::TABLE.name())?;
                for (key, value) in rows {
                    store.put_kv(&key, &value).await?;
                }
                Ok(())
            })
            .await;
        wrap_idb(res, "writing IndexedDB records")
    }

    async fn delete<R: Record>(&self, key: R::Key) -> medkit_core::Result<()> {
        let js_key = key_of::<R>(&key);
        let res = self
            .db
            .transaction(&[R::TABLE.name()])
            .rw()
            .run(move |t| async move { t.object_store(R::TABLE.name())?.delete(&js_key).await })
            .await;
        wrap_idb(res, "deleting IndexedDB record")
    }

    async fn count<R: Record>(&self) -> medkit_core::Result<usize> {
        let res = self
            .db
            .transaction(&[R::TABLE.name()])
            .run(|t| async move { t.object_store(R::TABLE.name())?.count().await })
            .await;
        wrap_idb(res, "counting IndexedDB records")
    }

    async fn clear(&self, tables: &'static [Table]) -> medkit_core::Result<()> {
        let names = tables.iter().map(|t| t.name()).collect::<Vec<_>>();
        let res = self
            .db
            .transaction(&names)
            .rw()
            .run(move |t| async move {
                for table in tables {
                    t.object_store(table.name())?.clear().await?;
                }
                Ok(())
            })
            .await;
        wrap_idb(res, "clearing IndexedDB tables")?;
        tracing::debug!(?tables, "cleared IndexedDB tables");
        Ok(())
    }

    async fn close(&self) -> medkit_core::Result<()> {
        self.db.close();
        Ok(())
    }
}

/// `window.sessionStorage`, scoped to the current tab
pub struct BrowserSessionStorage {
    storage: web_sys::Storage,
}

impl BrowserSessionStorage {
    /// Fails if the page has no window or session storage is disabled
    pub fn get() -> anyhow::Result<BrowserSessionStorage> {
        let window = web_sys::window().ok_or_else(|| anyhow!("no global window"))?;
        let storage = window
            .session_storage()
            .map_err(js_err)?
            .ok_or_else(|| anyhow!("session storage is not available"))?;
        Ok(BrowserSessionStorage { storage })
    }
}

impl TabStorage for BrowserSessionStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.storage.get_item(key).map_err(js_err)
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.storage.set_item(key, value).map_err(js_err)
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.storage.remove_item(key).map_err(js_err)
    }
}
