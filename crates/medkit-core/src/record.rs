use crate::{BatchId, ItemId, LocationId, MedicineId, MovementId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, hash::Hash};

/// Tables of the embedded store
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Table {
    Medicines,
    Batches,
    Items,
    Locations,
    Movements,
    Users,
    Settings,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Medicines,
        Table::Batches,
        Table::Items,
        Table::Locations,
        Table::Movements,
        Table::Users,
        Table::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Medicines => "medicines",
            Table::Batches => "batches",
            Table::Items => "items",
            Table::Locations => "locations",
            Table::Movements => "movements",
            Table::Users => "users",
            Table::Settings => "settings",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait RecordKey:
    'static
    + Clone
    + fmt::Debug
    + fmt::Display
    + Eq
    + Hash
    + Serialize
    + DeserializeOwned
    + waaa::Send
    + waaa::Sync
{
}

impl RecordKey for String {}

/// A row of one of the store's tables
pub trait Record:
    'static + Clone + fmt::Debug + Serialize + DeserializeOwned + waaa::Send + waaa::Sync
{
    type Key: RecordKey;

    const TABLE: Table;

    fn key(&self) -> Self::Key;
}

macro_rules! impl_record {
    ($type:ty, $table:expr, $key:ty, $field:ident) => {
        impl Record for $type {
            type Key = $key;

            const TABLE: Table = $table;

            fn key(&self) -> $key {
                self.$field.clone()
            }
        }
    };
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: MedicineId,
    pub name: String,
    pub strength: String,
    pub form: String,
    pub route: String,
    pub category: String,
    #[serde(default)]
    pub is_controlled: bool,
    pub min_stock: u32,
    pub max_stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: BatchId,
    pub medicine_id: MedicineId,
    pub lot_number: String,
    pub quantity: u32,
    pub expiry_date: NaiveDate,
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    pub received_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Some quantity of a batch stored at a location
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub medicine_id: MedicineId,
    pub batch_id: BatchId,
    pub location_id: LocationId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationKind {
    Vehicle,
    Kit,
    Pouch,
    Shelf,
    Room,
    Other,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub kind: LocationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementKind {
    Receive,
    Transfer,
    Dispense,
    Dispose,
    Adjust,
}

/// Audit trail entry for a stock change
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: MovementId,
    pub batch_id: BatchId,
    pub kind: MovementKind,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Member,
    Viewer,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
}

impl_record!(Medicine, Table::Medicines, MedicineId, id);
impl_record!(Batch, Table::Batches, BatchId, id);
impl_record!(Item, Table::Items, ItemId, id);
impl_record!(Location, Table::Locations, LocationId, id);
impl_record!(Movement, Table::Movements, MovementId, id);
impl_record!(User, Table::Users, UserId, id);
impl_record!(Setting, Table::Settings, String, key);
