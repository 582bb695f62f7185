use chrono::{DateTime, NaiveDate, Utc};
use medkit_core::{
    Batch, BatchId, Item, ItemId, Location, LocationId, LocationKind, Medicine, MedicineId,
};
use ulid::Ulid;

pub const fn ulid(s: &str) -> Ulid {
    match Ulid::from_string(s) {
        Ok(r) => r,
        Err(_) => panic!("const fn failed"),
    }
}

pub const MEDICINE_ID_1: MedicineId = MedicineId(ulid("10000000000000000000000010"));
pub const MEDICINE_ID_2: MedicineId = MedicineId(ulid("10000000000000000000000020"));
pub const MEDICINE_ID_3: MedicineId = MedicineId(ulid("10000000000000000000000030"));

pub const LOCATION_ID_1: LocationId = LocationId(ulid("30000000000000000000000010"));
pub const LOCATION_ID_2: LocationId = LocationId(ulid("30000000000000000000000020"));
pub const LOCATION_ID_3: LocationId = LocationId(ulid("30000000000000000000000030"));

pub const ITEM_ID_1: ItemId = ItemId(ulid("40000000000000000000000010"));

pub const SESSION_1: &str = "session-tab-0000000001";
pub const SESSION_2: &str = "session-tab-0000000002";
pub const SESSION_3: &str = "session-tab-0000000003";

pub fn date(s: &str) -> NaiveDate {
    match s.parse() {
        Ok(d) => d,
        Err(e) => panic!("invalid date {s:?} in test: {e}"),
    }
}

pub fn medicine(id: MedicineId, name: &str) -> Medicine {
    Medicine {
        id,
        name: name.to_string(),
        strength: String::from("100 mg"),
        form: String::from("tablet"),
        route: String::from("oral"),
        category: String::from("analgesic"),
        is_controlled: false,
        min_stock: 10,
        max_stock: 100,
        storage_requirements: None,
        notes: None,
        created_at: DateTime::<Utc>::default(),
        updated_at: DateTime::<Utc>::default(),
    }
}

/// A batch with an id derived from its lot number, so that tests can refer to it again
pub fn batch(medicine_id: MedicineId, lot: &str, quantity: u32, expiry: NaiveDate) -> Batch {
    Batch {
        id: batch_id(lot),
        medicine_id,
        lot_number: lot.to_string(),
        quantity,
        expiry_date: expiry,
        manufacturer: String::from("ACME Pharma"),
        supplier_name: None,
        received_date: date("2024-01-15"),
        notes: None,
    }
}

pub fn batch_id(lot: &str) -> BatchId {
    let hash = lot
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        });
    BatchId(Ulid::from_parts(0x0001_0000_0000, u128::from(hash)))
}

pub fn location(id: LocationId, name: &str, parent_id: Option<LocationId>) -> Location {
    Location {
        id,
        name: name.to_string(),
        kind: LocationKind::Kit,
        parent_id,
        description: None,
    }
}

pub fn item(id: ItemId, batch: &Batch, location_id: LocationId, quantity: u32) -> Item {
    Item {
        id,
        medicine_id: batch.medicine_id,
        batch_id: batch.id,
        location_id,
        quantity,
        notes: None,
    }
}
