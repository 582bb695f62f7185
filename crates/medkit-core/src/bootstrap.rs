use crate::{
    Location, LocationId, LocationKind, Medicine, MedicineId, Role, Setting, StoreHandle,
    SystemTimeExt, User, UserId,
};
use serde_json::json;
use web_time::SystemTime;

/// Setting written once the default rows have been populated
pub const BOOTSTRAP_MARKER: &str = "bootstrap.completedAt";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BootstrapReport {
    pub already_done: bool,
    pub locations: usize,
    pub medicines: usize,
    pub users: usize,
    pub settings: usize,
}

struct FormularyEntry {
    name: &'static str,
    strength: &'static str,
    form: &'static str,
    route: &'static str,
    category: &'static str,
    is_controlled: bool,
    min_stock: u32,
    max_stock: u32,
    storage: Option<&'static str>,
}

const FORMULARY: &[FormularyEntry] = &[
    FormularyEntry {
        name: "Paracetamol",
        strength: "500 mg",
        form: "tablet",
        route: "oral",
        category: "analgesic",
        is_controlled: false,
        min_stock: 40,
        max_stock: 200,
        storage: None,
    },
    FormularyEntry {
        name: "Ibuprofen",
        strength: "400 mg",
        form: "tablet",
        route: "oral",
        category: "analgesic",
        is_controlled: false,
        min_stock: 30,
        max_stock: 150,
        storage: None,
    },
    FormularyEntry {
        name: "Adrenaline",
        strength: "1 mg/ml",
        form: "ampoule",
        route: "intramuscular",
        category: "emergency",
        is_controlled: false,
        min_stock: 6,
        max_stock: 20,
        storage: Some("Protect from light"),
    },
    FormularyEntry {
        name: "Salbutamol",
        strength: "100 mcg/dose",
        form: "inhaler",
        route: "inhalation",
        category: "respiratory",
        is_controlled: false,
        min_stock: 2,
        max_stock: 8,
        storage: None,
    },
    FormularyEntry {
        name: "Aspirin",
        strength: "300 mg",
        form: "tablet",
        route: "oral",
        category: "cardiac",
        is_controlled: false,
        min_stock: 20,
        max_stock: 100,
        storage: None,
    },
    FormularyEntry {
        name: "Glucose",
        strength: "40%",
        form: "gel",
        route: "oral",
        category: "metabolic",
        is_controlled: false,
        min_stock: 4,
        max_stock: 12,
        storage: None,
    },
    FormularyEntry {
        name: "Naloxone",
        strength: "400 mcg/ml",
        form: "ampoule",
        route: "intramuscular",
        category: "antidote",
        is_controlled: false,
        min_stock: 4,
        max_stock: 10,
        storage: None,
    },
    FormularyEntry {
        name: "Morphine sulfate",
        strength: "10 mg/ml",
        form: "ampoule",
        route: "intravenous",
        category: "analgesic",
        is_controlled: true,
        min_stock: 2,
        max_stock: 10,
        storage: Some("Locked controlled-drug box"),
    },
];

/// Writes the default locations, settings, admin user and formulary
///
/// Does nothing if [`BOOTSTRAP_MARKER`] is already set. The marker is written last, so an
/// interrupted run is retried from the start on the next call.
pub async fn populate_defaults<H: StoreHandle + ?Sized>(
    handle: &H,
    now: SystemTime,
) -> crate::Result<BootstrapReport> {
    if handle
        .get::<Setting>(BOOTSTRAP_MARKER.to_string())
        .await?
        .is_some()
    {
        tracing::debug!("default data already present, skipping bootstrap");
        return Ok(BootstrapReport {
            already_done: true,
            ..BootstrapReport::default()
        });
    }

    let at = now.utc_datetime()?;
    let locations = default_locations(now);
    let medicines = FORMULARY
        .iter()
        .map(|f| Medicine {
            id: MedicineId::generate(now),
            name: f.name.to_string(),
            strength: f.strength.to_string(),
            form: f.form.to_string(),
            route: f.route.to_string(),
            category: f.category.to_string(),
            is_controlled: f.is_controlled,
            min_stock: f.min_stock,
            max_stock: f.max_stock,
            storage_requirements: f.storage.map(String::from),
            notes: None,
            created_at: at,
            updated_at: at,
        })
        .collect::<Vec<_>>();
    let users = vec![User {
        id: UserId::generate(now),
        name: String::from("Administrator"),
        role: Role::Admin,
        created_at: at,
    }];
    let settings = vec![
        setting("expiry.criticalDays", json!(crate::EXPIRY_CRITICAL_DAYS)),
        setting("expiry.warningDays", json!(crate::EXPIRY_WARNING_DAYS)),
        setting("organization.name", json!("Rescue Team")),
    ];

    let report = BootstrapReport {
        already_done: false,
        locations: locations.len(),
        medicines: medicines.len(),
        users: users.len(),
        settings: settings.len() + 1,
    };
    handle.put_many(locations).await?;
    handle.put_many(medicines).await?;
    handle.put_many(users).await?;
    handle.put_many(settings).await?;
    handle
        .put(setting(BOOTSTRAP_MARKER, json!(now.to_rfc3339()?)))
        .await?;
    tracing::info!(?report, "populated default data");
    Ok(report)
}

fn setting(key: &str, value: serde_json::Value) -> Setting {
    Setting {
        key: key.to_string(),
        value,
    }
}

fn default_locations(now: SystemTime) -> Vec<Location> {
    let mut res = Vec::new();
    let mut add = |name: &str, kind, parent_id| {
        let id = LocationId::generate(now);
        res.push(Location {
            id,
            name: name.to_string(),
            kind,
            parent_id,
            description: None,
        });
        id
    };
    let vehicle = add("Rescue Vehicle 1", LocationKind::Vehicle, None);
    let trauma = add("Trauma Kit", LocationKind::Kit, Some(vehicle));
    add("Airway Pouch", LocationKind::Pouch, Some(trauma));
    add("Medication Pouch", LocationKind::Pouch, Some(trauma));
    add("Oxygen Kit", LocationKind::Kit, Some(vehicle));
    let base = add("Base Storage", LocationKind::Room, None);
    add("Shelf A", LocationKind::Shelf, Some(base));
    add("Shelf B", LocationKind::Shelf, Some(base));
    res
}
