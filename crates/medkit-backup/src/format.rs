use chrono::NaiveDate;
use medkit_core::{Batch, Item, Location, Medicine, Movement, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version written into every backup this crate produces
pub const BACKUP_VERSION: &str = "2.0";

/// Value of `exportType` in critical backups
pub const CRITICAL_EXPORT_TYPE: &str = "critical";

/// Tables a backup carries, and the only ones a wiping import empties
pub const BACKUP_TABLES: [Table; 5] = [
    Table::Medicines,
    Table::Batches,
    Table::Items,
    Table::Locations,
    Table::Movements,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BackupFormat {
    Full,
    Critical,
}

/// Every table that matters for restoring an inventory
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullBackup {
    pub version: String,
    /// RFC 3339, in UTC with millisecond precision
    pub export_date: String,
    pub exported_by: String,
    pub medicines: Vec<Medicine>,
    pub batches: Vec<Batch>,
    pub items: Vec<Item>,
    pub locations: Vec<Location>,
    pub movements: Vec<Movement>,
    pub metadata: BackupMetadata,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub medicine_count: usize,
    pub batch_count: usize,
    pub item_count: usize,
    pub location_count: usize,
    pub movement_count: usize,
}

/// Just enough to rebuild the formulary and its stock after losing everything else
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalBackup {
    pub export_type: String,
    pub version: String,
    pub export_date: String,
    pub medicine_count: usize,
    pub total_batches: usize,
    pub data: Vec<CriticalMedicine>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalMedicine {
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
    #[serde(default)]
    pub current_stock: u64,
    #[serde(default)]
    pub batches: Vec<CriticalBatch>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalBatch {
    pub lot_number: String,
    pub quantity: u32,
    pub expiry_date: NaiveDate,
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    pub received_date: NaiveDate,
}

/// Checks the overall shape of a backup file, before anything is written
///
/// Accepts both formats, as well as older files that only carry some of the tables.
pub fn validate(file: &Value) -> medkit_core::Result<BackupFormat> {
    let fail = |msg: &str| Err(medkit_core::Error::ImportValidationFailed(msg.to_string()));
    let Some(obj) = file.as_object() else {
        return fail("backup must be a JSON object");
    };
    let version = obj.get("version");
    let export_type = obj.get("exportType");
    if version.is_none() && export_type.is_none() {
        return fail("missing both version and exportType");
    }
    if version.is_some_and(|v| !v.is_string()) {
        return fail("version must be a string");
    }
    let has_array = |key: &str| obj.get(key).is_some_and(Value::is_array);
    if !has_array("medicines") && !has_array("data") {
        return fail("missing a medicines or data array");
    }
    for key in [
        "medicines",
        "batches",
        "items",
        "locations",
        "movements",
        "data",
    ] {
        if obj.get(key).is_some_and(|v| !v.is_array()) {
            return Err(medkit_core::Error::ImportValidationFailed(format!(
                "{key} must be an array"
            )));
        }
    }
    let critical = export_type.and_then(Value::as_str) == Some(CRITICAL_EXPORT_TYPE)
        || (!has_array("medicines") && has_array("data"));
    Ok(if critical {
        BackupFormat::Critical
    } else {
        BackupFormat::Full
    })
}
