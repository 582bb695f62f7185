use crate::{validate, BackupFormat, CriticalMedicine};
use medkit_core::{
    Batch, BatchId, Item, Location, LocationId, Medicine, MedicineId, Movement, Record, ResultExt,
    StoreHandle, SystemTimeExt, Table,
};
use serde_json::Value;
use std::collections::HashSet;
use web_time::SystemTime;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ImportOptions {
    /// Empty the tables in [`crate::BACKUP_TABLES`] before importing
    pub wipe_first: bool,
}

/// A record that could not be imported
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub table: Table,
    /// Position of the record in its array in the backup file
    pub index: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub format: BackupFormat,
    pub medicines: usize,
    pub batches: usize,
    pub items: usize,
    pub locations: usize,
    pub movements: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    fn new(format: BackupFormat) -> ImportReport {
        ImportReport {
            format,
            medicines: 0,
            batches: 0,
            items: 0,
            locations: 0,
            movements: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, table: Table, index: usize, reason: impl ToString) {
        self.failures.push(ImportFailure {
            table,
            index,
            reason: reason.to_string(),
        });
    }
}

/// Parses and imports a backup file
pub async fn import_backup<H: StoreHandle>(
    handle: &H,
    json: &str,
    options: ImportOptions,
    now: SystemTime,
) -> medkit_core::Result<ImportReport> {
    let file = serde_json::from_str::<Value>(json).map_err(|err| {
        medkit_core::Error::ImportValidationFailed(format!("backup is not valid JSON: {err}"))
    })?;
    import_value(handle, &file, options, now).await
}

/// Imports an already-parsed backup file
///
/// Fails without writing anything if the file does not look like a backup. Past that point,
/// records that cannot be decoded or that reference missing records are reported in
/// [`ImportReport::failures`] while every other record is written.
pub async fn import_value<H: StoreHandle>(
    handle: &H,
    file: &Value,
    options: ImportOptions,
    now: SystemTime,
) -> medkit_core::Result<ImportReport> {
    let format = validate(file)?;
    if let Some(version) = file.get("version").and_then(Value::as_str) {
        if version != crate::BACKUP_VERSION {
            tracing::warn!(version, "importing backup with a different version");
        }
    }
    if options.wipe_first {
        tracing::info!("wiping store before import");
        handle
            .clear(&crate::BACKUP_TABLES)
            .await
            .wrap_context("wiping store before import")?;
    }
    let report = match format {
        BackupFormat::Full => import_full(handle, file).await?,
        BackupFormat::Critical => import_critical(handle, file, now).await?,
    };
    tracing::info!(
        ?format,
        medicines = report.medicines,
        batches = report.batches,
        items = report.items,
        locations = report.locations,
        movements = report.movements,
        failures = report.failures.len(),
        "imported backup",
    );
    Ok(report)
}

fn records<'a>(file: &'a Value, key: &str) -> &'a [Value] {
    file.get(key)
        .and_then(Value::as_array)
        .map(|a| &a[..])
        .unwrap_or(&[])
}

/// Decodes every record of `table`, keeping those `check` accepts
fn decode<R: Record>(
    file: &Value,
    report: &mut ImportReport,
    check: impl Fn(&R) -> Result<(), String>,
) -> Vec<R> {
    let mut res = Vec::new();
    for (index, raw) in records(file, R::TABLE.name()).iter().enumerate() {
        let record = match serde_json::from_value::<R>(raw.clone()) {
            Ok(r) => r,
            Err(err) => {
                report.fail(R::TABLE, index, format!("malformed record: {err}"));
                continue;
            }
        };
        match check(&record) {
            Ok(()) => res.push(record),
            Err(reason) => report.fail(R::TABLE, index, reason),
        }
    }
    res
}

async fn keys<R: Record, H: StoreHandle>(handle: &H) -> medkit_core::Result<HashSet<R::Key>> {
    Ok(handle
        .get_all::<R>()
        .await?
        .into_iter()
        .map(|r| r.key())
        .collect())
}

async fn import_full<H: StoreHandle>(
    handle: &H,
    file: &Value,
) -> medkit_core::Result<ImportReport> {
    let mut report = ImportReport::new(BackupFormat::Full);

    let locations = decode::<Location>(file, &mut report, |_| Ok(()));
    report.locations = locations.len();
    handle.put_many(locations).await?;

    let medicines = decode::<Medicine>(file, &mut report, |_| Ok(()));
    report.medicines = medicines.len();
    handle.put_many(medicines).await?;

    let medicine_ids = keys::<Medicine, _>(handle).await?;
    let batches = decode::<Batch>(file, &mut report, |b| {
        if !medicine_ids.contains(&b.medicine_id) {
            return Err(format!(
                "batch references unknown medicine {}",
                b.medicine_id
            ));
        }
        Ok(())
    });
    report.batches = batches.len();
    handle.put_many(batches).await?;

    let batch_ids = keys::<Batch, _>(handle).await?;
    let location_ids = keys::<Location, _>(handle).await?;
    let items = decode::<Item>(file, &mut report, |i| {
        check_item(i, &medicine_ids, &batch_ids, &location_ids)
    });
    report.items = items.len();
    handle.put_many(items).await?;

    let movements = decode::<Movement>(file, &mut report, |m| {
        if !batch_ids.contains(&m.batch_id) {
            return Err(format!("movement references unknown batch {}", m.batch_id));
        }
        Ok(())
    });
    report.movements = movements.len();
    handle.put_many(movements).await?;

    Ok(report)
}

fn check_item(
    item: &Item,
    medicines: &HashSet<MedicineId>,
    batches: &HashSet<BatchId>,
    locations: &HashSet<LocationId>,
) -> Result<(), String> {
    if !medicines.contains(&item.medicine_id) {
        return Err(format!(
            "item references unknown medicine {}",
            item.medicine_id
        ));
    }
    if !batches.contains(&item.batch_id) {
        return Err(format!("item references unknown batch {}", item.batch_id));
    }
    if !locations.contains(&item.location_id) {
        return Err(format!(
            "item references unknown location {}",
            item.location_id
        ));
    }
    Ok(())
}

/// Recreates every medicine with a fresh id, along with its batches
async fn import_critical<H: StoreHandle>(
    handle: &H,
    file: &Value,
    now: SystemTime,
) -> medkit_core::Result<ImportReport> {
    let mut report = ImportReport::new(BackupFormat::Critical);
    let at = now.utc_datetime()?;
    let mut medicines = Vec::new();
    let mut batches = Vec::new();
    for (index, raw) in records(file, "data").iter().enumerate() {
        let critical = match serde_json::from_value::<CriticalMedicine>(raw.clone()) {
            Ok(c) => c,
            Err(err) => {
                report.fail(Table::Medicines, index, format!("malformed record: {err}"));
                continue;
            }
        };
        let medicine_id = MedicineId::generate(now);
        for b in critical.batches {
            batches.push(Batch {
                id: BatchId::generate(now),
                medicine_id,
                lot_number: b.lot_number,
                quantity: b.quantity,
                expiry_date: b.expiry_date,
                manufacturer: b.manufacturer,
                supplier_name: b.supplier_name,
                received_date: b.received_date,
                notes: None,
            });
        }
        medicines.push(Medicine {
            id: medicine_id,
            name: critical.name,
            strength: critical.strength,
            form: critical.form,
            route: critical.route,
            category: critical.category,
            is_controlled: critical.is_controlled,
            min_stock: critical.min_stock,
            max_stock: critical.max_stock,
            storage_requirements: critical.storage_requirements,
            notes: critical.notes,
            created_at: at,
            updated_at: at,
        });
    }
    report.medicines = medicines.len();
    report.batches = batches.len();
    handle.put_many(medicines).await?;
    handle.put_many(batches).await?;
    Ok(report)
}
