use crate::{
    BackupMetadata, CriticalBackup, CriticalBatch, CriticalMedicine, FullBackup, BACKUP_VERSION,
    CRITICAL_EXPORT_TYPE,
};
use medkit_core::{
    stock_totals, Batch, Item, Location, Medicine, Movement, StoreHandle, SystemTimeExt,
};
use web_time::SystemTime;

/// Snapshots every inventory table
pub async fn export_full<H: StoreHandle>(
    handle: &H,
    exported_by: &str,
    now: SystemTime,
) -> medkit_core::Result<FullBackup> {
    let medicines = handle.get_all::<Medicine>().await?;
    let batches = handle.get_all::<Batch>().await?;
    let items = handle.get_all::<Item>().await?;
    let locations = handle.get_all::<Location>().await?;
    let movements = handle.get_all::<Movement>().await?;
    let metadata = BackupMetadata {
        medicine_count: medicines.len(),
        batch_count: batches.len(),
        item_count: items.len(),
        location_count: locations.len(),
        movement_count: movements.len(),
    };
    tracing::info!(?metadata, exported_by, "exported full backup");
    Ok(FullBackup {
        version: String::from(BACKUP_VERSION),
        export_date: now.to_rfc3339()?,
        exported_by: exported_by.to_string(),
        medicines,
        batches,
        items,
        locations,
        movements,
        metadata,
    })
}

/// Snapshots the formulary with its batches nested inside, dropping ids and placement
pub async fn export_critical<H: StoreHandle>(
    handle: &H,
    now: SystemTime,
) -> medkit_core::Result<CriticalBackup> {
    let mut medicines = handle.get_all::<Medicine>().await?;
    let mut batches = handle.get_all::<Batch>().await?;
    medicines.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    batches.sort_by_key(|b| (b.expiry_date, b.id));
    let totals = stock_totals(&batches);
    let data = medicines
        .into_iter()
        .map(|m| CriticalMedicine {
            current_stock: totals.get(&m.id).copied().unwrap_or(0),
            batches: batches
                .iter()
                .filter(|b| b.medicine_id == m.id)
                .map(|b| CriticalBatch {
                    lot_number: b.lot_number.clone(),
                    quantity: b.quantity,
                    expiry_date: b.expiry_date,
                    manufacturer: b.manufacturer.clone(),
                    supplier_name: b.supplier_name.clone(),
                    received_date: b.received_date,
                })
                .collect(),
            name: m.name,
            strength: m.strength,
            form: m.form,
            route: m.route,
            category: m.category,
            is_controlled: m.is_controlled,
            min_stock: m.min_stock,
            max_stock: m.max_stock,
            storage_requirements: m.storage_requirements,
            notes: m.notes,
        })
        .collect::<Vec<_>>();
    let total_batches: usize = data.iter().map(|m| m.batches.len()).sum();
    tracing::info!(medicines = data.len(), total_batches, "exported critical backup");
    Ok(CriticalBackup {
        export_type: String::from(CRITICAL_EXPORT_TYPE),
        version: String::from(BACKUP_VERSION),
        export_date: now.to_rfc3339()?,
        medicine_count: data.len(),
        total_batches,
        data,
    })
}
