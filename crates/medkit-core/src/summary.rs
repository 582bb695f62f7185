use crate::{
    classify_expiry, dashboard_stock_level, inventory_stock_status, Batch, ExpiryClassification,
    Medicine, MedicineId, StockLevel,
};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Total quantity across every batch of each medicine
pub fn stock_totals(batches: &[Batch]) -> HashMap<MedicineId, u64> {
    let mut res = HashMap::new();
    for b in batches {
        *res.entry(b.medicine_id).or_insert(0) += u64::from(b.quantity);
    }
    res
}

pub fn nearest_expiry(batches: &[Batch], medicine_id: MedicineId) -> Option<NaiveDate> {
    batches
        .iter()
        .filter(|b| b.medicine_id == medicine_id)
        .map(|b| b.expiry_date)
        .min()
}

/// One dashboard row
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineSummary {
    pub medicine_id: MedicineId,
    pub name: String,
    pub current_stock: u64,
    pub batch_count: usize,
    pub nearest_expiry: Option<NaiveDate>,
    pub expiry: ExpiryClassification,
    pub dashboard_level: StockLevel,
    pub inventory_status: StockLevel,
}

/// Joins medicines with their batches, sorted by name
pub fn medicine_summaries(
    medicines: &[Medicine],
    batches: &[Batch],
    today: NaiveDate,
) -> Vec<MedicineSummary> {
    let totals = stock_totals(batches);
    let mut res = medicines
        .iter()
        .map(|m| {
            let current_stock = totals.get(&m.id).copied().unwrap_or(0);
            let nearest = nearest_expiry(batches, m.id);
            MedicineSummary {
                medicine_id: m.id,
                name: m.name.clone(),
                current_stock,
                batch_count: batches.iter().filter(|b| b.medicine_id == m.id).count(),
                nearest_expiry: nearest,
                expiry: classify_expiry(nearest, today),
                dashboard_level: dashboard_stock_level(current_stock, m.min_stock, m.max_stock),
                inventory_status: inventory_stock_status(current_stock, m.min_stock, m.max_stock),
            }
        })
        .collect::<Vec<_>>();
    res.sort_by(|a, b| (&a.name, a.medicine_id).cmp(&(&b.name, b.medicine_id)));
    res
}

/// Batches expiring no later than `days` after `today`, already-expired ones included, soonest
/// first
pub fn expiring_within(batches: &[Batch], today: NaiveDate, days: u64) -> Vec<&Batch> {
    let Some(limit) = today.checked_add_days(chrono::Days::new(days)) else {
        return batches.iter().collect();
    };
    let mut res = batches
        .iter()
        .filter(|b| b.expiry_date <= limit)
        .collect::<Vec<_>>();
    res.sort_by_key(|b| (b.expiry_date, b.id));
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchId, ExpiryStatus};
    use chrono::{DateTime, Utc};
    use ulid::Ulid;

    fn med(n: u128, name: &str, min: u32, max: u32) -> Medicine {
        Medicine {
            id: MedicineId(Ulid(n)),
            name: name.to_string(),
            strength: String::from("1 mg"),
            form: String::from("tablet"),
            route: String::from("oral"),
            category: String::from("test"),
            is_controlled: false,
            min_stock: min,
            max_stock: max,
            storage_requirements: None,
            notes: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    fn batch(n: u128, medicine: u128, quantity: u32, expiry: NaiveDate) -> Batch {
        Batch {
            id: BatchId(Ulid(n)),
            medicine_id: MedicineId(Ulid(medicine)),
            lot_number: format!("LOT{n}"),
            quantity,
            expiry_date: expiry,
            manufacturer: String::from("ACME"),
            supplier_name: None,
            received_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            notes: None,
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn totals_and_nearest_expiry() {
        let batches = vec![
            batch(1, 10, 5, date(9, 1)),
            batch(2, 10, 7, date(6, 1)),
            batch(3, 20, 1, date(7, 1)),
        ];
        let totals = stock_totals(&batches);
        assert_eq!(totals[&MedicineId(Ulid(10))], 12);
        assert_eq!(totals[&MedicineId(Ulid(20))], 1);
        assert_eq!(
            nearest_expiry(&batches, MedicineId(Ulid(10))),
            Some(date(6, 1))
        );
        assert_eq!(nearest_expiry(&batches, MedicineId(Ulid(30))), None);
    }

    #[test]
    fn summaries_join_and_classify() {
        let medicines = vec![
            med(20, "Zinc", 2, 10),
            med(10, "Aspirin", 10, 50),
            med(30, "Iodine", 1, 5),
        ];
        let batches = vec![
            batch(1, 10, 5, date(5, 20)),
            batch(2, 10, 7, date(12, 1)),
            batch(3, 20, 4, date(3, 1)),
        ];
        let rows = medicine_summaries(&medicines, &batches, date(5, 10));
        assert_eq!(
            rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            ["Aspirin", "Iodine", "Zinc"]
        );
        assert_eq!(rows[0].current_stock, 12);
        assert_eq!(rows[0].batch_count, 2);
        assert_eq!(rows[0].expiry.status, ExpiryStatus::Critical);
        assert_eq!(rows[0].dashboard_level, StockLevel::Ok);
        assert_eq!(rows[1].current_stock, 0);
        assert_eq!(rows[1].nearest_expiry, None);
        assert_eq!(rows[1].expiry.status, ExpiryStatus::Good);
        assert_eq!(rows[1].dashboard_level, StockLevel::Critical);
        assert_eq!(rows[1].inventory_status, StockLevel::Low);
        assert_eq!(rows[2].expiry.status, ExpiryStatus::Expired);
    }

    #[test]
    fn expiring_window() {
        let batches = vec![
            batch(1, 10, 5, date(8, 1)),
            batch(2, 10, 7, date(6, 1)),
            batch(3, 20, 4, date(3, 1)),
        ];
        let ids = expiring_within(&batches, date(5, 10), 30)
            .into_iter()
            .map(|b| b.id.0 .0)
            .collect::<Vec<_>>();
        assert_eq!(ids, [3, 2]);
    }
}
