use chrono::NaiveDate;

pub const EXPIRY_CRITICAL_DAYS: i64 = 30;
pub const EXPIRY_WARNING_DAYS: i64 = 60;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpiryStatus {
    Expired,
    Critical,
    Warning,
    Good,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DaysUntil {
    Days(i64),
    /// Nothing expires
    Unbounded,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryClassification {
    pub status: ExpiryStatus,
    pub days_until: DaysUntil,
}

/// Buckets an expiry date relative to `today`
///
/// Negative day counts are expired, `0..=30` critical, `31..=60` warning, anything further good.
pub fn classify_expiry(expiry: Option<NaiveDate>, today: NaiveDate) -> ExpiryClassification {
    let Some(expiry) = expiry else {
        return ExpiryClassification {
            status: ExpiryStatus::Good,
            days_until: DaysUntil::Unbounded,
        };
    };
    let days = (expiry - today).num_days();
    let status = if days < 0 {
        ExpiryStatus::Expired
    } else if days <= EXPIRY_CRITICAL_DAYS {
        ExpiryStatus::Critical
    } else if days <= EXPIRY_WARNING_DAYS {
        ExpiryStatus::Warning
    } else {
        ExpiryStatus::Good
    };
    ExpiryClassification {
        status,
        days_until: DaysUntil::Days(days),
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StockLevel {
    Critical,
    Low,
    Ok,
    Excess,
}

/// Stock level as shown on the dashboard
///
/// Critical at or below half the minimum, low at or below the minimum.
pub fn dashboard_stock_level(current: u64, min: u32, max: u32) -> StockLevel {
    // current <= min / 2, without losing the half unit on odd minimums
    if current.saturating_mul(2) <= u64::from(min) {
        StockLevel::Critical
    } else if current <= u64::from(min) {
        StockLevel::Low
    } else if current > u64::from(max) {
        StockLevel::Excess
    } else {
        StockLevel::Ok
    }
}

/// Stock status as shown in the inventory table
///
/// Low strictly below the minimum; this does not agree with [`dashboard_stock_level`] at or
/// near the minimum, and never reports critical.
pub fn inventory_stock_status(current: u64, min: u32, max: u32) -> StockLevel {
    if current < u64::from(min) {
        StockLevel::Low
    } else if current > u64::from(max) {
        StockLevel::Excess
    } else {
        StockLevel::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn classify_in(days: i64) -> ExpiryClassification {
        let date = if days >= 0 {
            today().checked_add_days(Days::new(days as u64))
        } else {
            today().checked_sub_days(Days::new(days.unsigned_abs()))
        };
        classify_expiry(date, today())
    }

    #[test]
    fn expiry_buckets() {
        assert_eq!(classify_in(-1).status, ExpiryStatus::Expired);
        assert_eq!(classify_in(0).status, ExpiryStatus::Critical);
        assert_eq!(classify_in(30).status, ExpiryStatus::Critical);
        assert_eq!(classify_in(31).status, ExpiryStatus::Warning);
        assert_eq!(classify_in(45).status, ExpiryStatus::Warning);
        assert_eq!(classify_in(60).status, ExpiryStatus::Warning);
        assert_eq!(classify_in(61).status, ExpiryStatus::Good);
        assert_eq!(classify_in(90).status, ExpiryStatus::Good);
        assert_eq!(classify_in(45).days_until, DaysUntil::Days(45));
        assert_eq!(
            classify_expiry(None, today()),
            ExpiryClassification {
                status: ExpiryStatus::Good,
                days_until: DaysUntil::Unbounded,
            }
        );
    }

    #[test]
    fn dashboard_levels() {
        assert_eq!(dashboard_stock_level(0, 10, 50), StockLevel::Critical);
        assert_eq!(dashboard_stock_level(5, 10, 50), StockLevel::Critical);
        assert_eq!(dashboard_stock_level(6, 10, 50), StockLevel::Low);
        assert_eq!(dashboard_stock_level(10, 10, 50), StockLevel::Low);
        assert_eq!(dashboard_stock_level(11, 10, 50), StockLevel::Ok);
        assert_eq!(dashboard_stock_level(50, 10, 50), StockLevel::Ok);
        assert_eq!(dashboard_stock_level(51, 10, 50), StockLevel::Excess);
        // 2 > 3 * 0.5
        assert_eq!(dashboard_stock_level(2, 3, 10), StockLevel::Low);
    }

    #[test]
    fn huge_stock_is_excess() {
        assert_eq!(dashboard_stock_level(u64::MAX, 10, 50), StockLevel::Excess);
        assert_eq!(
            dashboard_stock_level(u64::MAX, u32::MAX, u32::MAX),
            StockLevel::Excess
        );
        assert_eq!(inventory_stock_status(u64::MAX, 10, 50), StockLevel::Excess);
    }

    #[test]
    fn inventory_levels_differ_at_the_minimum() {
        assert_eq!(inventory_stock_status(9, 10, 50), StockLevel::Low);
        assert_eq!(inventory_stock_status(10, 10, 50), StockLevel::Ok);
        assert_eq!(dashboard_stock_level(10, 10, 50), StockLevel::Low);
        assert_eq!(inventory_stock_status(0, 10, 50), StockLevel::Low);
        assert_eq!(inventory_stock_status(51, 10, 50), StockLevel::Excess);
    }

    #[test]
    fn fuzz_expiry_classification_is_total_and_monotonic() {
        bolero::check!()
            .with_type::<(i32, i32)>()
            .for_each(|&(a, b)| {
                let (a, b) = (i64::from(a.min(b)) % 100_000, i64::from(a.max(b)) % 100_000);
                let (a, b) = (a.min(b), a.max(b));
                let ca = classify_in(a);
                let cb = classify_in(b);
                assert!(ca.status <= cb.status, "{a} -> {ca:?}, {b} -> {cb:?}");
                assert_eq!(ca.days_until, DaysUntil::Days(a));
            })
    }

    #[test]
    fn fuzz_stock_levels_never_panic() {
        bolero::check!()
            .with_type::<(u64, u32, u32)>()
            .for_each(|&(current, min, max)| {
                let dashboard = dashboard_stock_level(current, min, max);
                let inventory = inventory_stock_status(current, min, max);
                if inventory == StockLevel::Low {
                    assert!(matches!(dashboard, StockLevel::Low | StockLevel::Critical));
                }
            })
    }
}
