use serde_json::Value;
use std::cmp::Ordering;

/// Selection of records by the value of their top-level JSON fields
///
/// Field names are the serialized (camelCase) names, eg. `medicineId` or `expiryDate`.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Filter {
    /// Every sub-filter must match; `All(vec![])` matches everything
    All(Vec<Filter>),

    Eq(String, Value),

    /// Inclusive on both ends, an absent bound is unbounded
    Range {
        field: String,
        from: Option<Value>,
        to: Option<Value>,
    },
}

impl Filter {
    pub fn everything() -> Filter {
        Filter::All(Vec::new())
    }

    pub fn eq(field: &str, value: impl serde::Serialize) -> serde_json::Result<Filter> {
        Ok(Filter::Eq(field.to_string(), serde_json::to_value(value)?))
    }

    pub fn range(
        field: &str,
        from: Option<impl serde::Serialize>,
        to: Option<impl serde::Serialize>,
    ) -> serde_json::Result<Filter> {
        Ok(Filter::Range {
            field: field.to_string(),
            from: from.map(serde_json::to_value).transpose()?,
            to: to.map(serde_json::to_value).transpose()?,
        })
    }

    pub fn matches<T: serde::Serialize>(&self, v: &T) -> serde_json::Result<bool> {
        let json = serde_json::to_value(v)?;
        Ok(self.matches_json(&json))
    }

    pub fn matches_json(&self, v: &Value) -> bool {
        match self {
            Filter::All(f) => f.iter().all(|f| f.matches_json(v)),
            Filter::Eq(field, to) => v
                .get(field)
                .map(|v| compare(v, to) == Some(Ordering::Equal))
                .unwrap_or(false),
            Filter::Range { field, from, to } => {
                let Some(v) = v.get(field) else {
                    return false;
                };
                let above = from
                    .as_ref()
                    .map(|from| compare(v, from).is_some_and(Ordering::is_ge))
                    .unwrap_or(true);
                let below = to
                    .as_ref()
                    .map(|to| compare(v, to).is_some_and(Ordering::is_le))
                    .unwrap_or(true);
                above && below
            }
        }
    }
}

/// Numbers compare numerically and strings lexicographically, which orders ISO-8601 dates
/// correctly. Values of different kinds are incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_and_range() {
        let batch = json!({ "medicineId": "M1", "quantity": 12, "expiryDate": "2025-06-01" });
        let matches = |f: serde_json::Result<Filter>| f.unwrap().matches_json(&batch);
        assert!(matches(Filter::eq("medicineId", "M1")));
        assert!(!matches(Filter::eq("medicineId", "M2")));
        assert!(matches(Filter::eq("quantity", 12.0)));
        assert!(!matches(Filter::eq("missing", 1)));

        let window = Filter::range("expiryDate", Some("2025-01-01"), Some("2025-06-01")).unwrap();
        assert!(window.matches_json(&batch));
        let after = Filter::range("expiryDate", Some("2025-06-02"), None::<&str>).unwrap();
        assert!(!after.matches_json(&batch));
        let kinds_differ = Filter::range("quantity", Some("10"), None::<&str>).unwrap();
        assert!(!kinds_differ.matches_json(&batch));

        assert!(Filter::everything().matches_json(&batch));
        assert!(!Filter::All(vec![
            Filter::eq("medicineId", "M1").unwrap(),
            Filter::eq("quantity", 13).unwrap(),
        ])
        .matches_json(&batch));
    }
}
