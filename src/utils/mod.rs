use chrono::NaiveDate;
use serde_json::Value;

/// Read a provider number that may arrive as a JSON number, a numeric string or
/// not at all. Anything unparseable counts as zero.
pub fn lenient_f64(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Same as [`lenient_f64`] but for odds, where a missing value must stay missing.
pub fn optional_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Follow a path of object keys, e.g. `["goals", "for", "average", "total"]`.
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a provider value for display, `-` when absent.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "-".to_string(),
    }
}

/// Fixture dates are calendar days in `YYYY-MM-DD` form.
pub fn is_valid_date(date: &str) -> bool {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_f64() {
        assert_eq!(lenient_f64(Some(&json!(1.5))), 1.5);
        assert_eq!(lenient_f64(Some(&json!("2.3"))), 2.3);
        assert_eq!(lenient_f64(Some(&json!("n/a"))), 0.0);
        assert_eq!(lenient_f64(Some(&Value::Null)), 0.0);
        assert_eq!(lenient_f64(None), 0.0);
    }

    #[test]
    fn test_optional_f64() {
        assert_eq!(optional_f64(Some(&json!("1.85"))), Some(1.85));
        assert_eq!(optional_f64(Some(&json!("abc"))), None);
        assert_eq!(optional_f64(None), None);
    }

    #[test]
    fn test_path() {
        let stats = json!({"goals": {"for": {"average": {"total": "1.4"}}}});
        assert_eq!(lenient_f64(path(&stats, &["goals", "for", "average", "total"])), 1.4);
        assert!(path(&stats, &["goals", "against"]).is_none());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.4), 0.4);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(0.666), 0.67);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(Some(&json!(7))), "7");
        assert_eq!(display_value(Some(&json!("55%"))), "55%");
        assert_eq!(display_value(None), "-");
    }

    #[test]
    fn test_is_valid_date() {
        assert!(is_valid_date("2025-05-01"));
        assert!(!is_valid_date("2025-13-01"));
        assert!(!is_valid_date("01/05/2025"));
    }
}
