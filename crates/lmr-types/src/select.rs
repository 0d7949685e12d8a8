//! Defensive extraction of nested decimal fields from untrusted JSON records.
//!
//! Ledger payloads are not schema-enforced; a missing or non-numeric field
//! contributes nothing rather than failing a whole aggregation.

use serde_json::Value;

use crate::Amount;

/// Walk `path` through nested JSON objects.
pub fn nested<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// Parse a decimal amount out of a JSON string or number.
///
/// Numbers go through their textual form, never through float arithmetic.
pub fn amount_of(value: &Value) -> Option<Amount> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// [`nested`] then [`amount_of`]; `None` on any miss.
pub fn amount_at(value: &Value, path: &[&str]) -> Option<Amount> {
    nested(value, path).and_then(amount_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_nested_string_amount() {
        let record = json!({
            "create_arguments": { "amount": { "initial_amount": "10.0000000000" } }
        });
        let amount = amount_at(&record, &["create_arguments", "amount", "initial_amount"]);
        assert_eq!(amount.unwrap().to_string(), "10.0000000000");
    }

    #[test]
    fn accepts_bare_numbers_via_text() {
        let record = json!({ "amount": 5 });
        assert_eq!(
            amount_at(&record, &["amount"]).unwrap().to_string(),
            "5.0000000000"
        );
    }

    #[test]
    fn missing_or_malformed_yields_none() {
        let record = json!({ "amount": { "initial_amount": "not-a-number" } });
        assert!(amount_at(&record, &["amount", "initial_amount"]).is_none());
        assert!(amount_at(&record, &["absent"]).is_none());
        assert!(amount_at(&json!(null), &["amount"]).is_none());
    }
}
