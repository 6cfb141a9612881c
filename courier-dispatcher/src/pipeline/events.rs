//! Change-notification payload helpers
//!
//! Storage change notifications are loosely typed: integer columns may
//! arrive as numbers or strings, booleans as `t`/`f` or true/false, and
//! the column a handler needs may sit in the top-level `where` clause or
//! in a nested `where.and` clause. These helpers normalise all of that.

use serde_json::Value;

/// Look up a column's value in a where clause, descending into nested
/// `and` clauses
pub fn where_value<'a>(clause: &'a Value, column: &str) -> Option<&'a Value> {
    if clause.get("column").and_then(Value::as_str) == Some(column) {
        return clause.get("value");
    }
    clause.get("and").and_then(|inner| where_value(inner, column))
}

/// Integer lookup in a where clause
pub fn where_int(clause: &Value, column: &str) -> Option<i64> {
    where_value(clause, column).and_then(as_int)
}

/// String lookup in a where clause
pub fn where_str<'a>(clause: &'a Value, column: &str) -> Option<&'a str> {
    where_value(clause, column).and_then(Value::as_str)
}

/// An integer that may be encoded as a number or a string
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A boolean that may be encoded as a bool, `t`/`f` or `true`/`false`
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "t" | "true" => Some(true),
            "f" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_where_top_level() {
        let clause = json!({"column": "cpid", "condition": "=", "value": 3});
        assert_eq!(where_int(&clause, "cpid"), Some(3));
        assert_eq!(where_int(&clause, "fname"), None);
    }

    #[test]
    fn test_where_nested_and() {
        let clause = json!({
            "column": "cpid", "condition": "=", "value": "3",
            "and": {"column": "fname", "condition": "=", "value": "scale"}
        });
        assert_eq!(where_int(&clause, "cpid"), Some(3));
        assert_eq!(where_str(&clause, "fname"), Some("scale"));
    }

    #[test]
    fn test_int_encodings() {
        assert_eq!(as_int(&json!(7)), Some(7));
        assert_eq!(as_int(&json!("7")), Some(7));
        assert_eq!(as_int(&json!(" 7 ")), Some(7));
        assert_eq!(as_int(&json!("seven")), None);
        assert_eq!(as_int(&json!(null)), None);
    }

    #[test]
    fn test_bool_encodings() {
        assert_eq!(as_bool(&json!(true)), Some(true));
        assert_eq!(as_bool(&json!("t")), Some(true));
        assert_eq!(as_bool(&json!("false")), Some(false));
        assert_eq!(as_bool(&json!("maybe")), None);
    }
}
