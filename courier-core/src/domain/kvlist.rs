//! Ordered key/value bundles
//!
//! Control writes and operation parameters travel as ordered lists of
//! (key, value) string pairs. Duplicate keys are permitted and the first
//! occurrence wins on lookup. Values are always strings at the transport
//! boundary; types are only deduced when converting to a reading.

use serde_json::Value;
use std::fmt;

use crate::domain::reading::{DataValue, Datapoint, Reading, NONE_POINT};

/// Errors raised when building a key/value list from JSON
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The payload was not a JSON object
    #[error("expected a JSON object, got {0}")]
    BadStructure(&'static str),
    /// A value in the object was not a string
    #[error("value for key '{0}' must be a string")]
    BadValueType(String),
}

/// An ordered list of key/value string pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KvList {
    items: Vec<(String, String)>,
}

impl KvList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from a JSON object whose values are all strings
    pub fn from_json_object(value: &Value) -> Result<Self, KvError> {
        let Some(map) = value.as_object() else {
            return Err(KvError::BadStructure(json_type_name(value)));
        };
        let mut list = KvList::new();
        for (key, v) in map {
            match v.as_str() {
                Some(s) => list.add(key, s),
                None => return Err(KvError::BadValueType(key.clone())),
            }
        }
        Ok(list)
    }

    /// Append a key/value pair
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.push((key.into(), value.into()));
    }

    /// The value for a key, or the empty string when the key is absent
    pub fn get(&self, key: &str) -> &str {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as a JSON object: `{ "key" :"value", ... }`
    ///
    /// Embedded quotes are escaped; pair order is preserved.
    pub fn to_json(&self) -> String {
        let mut payload = String::from("{ ");
        let mut first = true;
        for (key, value) in &self.items {
            if first {
                first = false;
            } else {
                payload.push_str(", ");
            }
            payload.push('"');
            payload.push_str(&escape(key));
            payload.push_str("\" :\"");
            payload.push_str(&escape(value));
            payload.push('"');
        }
        payload.push_str(" }");
        payload
    }

    /// Substitute `$key$` macros in every value from the given parameters.
    ///
    /// Substitution is a single left-to-right pass; expanded text is never
    /// rescanned. An unterminated `$` is reported and the remainder of the
    /// value is copied verbatim.
    pub fn substitute(&mut self, parameters: &KvList) {
        for (key, value) in &mut self.items {
            let substituted = substitute_value(key, value, parameters);
            *value = substituted;
        }
    }

    /// Convert to a reading, deducing each value's type.
    ///
    /// A value made up entirely of digits becomes an integer, digits with a
    /// single embedded dot become a floating point value and anything else
    /// stays a string. An empty list produces the placeholder point that
    /// keeps downstream filters fed.
    pub fn to_reading(&self, asset: &str) -> Reading {
        let mut points: Vec<Datapoint> = self
            .items
            .iter()
            .map(|(k, v)| Datapoint::new(k.clone(), deduce(v)))
            .collect();
        if points.is_empty() {
            points.push(Datapoint::new(NONE_POINT, DataValue::Str(String::new())));
        }
        Reading::new(asset, points)
    }

    /// Replace the list contents with the data points of a reading,
    /// dropping the placeholder point if present.
    pub fn from_reading(&mut self, reading: &Reading) {
        self.items.clear();
        for dp in reading.datapoints() {
            if dp.name() == NONE_POINT {
                continue;
            }
            self.add(dp.name(), dp.value().to_string_value());
        }
    }
}

impl fmt::Display for KvList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn substitute_value(key: &str, value: &str, parameters: &KvList) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('$') {
            Some(end) => {
                out.push_str(parameters.get(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                tracing::error!(
                    "Unterminated macro in value for '{}', copying remainder verbatim",
                    key
                );
                out.push('$');
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn deduce(value: &str) -> DataValue {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    let dots = value.chars().filter(|c| *c == '.').count();
    if !value.is_empty() && digits + dots == value.len() && digits > 0 {
        if dots == 0 {
            if let Ok(i) = value.parse() {
                return DataValue::Int(i);
            }
        } else if dots == 1 {
            if let Ok(f) = value.parse() {
                return DataValue::Float(f);
            }
        }
    }
    DataValue::Str(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object() {
        let list = KvList::from_json_object(&json!({"speed": "40", "mode": "auto"})).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get("speed"), "40");
        assert_eq!(list.get("mode"), "auto");
    }

    #[test]
    fn test_from_json_object_rejects_non_object() {
        assert!(matches!(
            KvList::from_json_object(&json!([1, 2])),
            Err(KvError::BadStructure(_))
        ));
    }

    #[test]
    fn test_from_json_object_rejects_non_string_value() {
        assert!(matches!(
            KvList::from_json_object(&json!({"speed": 40})),
            Err(KvError::BadValueType(key)) if key == "speed"
        ));
    }

    #[test]
    fn test_get_first_match_wins() {
        let mut list = KvList::new();
        list.add("k", "first");
        list.add("k", "second");
        assert_eq!(list.get("k"), "first");
    }

    #[test]
    fn test_get_missing_is_empty() {
        assert_eq!(KvList::new().get("absent"), "");
    }

    #[test]
    fn test_to_json() {
        let mut list = KvList::new();
        list.add("target", "pump-out");
        list.add("rate", "40");
        assert_eq!(list.to_json(), r#"{ "target" :"pump-out", "rate" :"40" }"#);
    }

    #[test]
    fn test_to_json_escapes_quotes() {
        let mut list = KvList::new();
        list.add("msg", "say \"hi\"");
        assert_eq!(list.to_json(), r#"{ "msg" :"say \"hi\"" }"#);
    }

    #[test]
    fn test_substitute() {
        let mut list = KvList::new();
        list.add("target", "$name$-out");
        list.add("rate", "$rate$");
        let mut params = KvList::new();
        params.add("name", "pump");
        params.add("rate", "40");
        list.substitute(&params);
        assert_eq!(list.get("target"), "pump-out");
        assert_eq!(list.get("rate"), "40");
    }

    #[test]
    fn test_substitute_is_single_pass() {
        let mut list = KvList::new();
        list.add("v", "$a$");
        let mut params = KvList::new();
        params.add("a", "$b$");
        params.add("b", "deep");
        list.substitute(&params);
        // The expansion of $a$ is not rescanned
        assert_eq!(list.get("v"), "$b$");
    }

    #[test]
    fn test_substitute_unterminated_dollar() {
        let mut list = KvList::new();
        list.add("v", "cost is $total");
        list.substitute(&KvList::new());
        assert_eq!(list.get("v"), "cost is $total");
    }

    #[test]
    fn test_substitute_unknown_key_expands_empty() {
        let mut list = KvList::new();
        list.add("v", "x$missing$y");
        list.substitute(&KvList::new());
        assert_eq!(list.get("v"), "xy");
    }

    #[test]
    fn test_to_reading_type_deduction() {
        let mut list = KvList::new();
        list.add("count", "12");
        list.add("rate", "1.5");
        list.add("mode", "auto");
        list.add("version", "1.2.3");
        let reading = list.to_reading("asset");
        let dps = reading.datapoints();
        assert_eq!(*dps[0].value(), DataValue::Int(12));
        assert_eq!(*dps[1].value(), DataValue::Float(1.5));
        assert_eq!(*dps[2].value(), DataValue::Str("auto".into()));
        // Two dots is not a number
        assert_eq!(*dps[3].value(), DataValue::Str("1.2.3".into()));
    }

    #[test]
    fn test_empty_list_produces_placeholder() {
        let reading = KvList::new().to_reading("asset");
        assert_eq!(reading.datapoints().len(), 1);
        assert_eq!(reading.datapoints()[0].name(), NONE_POINT);
    }

    #[test]
    fn test_round_trip_through_reading() {
        let mut list = KvList::new();
        list.add("count", "12");
        list.add("rate", "1.5");
        list.add("level", "40.0");
        list.add("mode", "auto");
        let mut back = KvList::new();
        back.from_reading(&list.to_reading("asset"));
        assert_eq!(back, list);
    }

    #[test]
    fn test_from_reading_drops_placeholder() {
        let mut back = KvList::new();
        back.add("stale", "1");
        back.from_reading(&KvList::new().to_reading("asset"));
        assert!(back.is_empty());
    }
}
