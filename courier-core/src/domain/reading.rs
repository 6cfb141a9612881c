//! Readings and data points
//!
//! A reading is an asset-named bundle of typed data points and is the
//! canonical transport through a control filter pipeline. Control values
//! arrive as strings and are converted to readings before filtering, then
//! back to strings for delivery.

use serde_json::Value;

/// Name of the placeholder data point used for empty value bundles.
///
/// Filters reject empty readings, so an empty key/value list travels as a
/// single point with this name and is stripped again on the way back.
pub const NONE_POINT: &str = "__None__";

/// A typed data point value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Str(String),
    Int(i64),
    Float(f64),
    /// Nested JSON carried opaquely through the pipeline
    Object(Value),
}

impl DataValue {
    /// The string form used when converting a reading back to a key/value
    /// list. Whole floats keep one decimal so the string round-trips.
    pub fn to_string_value(&self) -> String {
        match self {
            DataValue::Str(s) => s.clone(),
            DataValue::Int(i) => i.to_string(),
            DataValue::Float(f) => {
                if f.fract() == 0.0 {
                    format!("{:.1}", f)
                } else {
                    format!("{}", f)
                }
            }
            DataValue::Object(v) => v.to_string(),
        }
    }

    fn to_json(&self) -> String {
        match self {
            DataValue::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            DataValue::Int(i) => i.to_string(),
            DataValue::Float(f) => format!("{}", f),
            DataValue::Object(v) => v.to_string(),
        }
    }
}

/// A named, typed value within a reading
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    name: String,
    value: DataValue,
}

impl Datapoint {
    pub fn new(name: impl Into<String>, value: DataValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DataValue {
        &self.value
    }
}

/// An asset-named bundle of data points
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    asset: String,
    datapoints: Vec<Datapoint>,
}

impl Reading {
    pub fn new(asset: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        Self {
            asset: asset.into(),
            datapoints,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn datapoints(&self) -> &[Datapoint] {
        &self.datapoints
    }

    pub fn push(&mut self, datapoint: Datapoint) {
        self.datapoints.push(datapoint);
    }

    /// JSON rendering used for trace logging
    pub fn to_json(&self) -> String {
        let mut out = format!("{{ \"asset\" : \"{}\", \"readings\" : {{ ", self.asset);
        let mut first = true;
        for dp in &self.datapoints {
            if first {
                first = false;
            } else {
                out.push_str(", ");
            }
            out.push('"');
            out.push_str(dp.name());
            out.push_str("\" : ");
            out.push_str(&dp.value.to_json());
        }
        out.push_str(" } }");
        out
    }
}
