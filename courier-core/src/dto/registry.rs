//! Core registry records
//!
//! Types exchanged with the core configuration/registration service: the
//! service records it holds, the configuration categories it manages and
//! the claims it extracts from verified bearer tokens.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A service record held by the core registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub protocol: String,
    pub address: String,
    pub service_port: u16,
    pub management_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ServiceRecord {
    /// Base URL of the service API
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.service_port)
    }
}

/// Claims extracted from a verified bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub name: String,
    #[serde(rename = "type")]
    pub caller_type: String,
}

/// A configuration category: a named bundle of string items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

impl Category {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    pub fn value(&self, item: &str) -> Option<&str> {
        self.items.get(item).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let record = ServiceRecord {
            name: "pump".into(),
            service_type: "Southbound".into(),
            protocol: "http".into(),
            address: "10.0.0.5".into(),
            service_port: 6683,
            management_port: 1081,
            token: None,
        };
        assert_eq!(record.base_url(), "http://10.0.0.5:6683");
    }

    #[test]
    fn test_category_items() {
        let category = Category::named("pipeline_filter")
            .with_item("plugin", "scale")
            .with_item("factor", "10");
        assert_eq!(category.value("plugin"), Some("scale"));
        assert_eq!(category.value("missing"), None);
    }
}
