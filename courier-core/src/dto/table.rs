//! Storage change-notification payloads
//!
//! The storage layer notifies the dispatcher of table mutations through
//! `POST /table/{insert,update,delete}/{table}`. Inserts carry the raw row;
//! updates and deletes carry a `where` clause that may nest further
//! conditions under `and`.

use serde::{Deserialize, Serialize};

/// Body of `POST /table/update/{table}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableUpdate {
    pub values: serde_json::Value,
    #[serde(rename = "where")]
    pub condition: serde_json::Value,
}

/// Body of `POST /table/delete/{table}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDelete {
    #[serde(rename = "where")]
    pub condition: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_round_trip() {
        let update: TableUpdate = serde_json::from_value(json!({
            "values": {"forder": 2},
            "where": {"column": "cpid", "condition": "=", "value": "3",
                      "and": {"column": "fname", "condition": "=", "value": "scale"}}
        }))
        .unwrap();
        assert_eq!(update.values["forder"], 2);
        assert_eq!(update.condition["and"]["column"], "fname");
    }
}
