//! Dispatch API payloads

use serde::{Deserialize, Serialize};

/// Body of `POST /dispatch/write`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    /// One of `service`, `asset`, `script`, `broadcast`
    pub destination: String,
    /// Destination name; required except for broadcasts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Values to write, all strings
    pub write: serde_json::Value,
    /// Source endpoint type hint for pipeline matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// Body of `POST /dispatch/operation`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Single-key object: operation name to parameter object
    pub operation: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// Standard message response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_request_deserializes() {
        let req: WriteRequest = serde_json::from_value(json!({
            "destination": "service",
            "name": "pump",
            "write": {"speed": "40"},
            "source": "Service",
            "source_name": "controller"
        }))
        .unwrap();
        assert_eq!(req.destination, "service");
        assert_eq!(req.name.as_deref(), Some("pump"));
        assert_eq!(req.source.as_deref(), Some("Service"));
    }

    #[test]
    fn test_operation_request_minimal() {
        let req: OperationRequest = serde_json::from_value(json!({
            "destination": "broadcast",
            "operation": {"reboot": {}}
        }))
        .unwrap();
        assert!(req.name.is_none());
        assert!(req.source.is_none());
    }
}
