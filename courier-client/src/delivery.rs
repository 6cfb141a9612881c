//! Southbound delivery
//!
//! Delivery of control payloads to device-facing services. The dispatcher
//! PUTs JSON to the target's control API, identifying the originating
//! caller through the `Service-Orig-*` headers and itself through a bearer
//! token when one was issued.

use courier_core::domain::{CallerIdentity, KvList};
use courier_core::dto::registry::ServiceRecord;
use reqwest::Client;

use crate::error::{ClientError, Result};

/// Header naming the caller a control request originated from
pub const HEADER_ORIG_FROM: &str = "Service-Orig-From";
/// Header naming the caller's service type
pub const HEADER_ORIG_TYPE: &str = "Service-Orig-Type";

/// Control API path for setpoint writes
pub const SETPOINT_PATH: &str = "/fledge/south/setpoint";
/// Control API path for operations
pub const OPERATION_PATH: &str = "/fledge/south/operation";

/// Build the body of a setpoint write: `{ "values" : { ... } }`
pub fn write_payload(values: &KvList) -> String {
    format!("{{ \"values\" : {} }}", values.to_json())
}

/// Build the body of an operation: `{ "operation" : "...", "parameters" : { ... } }`
///
/// The parameters object is omitted when there are none.
pub fn operation_payload(operation: &str, parameters: &KvList) -> String {
    if parameters.is_empty() {
        format!("{{ \"operation\" : \"{}\" }}", operation)
    } else {
        format!(
            "{{ \"operation\" : \"{}\", \"parameters\" : {} }}",
            operation,
            parameters.to_json()
        )
    }
}

/// HTTP client used to deliver control payloads southbound
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: Client,
    /// Bearer token presented to downstream services
    token: Option<String>,
}

impl DeliveryClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    /// PUT a JSON payload to a path on the target service's API.
    ///
    /// A non-2xx status is reported as an error; there is no retry here,
    /// retries are upstream policy.
    pub async fn put_json(
        &self,
        record: &ServiceRecord,
        path: &str,
        payload: &str,
        caller: &CallerIdentity,
    ) -> Result<()> {
        let url = format!("{}{}", record.base_url(), path);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if !caller.source_name.is_empty() {
            request = request.header(HEADER_ORIG_FROM, &caller.source_name);
        }
        if !caller.source_type.is_empty() {
            request = request.header(HEADER_ORIG_TYPE, &caller.source_type);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), message));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_payload() {
        let mut values = KvList::new();
        values.add("x", "1");
        assert_eq!(write_payload(&values), r#"{ "values" : { "x" :"1" } }"#);
    }

    #[test]
    fn test_operation_payload() {
        let mut parameters = KvList::new();
        parameters.add("delay", "5");
        assert_eq!(
            operation_payload("reboot", &parameters),
            r#"{ "operation" : "reboot", "parameters" : { "delay" :"5" } }"#
        );
    }

    #[test]
    fn test_operation_payload_without_parameters() {
        assert_eq!(
            operation_payload("reboot", &KvList::new()),
            r#"{ "operation" : "reboot" }"#
        );
    }
}
