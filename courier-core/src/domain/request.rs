//! Control requests
//!
//! The typed intents accepted by the dispatch API. A request couples an
//! intent (what to write or operate, and where) with the identity of the
//! caller that submitted it, used for pipeline source matching and for ACL
//! checks on scripts.

use crate::domain::endpoint::Endpoint;
use crate::domain::kvlist::KvList;

/// Identity of the caller that submitted a request.
///
/// Populated only when the incoming HTTP call was authenticated; an
/// anonymous request carries empty fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerIdentity {
    pub source_name: String,
    pub source_type: String,
    pub request_url: String,
}

impl CallerIdentity {
    pub fn new(
        source_name: impl Into<String>,
        source_type: impl Into<String>,
        request_url: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            source_type: source_type.into(),
            request_url: request_url.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.source_name.is_empty() && self.source_type.is_empty()
    }
}

/// The intent of a control request
#[derive(Debug, Clone)]
pub enum ControlIntent {
    WriteService {
        service: String,
        values: KvList,
    },
    WriteAsset {
        asset: String,
        values: KvList,
    },
    WriteScript {
        script: String,
        values: KvList,
    },
    WriteBroadcast {
        values: KvList,
    },
    OperationService {
        operation: String,
        service: String,
        parameters: KvList,
    },
    OperationAsset {
        operation: String,
        asset: String,
        parameters: KvList,
    },
    OperationBroadcast {
        operation: String,
        parameters: KvList,
    },
}

impl ControlIntent {
    /// The destination endpoint used for pipeline matching
    pub fn destination(&self) -> Endpoint {
        match self {
            ControlIntent::WriteService { service, .. }
            | ControlIntent::OperationService { service, .. } => Endpoint::service(service),
            ControlIntent::WriteAsset { asset, .. }
            | ControlIntent::OperationAsset { asset, .. } => Endpoint::asset(asset),
            ControlIntent::WriteScript { script, .. } => Endpoint::script(script),
            ControlIntent::WriteBroadcast { .. } | ControlIntent::OperationBroadcast { .. } => {
                Endpoint::broadcast()
            }
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ControlIntent::WriteService { .. } => "write/service",
            ControlIntent::WriteAsset { .. } => "write/asset",
            ControlIntent::WriteScript { .. } => "write/script",
            ControlIntent::WriteBroadcast { .. } => "write/broadcast",
            ControlIntent::OperationService { .. } => "operation/service",
            ControlIntent::OperationAsset { .. } => "operation/asset",
            ControlIntent::OperationBroadcast { .. } => "operation/broadcast",
        }
    }
}

/// A control request as queued for execution
#[derive(Debug, Clone)]
pub struct ControlRequest {
    /// Who submitted the request, if authenticated
    pub caller: CallerIdentity,
    /// Source endpoint hint carried in the request body, if any
    pub source_hint: Option<Endpoint>,
    pub intent: ControlIntent,
}

impl ControlRequest {
    pub fn new(caller: CallerIdentity, source_hint: Option<Endpoint>, intent: ControlIntent) -> Self {
        Self {
            caller,
            source_hint,
            intent,
        }
    }

    pub fn destination(&self) -> Endpoint {
        self.intent.destination()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::endpoint::EndpointKind;

    #[test]
    fn test_destinations() {
        let values = KvList::new();
        assert_eq!(
            ControlIntent::WriteService {
                service: "pump".into(),
                values: values.clone()
            }
            .destination(),
            Endpoint::service("pump")
        );
        assert_eq!(
            ControlIntent::WriteBroadcast {
                values: values.clone()
            }
            .destination()
            .kind(),
            EndpointKind::Broadcast
        );
        assert_eq!(
            ControlIntent::OperationAsset {
                operation: "reboot".into(),
                asset: "motor".into(),
                parameters: values
            }
            .destination(),
            Endpoint::asset("motor")
        );
    }

    #[test]
    fn test_anonymous_caller() {
        assert!(CallerIdentity::default().is_anonymous());
        assert!(!CallerIdentity::new("svc", "Service", "/dispatch/write").is_anonymous());
    }
}
