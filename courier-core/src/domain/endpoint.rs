//! Pipeline endpoints
//!
//! An endpoint names one side of a control flow as a (type, name) pair.
//! Pipelines declare the endpoints they serve; requests are matched against
//! them with a wildcard rule where `Any` accepts everything and an unnamed
//! candidate accepts any name of its type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type half of a pipeline endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    Undefined,
    Any,
    Service,
    Api,
    Notification,
    Schedule,
    Script,
    Broadcast,
    Asset,
}

impl EndpointKind {
    /// Parse the name strings used by the endpoint lookup tables
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Any" => Some(EndpointKind::Any),
            "Service" => Some(EndpointKind::Service),
            "API" => Some(EndpointKind::Api),
            "Notification" => Some(EndpointKind::Notification),
            "Schedule" => Some(EndpointKind::Schedule),
            "Script" => Some(EndpointKind::Script),
            "Broadcast" => Some(EndpointKind::Broadcast),
            "Asset" => Some(EndpointKind::Asset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Undefined => "Undefined",
            EndpointKind::Any => "Any",
            EndpointKind::Service => "Service",
            EndpointKind::Api => "API",
            EndpointKind::Notification => "Notification",
            EndpointKind::Schedule => "Schedule",
            EndpointKind::Script => "Script",
            EndpointKind::Broadcast => "Broadcast",
            EndpointKind::Asset => "Asset",
        }
    }

    /// Whether endpoints of this type carry a name
    pub fn carries_name(&self) -> bool {
        !matches!(
            self,
            EndpointKind::Undefined
                | EndpointKind::Any
                | EndpointKind::Api
                | EndpointKind::Broadcast
        )
    }
}

/// One side of a control flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    kind: EndpointKind,
    name: String,
}

impl Endpoint {
    pub fn undefined() -> Self {
        Self::nameless(EndpointKind::Undefined)
    }

    pub fn any() -> Self {
        Self::nameless(EndpointKind::Any)
    }

    pub fn api() -> Self {
        Self::nameless(EndpointKind::Api)
    }

    pub fn broadcast() -> Self {
        Self::nameless(EndpointKind::Broadcast)
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::named(EndpointKind::Service, name)
    }

    pub fn notification(name: impl Into<String>) -> Self {
        Self::named(EndpointKind::Notification, name)
    }

    pub fn schedule(name: impl Into<String>) -> Self {
        Self::named(EndpointKind::Schedule, name)
    }

    pub fn script(name: impl Into<String>) -> Self {
        Self::named(EndpointKind::Script, name)
    }

    pub fn asset(name: impl Into<String>) -> Self {
        Self::named(EndpointKind::Asset, name)
    }

    /// Build an endpoint from lookup-table parts. Named kinds keep the
    /// name; nameless kinds discard whatever the table row carried.
    pub fn from_parts(kind: EndpointKind, name: impl Into<String>) -> Self {
        if kind.carries_name() {
            Self {
                kind,
                name: name.into(),
            }
        } else {
            Self::nameless(kind)
        }
    }

    fn nameless(kind: EndpointKind) -> Self {
        Self {
            kind,
            name: String::new(),
        }
    }

    fn named(kind: EndpointKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when this pipeline endpoint accepts the candidate.
    ///
    /// `Any` accepts everything; otherwise the types must agree and the
    /// candidate's name must be empty or equal.
    pub fn matches(&self, candidate: &Endpoint) -> bool {
        if self.kind == EndpointKind::Any {
            return true;
        }
        candidate.kind == self.kind && (candidate.name.is_empty() || candidate.name == self.name)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.kind.as_str())
        } else {
            write!(f, "{}({})", self.kind.as_str(), self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            EndpointKind::Any,
            EndpointKind::Service,
            EndpointKind::Api,
            EndpointKind::Notification,
            EndpointKind::Schedule,
            EndpointKind::Script,
            EndpointKind::Broadcast,
            EndpointKind::Asset,
        ] {
            assert_eq!(EndpointKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EndpointKind::from_name("Bogus"), None);
    }

    #[test]
    fn test_any_matches_everything() {
        let any = Endpoint::any();
        assert!(any.matches(&Endpoint::service("pump")));
        assert!(any.matches(&Endpoint::broadcast()));
        assert!(any.matches(&Endpoint::any()));
    }

    #[test]
    fn test_exact_match() {
        let pipe = Endpoint::service("pump");
        assert!(pipe.matches(&Endpoint::service("pump")));
        assert!(!pipe.matches(&Endpoint::service("valve")));
        assert!(!pipe.matches(&Endpoint::asset("pump")));
    }

    #[test]
    fn test_unnamed_candidate_matches_by_type() {
        let pipe = Endpoint::service("pump");
        let unnamed = Endpoint::from_parts(EndpointKind::Service, "");
        assert!(pipe.matches(&unnamed));
    }

    #[test]
    fn test_nameless_kinds_drop_names() {
        let e = Endpoint::from_parts(EndpointKind::Broadcast, "ignored");
        assert_eq!(e.name(), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(Endpoint::service("pump").to_string(), "Service(pump)");
        assert_eq!(Endpoint::broadcast().to_string(), "Broadcast");
    }
}
