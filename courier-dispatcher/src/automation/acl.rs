//! Script access control lists
//!
//! An ACL row carries two JSON arrays: service rules matching the caller
//! by name or type, and URL rules matching the request URL the caller
//! used, optionally narrowed to caller types. An empty array on either
//! side allows any caller; both sides must accept.

use courier_core::domain::CallerIdentity;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
#[error("ACL '{name}' is badly formatted: {reason}")]
pub struct AclError {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
enum ServiceRule {
    Name(String),
    Type(String),
}

#[derive(Debug, Clone, PartialEq)]
struct UrlRule {
    url: String,
    /// Caller types accepted on this URL; empty accepts all
    types: Vec<String>,
}

/// A parsed access control list
#[derive(Debug, Clone, PartialEq)]
pub struct Acl {
    name: String,
    services: Vec<ServiceRule>,
    urls: Vec<UrlRule>,
}

impl Acl {
    /// Parse an ACL from its service and url table columns
    pub fn parse(name: &str, service: &Value, url: &Value) -> Result<Self, AclError> {
        let bad = |reason: &str| AclError {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut services = Vec::new();
        for entry in as_rule_array(service).ok_or_else(|| bad("service should be an array"))? {
            if let Some(n) = entry.get("name").and_then(Value::as_str) {
                services.push(ServiceRule::Name(n.to_string()));
            } else if let Some(t) = entry.get("type").and_then(Value::as_str) {
                services.push(ServiceRule::Type(t.to_string()));
            } else {
                return Err(bad("service entries must have a name or a type"));
            }
        }

        let mut urls = Vec::new();
        for entry in as_rule_array(url).ok_or_else(|| bad("url should be an array"))? {
            let Some(u) = entry.get("url").and_then(Value::as_str) else {
                return Err(bad("url entries must have a url"));
            };
            let mut types = Vec::new();
            if let Some(inner) = entry.get("acl") {
                for rule in inner
                    .as_array()
                    .ok_or_else(|| bad("the acl of a url entry should be an array"))?
                {
                    let Some(t) = rule.get("type").and_then(Value::as_str) else {
                        return Err(bad("url acl entries must have a type"));
                    };
                    types.push(t.to_string());
                }
            }
            urls.push(UrlRule {
                url: u.to_string(),
                types,
            });
        }

        Ok(Self {
            name: name.to_string(),
            services,
            urls,
        })
    }

    /// Whether the caller may execute a script guarded by this ACL
    pub fn allows(&self, caller: &CallerIdentity) -> bool {
        let allowed = self.service_allows(caller) && self.url_allows(caller);
        if !allowed {
            warn!(
                "ACL '{}' denies caller '{}' of type '{}' on '{}'",
                self.name, caller.source_name, caller.source_type, caller.request_url
            );
        }
        allowed
    }

    fn service_allows(&self, caller: &CallerIdentity) -> bool {
        if self.services.is_empty() {
            return true;
        }
        self.services.iter().any(|rule| match rule {
            ServiceRule::Name(name) => *name == caller.source_name,
            ServiceRule::Type(service_type) => *service_type == caller.source_type,
        })
    }

    fn url_allows(&self, caller: &CallerIdentity) -> bool {
        if self.urls.is_empty() {
            return true;
        }
        self.urls.iter().any(|rule| {
            rule.url == caller.request_url
                || rule.types.is_empty()
                || rule.types.iter().any(|t| *t == caller.source_type)
        })
    }
}

/// Null and empty values are treated as an empty rule array
fn as_rule_array(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => Some(items.iter().collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller(name: &str, caller_type: &str, url: &str) -> CallerIdentity {
        CallerIdentity::new(name, caller_type, url)
    }

    #[test]
    fn test_empty_acl_allows_anyone() {
        let acl = Acl::parse("open", &json!([]), &json!([])).unwrap();
        assert!(acl.allows(&caller("x", "Schedule", "/dispatch/write")));
        assert!(acl.allows(&CallerIdentity::default()));
    }

    #[test]
    fn test_service_name_rule() {
        let acl = Acl::parse("named", &json!([{"name": "north"}]), &json!([])).unwrap();
        assert!(acl.allows(&caller("north", "Service", "/dispatch/write")));
        assert!(!acl.allows(&caller("south", "Service", "/dispatch/write")));
    }

    #[test]
    fn test_service_type_rule_denies_other_types() {
        let acl = Acl::parse("typed", &json!([{"type": "Notification"}]), &json!([])).unwrap();
        assert!(acl.allows(&caller("n1", "Notification", "/dispatch/write")));
        // A Schedule caller is denied, no matter its name
        assert!(!acl.allows(&caller("n1", "Schedule", "/dispatch/write")));
    }

    #[test]
    fn test_url_rule_matches_request_url() {
        let acl = Acl::parse(
            "urls",
            &json!([]),
            &json!([{"url": "/dispatch/operation", "acl": [{"type": "Service"}]}]),
        )
        .unwrap();
        assert!(acl.allows(&caller("x", "Schedule", "/dispatch/operation")));
        assert!(!acl.allows(&caller("x", "Schedule", "/dispatch/write")));
    }

    #[test]
    fn test_url_rule_with_empty_inner_acl_accepts() {
        let acl = Acl::parse(
            "urls",
            &json!([]),
            &json!([{"url": "/dispatch/operation", "acl": []}]),
        )
        .unwrap();
        // An empty inner acl accepts regardless of the URL used
        assert!(acl.allows(&caller("x", "Schedule", "/dispatch/write")));
    }

    #[test]
    fn test_url_rule_inner_type_match() {
        let acl = Acl::parse(
            "urls",
            &json!([]),
            &json!([{"url": "/other", "acl": [{"type": "Schedule"}]}]),
        )
        .unwrap();
        assert!(acl.allows(&caller("x", "Schedule", "/dispatch/write")));
        assert!(!acl.allows(&caller("x", "Service", "/dispatch/write")));
    }

    #[test]
    fn test_both_sides_must_accept() {
        let acl = Acl::parse(
            "both",
            &json!([{"type": "Notification"}]),
            &json!([{"url": "/dispatch/write", "acl": [{"type": "Notification"}]}]),
        )
        .unwrap();
        assert!(acl.allows(&caller("n1", "Notification", "/dispatch/write")));
        assert!(!acl.allows(&caller("n1", "Notification", "/elsewhere")));
        assert!(!acl.allows(&caller("s1", "Schedule", "/dispatch/write")));
    }

    #[test]
    fn test_malformed_entries_rejected() {
        assert!(Acl::parse("bad", &json!([{"service": "x"}]), &json!([])).is_err());
        assert!(Acl::parse("bad", &json!({"name": "x"}), &json!([])).is_err());
        assert!(Acl::parse("bad", &json!([]), &json!([{"acl": []}])).is_err());
    }
}
