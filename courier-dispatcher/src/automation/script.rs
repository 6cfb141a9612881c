//! Stored automation scripts
//!
//! A script is loaded lazily from storage on first execution: the ACL it
//! references is checked against the caller, the steps payload is parsed
//! into typed steps and the in-memory form is immutable from then on.
//! Steps execute in ascending order; the first failing step aborts the
//! script with its step number for diagnostics.

use courier_core::domain::{CallerIdentity, KvList};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::automation::acl::Acl;
use crate::automation::step::ScriptStep;
use crate::context::ServiceContext;
use crate::repository::{acl_repository, script_repository};

/// Maximum sub-script nesting before execution is refused
pub const MAX_SCRIPT_DEPTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("unable to retrieve a control script called '{0}'")]
    NotFound(String),

    #[error("caller is not permitted to run control script '{0}'")]
    Denied(String),

    #[error("control script '{script}' is badly formatted: {reason}")]
    Parse { script: String, reason: String },

    #[error("control script '{0}' exceeded the sub-script depth limit")]
    RecursionLimit(String),

    #[error("step {step} of control script '{script}' failed: {source:#}")]
    StepFailed {
        script: String,
        step: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load control script '{script}'")]
    Storage {
        script: String,
        #[source]
        source: sqlx::Error,
    },
}

/// A stored automation script
pub struct Script {
    name: String,
    caller: CallerIdentity,
    /// Parsed steps by order; None until loaded
    steps: Option<BTreeMap<i64, ScriptStep>>,
}

impl Script {
    pub fn new(name: impl Into<String>, caller: CallerIdentity) -> Self {
        Self {
            name: name.into(),
            caller,
            steps: None,
        }
    }

    /// Execute the script with the given parameters.
    ///
    /// `depth` counts sub-script nesting; top-level executions pass 0.
    /// Boxed because sub-script steps recurse back into this method.
    pub fn execute<'a>(
        &'a mut self,
        ctx: &'a ServiceContext,
        parameters: &'a KvList,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(), ScriptError>> + Send + 'a>> {
        Box::pin(async move {
            if depth >= MAX_SCRIPT_DEPTH {
                return Err(ScriptError::RecursionLimit(self.name.clone()));
            }
            if self.steps.is_none() {
                self.load(ctx).await?;
            }
            let steps = self.steps.as_ref().expect("script loaded above");
            for (order, step) in steps {
                debug!("Control script '{}' executing step {}", self.name, order);
                step.execute(ctx, &self.name, &self.caller, parameters, depth)
                    .await
                    .map_err(|e| ScriptError::StepFailed {
                        script: self.name.clone(),
                        step: *order,
                        source: e,
                    })?;
            }
            Ok(())
        })
    }

    /// Load the script from storage, checking the caller against its ACL
    async fn load(&mut self, ctx: &ServiceContext) -> Result<(), ScriptError> {
        let row = script_repository::find_by_name(&ctx.pool, &self.name)
            .await
            .map_err(|e| ScriptError::Storage {
                script: self.name.clone(),
                source: e,
            })?
            .ok_or_else(|| ScriptError::NotFound(self.name.clone()))?;

        if let Some(acl_name) = row.acl.as_deref().filter(|a| !a.is_empty()) {
            self.check_acl(ctx, acl_name).await?;
        }

        let steps = normalize_steps(&self.name, row.steps)?;
        self.steps = Some(parse_steps(&self.name, &steps)?);
        Ok(())
    }

    async fn check_acl(&self, ctx: &ServiceContext, acl_name: &str) -> Result<(), ScriptError> {
        let row = acl_repository::find_by_name(&ctx.pool, acl_name)
            .await
            .map_err(|e| ScriptError::Storage {
                script: self.name.clone(),
                source: e,
            })?;
        let Some(row) = row else {
            warn!(
                "Control script '{}' references the missing ACL '{}', denying execution",
                self.name, acl_name
            );
            return Err(ScriptError::Denied(self.name.clone()));
        };
        let acl =
            Acl::parse(&row.name, &row.service, &row.url).map_err(|e| ScriptError::Parse {
                script: self.name.clone(),
                reason: e.to_string(),
            })?;
        if !acl.allows(&self.caller) {
            return Err(ScriptError::Denied(self.name.clone()));
        }
        Ok(())
    }
}

/// Accept the steps column as a JSON array, an object wrapping a `steps`
/// array, or a legacy string form with single-quoted content.
pub fn normalize_steps(script: &str, stored: Value) -> Result<Value, ScriptError> {
    let parse_error = |reason: String| ScriptError::Parse {
        script: script.to_string(),
        reason,
    };

    let value = match stored {
        Value::String(text) => {
            warn!(
                "Control script '{}' stores its steps as a string; converting legacy quoting",
                script
            );
            serde_json::from_str(&requote(&text))
                .map_err(|e| parse_error(format!("invalid steps string: {}", e)))?
        }
        other => other,
    };

    let value = match value {
        Value::Object(mut wrapper) if wrapper.contains_key("steps") => {
            wrapper.remove("steps").expect("key checked above")
        }
        other => other,
    };

    if value.is_array() {
        Ok(value)
    } else {
        Err(parse_error("steps should be an array".to_string()))
    }
}

/// Replace single quotes with double quotes outside string literals, so
/// apostrophes inside double-quoted values survive the conversion.
fn requote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\'' if !in_string => out.push('"'),
            _ => out.push(c),
        }
    }
    out
}

/// Parse a steps array into typed steps keyed by their unique order.
///
/// Each element is a one-key object whose key is the step type; every
/// step must carry an integer `order` and two steps may not share one.
pub fn parse_steps(script: &str, steps: &Value) -> Result<BTreeMap<i64, ScriptStep>, ScriptError> {
    let parse_error = |reason: String| ScriptError::Parse {
        script: script.to_string(),
        reason,
    };

    let items = steps
        .as_array()
        .ok_or_else(|| parse_error("steps should be an array".to_string()))?;

    let mut parsed = BTreeMap::new();
    for item in items {
        let entries = item
            .as_object()
            .ok_or_else(|| parse_error("step items should be objects".to_string()))?;
        for (step_type, step) in entries {
            if !step.is_object() {
                return Err(parse_error(format!("{} step is not an object", step_type)));
            }
            let order = step
                .get("order")
                .and_then(Value::as_i64)
                .ok_or_else(|| parse_error(format!("{} step is missing an order item", step_type)))?;
            if parsed.contains_key(&order) {
                return Err(parse_error(format!(
                    "two steps share the order value {}",
                    order
                )));
            }
            let step = ScriptStep::parse(step_type, step).map_err(parse_error)?;
            parsed.insert(order, step);
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::step::StepAction;
    use serde_json::json;

    #[test]
    fn test_parse_steps_in_order() {
        let steps = json!([
            {"write": {"order": 3, "service": "svc", "values": {"x": "0"}}},
            {"delay": {"order": 2, "duration": 100}},
            {"write": {"order": 1, "service": "svc", "values": {"x": "$v$"},
                       "condition": {"key": "mode", "condition": "==", "value": "on"}}}
        ]);
        let parsed = parse_steps("demo", &steps).unwrap();
        assert_eq!(parsed.len(), 3);
        // BTreeMap iterates in ascending order
        let orders: Vec<i64> = parsed.keys().copied().collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(parsed[&1].condition.is_some());
        assert_eq!(parsed[&2].action, StepAction::Delay { duration_ms: 100 });
    }

    #[test]
    fn test_parse_steps_rejects_duplicate_order() {
        let steps = json!([
            {"delay": {"order": 1, "duration": 10}},
            {"delay": {"order": 1, "duration": 20}}
        ]);
        let err = parse_steps("demo", &steps).unwrap_err();
        assert!(err.to_string().contains("share the order"));
    }

    #[test]
    fn test_parse_steps_requires_order() {
        let steps = json!([{"delay": {"duration": 10}}]);
        let err = parse_steps("demo", &steps).unwrap_err();
        assert!(err.to_string().contains("missing an order"));
    }

    #[test]
    fn test_parse_steps_rejects_non_objects() {
        assert!(parse_steps("demo", &json!(["delay"])).is_err());
        assert!(parse_steps("demo", &json!([{"delay": "fast"}])).is_err());
        assert!(parse_steps("demo", &json!({"delay": {}})).is_err());
    }

    #[test]
    fn test_normalize_steps_accepts_array() {
        let steps = json!([{"delay": {"order": 1, "duration": 10}}]);
        assert_eq!(normalize_steps("demo", steps.clone()).unwrap(), steps);
    }

    #[test]
    fn test_normalize_steps_unwraps_object_form() {
        let wrapped = json!({"steps": [{"delay": {"order": 1, "duration": 10}}]});
        let steps = normalize_steps("demo", wrapped).unwrap();
        assert!(steps.is_array());
    }

    #[test]
    fn test_normalize_steps_legacy_string_form() {
        let legacy = json!("[{'delay': {'order': 1, 'duration': 10}}]");
        let steps = normalize_steps("demo", legacy).unwrap();
        let parsed = parse_steps("demo", &steps).unwrap();
        assert_eq!(parsed[&1].action, StepAction::Delay { duration_ms: 10 });
    }

    #[test]
    fn test_requote_preserves_apostrophes_inside_strings() {
        let legacy = r#"[{'write': {'order': 1, 'service': "pump's twin", 'values': {'x': "1"}}}]"#;
        let converted = requote(legacy);
        let value: Value = serde_json::from_str(&converted).unwrap();
        assert_eq!(value[0]["write"]["service"], "pump's twin");
    }

    #[test]
    fn test_normalize_steps_rejects_non_array() {
        assert!(normalize_steps("demo", json!({"write": {}})).is_err());
        assert!(normalize_steps("demo", json!("not json at all")).is_err());
    }
}
