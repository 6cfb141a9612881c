//! Script steps
//!
//! A step is one typed action within an automation script, optionally
//! guarded by a condition on the script's input parameters. Write and
//! operation steps substitute `$key$` macros from the parameters and then
//! deliver through the same pipeline-and-send path as top-level requests,
//! with the script itself as the source endpoint.

use courier_core::domain::{CallerIdentity, Endpoint, KvList};
use serde_json::Value;
use tracing::debug;

use crate::automation::script::Script;
use crate::context::ServiceContext;
use crate::worker;

/// Condition operators; anything else is rejected at parse time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Eq,
    Ne,
}

impl ConditionOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "==" => Some(ConditionOp::Eq),
            "!=" => Some(ConditionOp::Ne),
            _ => None,
        }
    }
}

/// A condition guarding a script step
#[derive(Debug, Clone, PartialEq)]
pub struct StepCondition {
    pub key: String,
    pub op: ConditionOp,
    pub value: String,
}

impl StepCondition {
    /// Evaluate against the script parameters. A key that is absent from
    /// the parameters skips the step.
    pub fn evaluate(&self, parameters: &KvList) -> bool {
        if !parameters.contains_key(&self.key) {
            tracing::warn!(
                "The key '{}' was not present in the parameters of the script",
                self.key
            );
            return false;
        }
        let actual = parameters.get(&self.key);
        match self.op {
            ConditionOp::Eq => actual == self.value,
            ConditionOp::Ne => actual != self.value,
        }
    }
}

/// The action a step performs
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Write {
        service: String,
        values: KvList,
    },
    Operation {
        operation: String,
        service: String,
        parameters: KvList,
    },
    Delay {
        duration_ms: u64,
    },
    Config {
        category: String,
        item: String,
        value: String,
    },
    SubScript {
        name: String,
    },
}

/// One step of an automation script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub condition: Option<StepCondition>,
    pub action: StepAction,
}

impl ScriptStep {
    /// Parse a step of the given type from its JSON object. Errors return
    /// the reason only; the caller adds the script context.
    pub fn parse(step_type: &str, step: &Value) -> Result<Self, String> {
        let condition = parse_condition(step)?;
        let action = match step_type {
            "write" => {
                let service = required_str(step, "service")
                    .ok_or("write type steps must contain a service name")?;
                let values = step
                    .get("values")
                    .ok_or("write type steps must contain values")?;
                let values = KvList::from_json_object(values)
                    .map_err(|e| format!("invalid write values: {}", e))?;
                StepAction::Write { service, values }
            }
            "operation" => {
                let operation = required_str(step, "operation")
                    .ok_or("operation type steps must contain an operation name")?;
                let service = required_str(step, "service")
                    .ok_or("operation type steps must contain a service name")?;
                let parameters = match step.get("parameters") {
                    Some(parameters) => KvList::from_json_object(parameters)
                        .map_err(|e| format!("invalid operation parameters: {}", e))?,
                    None => KvList::new(),
                };
                StepAction::Operation {
                    operation,
                    service,
                    parameters,
                }
            }
            "delay" => {
                let duration_ms = step
                    .get("duration")
                    .and_then(Value::as_u64)
                    .ok_or("delay type steps must contain a duration value")?;
                StepAction::Delay { duration_ms }
            }
            "config" => {
                let category = required_str(step, "category")
                    .ok_or("config type steps must contain a category name")?;
                let item = required_str(step, "name")
                    .ok_or("config type steps must contain an item name")?;
                let value = required_str(step, "value")
                    .ok_or("config type steps must contain an item value")?;
                StepAction::Config {
                    category,
                    item,
                    value,
                }
            }
            "script" => {
                let name = required_str(step, "name")
                    .ok_or("script type steps must contain a script name")?;
                StepAction::SubScript { name }
            }
            other => return Err(format!("{} is not a supported script step", other)),
        };
        Ok(Self { condition, action })
    }

    /// Execute the step with the given script parameters
    pub async fn execute(
        &self,
        ctx: &ServiceContext,
        script: &str,
        caller: &CallerIdentity,
        parameters: &KvList,
        depth: usize,
    ) -> anyhow::Result<()> {
        if let Some(condition) = &self.condition {
            if !condition.evaluate(parameters) {
                debug!("Skipping step of script '{}': condition not met", script);
                return Ok(());
            }
        }

        let source = Endpoint::script(script);
        match &self.action {
            StepAction::Write { service, values } => {
                let mut values = values.clone();
                values.substitute(parameters);
                worker::deliver_write(
                    ctx,
                    caller,
                    &source,
                    &Endpoint::service(service),
                    service,
                    values,
                )
                .await
                .map(|_| ())
            }
            StepAction::Operation {
                operation,
                service,
                parameters: step_parameters,
            } => {
                let mut step_parameters = step_parameters.clone();
                step_parameters.substitute(parameters);
                worker::deliver_operation(
                    ctx,
                    caller,
                    &source,
                    &Endpoint::service(service),
                    service,
                    operation,
                    step_parameters,
                )
                .await
                .map(|_| ())
            }
            StepAction::Delay { duration_ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*duration_ms)).await;
                Ok(())
            }
            StepAction::Config {
                category,
                item,
                value,
            } => ctx.core.set_config_item(category, item, value).await,
            StepAction::SubScript { name } => {
                let mut sub = Script::new(name.clone(), caller.clone());
                sub.execute(ctx, parameters, depth + 1).await?;
                Ok(())
            }
        }
    }
}

fn required_str(step: &Value, field: &str) -> Option<String> {
    step.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Parse an optional condition object; all three properties are required
/// when present
fn parse_condition(step: &Value) -> Result<Option<StepCondition>, String> {
    let Some(condition) = step.get("condition") else {
        return Ok(None);
    };
    if !condition.is_object() {
        return Err("the condition should be an object".to_string());
    }
    let key = required_str(condition, "key");
    let op = required_str(condition, "condition");
    let value = required_str(condition, "value");
    let (Some(key), Some(op), Some(value)) = (key, op, value) else {
        return Err(
            "the condition object must have a key, condition and value property".to_string(),
        );
    };
    let op = ConditionOp::parse(&op).ok_or(format!("unsupported condition operator '{}'", op))?;
    Ok(Some(StepCondition { key, op, value }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_write_step() {
        let step = ScriptStep::parse(
            "write",
            &json!({"order": 1, "service": "svc", "values": {"x": "$v$"}}),
        )
        .unwrap();
        assert!(step.condition.is_none());
        match step.action {
            StepAction::Write { service, values } => {
                assert_eq!(service, "svc");
                assert_eq!(values.get("x"), "$v$");
            }
            _ => panic!("expected a write action"),
        }
    }

    #[test]
    fn test_parse_write_step_requires_fields() {
        assert!(ScriptStep::parse("write", &json!({"order": 1, "values": {}})).is_err());
        assert!(ScriptStep::parse("write", &json!({"order": 1, "service": "svc"})).is_err());
        // Values must be an object of strings
        assert!(ScriptStep::parse(
            "write",
            &json!({"order": 1, "service": "svc", "values": {"x": 1}})
        )
        .is_err());
    }

    #[test]
    fn test_parse_operation_step_with_optional_parameters() {
        let step = ScriptStep::parse(
            "operation",
            &json!({"order": 1, "operation": "reboot", "service": "svc"}),
        )
        .unwrap();
        match step.action {
            StepAction::Operation { parameters, .. } => assert!(parameters.is_empty()),
            _ => panic!("expected an operation action"),
        }
    }

    #[test]
    fn test_parse_delay_step() {
        let step = ScriptStep::parse("delay", &json!({"order": 2, "duration": 100})).unwrap();
        assert_eq!(step.action, StepAction::Delay { duration_ms: 100 });
        assert!(ScriptStep::parse("delay", &json!({"order": 2})).is_err());
    }

    #[test]
    fn test_parse_config_step() {
        let step = ScriptStep::parse(
            "config",
            &json!({"order": 1, "category": "svcAdvanced", "name": "rate", "value": "5"}),
        )
        .unwrap();
        assert_eq!(
            step.action,
            StepAction::Config {
                category: "svcAdvanced".into(),
                item: "rate".into(),
                value: "5".into()
            }
        );
    }

    #[test]
    fn test_parse_sub_script_step() {
        let step = ScriptStep::parse("script", &json!({"order": 1, "name": "inner"})).unwrap();
        assert_eq!(
            step.action,
            StepAction::SubScript {
                name: "inner".into()
            }
        );
    }

    #[test]
    fn test_parse_unknown_step_type() {
        let err = ScriptStep::parse("pause", &json!({"order": 1})).unwrap_err();
        assert!(err.contains("not a supported script step"));
    }

    #[test]
    fn test_parse_condition() {
        let step = ScriptStep::parse(
            "delay",
            &json!({
                "order": 1, "duration": 10,
                "condition": {"key": "mode", "condition": "==", "value": "on"}
            }),
        )
        .unwrap();
        let condition = step.condition.unwrap();
        assert_eq!(condition.op, ConditionOp::Eq);
        assert_eq!(condition.key, "mode");
        assert_eq!(condition.value, "on");
    }

    #[test]
    fn test_parse_condition_rejects_unknown_operator() {
        let err = ScriptStep::parse(
            "delay",
            &json!({
                "order": 1, "duration": 10,
                "condition": {"key": "mode", "condition": ">=", "value": "1"}
            }),
        )
        .unwrap_err();
        assert!(err.contains("unsupported condition operator"));
    }

    #[test]
    fn test_parse_condition_requires_all_properties() {
        assert!(ScriptStep::parse(
            "delay",
            &json!({"order": 1, "duration": 10, "condition": {"key": "mode"}})
        )
        .is_err());
        assert!(ScriptStep::parse(
            "delay",
            &json!({"order": 1, "duration": 10, "condition": "mode == on"})
        )
        .is_err());
    }

    #[test]
    fn test_condition_evaluation() {
        let mut parameters = KvList::new();
        parameters.add("mode", "on");

        let eq = StepCondition {
            key: "mode".into(),
            op: ConditionOp::Eq,
            value: "on".into(),
        };
        assert!(eq.evaluate(&parameters));

        let ne = StepCondition {
            key: "mode".into(),
            op: ConditionOp::Ne,
            value: "on".into(),
        };
        assert!(!ne.evaluate(&parameters));

        let ne_other = StepCondition {
            key: "mode".into(),
            op: ConditionOp::Ne,
            value: "off".into(),
        };
        assert!(ne_other.evaluate(&parameters));
    }

    #[test]
    fn test_condition_with_absent_key_skips() {
        let condition = StepCondition {
            key: "missing".into(),
            op: ConditionOp::Ne,
            value: "x".into(),
        };
        // Absent key means "skip the step", even for !=
        assert!(!condition.evaluate(&KvList::new()));
    }
}
