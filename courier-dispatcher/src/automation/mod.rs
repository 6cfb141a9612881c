//! Automation script engine
//!
//! Stored scripts of typed steps: setpoint writes, operations, delays,
//! configuration changes and recursive sub-script calls, each optionally
//! guarded by a condition on the script parameters. Scripts are loaded
//! lazily from storage on first execution and validated against the
//! caller's ACL before they run.

pub mod acl;
pub mod script;
pub mod step;

pub use acl::Acl;
pub use script::{Script, ScriptError, MAX_SCRIPT_DEPTH};
pub use step::{ConditionOp, ScriptStep, StepAction, StepCondition};
