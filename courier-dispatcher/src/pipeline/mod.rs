//! Control pipeline layer
//!
//! - `manager`: loads pipelines, answers best-match queries, reacts to
//!   table-change and configuration-change events
//! - `pipeline`: a named pipeline with endpoints and execution contexts
//! - `context`: a concrete, initialised filter chain
//! - `plugin`: the filter plugin and plugin loader interfaces
//! - `events`: change-notification payload parsing

pub mod context;
pub mod events;
pub mod manager;
pub mod pipeline;
pub mod plugin;

pub use context::{ExecutionContext, FilterOutcome};
pub use manager::PipelineManager;
pub use pipeline::ControlPipeline;
pub use plugin::{FilterPlugin, PluginLoader, PluginRegistry};
