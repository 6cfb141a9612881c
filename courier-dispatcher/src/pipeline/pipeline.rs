//! Control pipelines
//!
//! A control pipeline names an ordered list of filter categories to run
//! between a source endpoint and a destination endpoint. A pipeline in
//! shared mode keeps a single execution context used by every flow it
//! serves; in exclusive mode it keeps one context per distinct
//! (source, destination) pair so flows do not serialise each other.
//!
//! A pipeline guards its context table with a mutex so delivery tasks
//! never observe a half-rewired chain while reconfiguration runs.

use courier_core::domain::Endpoint;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core_api::CoreApi;
use crate::pipeline::context::ExecutionContext;
use crate::pipeline::manager::PipelineManager;
use crate::pipeline::plugin::PluginLoader;

struct ContextEntry {
    source: Endpoint,
    dest: Endpoint,
    context: Arc<ExecutionContext>,
}

struct PipelineState {
    enabled: bool,
    exclusive: bool,
    source: Endpoint,
    dest: Endpoint,
    filters: Vec<String>,
    shared: Option<Arc<ExecutionContext>>,
    contexts: Vec<ContextEntry>,
}

pub struct ControlPipeline {
    cpid: i64,
    name: String,
    manager: Weak<PipelineManager>,
    core: Arc<dyn CoreApi>,
    loader: Arc<dyn PluginLoader>,
    state: Mutex<PipelineState>,
}

impl ControlPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cpid: i64,
        name: impl Into<String>,
        source: Endpoint,
        dest: Endpoint,
        enabled: bool,
        exclusive: bool,
        filters: Vec<String>,
        manager: Weak<PipelineManager>,
        core: Arc<dyn CoreApi>,
        loader: Arc<dyn PluginLoader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cpid,
            name: name.into(),
            manager,
            core,
            loader,
            state: Mutex::new(PipelineState {
                enabled,
                exclusive,
                source,
                dest,
                filters,
                shared: None,
                contexts: Vec::new(),
            }),
        })
    }

    pub fn cpid(&self) -> i64 {
        self.cpid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pipeline's endpoints, or None when it is disabled
    pub async fn match_endpoints(&self) -> Option<(Endpoint, Endpoint)> {
        let state = self.state.lock().await;
        if !state.enabled {
            return None;
        }
        Some((state.source.clone(), state.dest.clone()))
    }

    /// The pipeline's endpoints regardless of the enabled flag
    pub async fn endpoints(&self) -> (Endpoint, Endpoint) {
        let state = self.state.lock().await;
        (state.source.clone(), state.dest.clone())
    }

    /// The current filter category order
    #[allow(dead_code)]
    pub async fn filters(&self) -> Vec<String> {
        self.state.lock().await.filters.clone()
    }

    /// Return an execution context for the given flow.
    ///
    /// Shared pipelines lazily create a single context; exclusive
    /// pipelines keep one per distinct (source, destination) pair, matched
    /// by equality rather than the wildcard rule.
    pub async fn get_execution_context(
        &self,
        source: &Endpoint,
        dest: &Endpoint,
    ) -> Arc<ExecutionContext> {
        let mut state = self.state.lock().await;

        if !state.exclusive {
            if state.shared.is_none() {
                state.shared = Some(self.new_context(&state.filters));
            }
            debug!(
                "Using shared context for control pipeline '{}' from {} to {}",
                self.name, source, dest
            );
            return state.shared.clone().expect("shared context just created");
        }

        for entry in &state.contexts {
            if entry.source == *source && entry.dest == *dest {
                return entry.context.clone();
            }
        }

        info!(
            "Creating context to run pipeline '{}' between {} and {}",
            self.name, source, dest
        );
        let context = self.new_context(&state.filters);
        state.contexts.push(ContextEntry {
            source: source.clone(),
            dest: dest.clone(),
            context: context.clone(),
        });
        context
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        if state.enabled != enabled {
            info!(
                "Control pipeline '{}' is now {}",
                self.name,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        state.enabled = enabled;
    }

    /// Switch between shared and exclusive execution. Returns true when
    /// the mode changed; existing contexts then belong to the old mode and
    /// the caller should drop them.
    pub async fn set_exclusive(&self, exclusive: bool) -> bool {
        let mut state = self.state.lock().await;
        if state.exclusive == exclusive {
            return false;
        }
        state.exclusive = exclusive;
        debug!(
            "Control pipeline '{}' execution is now {}",
            self.name,
            if exclusive { "exclusive" } else { "shared" }
        );
        true
    }

    /// Replace the pipeline's endpoints. Contexts were created for the old
    /// flow pairs, so they are replaced atomically under the pipeline lock.
    pub async fn set_endpoints(&self, source: Endpoint, dest: Endpoint) {
        let mut state = self.state.lock().await;
        state.source = source;
        state.dest = dest;
        state.shared = None;
        state.contexts.clear();
    }

    /// Insert a filter and forward the change to every live context
    pub async fn add_filter(&self, name: &str, order: usize) {
        let mut state = self.state.lock().await;
        let index = order.saturating_sub(1).min(state.filters.len());
        state.filters.insert(index, name.to_string());
        if let Some(shared) = &state.shared {
            shared.add_filter(name, order).await;
        }
        for entry in &state.contexts {
            entry.context.add_filter(name, order).await;
        }
    }

    /// Remove a filter and forward the change to every live context
    pub async fn remove_filter(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.filters.retain(|f| f != name);
        if let Some(shared) = &state.shared {
            shared.remove_filter(name).await;
        }
        for entry in &state.contexts {
            entry.context.remove_filter(name).await;
        }
    }

    /// Move a filter within the pipeline and forward to every live context
    pub async fn reorder(&self, name: &str, order: usize) {
        let mut state = self.state.lock().await;
        if let Some(from) = state.filters.iter().position(|f| f == name) {
            let filter = state.filters.remove(from);
            let index = order.saturating_sub(1).min(state.filters.len());
            state.filters.insert(index, filter);
        }
        if let Some(shared) = &state.shared {
            shared.reorder(name, order).await;
        }
        for entry in &state.contexts {
            entry.context.reorder(name, order).await;
        }
    }

    /// Drop every context; used when a safe incremental update cannot be
    /// computed and the pipeline must be rebuilt on next use
    pub async fn remove_all_contexts(&self) {
        let mut state = self.state.lock().await;
        state.shared = None;
        state.contexts.clear();
    }

    fn new_context(&self, filters: &[String]) -> Arc<ExecutionContext> {
        ExecutionContext::new(
            &self.name,
            filters.to_vec(),
            self.manager.clone(),
            self.core.clone(),
            self.loader.clone(),
        )
    }
}
