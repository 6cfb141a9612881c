//! Pipeline execution contexts
//!
//! An execution context owns a concrete, initialised chain of filter
//! plugins for one control pipeline. The chain is loaded lazily on first
//! use and can be mutated live as the pipeline's filter membership changes.
//! A single mutex serialises filtering and reconfiguration, so no caller
//! ever observes a half-rewired chain.

use anyhow::Context as AnyhowContext;
use courier_core::domain::Reading;
use courier_core::dto::registry::Category;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core_api::CoreApi;
use crate::pipeline::manager::PipelineManager;
use crate::pipeline::plugin::{FilterPlugin, PluginLoader};

/// Result of running a reading through an execution context
#[derive(Debug)]
pub enum FilterOutcome {
    /// No chain could be loaded; the caller forwards the original request
    Unfiltered,
    /// The chain produced a (possibly modified) reading
    Filtered(Reading),
    /// The chain consumed the request
    Dropped,
}

struct LoadedFilter {
    category: String,
    plugin: Box<dyn FilterPlugin>,
}

struct ChainState {
    /// Ordered filter category names for this pipeline
    filters: Vec<String>,
    /// Loaded plugin instances; empty until the chain is loaded and
    /// cleared again whenever a load fails, so the next call retries
    plugins: Vec<LoadedFilter>,
}

pub struct ExecutionContext {
    pipeline: String,
    manager: Weak<PipelineManager>,
    core: Arc<dyn CoreApi>,
    loader: Arc<dyn PluginLoader>,
    self_ref: Weak<ExecutionContext>,
    state: Mutex<ChainState>,
}

impl ExecutionContext {
    pub fn new(
        pipeline: impl Into<String>,
        filters: Vec<String>,
        manager: Weak<PipelineManager>,
        core: Arc<dyn CoreApi>,
        loader: Arc<dyn PluginLoader>,
    ) -> Arc<Self> {
        let pipeline = pipeline.into();
        Arc::new_cyclic(|self_ref| Self {
            pipeline,
            manager,
            core,
            loader,
            self_ref: self_ref.clone(),
            state: Mutex::new(ChainState {
                filters,
                plugins: Vec::new(),
            }),
        })
    }

    /// The current filter category order
    #[allow(dead_code)]
    pub async fn filter_names(&self) -> Vec<String> {
        self.state.lock().await.filters.clone()
    }

    /// Run a reading through the filter chain.
    ///
    /// One execution at a time per context; a context shared between many
    /// flows serialises those flows.
    pub async fn filter(&self, reading: Reading) -> FilterOutcome {
        let mut state = self.state.lock().await;

        if state.plugins.is_empty() && !state.filters.is_empty() {
            if let Err(e) = self.load_chain(&mut state).await {
                tracing::error!("Failed to load pipeline '{}': {:#}", self.pipeline, e);
            }
        }

        if state.plugins.is_empty() {
            warn!(
                "Pipeline '{}' has no loaded filters, control request passes unfiltered",
                self.pipeline
            );
            return FilterOutcome::Unfiltered;
        }

        debug!(
            "Filtering control request for pipeline '{}': {}",
            self.pipeline,
            reading.to_json()
        );

        let mut set = vec![reading];
        for filter in state.plugins.iter_mut() {
            set = filter.plugin.ingest(set);
            if set.is_empty() {
                break;
            }
        }

        match set.into_iter().next() {
            Some(result) => {
                debug!(
                    "Result of filtering for pipeline '{}': {}",
                    self.pipeline,
                    result.to_json()
                );
                FilterOutcome::Filtered(result)
            }
            None => {
                info!(
                    "Control filter pipeline '{}' removed the control request",
                    self.pipeline
                );
                FilterOutcome::Dropped
            }
        }
    }

    /// Insert a filter at the given 1-based position.
    ///
    /// When the chain is live the new plugin is instantiated immediately
    /// and the predecessor is shut down and re-initialised, as the filter
    /// API requires before its output is rewired.
    pub async fn add_filter(&self, name: &str, order: usize) {
        let mut state = self.state.lock().await;
        let index = order.saturating_sub(1).min(state.filters.len());
        state.filters.insert(index, name.to_string());

        if state.plugins.is_empty() {
            // Chain not loaded; the new filter is picked up on next load
            return;
        }

        match self.instantiate(name).await {
            Ok(Some(filter)) => {
                let position = loaded_position(&state, index);
                state.plugins.insert(position, filter);
                if position > 0 {
                    self.rewire(&mut state, position - 1).await;
                }
                info!(
                    "Added filter '{}' to pipeline '{}' at position {}",
                    name, self.pipeline, order
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    "Failed to add filter '{}' to pipeline '{}': {:#}",
                    name,
                    self.pipeline,
                    e
                );
                // Leave the chain unloaded so the next execution retries
                self.unload(&mut state);
            }
        }
    }

    /// Remove a filter from the chain
    pub async fn remove_filter(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.filters.retain(|f| f != name);

        let position = state.plugins.iter().position(|f| f.category == name);
        if let Some(position) = position {
            let mut removed = state.plugins.remove(position);
            removed.plugin.shutdown();
            if let Some(manager) = self.manager.upgrade() {
                manager.unregister_category(name, &self.self_ref).await;
            }
            // If the tail changed its output must be rewired
            if position == state.plugins.len() && position > 0 {
                self.rewire(&mut state, position - 1).await;
            }
            info!(
                "Removed filter '{}' from pipeline '{}'",
                name, self.pipeline
            );
        }
    }

    /// Move a filter to the given 1-based position. The loaded chain is
    /// discarded and rebuilt on next use.
    pub async fn reorder(&self, name: &str, order: usize) {
        let mut state = self.state.lock().await;
        let Some(from) = state.filters.iter().position(|f| f == name) else {
            warn!(
                "Reorder of unknown filter '{}' in pipeline '{}'",
                name, self.pipeline
            );
            return;
        };
        let filter = state.filters.remove(from);
        let index = order.saturating_sub(1).min(state.filters.len());
        state.filters.insert(index, filter);
        self.unload(&mut state);
        debug!(
            "Reordered filter '{}' in pipeline '{}' to position {}",
            name, self.pipeline, order
        );
    }

    /// Forward a configuration change to every loaded plugin registered
    /// under the category
    pub async fn reconfigure_category(&self, category: &str, config: &serde_json::Value) {
        let mut state = self.state.lock().await;
        for filter in state.plugins.iter_mut() {
            if filter.category == category {
                debug!(
                    "Reconfiguring filter '{}' in pipeline '{}'",
                    category, self.pipeline
                );
                filter.plugin.reconfigure(config);
            }
        }
    }

    /// Load every filter in the pipeline and set up ready for execution.
    /// A failure to load any single filter leaves the context unloaded.
    async fn load_chain(&self, state: &mut ChainState) -> anyhow::Result<()> {
        debug!("Loading pipeline '{}'", self.pipeline);
        let mut plugins: Vec<LoadedFilter> = Vec::new();
        for category in state.filters.clone() {
            match self.instantiate(&category).await {
                Ok(Some(filter)) => plugins.push(filter),
                Ok(None) => {}
                Err(e) => {
                    for mut filter in plugins {
                        filter.plugin.shutdown();
                    }
                    return Err(e);
                }
            }
        }
        state.plugins = plugins;
        Ok(())
    }

    /// Instantiate and initialise the plugin behind a filter category.
    /// A category that names no plugin contributes nothing to the chain.
    async fn instantiate(&self, category_name: &str) -> anyhow::Result<Option<LoadedFilter>> {
        let category = self
            .core
            .get_category(category_name)
            .await
            .with_context(|| format!("fetching filter category '{}'", category_name))?;
        let Some(plugin_name) = category.value("plugin") else {
            info!(
                "Filter category '{}' of pipeline '{}' names no plugin",
                category_name, self.pipeline
            );
            return Ok(None);
        };

        debug!(
            "Loading plugin '{}' for filter '{}'",
            plugin_name, category_name
        );
        let mut plugin = self
            .loader
            .load(plugin_name)
            .with_context(|| format!("loading plugin '{}'", plugin_name))?;

        // Merge the plugin's default items into the category, then fetch
        // the merged result for init
        let defaults = plugin.default_config();
        if !defaults.is_empty() {
            let mut with_defaults = Category::named(category_name);
            with_defaults.items = defaults;
            self.core
                .create_category(&with_defaults)
                .await
                .with_context(|| format!("updating filter category '{}'", category_name))?;
        }
        let merged = self.core.get_category(category_name).await?;
        plugin
            .init(&merged)
            .with_context(|| format!("initialising filter '{}'", category_name))?;

        if let Some(manager) = self.manager.upgrade() {
            manager
                .register_category(category_name, self.self_ref.clone())
                .await;
        }

        Ok(Some(LoadedFilter {
            category: category_name.to_string(),
            plugin,
        }))
    }

    /// Shut down and re-initialise the plugin at a position so its output
    /// routing reflects the current chain
    async fn rewire(&self, state: &mut ChainState, position: usize) {
        let category = state.plugins[position].category.clone();
        let config = match self.core.get_category(&category).await {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to fetch category '{}' while rewiring pipeline '{}': {:#}",
                    category, self.pipeline, e
                );
                return;
            }
        };
        let filter = &mut state.plugins[position];
        filter.plugin.shutdown();
        if let Err(e) = filter.plugin.init(&config) {
            tracing::error!(
                "Failed to re-initialise filter '{}' in pipeline '{}': {:#}",
                category,
                self.pipeline,
                e
            );
            self.unload(state);
        }
    }

    fn unload(&self, state: &mut ChainState) {
        for filter in state.plugins.iter_mut() {
            filter.plugin.shutdown();
        }
        state.plugins.clear();
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        // No other reference exists at this point; a failed try_lock means
        // the runtime is tearing down anyway
        if let Ok(mut state) = self.state.try_lock() {
            for filter in state.plugins.iter_mut() {
                filter.plugin.shutdown();
            }
        }
    }
}

/// Position within the loaded plugin vector that corresponds to the filter
/// at `index` in the category list, counting only categories that actually
/// loaded a plugin
fn loaded_position(state: &ChainState, index: usize) -> usize {
    let before: Vec<&String> = state.filters.iter().take(index).collect();
    state
        .plugins
        .iter()
        .filter(|f| before.iter().any(|name| **name == f.category))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, TestHarness};
    use courier_core::domain::KvList;
    use courier_core::dto::registry::Category;

    fn reading() -> Reading {
        let mut values = KvList::new();
        values.add("x", "1");
        values.to_reading("pump")
    }

    fn context_for(harness: &TestHarness, filters: &[&str]) -> Arc<ExecutionContext> {
        ExecutionContext::new(
            "P",
            filters.iter().map(|f| f.to_string()).collect(),
            Arc::downgrade(&harness.manager),
            harness.core.clone(),
            harness.registry.clone(),
        )
    }

    fn tags_of(reading: &Reading) -> Vec<String> {
        reading
            .datapoints()
            .iter()
            .map(|dp| dp.name().to_string())
            .filter(|name| name.starts_with("via_"))
            .collect()
    }

    #[tokio::test]
    async fn test_chain_runs_filters_in_order() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        testutil::add_tag_filter(&harness, "F2", "t2");

        let context = context_for(&harness, &["F1", "F2"]);
        match context.filter(reading()).await {
            FilterOutcome::Filtered(result) => {
                assert_eq!(tags_of(&result), vec!["via_t1", "via_t2"]);
            }
            other => panic!("expected a filtered reading, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_can_drop_the_request() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        harness.registry.register("sink", testutil::drop_filter());
        harness
            .core
            .put_category(Category::named("F2").with_item("plugin", "sink"));

        let context = context_for(&harness, &["F1", "F2"]);
        assert!(matches!(
            context.filter(reading()).await,
            FilterOutcome::Dropped
        ));
    }

    #[tokio::test]
    async fn test_unloadable_chain_passes_unfiltered_and_retries() {
        let harness = testutil::harness();
        // Category F1 exists but its plugin is not registered yet
        harness
            .core
            .put_category(Category::named("F1").with_item("plugin", "later"));

        let context = context_for(&harness, &["F1"]);
        assert!(matches!(
            context.filter(reading()).await,
            FilterOutcome::Unfiltered
        ));

        // Once the plugin can be loaded the retry succeeds
        let (factory, _) = testutil::tag_filter("later");
        harness.registry.register("later", factory);
        assert!(matches!(
            context.filter(reading()).await,
            FilterOutcome::Filtered(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_filter_list_is_unfiltered() {
        let harness = testutil::harness();
        let context = context_for(&harness, &[]);
        assert!(matches!(
            context.filter(reading()).await,
            FilterOutcome::Unfiltered
        ));
    }

    #[tokio::test]
    async fn test_live_filter_insert() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        testutil::add_tag_filter(&harness, "F2", "t2");

        let context = context_for(&harness, &["F1", "F2"]);
        // Load and use the chain once
        assert!(matches!(
            context.filter(reading()).await,
            FilterOutcome::Filtered(_)
        ));

        // A filter arrives in the middle of the live chain
        testutil::add_tag_filter(&harness, "F1.5", "t15");
        context.add_filter("F1.5", 2).await;

        assert_eq!(context.filter_names().await, vec!["F1", "F1.5", "F2"]);
        match context.filter(reading()).await {
            FilterOutcome::Filtered(result) => {
                assert_eq!(tags_of(&result), vec!["via_t1", "via_t15", "via_t2"]);
            }
            other => panic!("expected a filtered reading, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_filter_from_live_chain() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        testutil::add_tag_filter(&harness, "F2", "t2");

        let context = context_for(&harness, &["F1", "F2"]);
        context.filter(reading()).await;

        context.remove_filter("F2").await;
        assert_eq!(context.filter_names().await, vec!["F1"]);
        match context.filter(reading()).await {
            FilterOutcome::Filtered(result) => {
                assert_eq!(tags_of(&result), vec!["via_t1"]);
            }
            other => panic!("expected a filtered reading, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reorder_rebuilds_the_chain() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        testutil::add_tag_filter(&harness, "F2", "t2");

        let context = context_for(&harness, &["F1", "F2"]);
        context.filter(reading()).await;

        context.reorder("F2", 1).await;
        assert_eq!(context.filter_names().await, vec!["F2", "F1"]);
        match context.filter(reading()).await {
            FilterOutcome::Filtered(result) => {
                assert_eq!(tags_of(&result), vec!["via_t2", "via_t1"]);
            }
            other => panic!("expected a filtered reading, got {:?}", other),
        }
    }
}
