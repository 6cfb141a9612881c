//! Control pipeline manager
//!
//! Loads the control pipelines and their filter membership at startup,
//! answers best-match queries from the delivery workers and keeps the
//! in-memory pipelines in step with the storage tables by reacting to
//! change notifications.
//!
//! Lock discipline: manager state, then pipeline state, then context
//! state; never the reverse.

use courier_core::domain::{Endpoint, EndpointKind};
use courier_core::dto::table::{TableDelete, TableUpdate};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core_api::CoreApi;
use crate::pipeline::context::ExecutionContext;
use crate::pipeline::events;
use crate::pipeline::pipeline::ControlPipeline;
use crate::pipeline::plugin::PluginLoader;
use crate::repository::{lookup_repository, pipeline_repository};

/// One row of the endpoint type lookup tables
#[derive(Debug, Clone)]
pub struct EndpointLookup {
    pub name: String,
    pub kind: EndpointKind,
}

struct ManagerState {
    /// Pipelines by name; BTreeMap so tie-breaks within a match pass are
    /// deterministic (name order) within a run
    pipelines: BTreeMap<String, Arc<ControlPipeline>>,
    names_by_cpid: HashMap<i64, String>,
    source_types: HashMap<i64, EndpointLookup>,
    dest_types: HashMap<i64, EndpointLookup>,
}

struct CategoryRegistration {
    category: String,
    context: Weak<ExecutionContext>,
}

pub struct PipelineManager {
    pool: PgPool,
    core: Arc<dyn CoreApi>,
    loader: Arc<dyn PluginLoader>,
    self_ref: Weak<PipelineManager>,
    state: Mutex<ManagerState>,
    registrations: Mutex<Vec<CategoryRegistration>>,
}

impl PipelineManager {
    pub fn new(pool: PgPool, core: Arc<dyn CoreApi>, loader: Arc<dyn PluginLoader>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            pool,
            core,
            loader,
            self_ref: self_ref.clone(),
            state: Mutex::new(ManagerState {
                pipelines: BTreeMap::new(),
                names_by_cpid: HashMap::new(),
                source_types: HashMap::new(),
                dest_types: HashMap::new(),
            }),
            registrations: Mutex::new(Vec::new()),
        })
    }

    // =============================================================================
    // Startup Load
    // =============================================================================

    /// Initial load of the control pipelines. Subsequent changes arrive
    /// through the table-change notification handlers.
    pub async fn load_pipelines(&self) -> anyhow::Result<()> {
        let sources = lookup_repository::load_source_types(&self.pool).await?;
        let dests = lookup_repository::load_dest_types(&self.pool).await?;

        let mut source_types = HashMap::new();
        for row in sources {
            let kind = EndpointKind::from_name(&row.name).unwrap_or(EndpointKind::Undefined);
            source_types.insert(i64::from(row.cpsid), EndpointLookup { name: row.name, kind });
        }
        let mut dest_types = HashMap::new();
        for row in dests {
            let kind = EndpointKind::from_name(&row.name).unwrap_or(EndpointKind::Undefined);
            dest_types.insert(i64::from(row.cpdid), EndpointLookup { name: row.name, kind });
        }

        let rows = pipeline_repository::load_all(&self.pool).await?;
        let mut loaded = Vec::with_capacity(rows.len());
        for row in rows {
            let source_kind = source_types
                .get(&i64::from(row.stype))
                .map(|l| l.kind)
                .unwrap_or(EndpointKind::Undefined);
            let dest_kind = dest_types
                .get(&i64::from(row.dtype))
                .map(|l| l.kind)
                .unwrap_or(EndpointKind::Undefined);
            if source_kind == EndpointKind::Undefined || dest_kind == EndpointKind::Undefined {
                warn!(
                    "Control pipeline '{}' has an unknown endpoint type, it will never match",
                    row.name
                );
            }
            let filters = pipeline_repository::filters_for(&self.pool, row.cpid).await?;
            let pipeline = self.build_pipeline(
                i64::from(row.cpid),
                &row.name,
                Endpoint::from_parts(source_kind, row.sname),
                Endpoint::from_parts(dest_kind, row.dname),
                row.enabled,
                row.execution == "exclusive",
                filters,
            );
            loaded.push(pipeline);
        }

        let mut state = self.state.lock().await;
        state.source_types = source_types;
        state.dest_types = dest_types;
        for pipeline in loaded {
            state
                .names_by_cpid
                .insert(pipeline.cpid(), pipeline.name().to_string());
            state
                .pipelines
                .insert(pipeline.name().to_string(), pipeline);
        }
        info!("Loaded {} control pipeline(s)", state.pipelines.len());
        Ok(())
    }

    // =============================================================================
    // Lookup
    // =============================================================================

    /// Find the pipeline that best matches the given flow.
    ///
    /// Four passes, first hit wins: exact source and destination, any
    /// source with exact destination, exact source with any destination,
    /// finally any source and destination. Disabled pipelines never match.
    pub async fn find_pipeline(
        &self,
        source: &Endpoint,
        dest: &Endpoint,
    ) -> Option<Arc<ControlPipeline>> {
        let candidates = {
            let state = self.state.lock().await;
            state.pipelines.values().cloned().collect::<Vec<_>>()
        };

        let mut enabled = Vec::with_capacity(candidates.len());
        for pipeline in candidates {
            if let Some((psource, pdest)) = pipeline.match_endpoints().await {
                enabled.push((pipeline, psource, pdest));
            }
        }

        let is_any = |e: &Endpoint| e.kind() == EndpointKind::Any;

        // Pass 1: exact match on both endpoints
        for (pipeline, psource, pdest) in &enabled {
            if !is_any(psource) && !is_any(pdest) && psource.matches(source) && pdest.matches(dest)
            {
                return Some(pipeline.clone());
            }
        }
        // Pass 2: any source, exact destination
        for (pipeline, psource, pdest) in &enabled {
            if is_any(psource) && !is_any(pdest) && pdest.matches(dest) {
                return Some(pipeline.clone());
            }
        }
        // Pass 3: exact source, any destination
        for (pipeline, psource, pdest) in &enabled {
            if !is_any(psource) && is_any(pdest) && psource.matches(source) {
                return Some(pipeline.clone());
            }
        }
        // Pass 4: any source and any destination
        for (pipeline, psource, pdest) in &enabled {
            if is_any(psource) && is_any(pdest) {
                return Some(pipeline.clone());
            }
        }
        None
    }

    /// Resolve a source endpoint type from its lookup-table name
    pub async fn source_kind(&self, type_name: &str) -> Option<EndpointKind> {
        let state = self.state.lock().await;
        state
            .source_types
            .values()
            .find(|l| l.name == type_name)
            .map(|l| l.kind)
    }

    async fn by_cpid(&self, cpid: i64) -> Option<Arc<ControlPipeline>> {
        let state = self.state.lock().await;
        let name = state.names_by_cpid.get(&cpid)?;
        state.pipelines.get(name).cloned()
    }

    /// Register a pipeline under both its name and its id
    pub async fn insert_pipeline(&self, pipeline: Arc<ControlPipeline>) {
        let mut state = self.state.lock().await;
        state
            .names_by_cpid
            .insert(pipeline.cpid(), pipeline.name().to_string());
        state
            .pipelines
            .insert(pipeline.name().to_string(), pipeline);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build_pipeline(
        &self,
        cpid: i64,
        name: &str,
        source: Endpoint,
        dest: Endpoint,
        enabled: bool,
        exclusive: bool,
        filters: Vec<String>,
    ) -> Arc<ControlPipeline> {
        ControlPipeline::new(
            cpid,
            name,
            source,
            dest,
            enabled,
            exclusive,
            filters,
            self.self_ref.clone(),
            self.core.clone(),
            self.loader.clone(),
        )
    }

    // =============================================================================
    // Pipeline Table Events
    // =============================================================================

    /// A row appeared in the pipelines table
    pub async fn pipeline_inserted(&self, row: &Value) -> anyhow::Result<()> {
        let name = row
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("pipeline insert without a name"))?;
        let stype = row.get("stype").and_then(events::as_int);
        let dtype = row.get("dtype").and_then(events::as_int);
        let sname = row.get("sname").and_then(Value::as_str).unwrap_or("");
        let dname = row.get("dname").and_then(Value::as_str).unwrap_or("");
        let enabled = row
            .get("enabled")
            .and_then(events::as_bool)
            .unwrap_or(true);
        let exclusive = row.get("execution").and_then(Value::as_str) == Some("exclusive");

        let (source_kind, dest_kind) = {
            let state = self.state.lock().await;
            (
                stype
                    .and_then(|id| state.source_types.get(&id))
                    .map(|l| l.kind)
                    .unwrap_or(EndpointKind::Undefined),
                dtype
                    .and_then(|id| state.dest_types.get(&id))
                    .map(|l| l.kind)
                    .unwrap_or(EndpointKind::Undefined),
            )
        };

        // The notification does not carry the generated id; fetch it back
        let cpid = pipeline_repository::cpid_by_name(&self.pool, name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("pipeline '{}' not found in storage", name))?;

        let pipeline = self.build_pipeline(
            i64::from(cpid),
            name,
            Endpoint::from_parts(source_kind, sname),
            Endpoint::from_parts(dest_kind, dname),
            enabled,
            exclusive,
            Vec::new(),
        );
        self.insert_pipeline(pipeline).await;
        info!("Control pipeline '{}' created", name);
        Ok(())
    }

    /// A row in the pipelines table changed
    pub async fn pipeline_updated(&self, update: &TableUpdate) -> anyhow::Result<()> {
        let cpid = events::where_int(&update.condition, "cpid")
            .ok_or_else(|| anyhow::anyhow!("pipeline update without a cpid"))?;
        let pipeline = self
            .by_cpid(cpid)
            .await
            .ok_or_else(|| anyhow::anyhow!("update for unknown pipeline id {}", cpid))?;
        let values = &update.values;

        if let Some(enabled) = values.get("enabled").and_then(events::as_bool) {
            pipeline.set_enabled(enabled).await;
        }
        if let Some(execution) = values.get("execution").and_then(Value::as_str) {
            if pipeline.set_exclusive(execution == "exclusive").await {
                // Contexts created under the old mode are stale
                pipeline.remove_all_contexts().await;
            }
        }

        // Endpoint changes invalidate contexts created for the old flow
        // pairs; replace them atomically under the pipeline mutex
        let endpoint_change = ["stype", "sname", "dtype", "dname"]
            .iter()
            .any(|k| values.get(*k).is_some());
        if endpoint_change {
            let (mut source, mut dest) = pipeline.endpoints().await;
            let state = self.state.lock().await;
            if let Some(kind) = values
                .get("stype")
                .and_then(events::as_int)
                .and_then(|id| state.source_types.get(&id))
                .map(|l| l.kind)
            {
                source = Endpoint::from_parts(kind, source.name());
            }
            if let Some(sname) = values.get("sname").and_then(Value::as_str) {
                source = Endpoint::from_parts(source.kind(), sname);
            }
            if let Some(kind) = values
                .get("dtype")
                .and_then(events::as_int)
                .and_then(|id| state.dest_types.get(&id))
                .map(|l| l.kind)
            {
                dest = Endpoint::from_parts(kind, dest.name());
            }
            if let Some(dname) = values.get("dname").and_then(Value::as_str) {
                dest = Endpoint::from_parts(dest.kind(), dname);
            }
            drop(state);
            pipeline.set_endpoints(source, dest).await;
        }

        if let Some(new_name) = values.get("name").and_then(Value::as_str) {
            if new_name != pipeline.name() {
                warn!(
                    "Rename of control pipeline '{}' is not applied until the next restart",
                    pipeline.name()
                );
            }
        }

        debug!("Control pipeline id {} updated", cpid);
        Ok(())
    }

    /// A row disappeared from the pipelines table
    pub async fn pipeline_deleted(&self, delete: &TableDelete) -> anyhow::Result<()> {
        let cpid = events::where_int(&delete.condition, "cpid")
            .ok_or_else(|| anyhow::anyhow!("pipeline delete without a cpid"))?;
        let mut state = self.state.lock().await;
        if let Some(name) = state.names_by_cpid.remove(&cpid) {
            state.pipelines.remove(&name);
            info!("Control pipeline '{}' removed", name);
        }
        Ok(())
    }

    // =============================================================================
    // Filter Table Events
    // =============================================================================

    /// A filter joined a pipeline
    pub async fn filter_inserted(&self, row: &Value) -> anyhow::Result<()> {
        let cpid = row
            .get("cpid")
            .and_then(events::as_int)
            .ok_or_else(|| anyhow::anyhow!("filter insert without a cpid"))?;
        let fname = row
            .get("fname")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("filter insert without a filter name"))?;
        let forder = row.get("forder").and_then(events::as_int).unwrap_or(1);
        let pipeline = self
            .by_cpid(cpid)
            .await
            .ok_or_else(|| anyhow::anyhow!("filter insert for unknown pipeline id {}", cpid))?;
        pipeline.add_filter(fname, forder.max(1) as usize).await;
        Ok(())
    }

    /// A filter's position within its pipeline changed
    pub async fn filter_updated(&self, update: &TableUpdate) -> anyhow::Result<()> {
        let cpid = events::where_int(&update.condition, "cpid")
            .ok_or_else(|| anyhow::anyhow!("filter update without a cpid"))?;
        let fname = events::where_str(&update.condition, "fname")
            .ok_or_else(|| anyhow::anyhow!("filter update without a filter name"))?;
        let pipeline = self
            .by_cpid(cpid)
            .await
            .ok_or_else(|| anyhow::anyhow!("filter update for unknown pipeline id {}", cpid))?;
        if let Some(forder) = update.values.get("forder").and_then(events::as_int) {
            pipeline.reorder(fname, forder.max(1) as usize).await;
        }
        Ok(())
    }

    /// A filter left a pipeline
    pub async fn filter_deleted(&self, delete: &TableDelete) -> anyhow::Result<()> {
        let cpid = events::where_int(&delete.condition, "cpid")
            .ok_or_else(|| anyhow::anyhow!("filter delete without a cpid"))?;
        let fname = events::where_str(&delete.condition, "fname")
            .ok_or_else(|| anyhow::anyhow!("filter delete without a filter name"))?;
        let pipeline = self
            .by_cpid(cpid)
            .await
            .ok_or_else(|| anyhow::anyhow!("filter delete for unknown pipeline id {}", cpid))?;
        pipeline.remove_filter(fname).await;
        Ok(())
    }

    // =============================================================================
    // Category Registration
    // =============================================================================

    /// Record that a context holds a plugin configured by the category, so
    /// configuration changes reach its `reconfigure` entry point. The core
    /// is asked to deliver changes the first time a category is seen.
    pub async fn register_category(&self, category: &str, context: Weak<ExecutionContext>) {
        let mut registrations = self.registrations.lock().await;
        registrations.retain(|r| r.context.strong_count() > 0);
        let already_known = registrations.iter().any(|r| r.category == category);
        let duplicate = registrations
            .iter()
            .any(|r| r.category == category && Weak::ptr_eq(&r.context, &context));
        if !duplicate {
            registrations.push(CategoryRegistration {
                category: category.to_string(),
                context,
            });
        }
        drop(registrations);

        if !already_known {
            if let Err(e) = self.core.register_interest(category).await {
                warn!(
                    "Failed to register interest in category '{}': {:#}",
                    category, e
                );
            }
        }
    }

    /// Remove a context's registration for a category
    pub async fn unregister_category(&self, category: &str, context: &Weak<ExecutionContext>) {
        let mut registrations = self.registrations.lock().await;
        registrations.retain(|r| {
            !(r.category == category && Weak::ptr_eq(&r.context, context))
                && r.context.strong_count() > 0
        });
    }

    /// A filter category's configuration changed; forward to every plugin
    /// registered under it, in registration order
    pub async fn category_changed(&self, category: &str, config: &Value) {
        let contexts: Vec<Arc<ExecutionContext>> = {
            let registrations = self.registrations.lock().await;
            registrations
                .iter()
                .filter(|r| r.category == category)
                .filter_map(|r| r.context.upgrade())
                .collect()
        };
        if contexts.is_empty() {
            debug!("Configuration change for unregistered category '{}'", category);
            return;
        }
        for context in contexts {
            context.reconfigure_category(category, config).await;
        }
    }
}
