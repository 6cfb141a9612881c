//! Service context
//!
//! One explicit bundle of the shared collaborators each component needs:
//! storage pool, core service, downstream delivery, the pipeline manager
//! and the runtime gates driven by configuration. Passed by reference
//! instead of living behind process-wide singletons.

use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core_api::{CoreApi, Downstream};
use crate::pipeline::PipelineManager;

pub struct ServiceContext {
    /// Name this dispatcher registered under
    pub service_name: String,
    pub pool: PgPool,
    pub core: Arc<dyn CoreApi>,
    pub downstream: Arc<dyn Downstream>,
    pub manager: Arc<PipelineManager>,
    /// Control dispatch on/off gate from the server category
    enable: AtomicBool,
    /// Whether dispatch callers must present a valid bearer token
    auth_mandatory: AtomicBool,
}

impl ServiceContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service_name: impl Into<String>,
        pool: PgPool,
        core: Arc<dyn CoreApi>,
        downstream: Arc<dyn Downstream>,
        manager: Arc<PipelineManager>,
        enable: bool,
        auth_mandatory: bool,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            pool,
            core,
            downstream,
            manager,
            enable: AtomicBool::new(enable),
            auth_mandatory: AtomicBool::new(auth_mandatory),
        }
    }

    pub fn control_enabled(&self) -> bool {
        self.enable.load(Ordering::Relaxed)
    }

    pub fn set_control_enabled(&self, enabled: bool) {
        self.enable.store(enabled, Ordering::Relaxed);
    }

    pub fn auth_mandatory(&self) -> bool {
        self.auth_mandatory.load(Ordering::Relaxed)
    }

    pub fn set_auth_mandatory(&self, mandatory: bool) {
        self.auth_mandatory.store(mandatory, Ordering::Relaxed);
    }
}
