//! External collaborator seams
//!
//! The dispatcher depends on two outside parties: the core
//! configuration/registration service and the downstream device services it
//! delivers control payloads to. Both are reached through trait objects so
//! the rest of the service is testable with recording fakes.

use async_trait::async_trait;
use courier_core::domain::CallerIdentity;
use courier_core::dto::registry::{Category, ServiceRecord, TokenClaims};
use courier_client::{CoreClient, DeliveryClient};

/// The core configuration/registration service
#[async_trait]
pub trait CoreApi: Send + Sync {
    async fn get_category(&self, name: &str) -> anyhow::Result<Category>;
    async fn create_category(&self, category: &Category) -> anyhow::Result<()>;
    async fn set_config_item(&self, category: &str, item: &str, value: &str)
        -> anyhow::Result<()>;
    /// Ask the core to deliver configuration changes for a category to our
    /// `/category/{name}/change` endpoint
    async fn register_interest(&self, category: &str) -> anyhow::Result<()>;
    async fn register_service(&self, record: &ServiceRecord) -> anyhow::Result<()>;
    async fn unregister_service(&self) -> anyhow::Result<()>;
    async fn get_service(&self, name: &str) -> anyhow::Result<ServiceRecord>;
    async fn list_services_by_type(&self, service_type: &str)
        -> anyhow::Result<Vec<ServiceRecord>>;
    async fn verify_token(&self, token: &str) -> anyhow::Result<TokenClaims>;
    async fn add_audit_entry(&self, code: &str, severity: &str, details: &str)
        -> anyhow::Result<()>;
}

/// Downstream control delivery
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Deliver a JSON payload to the named service's control API
    async fn send_to_service(
        &self,
        service: &str,
        path: &str,
        payload: &str,
        caller: &CallerIdentity,
    ) -> anyhow::Result<()>;

    /// Deliver a JSON payload to every southbound service. Individual
    /// refusals are logged but do not fail the broadcast.
    async fn broadcast(
        &self,
        path: &str,
        payload: &str,
        caller: &CallerIdentity,
    ) -> anyhow::Result<()>;
}

/// [`CoreApi`] implementation over the real core service
pub struct HttpCore {
    service_name: String,
    client: CoreClient,
}

impl HttpCore {
    pub fn new(client: CoreClient, service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            client,
        }
    }
}

#[async_trait]
impl CoreApi for HttpCore {
    async fn get_category(&self, name: &str) -> anyhow::Result<Category> {
        Ok(self.client.get_category(name).await?)
    }

    async fn create_category(&self, category: &Category) -> anyhow::Result<()> {
        Ok(self.client.create_category(category).await?)
    }

    async fn set_config_item(
        &self,
        category: &str,
        item: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        Ok(self.client.set_config_item(category, item, value).await?)
    }

    async fn register_interest(&self, category: &str) -> anyhow::Result<()> {
        Ok(self
            .client
            .register_interest(&self.service_name, category)
            .await?)
    }

    async fn register_service(&self, record: &ServiceRecord) -> anyhow::Result<()> {
        Ok(self.client.register_service(record).await?)
    }

    async fn unregister_service(&self) -> anyhow::Result<()> {
        Ok(self.client.unregister_service(&self.service_name).await?)
    }

    async fn get_service(&self, name: &str) -> anyhow::Result<ServiceRecord> {
        Ok(self.client.get_service(name).await?)
    }

    async fn list_services_by_type(
        &self,
        service_type: &str,
    ) -> anyhow::Result<Vec<ServiceRecord>> {
        Ok(self.client.list_services_by_type(service_type).await?)
    }

    async fn verify_token(&self, token: &str) -> anyhow::Result<TokenClaims> {
        Ok(self.client.verify_token(token).await?)
    }

    async fn add_audit_entry(
        &self,
        code: &str,
        severity: &str,
        details: &str,
    ) -> anyhow::Result<()> {
        Ok(self.client.add_audit_entry(code, severity, details).await?)
    }
}

/// Service type southbound broadcasts fan out to
pub const SOUTHBOUND_TYPE: &str = "Southbound";

/// [`Downstream`] implementation delivering over HTTP through the registry
pub struct HttpDownstream {
    core: std::sync::Arc<dyn CoreApi>,
    client: DeliveryClient,
}

impl HttpDownstream {
    pub fn new(core: std::sync::Arc<dyn CoreApi>, client: DeliveryClient) -> Self {
        Self { core, client }
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn send_to_service(
        &self,
        service: &str,
        path: &str,
        payload: &str,
        caller: &CallerIdentity,
    ) -> anyhow::Result<()> {
        let record = self.core.get_service(service).await.map_err(|e| {
            anyhow::anyhow!("Unable to find service '{}': {:#}", service, e)
        })?;
        self.client
            .put_json(&record, path, payload, caller)
            .await
            .map_err(|e| {
                anyhow::anyhow!("Failed to send control payload to service '{}': {}", service, e)
            })
    }

    async fn broadcast(
        &self,
        path: &str,
        payload: &str,
        caller: &CallerIdentity,
    ) -> anyhow::Result<()> {
        let records = self.core.list_services_by_type(SOUTHBOUND_TYPE).await?;
        if records.is_empty() {
            tracing::warn!("Broadcast requested but no southbound services are registered");
            return Ok(());
        }
        for record in &records {
            // A target refusing the payload does not fail the broadcast
            if let Err(e) = self.client.put_json(record, path, payload, caller).await {
                tracing::warn!(
                    "Broadcast target '{}' did not accept the control payload: {}",
                    record.name,
                    e
                );
            }
        }
        Ok(())
    }
}
