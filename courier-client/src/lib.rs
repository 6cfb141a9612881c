//! Courier HTTP clients
//!
//! Typed, reqwest-backed clients for the services the dispatcher talks to:
//!
//! - [`CoreClient`]: the core configuration/registration service (service
//!   registry, configuration categories, token verification, audit trail)
//! - [`DeliveryClient`]: southbound control delivery to device services
//! - [`DispatcherClient`]: the dispatcher's own API, used by the CLI
//!
//! All clients share the [`ClientError`] error type and the same response
//! handling conventions.

pub mod delivery;
pub mod dispatcher;
pub mod error;

pub use delivery::DeliveryClient;
pub use dispatcher::DispatcherClient;
pub use error::{ClientError, Result};

use courier_core::dto::registry::{Category, ServiceRecord, TokenClaims};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the core configuration/registration service
#[derive(Debug, Clone)]
pub struct CoreClient {
    /// Base URL of the core service (e.g. "http://localhost:8081")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CoreClient {
    /// Create a new core client for the given address and port
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", address, port),
            client: Client::new(),
        }
    }

    /// Get the base URL of the core service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Service Registry
    // =============================================================================

    /// Register a service record with the core
    pub async fn register_service(&self, record: &ServiceRecord) -> Result<()> {
        let url = format!("{}/core/service", self.base_url);
        let response = self.client.post(&url).json(record).send().await?;
        self.handle_empty_response(response).await
    }

    /// Remove a service registration
    pub async fn unregister_service(&self, name: &str) -> Result<()> {
        let url = format!("{}/core/service/{}", self.base_url, name);
        let response = self.client.delete(&url).send().await?;
        self.handle_empty_response(response).await
    }

    /// Look up a service record by name
    pub async fn get_service(&self, name: &str) -> Result<ServiceRecord> {
        let url = format!("{}/core/service/{}", self.base_url, name);
        let response = self.client.get(&url).send().await?;
        if response.status().as_u16() == 404 {
            return Err(ClientError::NotFound(name.to_string()));
        }
        self.handle_response(response).await
    }

    /// List every registered service of the given type
    pub async fn list_services_by_type(&self, service_type: &str) -> Result<Vec<ServiceRecord>> {
        let url = format!("{}/core/service?type={}", self.base_url, service_type);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Configuration Categories
    // =============================================================================

    /// Fetch a configuration category with current values
    pub async fn get_category(&self, name: &str) -> Result<Category> {
        let url = format!("{}/core/category/{}", self.base_url, name);
        let response = self.client.get(&url).send().await?;
        if response.status().as_u16() == 404 {
            return Err(ClientError::NotFound(name.to_string()));
        }
        self.handle_response(response).await
    }

    /// Create a category, keeping any items already present
    pub async fn create_category(&self, category: &Category) -> Result<()> {
        let url = format!("{}/core/category?keep_original_items=true", self.base_url);
        let response = self.client.post(&url).json(category).send().await?;
        self.handle_empty_response(response).await
    }

    /// Set a single configuration item
    pub async fn set_config_item(&self, category: &str, item: &str, value: &str) -> Result<()> {
        let url = format!("{}/core/category/{}/{}", self.base_url, category, item);
        let body = serde_json::json!({ "value": value });
        let response = self.client.put(&url).json(&body).send().await?;
        self.handle_empty_response(response).await
    }

    /// Register interest in configuration changes to a category. The core
    /// delivers changes to the service's `/category/{name}/change` endpoint.
    pub async fn register_interest(&self, service: &str, category: &str) -> Result<()> {
        let url = format!("{}/core/interest", self.base_url);
        let body = serde_json::json!({ "service": service, "category": category });
        let response = self.client.post(&url).json(&body).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Tokens and Audit
    // =============================================================================

    /// Verify a bearer token, returning the caller claims it carries
    pub async fn verify_token(&self, token: &str) -> Result<TokenClaims> {
        let url = format!("{}/core/token/verify", self.base_url);
        let body = serde_json::json!({ "token": token });
        let response = self.client.post(&url).json(&body).send().await?;
        self.handle_response(response).await
    }

    /// Record an audit trail entry
    pub async fn add_audit_entry(&self, code: &str, severity: &str, details: &str) -> Result<()> {
        let url = format!("{}/core/audit", self.base_url);
        let body = serde_json::json!({
            "source": code,
            "severity": severity,
            "details": details,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
