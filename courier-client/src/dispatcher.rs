//! Dispatcher API client
//!
//! Client for the dispatcher's own HTTP API, used by the CLI and by
//! integration tooling to submit control requests.

use courier_core::dto::dispatch::{MessageResponse, OperationRequest, WriteRequest};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};

/// HTTP client for the Courier dispatch API
#[derive(Debug, Clone)]
pub struct DispatcherClient {
    base_url: String,
    client: Client,
    /// Bearer token presented on dispatch calls, if authentication is on
    token: Option<String>,
}

impl DispatcherClient {
    /// Create a new dispatcher client
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token: None,
        }
    }

    /// Attach a bearer token to every dispatch call
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a control write for queued delivery
    pub async fn write(&self, request: &WriteRequest) -> Result<MessageResponse> {
        self.post("/dispatch/write", request).await
    }

    /// Submit a control operation for queued delivery
    pub async fn operation(&self, request: &OperationRequest) -> Result<MessageResponse> {
        self.post("/dispatch/operation", request).await
    }

    /// Check service liveness
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), "health check failed"));
        }
        Ok(())
    }

    async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = DispatcherClient::new("http://localhost:8084/");
        assert_eq!(client.base_url(), "http://localhost:8084");
    }
}
