//! HTTP transport - JSON POST to the graph-query endpoint

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{GraphRequest, GraphResponse, Transport};
use crate::config::StencilConfig;
use crate::error::StencilError;

/// Production transport backed by `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    secret_header: String,
    admin_secret: Option<String>,
}

impl HttpTransport {
    /// Create a transport for an endpoint without credentials
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            secret_header: crate::config::DEFAULT_SECRET_HEADER.to_string(),
            admin_secret: None,
        }
    }

    /// Create from configuration (endpoint is validated, timeout applied)
    pub fn from_config(config: &StencilConfig) -> Result<Self, StencilError> {
        let url = config.endpoint_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StencilError::Config {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: url.to_string(),
            secret_header: config.secret_header.clone(),
            admin_secret: config.admin_secret.clone(),
        })
    }

    pub fn with_secret(mut self, header: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secret_header = header.into();
        self.admin_secret = Some(secret.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: GraphRequest) -> Result<GraphResponse> {
        tracing::debug!(
            transport = "http",
            endpoint = %self.endpoint,
            operation = request.operation_name.as_deref().unwrap_or(""),
            "Sending graph request"
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.admin_secret {
            builder = builder.header(self.secret_header.as_str(), secret.as_str());
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to graph endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                transport = "http",
                status = %status,
                error = %error_text,
                "Graph endpoint error"
            );
            anyhow::bail!("Graph endpoint error ({}): {}", status, error_text);
        }

        let body: GraphResponse = response
            .json()
            .await
            .context("Failed to parse graph endpoint response")?;

        tracing::debug!(
            transport = "http",
            has_data = body.data.is_some(),
            errors = body.errors.len(),
            "Graph response received"
        );

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_keeps_credentials() {
        let config = StencilConfig {
            admin_secret: Some("s3cret".to_string()),
            ..Default::default()
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8081/v1/graphql");
        assert_eq!(transport.admin_secret.as_deref(), Some("s3cret"));
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn from_config_rejects_bad_endpoint() {
        let config = StencilConfig {
            endpoint: "localhost".to_string(),
            ..Default::default()
        };
        assert!(HttpTransport::from_config(&config).is_err());
    }
}
