//! Stencil Configuration Module
//!
//! Endpoint, credentials and schema hints, read from `stencil.yaml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`STENCIL_ENDPOINT`, `STENCIL_ADMIN_SECRET`)
//! 2. Config file (`--config <file>` or `./stencil.yaml`)
//! 3. Defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::StencilError;
use crate::schema::Schema;

/// Local development endpoint of the graph service
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8081/v1/graphql";
pub const DEFAULT_SECRET_HEADER: &str = "X-Hasura-Admin-Secret";
pub const DEFAULT_CONFIG_FILE: &str = "stencil.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StencilConfig {
    /// Graph-query endpoint
    pub endpoint: String,

    /// Admin/service credential sent with every request
    pub admin_secret: Option<String>,

    /// Header carrying the credential
    pub secret_header: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    pub schema: Schema,
}

impl Default for StencilConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            admin_secret: None,
            secret_header: DEFAULT_SECRET_HEADER.to_string(),
            timeout_secs: 30,
            schema: Schema::default(),
        }
    }
}

impl StencilConfig {
    /// Load configuration from an explicit file or `./stencil.yaml`
    ///
    /// Returns default config if no file is given and the default file doesn't exist.
    /// Returns error if a file exists but is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, StencilError> {
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| StencilError::Config {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, StencilError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("STENCIL_ENDPOINT") {
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }

        if let Ok(secret) = std::env::var("STENCIL_ADMIN_SECRET") {
            if !secret.is_empty() {
                self.admin_secret = Some(secret);
            }
        }

        self
    }

    /// Parsed endpoint; only http(s) is accepted
    pub fn endpoint_url(&self) -> Result<Url, StencilError> {
        let url = Url::parse(&self.endpoint).map_err(|e| StencilError::Config {
            reason: format!("Invalid endpoint '{}': {}", self.endpoint, e),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(StencilError::Config {
                reason: format!("Unsupported endpoint scheme '{}'", other),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
