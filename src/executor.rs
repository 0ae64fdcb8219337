//! Query executor with normalized caching
//!
//! Sends synthesized documents through a [`Transport`] and keeps the shared
//! [`NormalizedCache`] up to date. Failures never escape `execute`: they are
//! logged and turned into `None` so the caller simply skips rendering.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::error::StencilError;
use crate::query::QueryDocument;
use crate::schema::Schema;
use crate::store::NormalizedCache;
use crate::transport::{GraphRequest, Transport};

/// How the cache participates in one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Answer from the cache when every selected field is present
    #[default]
    PreferCache,
    /// Always go to the network and refresh the cache
    ForceNetwork,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::PreferCache => f.write_str("prefer-cache"),
            CachePolicy::ForceNetwork => f.write_str("force-network"),
        }
    }
}

/// Executor with a shared transport and cache
#[derive(Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
    cache: NormalizedCache,
    schema: Arc<Schema>,
}

impl QueryExecutor {
    pub fn new(transport: Arc<dyn Transport>, cache: NormalizedCache, schema: Arc<Schema>) -> Self {
        Self {
            transport,
            cache,
            schema,
        }
    }

    pub fn cache(&self) -> &NormalizedCache {
        &self.cache
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Execute a document, logging and swallowing any failure
    pub async fn execute(&self, doc: &QueryDocument, policy: CachePolicy) -> Option<Value> {
        match self.try_execute(doc, policy).await {
            Ok(data) => Some(data),
            Err(e) => {
                error!(operation = %doc.name, error = %e, "Query execution failed");
                None
            }
        }
    }

    /// Execute a document and write the result into the cache
    #[instrument(skip(self, doc), fields(operation = %doc.name, policy = %policy))]
    pub async fn try_execute(&self, doc: &QueryDocument, policy: CachePolicy) -> Result<Value, StencilError> {
        if policy == CachePolicy::PreferCache {
            if let Some(cached) = self.cache.read_query(doc) {
                debug!("Answered from cache");
                return Ok(cached);
            }
        }

        debug!(transport = self.transport_name(), "Sending to network");
        let data = self.send(doc).await?;
        self.cache.write_result(doc, &data, &self.schema);
        debug!(stats = ?self.cache.stats(), "Cache updated");
        Ok(data)
    }

    /// Send a document without touching the cache
    ///
    /// A response carrying `errors` alongside `data` is still a success; the
    /// errors are logged and the data is used.
    pub async fn send(&self, doc: &QueryDocument) -> Result<Value, StencilError> {
        let response = self
            .transport
            .send(GraphRequest::from(doc))
            .await
            .map_err(|e| StencilError::Transport(format!("{:#}", e)))?;

        let errors = (!response.errors.is_empty()).then(|| response.error_summary());
        if let Some(errors) = &errors {
            warn!(%errors, "Errors in response");
        }

        match response.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(StencilError::Execution {
                details: errors.unwrap_or_else(|| "response carried no data".to_string()),
            }),
        }
    }
}
