//! # Transport Abstraction Layer
//!
//! Trait and implementations for reaching the graph-query service.
//!
//! ## Overview
//!
//! - [`Transport`] - Core trait for sending one operation
//! - [`HttpTransport`] - Production transport (JSON over HTTP POST)
//! - [`MockTransport`] - Test transport with queued or computed responses
//!
//! ## Transport Trait
//!
//! ```rust,ignore
//! #[async_trait]
//! pub trait Transport: Send + Sync {
//!     fn name(&self) -> &str;
//!     async fn send(&self, request: GraphRequest) -> Result<GraphResponse>;
//! }
//! ```
//!
//! A transport only moves bytes. Deciding whether a response with `errors`
//! is usable is left to the executor.

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::QueryDocument;

// ============================================================================
// TRANSPORT TRAIT (ASYNC)
// ============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport name (e.g., "http", "mock")
    fn name(&self) -> &str;

    /// Send one operation and return the decoded response body
    async fn send(&self, request: GraphRequest) -> Result<GraphResponse>;
}

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

/// Body of one graph-query request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphRequest {
    pub query: String,

    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
}

impl GraphRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Map::new(),
        }
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

impl From<&QueryDocument> for GraphRequest {
    fn from(doc: &QueryDocument) -> Self {
        GraphRequest::new(doc.text()).with_operation_name(doc.name.clone())
    }
}

/// One entry of a response's `errors` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
}

/// Decoded response body
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphResponse {
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
}

impl GraphResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: vec![],
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![GraphError {
                message: message.into(),
                path: None,
            }],
        }
    }

    /// All error messages joined for logging
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_like_the_wire_format() {
        let req = GraphRequest::new("query Q { a }").with_operation_name("Q");
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"query": "query Q { a }", "operationName": "Q"})
        );
    }

    #[test]
    fn response_with_errors_only() {
        let resp: GraphResponse = serde_json::from_value(json!({
            "errors": [{"message": "field 'x' not found", "path": ["x"]}, {"message": "second"}]
        }))
        .unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.error_summary(), "field 'x' not found; second");
    }

    #[test]
    fn response_with_data() {
        let resp: GraphResponse = serde_json::from_value(json!({"data": {"a": 1}})).unwrap();
        assert_eq!(resp, GraphResponse::data(json!({"a": 1})));
    }
}
