//! Mock transport for testing
//!
//! Returns queued or computed responses without touching the network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::{GraphRequest, GraphResponse, Transport};

type Handler = dyn Fn(&GraphRequest) -> Result<GraphResponse> + Send + Sync;

/// Mock transport that returns predefined responses
pub struct MockTransport {
    /// Queue of outcomes to return (FIFO); `Err` simulates a transport failure
    queue: Arc<Mutex<VecDeque<Result<GraphResponse, String>>>>,
    /// Computes a response when the queue is empty
    handler: Option<Box<Handler>>,
    /// Track all requests made (for assertions)
    requests: Arc<Mutex<Vec<GraphRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            handler: None,
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Create with a queue of responses
    pub fn with_responses(responses: Vec<GraphResponse>) -> Self {
        let transport = Self::new();
        for response in responses {
            transport.queue_response(response);
        }
        transport
    }

    /// Answer every unqueued request with a closure
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&GraphRequest) -> Result<GraphResponse> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn queue_response(&self, response: GraphResponse) {
        self.queue.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a transport-level failure
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.queue.lock().unwrap().push_back(Err(message.into()));
    }

    /// Get all requests made to this transport
    pub fn requests(&self) -> Vec<GraphRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<GraphRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: GraphRequest) -> Result<GraphResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => match &self.handler {
                Some(handler) => handler(&request),
                None => anyhow::bail!("MockTransport has no response for '{}'", request.query),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn queued_then_handler() {
        let transport = MockTransport::with_responses(vec![GraphResponse::data(json!({"a": 1}))])
            .with_handler(|_| Ok(GraphResponse::data(json!({"a": 2}))));

        let first = transport.send(GraphRequest::new("query Q { a }")).await.unwrap();
        let second = transport.send(GraphRequest::new("query Q { a }")).await.unwrap();

        assert_eq!(first.data, Some(json!({"a": 1})));
        assert_eq!(second.data, Some(json!({"a": 2})));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn queued_failure_and_empty_queue() {
        let transport = MockTransport::new();
        transport.queue_failure("connection refused");

        let err = transport.send(GraphRequest::new("query Q { a }")).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(transport.send(GraphRequest::new("query Q { a }")).await.is_err());
    }

    #[tokio::test]
    async fn records_requests() {
        let transport = MockTransport::new().with_handler(|_| Ok(GraphResponse::default()));
        transport
            .send(GraphRequest::new("query A { a }").with_operation_name("A"))
            .await
            .unwrap();

        let last = transport.last_request().unwrap();
        assert_eq!(last.operation_name.as_deref(), Some("A"));

        transport.clear_requests();
        assert!(transport.requests().is_empty());
    }
}
