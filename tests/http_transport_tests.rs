//! HTTP transport tests using wiremock
//!
//! Verifies the wire format (JSON body, secret header), status handling and a
//! full render against a mocked graph endpoint.

use serde_json::json;
use stencil::binding::attr;
use stencil::{
    CachePolicy, CycleOutcome, Document, GraphRequest, HttpTransport, NormalizedCache, QueryExecutor, Schema,
    Stencil, StencilConfig, Transport,
};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// HELPERS
// =============================================================================

fn endpoint(server: &MockServer) -> String {
    format!("{}/v1/graphql", server.uri())
}

fn config_for(server: &MockServer) -> StencilConfig {
    StencilConfig {
        endpoint: endpoint(server),
        admin_secret: Some("s3cret".to_string()),
        timeout_secs: 5,
        ..Default::default()
    }
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

#[tokio::test]
async fn test_posts_query_with_secret_header() {
    // Arrange
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .and(header("X-Hasura-Admin-Secret", "s3cret"))
        .and(body_json(json!({"query": "query Q { name }", "operationName": "Q"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"name": "Widget A"}})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::from_config(&config_for(&server)).unwrap();

    // Act
    let response = transport
        .send(GraphRequest::new("query Q { name }").with_operation_name("Q"))
        .await;

    // Assert
    let response = response.unwrap();
    assert_eq!(response.data, Some(json!({"name": "Widget A"})));
    assert!(response.errors.is_empty());
}

#[tokio::test]
async fn test_no_secret_header_without_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("X-Hasura-Admin-Secret", "s3cret"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"a": 1}})))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(endpoint(&server));
    let response = transport.send(GraphRequest::new("query Q { a }")).await.unwrap();
    assert_eq!(response.data, Some(json!({"a": 1})));
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[tokio::test]
async fn test_server_error_status_is_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(endpoint(&server));
    let err = transport.send(GraphRequest::new("query Q { a }")).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("500"), "unexpected error: {}", message);
    assert!(message.contains("database unavailable"));
}

#[tokio::test]
async fn test_errors_without_data_fail_execution() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "field 'nope' not found in type: 'query_root'"}]
        })))
        .mount(&server)
        .await;

    let executor = QueryExecutor::new(
        Arc::new(HttpTransport::new(endpoint(&server))),
        NormalizedCache::new(),
        Arc::new(Schema::default()),
    );
    let doc = stencil::QueryDocument::new(
        stencil::query::Operation::Query,
        "Q",
        vec![stencil::query::RootField::leaf("nope")],
    )
    .unwrap();

    assert!(executor.execute(&doc, CachePolicy::ForceNetwork).await.is_none());
    assert_eq!(executor.cache().stats().roots, 0);
}

// =============================================================================
// FULL CYCLE
// =============================================================================

#[tokio::test]
async fn test_render_against_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "widgets": [
                    {"id": 1, "name": "Widget A", "in_stock": true},
                    {"id": 2, "name": "Widget B", "in_stock": false}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = Document::parse_html(
        r#"<ul data-gql-loop="widgets" data-gql-limit="5">
             <li data-gql-template><b data-gql-field="name"></b>:<i data-gql-field="in_stock"></i></li>
           </ul>"#,
    )
    .unwrap();
    let mut stencil = Stencil::from_config(page, &config_for(&server)).unwrap();

    let outcome = stencil.run().await;
    // answered from cache, no second request
    stencil.run().await;

    assert_eq!(
        outcome,
        CycleOutcome::Rendered {
            scalars: 0,
            replicas: 2,
            placeholders: 0
        }
    );
    let doc = stencil.document();
    let rows: Vec<String> = doc
        .find_by_attr(doc.root(), attr::REPLICATED)
        .into_iter()
        .map(|n| doc.text_content(n))
        .collect();
    assert_eq!(rows, vec!["Widget A:Yes", "Widget B:No"]);
}
