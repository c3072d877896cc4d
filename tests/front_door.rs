//! The axum front door driven in-process with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{spawn_backend, Harness, Mode};
use service_dispatch::config::{
    parse_config, ConfigError, GatewayConfig, RouteConfig, ServiceConfig,
};
use service_dispatch::config::validation::ValidationError;
use service_dispatch::resilience::CircuitState;

const CONFIG: &str = r#"
[services.items.circuit-breaker]
max-failures = 2

[[routes]]
name = "get-item"
method = "GET"
path = "/items/{id}"
service = "items"
action = "get"

[[routes]]
name = "update-item"
method = "PUT"
path = "/items/{id}"
service = "items"
action = "update"

[[routes]]
name = "search"
path = "/search"
service = "items"
"#;

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_get_merges_path_query_and_action() {
    let harness = Harness::new(CONFIG);
    spawn_backend(&harness.bus, "service.items", Mode::Echo);

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .uri("/items/5?id=9&x=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "echo": { "id": "9", "x": "1", "action": "get" } })
    );
}

#[tokio::test]
async fn test_body_overrides_query() {
    let harness = Harness::new(CONFIG);
    spawn_backend(&harness.bus, "service.items", Mode::Echo);

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/items/5?id=9&x=1")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"x":"2","y":"3"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "echo": { "id": "9", "x": "2", "y": "3", "action": "update" } })
    );
}

#[tokio::test]
async fn test_route_without_params_or_action() {
    let harness = Harness::new(CONFIG);
    spawn_backend(&harness.bus, "service.items", Mode::Echo);

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .uri("/search?q=pen")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "echo": { "q": "pen" } }));
}

#[tokio::test]
async fn test_malformed_body_is_400_and_not_counted() {
    let harness = Harness::new(CONFIG);
    let backend = spawn_backend(&harness.bus, "service.items", Mode::Echo);

    for _ in 0..3 {
        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/items/5")
                    .body(Body::from("{oops"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["path"], "/items/5");
    }

    assert_eq!(backend.calls(), 0);
    let client = harness.factory.get_client("items").await;
    assert_eq!(client.breaker().failure_count(), 0);
    assert_eq!(client.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_open_circuit_is_503_with_path() {
    let harness = Harness::new(CONFIG);
    spawn_backend(&harness.bus, "service.items", Mode::Fail("db locked".into()));

    for _ in 0..2 {
        let response = harness
            .router()
            .oneshot(Request::builder().uri("/items/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(response).await["message"],
            "Service unavailable: db locked"
        );
    }

    let response = harness
        .router()
        .oneshot(Request::builder().uri("/items/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await,
        json!({
            "status": 503,
            "message": "Service unavailable: circuit open for 'items'",
            "path": "/items/1"
        })
    );

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .uri("/admin/circuits")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        json_body(response).await,
        json!([{ "name": "items", "state": "open", "failures": 2 }])
    );
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let harness = Harness::new(CONFIG);
    spawn_backend(&harness.bus, "service.items", Mode::Echo);

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .uri("/search")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_unrouted_method_is_rejected() {
    let harness = Harness::new(CONFIG);
    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/items/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_undecodable_path_param_is_400() {
    let harness = Harness::new(CONFIG);
    let backend = spawn_backend(&harness.bus, "service.items", Mode::Echo);

    let response = harness
        .router()
        .oneshot(Request::builder().uri("/items/%FF").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["path"], "/items/%FF");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Bad request: invalid path parameters"));
    assert_eq!(backend.calls(), 0);
}

#[test]
fn test_request_deadline_inside_breaker_timeout_is_rejected() {
    let err = parse_config(
        r#"
        [timeouts]
        request_secs = 1

        [services.items.circuit-breaker]
        timeout = 5000
        "#,
    )
    .unwrap_err();

    let ConfigError::Validation(errors) = err else {
        panic!("expected validation failure, got {err}");
    };
    assert_eq!(
        errors,
        vec![ValidationError::RequestTimeoutTooShort {
            service: "items".into(),
            request_ms: 1000,
            timeout_ms: 5000,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_breaker_timeout_trips_before_request_deadline() {
    let harness = Harness::new(
        r#"
        [timeouts]
        request_secs = 1

        [services.items.circuit-breaker]
        max-failures = 2
        timeout = 500

        [[routes]]
        name = "get-item"
        path = "/items/{id}"
        service = "items"
        "#,
    );
    let backend = spawn_backend(&harness.bus, "service.items", Mode::Silent);

    for _ in 0..2 {
        let response = harness
            .router()
            .oneshot(Request::builder().uri("/items/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            json_body(response).await["message"],
            "Service unavailable: 'items' timed out after 500ms"
        );
    }

    assert_eq!(backend.calls(), 2);
    let client = harness.factory.get_client("items").await;
    assert_eq!(client.breaker().state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_is_a_failure_envelope() {
    // Assembled by hand: validation would refuse this pairing.
    let mut config = GatewayConfig::default();
    config.timeouts.request_secs = 1;
    let mut items = ServiceConfig::default();
    items.circuit_breaker.timeout = 5000;
    config.services.insert("items".into(), items);
    config.routes = vec![RouteConfig {
        name: "get-item".into(),
        method: "GET".into(),
        path: "/items/{id}".into(),
        service: "items".into(),
        action: None,
    }];
    let harness = Harness::from_config(config);
    spawn_backend(&harness.bus, "service.items", Mode::Silent);

    let response = harness
        .router()
        .oneshot(Request::builder().uri("/items/1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(
        json_body(response).await,
        json!({
            "status": 504,
            "message": "Service unavailable: request exceeded 1s",
            "path": "/items/1"
        })
    );
}
