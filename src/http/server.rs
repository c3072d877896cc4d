//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router from the configured route table
//! - Wire up middleware (request deadline, request ID, tracing)
//! - Answer an expired request deadline with a 504 failure envelope
//! - Extract path params, query and body into a `RawRequest`
//! - Hand each request to the dispatcher with the route's action
//! - Serve breaker snapshots on the admin endpoint
//! - Bind server to listener and stop on shutdown

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::{rejection::PathRejection, FromRequestParts, Path, Query, Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, MethodFilter, MethodRouter},
    BoxError, Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{timeout::error::Elapsed, ServiceBuilder};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, RouteConfig};
use crate::dispatch::error::UNAVAILABLE_PREFIX;
use crate::dispatch::{DispatchError, Dispatcher, FailureBody, RawRequest, ResponseEnvelope};
use crate::http::request::{request_id, MakeRequestUuid};
use crate::resilience::BreakerSnapshot;

/// Admin endpoint listing every breaker's state.
pub const ADMIN_CIRCUITS_PATH: &str = "/admin/circuits";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub max_body_size: usize,
}

/// What a configured route dispatches to.
#[derive(Debug, Clone)]
struct RouteTarget {
    name: Arc<str>,
    service: Arc<str>,
    action: Option<Arc<str>>,
}

impl From<&RouteConfig> for RouteTarget {
    fn from(route: &RouteConfig) -> Self {
        Self {
            name: route.name.as_str().into(),
            service: route.service.as_str().into(),
            action: route.action.as_deref().map(Into::into),
        }
    }
}

/// HTTP front door for the dispatch core.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, dispatcher: Dispatcher) -> Self {
        let state = AppState {
            dispatcher,
            max_body_size: config.listener.max_body_size,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        // Group by path; axum wants one MethodRouter per path.
        let mut by_path: BTreeMap<&str, MethodRouter<AppState>> = BTreeMap::new();
        for route in &config.routes {
            let Some(filter) = method_filter(&route.method) else {
                tracing::warn!(route = %route.name, method = %route.method, "Skipping route with unsupported method");
                continue;
            };
            let target = RouteTarget::from(route);
            let handler = move |State(state): State<AppState>, request: Request| async move {
                dispatch_route(state, target, request).await
            };
            let methods = by_path
                .remove(route.path.as_str())
                .unwrap_or_else(MethodRouter::new);
            by_path.insert(route.path.as_str(), methods.on(filter, handler));
            tracing::debug!(
                route = %route.name,
                method = %route.method,
                path = %route.path,
                service = %route.service,
                "Route registered"
            );
        }

        let mut router = Router::new().route(ADMIN_CIRCUITS_PATH, get(list_circuits));
        for (path, methods) in by_path {
            router = router.route(path, methods);
        }

        let request_secs = config.timeouts.request_secs;
        router
            .fallback(not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(move |uri: Uri, err: BoxError| {
                        handle_middleware_error(uri, err, request_secs)
                    }))
                    .timeout(Duration::from_secs(request_secs)),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The configured router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok()?;
    MethodFilter::try_from(method).ok()
}

/// Normalize one routed request and dispatch it.
async fn dispatch_route(state: AppState, target: RouteTarget, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    tracing::debug!(
        request_id = request_id(&parts.headers).unwrap_or("unknown"),
        route = %target.name,
        service = %target.service,
        path = %path,
        "Dispatching request"
    );

    let path_params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &state).await {
        Ok(Path(params)) => params,
        // Routes without placeholders have no params to extract.
        Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
        Err(e) => return bad_request(format!("invalid path parameters: {}", e.body_text()), path),
    };

    let query = match Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
        Ok(Query(pairs)) => pairs,
        Err(e) => return bad_request(format!("invalid query string: {e}"), path),
    };

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => return bad_request(format!("unreadable request body: {e}"), path),
    };

    let raw = RawRequest {
        path,
        path_params,
        query,
        body: Some(body.to_vec()),
    };

    let response = match &target.action {
        Some(action) => {
            state
                .dispatcher
                .dispatch_with(&target.service, &raw, |envelope| {
                    envelope.with_action(&**action)
                })
                .await
        }
        None => state.dispatcher.dispatch(&target.service, &raw).await,
    };
    response.into_response()
}

fn bad_request(message: String, path: String) -> Response {
    ResponseEnvelope::failure(&DispatchError::BadRequest(message), path).into_response()
}

/// Map a middleware failure, normally the request deadline, to a failure envelope.
async fn handle_middleware_error(uri: Uri, err: BoxError, request_secs: u64) -> Response {
    let (status, message) = if err.is::<Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            format!("{UNAVAILABLE_PREFIX}request exceeded {request_secs}s"),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{UNAVAILABLE_PREFIX}{err}"),
        )
    };
    tracing::warn!(path = %uri.path(), status = status.as_u16(), error = %err, "Request aborted by middleware");

    ResponseEnvelope::Failure(FailureBody {
        status: status.as_u16(),
        message,
        path: uri.path().to_string(),
    })
    .into_response()
}

async fn list_circuits(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.dispatcher.factory().snapshots())
}

async fn not_found(uri: Uri) -> Response {
    let body = FailureBody {
        status: StatusCode::NOT_FOUND.as_u16(),
        message: "No matching route found".to_string(),
        path: uri.path().to_string(),
    };
    ResponseEnvelope::Failure(body).into_response()
}
