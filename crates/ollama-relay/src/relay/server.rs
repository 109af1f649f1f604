//! HTTP relay server
//!
//! Implements the inbound side of the relay:
//! - `POST /api/generate` forwards to the upstream generate endpoint, buffered
//!   or streamed depending on the request's `stream` flag
//! - `GET /api/status` reports upstream liveness and its model list
//! - `GET /health` answers without touching upstream

use axum::{
    Extension, Json, Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{RelayError, Result};

use super::error::ProxyError;
use super::request::{GenerationRequest, ModelStatus};
use super::streaming::{OutcomeHandle, RelayEnd, RelayResult, StreamRelay};
use super::upstream::{UpstreamClient, filter_hop_by_hop};

/// Response header carrying the per-request identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identifier attached to every inbound request and its log span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay configuration
    pub config: Config,
    /// Client for the upstream inference server
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self { config, upstream })
    }
}

/// The relay server
pub struct RelayServer {
    config: Config,
}

impl RelayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the relay and serve requests until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        self.config.validate()?;
        let addr = self.config.server.socket_addr()?;

        let state = Arc::new(AppState::new(self.config.clone())?);

        tracing::info!("Starting relay server on {addr}");
        tracing::info!("Upstream: {}", state.upstream.base_url());
        if self.config.server.cors {
            tracing::info!("CORS: permissive");
        }

        let listener = TcpListener::bind(addr).await?;
        let app = create_router(state);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Proxy(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors;

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/status", get(status_handler))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!("generate", request_id = %request_id.0);

    match relay_generation(&state, headers, body).instrument(span).await {
        Ok(response) => response,
        Err(e) => {
            e.log();
            e.into_response()
        }
    }
}

/// Relay one generation request upstream and build the caller's response.
///
/// The body is forwarded as received; it is only parsed to read `stream`.
pub async fn relay_generation(
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ProxyError> {
    let request = GenerationRequest::from_slice(&body)?;
    tracing::debug!(model = %request.model, stream = request.stream, "Relaying generation");

    let upstream = state.upstream.generate(&headers, body, request.stream).await?;

    if request.stream {
        Ok(streamed_response(upstream))
    } else {
        buffered_response(upstream).await
    }
}

fn streamed_response(upstream: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);
    let headers = filter_hop_by_hop(upstream.headers());

    let RelayResult {
        client_stream,
        outcome,
    } = StreamRelay::relay(Box::pin(upstream.bytes_stream()));

    tokio::spawn(log_outcome(outcome).in_current_span());

    let mut response = Response::new(Body::from_stream(client_stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn buffered_response(
    upstream: reqwest::Response,
) -> std::result::Result<Response, ProxyError> {
    let body = upstream
        .bytes()
        .await
        .map_err(|e| ProxyError::from_reqwest(&e))?;

    // Validate only; the caller gets the upstream bytes as sent.
    serde_json::from_slice::<serde::de::IgnoredAny>(&body)
        .map_err(|e| ProxyError::InvalidUpstreamBody(format!("Upstream body is not JSON: {e}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

async fn log_outcome(outcome: OutcomeHandle) {
    let outcome = outcome.outcome().await;
    match outcome.end {
        RelayEnd::Completed => tracing::info!(
            chunks = outcome.chunks,
            bytes = outcome.bytes,
            "Stream relay completed"
        ),
        RelayEnd::Interrupted(reason) => tracing::warn!(
            chunks = outcome.chunks,
            bytes = outcome.bytes,
            %reason,
            "Stream relay interrupted"
        ),
        RelayEnd::Cancelled => tracing::info!(
            chunks = outcome.chunks,
            bytes = outcome.bytes,
            "Stream relay cancelled by caller"
        ),
    }
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    let span = tracing::info_span!("status", request_id = %request_id.0);

    match state.upstream.tags().instrument(span).await {
        Ok(models) => (StatusCode::OK, Json(ModelStatus::available(models))).into_response(),
        Err(e) => {
            tracing::warn!(error_message = %e, "Upstream status check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ModelStatus::unavailable(e.message())),
            )
                .into_response()
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state(base_url: &str) -> Arc<AppState> {
        let mut config = Config::default();
        config.upstream.base_url = base_url.to_string();
        config.upstream.connect_timeout_secs = 2;
        Arc::new(AppState::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state("http://127.0.0.1:1"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(body_str.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let app = create_router(create_test_state("http://127.0.0.1:1"));

        let mut ids = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/health")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            ids.push(response.headers()[REQUEST_ID_HEADER].clone());
        }

        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_generate_rejects_invalid_body() {
        let app = create_router(create_test_state("http://127.0.0.1:1"));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_generate_requires_post() {
        let app = create_router(create_test_state("http://127.0.0.1:1"));

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_preflight_when_enabled() {
        let mut config = Config::default();
        config.server.cors = true;
        let app = create_router(Arc::new(AppState::new(config).unwrap()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/generate")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin")
        );
    }

    #[tokio::test]
    async fn test_serve_reports_address_in_use_as_io_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut config = Config::default();
        config.server.listen_addr = taken.local_addr().unwrap().to_string();

        let err = RelayServer::new(config).serve().await.unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
