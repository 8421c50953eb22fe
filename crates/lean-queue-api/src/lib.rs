//! # Lean Queue HTTP Service
//!
//! HTTP surface for the lease-based work queue.
//!
//! This crate provides:
//! - Message endpoints (publish, reserve-next, list, get, remove) behind an
//!   API key check
//! - Liveness, health and Prometheus metrics endpoints
//! - Request logging with correlation IDs
//! - Service configuration types

pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use auth::{ApiKeyAuthenticator, AuthenticatedClient};
pub use config::{
    DatabaseConfig, LoggingConfig, QueueConfig, SecurityConfig, ServerConfig, ServiceConfig,
};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use metrics::ServiceMetrics;
pub use responses::{
    HealthCheckResult, HealthChecker, HealthResponse, HealthStatus, ListMessagesParams,
    MessageResponse, PublishMessageRequest, PublishResponse, RemoveMessageRequest,
    RemoveResponse, ReserveNextParams, StoreHealthChecker,
};

use axum::{
    body::Bytes,
    extract::{
        rejection::QueryRejection, DefaultBodyLimit, MatchedPath, Path, Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use lean_queue_core::{MessageId, QueueError, QueueService};
use serde::de::DeserializeOwned;
use std::{future::Future, sync::Arc, time::Instant};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Queue use cases
    pub queue: QueueService,

    /// Health checker for system monitoring
    pub health_checker: Arc<dyn HealthChecker>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        queue: QueueService,
        health_checker: Arc<dyn HealthChecker>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            queue,
            health_checker,
            metrics,
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the HTTP router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let authenticator = Arc::new(ApiKeyAuthenticator::from_config(&state.config.security));
    if authenticator.is_disabled() {
        warn!("No API keys configured; message routes accept unauthenticated requests");
    }

    let message_routes = Router::new()
        .route("/message", post(publish_message).delete(remove_message))
        .route("/message/next", get(reserve_next_messages))
        .route("/message/queue", get(missing_queue_name))
        .route("/message/queue/", get(missing_queue_name))
        .route("/message/queue/{queue_name}", get(list_queue_messages))
        .route("/message/{message_id}", get(get_message))
        .route_layer(middleware::from_fn_with_state(
            authenticator,
            auth::require_api_key,
        ));

    let operational_routes = Router::new()
        .route("/", get(banner))
        .route("/alive", get(alive))
        .route("/health", get(handle_health_check))
        .route("/health/deep", get(handle_deep_health_check))
        .route("/metrics", get(metrics_endpoint));

    let prefix = state.config.server.path_prefix.as_str();
    let router = if prefix.is_empty() {
        operational_routes.merge(message_routes)
    } else {
        operational_routes.nest(prefix, message_routes)
    };

    let mut router = router
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ));

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    if state.config.security.log_requests {
        router = router.layer(middleware::from_fn(request_logging_middleware));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

/// Serve the router until `shutdown` resolves
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    // In-flight requests finish before this returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

/// Publish a message to a queue
#[instrument(skip(state, body))]
async fn publish_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PublishResponse>, ApiError> {
    let request: PublishMessageRequest = parse_json_body(&body)?;

    let id = state
        .queue
        .publish(&request.queue_name, &request.message)
        .await
        .map_err(|e| track_failure(&state, e))?;

    state.metrics.record_publish();
    Ok(Json(PublishResponse::new(id)))
}

/// Remove a message; succeeds whether or not it existed
#[instrument(skip(state, body))]
async fn remove_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RemoveResponse>, ApiError> {
    let request: RemoveMessageRequest = parse_json_body(&body)?;
    let id = parse_message_id(&request.message_id)?;

    let existed = state
        .queue
        .remove(&id)
        .await
        .map_err(|e| track_failure(&state, e))?;

    state.metrics.record_remove(existed);
    Ok(Json(RemoveResponse::new(id, existed)))
}

/// Lease the next available messages of a queue
#[instrument(skip(state, params))]
async fn reserve_next_messages(
    State(state): State<AppState>,
    params: Result<Query<ReserveNextParams>, QueryRejection>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let Query(params) = params.map_err(query_error)?;
    let request = params.into_request()?;

    let messages = match state.queue.reserve_next(request).await {
        Ok(messages) => messages,
        Err(e) => {
            state.metrics.record_claim_failure();
            return Err(track_failure(&state, e));
        }
    };

    state.metrics.record_claim(messages.len());
    Ok(Json(messages.iter().map(MessageResponse::from).collect()))
}

/// List messages of a queue regardless of lease state
#[instrument(skip(state, params))]
async fn list_queue_messages(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    params: Result<Query<ListMessagesParams>, QueryRejection>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let Query(params) = params.map_err(query_error)?;
    let limit = params.limit()?;

    let messages = state
        .queue
        .list_pending(&queue_name, limit)
        .await
        .map_err(|e| track_failure(&state, e))?;

    Ok(Json(messages.iter().map(MessageResponse::from).collect()))
}

async fn missing_queue_name() -> ApiError {
    ApiError::MissingParameter {
        name: "queue_name".to_string(),
    }
}

/// Fetch one message by ID
#[instrument(skip(state))]
async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_message_id(&message_id)?;

    let message = state
        .queue
        .get(&id)
        .await
        .map_err(|e| track_failure(&state, e))?;

    match message {
        Some(message) => Ok(Json(MessageResponse::from(&message))),
        None => Err(ApiError::NotFound {
            resource: "message".to_string(),
            id: id.to_string(),
        }),
    }
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody {
        message: e.to_string(),
    })
}

fn parse_message_id(raw: &str) -> Result<MessageId, ApiError> {
    raw.parse::<MessageId>()
        .map_err(|e| ApiError::Queue(QueueError::InvalidArgument(e)))
}

fn query_error(rejection: QueryRejection) -> ApiError {
    ApiError::InvalidParameter {
        name: "query".to_string(),
        message: rejection.body_text(),
    }
}

/// Count a failed queue operation and convert it for the response
fn track_failure(state: &AppState, err: QueueError) -> ApiError {
    state.metrics.record_error(err.kind());
    ApiError::Queue(err)
}

// ============================================================================
// Operational Handlers
// ============================================================================

async fn banner() -> &'static str {
    concat!("OK - lean-queue ", env!("CARGO_PKG_VERSION"))
}

async fn alive() -> &'static str {
    "OK"
}

/// Basic health check endpoint
#[instrument(skip(state))]
async fn handle_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let status = state.health_checker.check_basic_health().await;
    health_reply(status)
}

/// Deep health check including the message store
#[instrument(skip(state))]
async fn handle_deep_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let status = state.health_checker.check_deep_health().await;
    health_reply(status)
}

fn health_reply(
    status: HealthStatus,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let healthy = status.is_healthy;
    let response = HealthResponse::from_status(status);

    if healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// Reuses the caller's `x-correlation-id` or generates one, and echoes it on
/// the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

/// Record request latency by route template
///
/// Uses the matched route rather than the raw path so message IDs and queue
/// names do not become label values.
async fn metrics_middleware(
    State(metrics): State<Arc<ServiceMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics.record_http_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
