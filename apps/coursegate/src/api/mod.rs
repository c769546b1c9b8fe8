//! # Coursegate HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Catalog status
//! - `GET /courses/{id}/access?user=&now=` - Evaluate access for a learner
//! - `GET /courses/{id}/progress?user=` - Learner progress
//! - `GET /courses/{id}/enrollment?user=` - Learner enrollment
//! - `GET /courses/{id}/capacity` - Seat availability
//! - `POST /records/status` - Append an enrollment status row
//! - `POST /records/completion` - Mark an entity complete
//! - `POST /export` - Export the catalog snapshot
//!
//! ## Security Configuration
//!
//! CORS origins, the rate limit and the API key come from [`ServerSettings`],
//! which layers `coursegate.toml` and the `COURSEGATE_*` environment
//! variables (see [`crate::config`]).

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::ApiKey;
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AccessQuery, AccessResponse, CapacityResponse, CompletionRecordRequest, EnrollmentResponse,
    ExportResponse, HealthResponse, ProgressResponse, RecordResponse, StatusRecordRequest,
    StatusResponse, UserQuery,
};

use crate::config::ServerSettings;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use coursegate_core::{CourseGateError, Evaluator};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MiB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the evaluator.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<RwLock<Evaluator>>,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    /// State over an evaluator with resolved server settings.
    #[must_use]
    pub fn with_settings(evaluator: Evaluator, settings: ServerSettings) -> Self {
        Self {
            evaluator: Arc::new(RwLock::new(evaluator)),
            settings: Arc::new(settings),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - `["*"]`: allows all origins (development only)
/// - unset: localhost only
/// - otherwise: the listed origins
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        tracing::info!("CORS: No origins configured, defaulting to localhost only");
        return build_localhost_cors();
    };

    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
        return CorsLayer::permissive();
    }

    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: Allowing origin: {}", origin);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting - protects against DoS (if enabled)
/// 5. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let settings = Arc::clone(&state.settings);
    let cors = build_cors_layer(settings.cors_origins.as_deref());

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/courses/{id}/access", get(handlers::access_handler))
        .route("/courses/{id}/progress", get(handlers::progress_handler))
        .route("/courses/{id}/enrollment", get(handlers::enrollment_handler))
        .route("/courses/{id}/capacity", get(handlers::capacity_handler))
        .route("/records/status", post(handlers::record_status_handler))
        .route(
            "/records/completion",
            post(handlers::record_completion_handler),
        )
        .route("/export", post(handlers::export_handler));

    // Authentication is the innermost layer, so it runs last on a request.
    match ApiKey::from_settings(&settings) {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                key,
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set COURSEGATE_API_KEY to enable authentication."
            );
        }
    }

    if settings.rate_limit > 0 {
        tracing::info!(
            "Rate limiting enabled: {} requests/second",
            settings.rate_limit
        );
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(settings.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl+C.
pub async fn run_server(
    settings: ServerSettings,
    evaluator: Evaluator,
) -> Result<(), CourseGateError> {
    let addr = settings.bind_addr();
    let router = create_router(AppState::with_settings(evaluator, settings));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CourseGateError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Coursegate HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CourseGateError::IoError(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
