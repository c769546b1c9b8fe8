//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        AccessQuery, AccessResponse, CapacityResponse, CompletionRecordRequest,
        EnrollmentResponse, ExportResponse, HealthResponse, ProgressResponse, RecordResponse,
        StatusRecordRequest, StatusResponse, UserQuery,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use coursegate_core::{
    CourseGateError, EntityId, compute_blake3_hash, dataset_to_bytes, snapshot_checksum,
};

/// HTTP status for an error surfaced by the evaluator.
fn error_status(err: &CourseGateError) -> StatusCode {
    match err {
        CourseGateError::NotFound(_) => StatusCode::NOT_FOUND,
        CourseGateError::InvalidRecord(_) | CourseGateError::InvalidConfiguration(_) => {
            StatusCode::BAD_REQUEST
        }
        CourseGateError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CourseGateError::SerializationError(_)
        | CourseGateError::DeserializationError(_)
        | CourseGateError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get catalog status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let evaluator = state.evaluator.read().await;
    let metrics = evaluator.metrics();

    (
        StatusCode::OK,
        Json(StatusResponse::new(&metrics, evaluator.is_persistent())),
    )
}

// =============================================================================
// EVALUATION HANDLERS
// =============================================================================

/// Evaluate access for a learner, at `now` or the server clock.
pub async fn access_handler(
    State(state): State<AppState>,
    Path(course): Path<u64>,
    Query(query): Query<AccessQuery>,
) -> impl IntoResponse {
    let instant = match query.instant() {
        Ok(instant) => instant,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AccessResponse::error(e.to_string())),
            );
        }
    };

    let evaluator = state.evaluator.read().await;
    let now = instant.unwrap_or_else(|| evaluator.now());

    match evaluator.access_at(EntityId(course), query.user_id(), now) {
        Some(decision) => (StatusCode::OK, Json(AccessResponse::with_decision(decision))),
        None => (StatusCode::NOT_FOUND, Json(AccessResponse::not_found())),
    }
}

/// Learner progress through a course.
pub async fn progress_handler(
    State(state): State<AppState>,
    Path(course): Path<u64>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let evaluator = state.evaluator.read().await;

    match evaluator.compute_progress(EntityId(course), query.user_id()) {
        Some(snapshot) => (
            StatusCode::OK,
            Json(ProgressResponse::with_snapshot(snapshot)),
        ),
        None => (StatusCode::NOT_FOUND, Json(ProgressResponse::not_found())),
    }
}

/// Learner enrollment in a course.
pub async fn enrollment_handler(
    State(state): State<AppState>,
    Path(course): Path<u64>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let evaluator = state.evaluator.read().await;
    let course = EntityId(course);

    if evaluator.course(course).is_none() {
        return (StatusCode::NOT_FOUND, Json(EnrollmentResponse::not_found()));
    }

    let record = evaluator.enrollment_record(course, query.user_id());
    (StatusCode::OK, Json(EnrollmentResponse::with_record(record)))
}

/// Seat availability of a course.
pub async fn capacity_handler(
    State(state): State<AppState>,
    Path(course): Path<u64>,
) -> impl IntoResponse {
    let evaluator = state.evaluator.read().await;
    let course_id = EntityId(course);

    let Some(course) = evaluator.course(course_id) else {
        return (StatusCode::NOT_FOUND, Json(CapacityResponse::not_found()));
    };

    let response = CapacityResponse {
        found: true,
        capacity: course.capacity_limit(),
        enrolled: evaluator.count_enrolled(course_id),
        has_capacity: evaluator.has_capacity(course_id),
    };
    (StatusCode::OK, Json(response))
}

// =============================================================================
// RECORD HANDLERS
// =============================================================================

/// Append an enrollment status row.
pub async fn record_status_handler(
    State(state): State<AppState>,
    Json(request): Json<StatusRecordRequest>,
) -> impl IntoResponse {
    let mut evaluator = state.evaluator.write().await;

    let row = match request.to_row(evaluator.now()) {
        Ok(row) => row,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RecordResponse::error(format!("Invalid status row: {}", e))),
            );
        }
    };

    match evaluator.record_status(row) {
        Ok(seq) => (StatusCode::OK, Json(RecordResponse::status_recorded(seq))),
        Err(e) => (
            error_status(&e),
            Json(RecordResponse::error(format!("Record failed: {}", e))),
        ),
    }
}

/// Mark an entity complete for a learner.
pub async fn record_completion_handler(
    State(state): State<AppState>,
    Json(request): Json<CompletionRecordRequest>,
) -> impl IntoResponse {
    let mut evaluator = state.evaluator.write().await;

    let record = match request.to_record(evaluator.now()) {
        Ok(record) => record,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RecordResponse::error(format!("Invalid completion: {}", e))),
            );
        }
    };

    match evaluator.record_completion(record) {
        Ok(changed) => (
            StatusCode::OK,
            Json(RecordResponse::completion_recorded(changed)),
        ),
        Err(e) => (
            error_status(&e),
            Json(RecordResponse::error(format!("Record failed: {}", e))),
        ),
    }
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export the catalog as a base64 snapshot with its checksums.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let evaluator = state.evaluator.read().await;

    let data = match evaluator
        .export_dataset()
        .and_then(|dataset| dataset_to_bytes(&dataset))
    {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExportResponse::error(format!("Export failed: {}", e))),
            );
        }
    };

    let checksum = snapshot_checksum(&data);
    let blake3 = compute_blake3_hash(&data);
    (
        StatusCode::OK,
        Json(ExportResponse::success(&data, checksum, blake3)),
    )
}
