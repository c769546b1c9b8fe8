//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use coursegate_core::{
    AccessDecision, CatalogMetrics, CompletionRecord, CourseGateError, EnrollmentRecord,
    EnrollmentStatus, EntityId, EntityKey, EntityKind, ProgressSnapshot, StatusRow, Timestamp,
    UserId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Catalog status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub persistent: bool,
    pub course_count: usize,
    pub section_count: usize,
    pub lesson_count: usize,
    pub status_row_count: usize,
    pub active_enrollment_count: usize,
    pub completion_count: usize,
    pub lessons_per_course_thousandths: u64,
}

impl StatusResponse {
    pub fn new(metrics: &CatalogMetrics, persistent: bool) -> Self {
        Self {
            persistent,
            course_count: metrics.course_count,
            section_count: metrics.section_count,
            lesson_count: metrics.lesson_count,
            status_row_count: metrics.status_row_count,
            active_enrollment_count: metrics.active_enrollment_count,
            completion_count: metrics.completion_count,
            lessons_per_course_thousandths: metrics.lessons_per_course_thousandths,
        }
    }
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// `?user=` query string. A missing user is the anonymous visitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user: Option<u64>,
}

impl UserQuery {
    pub fn user_id(&self) -> UserId {
        UserId::from(self.user)
    }
}

/// `?user=&now=` query string for access evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessQuery {
    #[serde(default)]
    pub user: Option<u64>,
    /// Instant to evaluate at; the server clock when absent.
    #[serde(default)]
    pub now: Option<String>,
}

impl AccessQuery {
    pub fn user_id(&self) -> UserId {
        UserId::from(self.user)
    }

    /// The requested instant, `Ok(None)` when not given.
    ///
    /// An unencoded `+` in the offset arrives as a space after query decoding,
    /// so `2024-03-01T00:00:00 00:00` is read as `+00:00`.
    pub fn instant(&self) -> Result<Option<Timestamp>, CourseGateError> {
        match self.now.as_deref() {
            None => Ok(None),
            Some(raw) => Timestamp::parse(raw)
                .or_else(|| restore_offset_plus(raw).and_then(|fixed| Timestamp::parse(&fixed)))
                .map(Some)
                .ok_or_else(|| {
                    CourseGateError::InvalidConfiguration(format!("Unrecognised instant: {}", raw))
                }),
        }
    }
}

/// Turn a trailing ` HH:MM` offset back into `+HH:MM`.
fn restore_offset_plus(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let idx = raw.rfind(' ')?;
    let offset = &raw[idx + 1..];
    let is_offset = offset.len() == 5
        && offset.as_bytes()[2] == b':'
        && offset
            .bytes()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if idx == 0 || !is_offset {
        return None;
    }
    Some(format!("{}+{}", &raw[..idx], offset))
}

// =============================================================================
// EVALUATION RESPONSES
// =============================================================================

/// Access evaluation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    pub success: bool,
    pub found: bool,
    pub decision: Option<AccessDecision>,
    pub error: Option<String>,
}

impl AccessResponse {
    pub fn with_decision(decision: AccessDecision) -> Self {
        Self {
            success: true,
            found: true,
            decision: Some(decision),
            error: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            success: true,
            found: false,
            decision: None,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            found: false,
            decision: None,
            error: Some(msg.into()),
        }
    }
}

/// Progress response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub found: bool,
    pub percent_complete: u8,
    pub next_lesson: Option<u64>,
    pub progress: Option<ProgressSnapshot>,
}

impl ProgressResponse {
    pub fn with_snapshot(snapshot: ProgressSnapshot) -> Self {
        Self {
            found: true,
            percent_complete: snapshot.percent_complete(),
            next_lesson: snapshot.next_incomplete_lesson().map(|id| id.0),
            progress: Some(snapshot),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            percent_complete: 0,
            next_lesson: None,
            progress: None,
        }
    }
}

/// Enrollment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub found: bool,
    pub is_enrolled: bool,
    pub enrollment: Option<EnrollmentRecord>,
}

impl EnrollmentResponse {
    pub fn with_record(record: EnrollmentRecord) -> Self {
        Self {
            found: true,
            is_enrolled: record.status == EnrollmentStatus::Enrolled,
            enrollment: Some(record),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            is_enrolled: false,
            enrollment: None,
        }
    }
}

/// Seat availability response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityResponse {
    pub found: bool,
    /// `None` when the course has no seat limit.
    pub capacity: Option<u32>,
    pub enrolled: usize,
    pub has_capacity: bool,
}

impl CapacityResponse {
    pub fn not_found() -> Self {
        Self {
            found: false,
            capacity: None,
            enrolled: 0,
            has_capacity: false,
        }
    }
}

// =============================================================================
// RECORD REQUESTS
// =============================================================================

/// Enrollment status fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecordRequest {
    pub course: u64,
    pub user: u64,
    /// `none`, `enrolled` or `expired`.
    pub status: String,
    /// When the status took effect; the server clock when absent.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl StatusRecordRequest {
    /// Convert to a [`StatusRow`], validating fields.
    ///
    /// Unlike stored meta values, an unknown status here is rejected rather
    /// than read as `none`.
    pub fn to_row(&self, now: Timestamp) -> Result<StatusRow, CourseGateError> {
        if self.user == 0 {
            return Err(CourseGateError::InvalidRecord(
                "status rows need a signed-in user".to_string(),
            ));
        }

        let status = EnrollmentStatus::parse(&self.status).ok_or_else(|| {
            CourseGateError::InvalidRecord(format!(
                "Unknown status '{}'. Use: none, enrolled, expired",
                self.status.trim()
            ))
        })?;

        let updated_at = parse_optional_instant(self.updated_at.as_deref(), "updated_at")?
            .unwrap_or(now);

        Ok(StatusRow::new(
            EntityId(self.course),
            UserId(self.user),
            status,
            updated_at,
        ))
    }
}

/// Completion fact for a course, section, lesson or track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecordRequest {
    /// `course`, `section`, `lesson` or `track`.
    pub kind: String,
    pub id: u64,
    pub user: u64,
    /// When the entity was completed; the server clock when absent.
    #[serde(default)]
    pub completed_date: Option<String>,
}

impl CompletionRecordRequest {
    /// Convert to a [`CompletionRecord`], validating fields.
    pub fn to_record(&self, now: Timestamp) -> Result<CompletionRecord, CourseGateError> {
        if self.user == 0 {
            return Err(CourseGateError::InvalidRecord(
                "completions need a signed-in user".to_string(),
            ));
        }

        let kind = [
            EntityKind::Course,
            EntityKind::Section,
            EntityKind::Lesson,
            EntityKind::Track,
        ]
        .into_iter()
        .find(|k| k.as_str() == self.kind.trim().to_ascii_lowercase())
        .ok_or_else(|| {
            CourseGateError::InvalidRecord(format!(
                "Unknown kind '{}'. Use: course, section, lesson, track",
                self.kind
            ))
        })?;

        let at = parse_optional_instant(self.completed_date.as_deref(), "completed_date")?
            .unwrap_or(now);

        Ok(CompletionRecord::complete(
            EntityKey::new(kind, EntityId(self.id)),
            UserId(self.user),
            at,
        ))
    }
}

fn parse_optional_instant(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<Timestamp>, CourseGateError> {
    match raw {
        None => Ok(None),
        Some(raw) => Timestamp::parse(raw).map(Some).ok_or_else(|| {
            CourseGateError::InvalidRecord(format!("Unrecognised {} '{}'", field, raw))
        }),
    }
}

/// Result of recording a fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    /// Sequence number assigned to a status row.
    pub seq: Option<u64>,
    /// `false` when a completion was already on record.
    pub changed: Option<bool>,
    pub error: Option<String>,
}

impl RecordResponse {
    pub fn status_recorded(seq: u64) -> Self {
        Self {
            success: true,
            seq: Some(seq),
            changed: Some(true),
            error: None,
        }
    }

    pub fn completion_recorded(changed: bool) -> Self {
        Self {
            success: true,
            seq: None,
            changed: Some(changed),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            seq: None,
            changed: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub blake3: Option<String>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], checksum: u64, blake3: String) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            checksum: Some(checksum),
            blake3: Some(blake3),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            blake3: None,
            error: Some(msg.into()),
        }
    }
}
