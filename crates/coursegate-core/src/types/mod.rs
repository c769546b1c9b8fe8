//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the evaluator:
//! - Identifiers (`EntityId`, `UserId`, `EntityKey`)
//! - Time (`Timestamp`)
//! - Raw facts read from the status store (`StatusRow`, `CompletionRecord`)
//! - Derived facts (`EnrollmentStatus`, `EnrollmentRecord`)
//! - Error types (`CourseGateError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a content entity (course, section, lesson or track).
///
/// Courses, sections and lessons share one id space. Tracks use their own,
/// which is why completion lookups go through [`EntityKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a learner.
///
/// `UserId(0)` is the anonymous visitor and never owns enrollment or
/// completion facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// The anonymous (unauthenticated) visitor.
    pub const ANONYMOUS: UserId = UserId(0);

    /// Check whether this is the anonymous visitor.
    #[must_use]
    pub const fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

impl From<Option<u64>> for UserId {
    fn from(raw: Option<u64>) -> Self {
        raw.map_or(Self::ANONYMOUS, UserId)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of entity a completion record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Course,
    Section,
    Lesson,
    Track,
}

impl EntityKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Course => "course",
            EntityKind::Section => "section",
            EntityKind::Lesson => "lesson",
            EntityKind::Track => "track",
        }
    }

    /// Compact tag used as part of storage keys.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            EntityKind::Course => 0,
            EntityKind::Section => 1,
            EntityKind::Lesson => 2,
            EntityKind::Track => 3,
        }
    }

    /// Inverse of [`EntityKind::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntityKind::Course),
            1 => Some(EntityKind::Section),
            2 => Some(EntityKind::Lesson),
            3 => Some(EntityKind::Track),
            _ => None,
        }
    }
}

/// A typed reference to an entity: `(kind, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    #[must_use]
    pub const fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    #[must_use]
    pub const fn course(id: EntityId) -> Self {
        Self::new(EntityKind::Course, id)
    }

    #[must_use]
    pub const fn section(id: EntityId) -> Self {
        Self::new(EntityKind::Section, id)
    }

    #[must_use]
    pub const fn lesson(id: EntityId) -> Self {
        Self::new(EntityKind::Lesson, id)
    }

    #[must_use]
    pub const fn track(id: EntityId) -> Self {
        Self::new(EntityKind::Track, id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id.0)
    }
}

// =============================================================================
// TIMESTAMP
// =============================================================================

/// Date-time layouts accepted by [`Timestamp::parse`], tried in order.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Date-only layouts accepted by [`Timestamp::parse`]. Midnight UTC is assumed.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// `YYYYMMDD`. Checked before unix seconds so an eight-digit date is not read
/// as a 1970 instant.
const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Seconds since the Unix epoch (UTC).
///
/// Serialized as an RFC 3339 string in human-readable formats (JSON, TOML,
/// query strings) and as a plain `i64` in binary formats (postcard, redb).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Wrap a raw unix timestamp.
    #[must_use]
    pub const fn from_unix(secs: i64) -> Self {
        Self(secs)
    }

    /// Raw seconds since the epoch.
    #[must_use]
    pub const fn as_unix(self) -> i64 {
        self.0
    }

    /// Midnight UTC on the given calendar day.
    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| Self(n.and_utc().timestamp()))
    }

    /// Parse a stored date value.
    ///
    /// Accepts `YYYYMMDD`, unix seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS`,
    /// `YYYY-MM-DD` and `MM/DD/YYYY`. Returns `None` for empty or
    /// unrecognised input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(ts) = Self::parse_compact_date(raw) {
            return Some(ts);
        }
        if let Ok(secs) = raw.parse::<i64>() {
            return Some(Self(secs));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self(dt.timestamp()));
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(Self(naive.and_utc().timestamp()));
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
                return date
                    .and_hms_opt(0, 0, 0)
                    .map(|n| Self(n.and_utc().timestamp()));
            }
        }
        None
    }

    fn parse_compact_date(raw: &str) -> Option<Self> {
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(raw, COMPACT_DATE_FORMAT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| Self(n.and_utc().timestamp()))
    }

    /// Format as RFC 3339 (UTC). Falls back to raw seconds when out of range.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        DateTime::<Utc>::from_timestamp(self.0, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_rfc3339())
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(TimestampVisitor)
        } else {
            i64::deserialize(deserializer).map(Timestamp)
        }
    }
}

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a unix timestamp or a date string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
        Ok(Timestamp(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
        i64::try_from(v)
            .map(Timestamp)
            .map_err(|_| E::custom("timestamp out of range"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
        Timestamp::parse(v).ok_or_else(|| E::custom(format!("unrecognised date: {v}")))
    }
}

// =============================================================================
// ENROLLMENT
// =============================================================================

/// A learner's registration state for a course.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// No enrollment on record.
    #[default]
    #[serde(rename = "none")]
    NotEnrolled,
    /// Currently enrolled.
    Enrolled,
    /// Was enrolled; the enrollment has lapsed.
    Expired,
}

impl EnrollmentStatus {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::NotEnrolled => "none",
            EnrollmentStatus::Enrolled => "enrolled",
            EnrollmentStatus::Expired => "expired",
        }
    }

    /// Parse a status name. Case-insensitive; `None` for anything other than
    /// `none`, `enrolled` or `expired`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(EnrollmentStatus::NotEnrolled),
            "enrolled" => Some(EnrollmentStatus::Enrolled),
            "expired" => Some(EnrollmentStatus::Expired),
            _ => None,
        }
    }

    /// Enrolled now, or enrolled at some point in the past.
    #[must_use]
    pub const fn was_enrolled(self) -> bool {
        matches!(self, EnrollmentStatus::Enrolled | EnrollmentStatus::Expired)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped status fact for a `(course, user)` pair.
///
/// Rows are append-only. `seq` is assigned by the store on append and only
/// breaks ties between rows sharing the same `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    pub course: EntityId,
    pub user: UserId,
    pub status: EnrollmentStatus,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub seq: u64,
}

impl StatusRow {
    #[must_use]
    pub fn new(
        course: EntityId,
        user: UserId,
        status: EnrollmentStatus,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            course,
            user,
            status,
            updated_at,
            seq: 0,
        }
    }

    /// Ordering key for the recency rule: newest `updated_at` first, then
    /// newest `seq`.
    #[must_use]
    pub const fn recency(&self) -> (Timestamp, u64) {
        (self.updated_at, self.seq)
    }
}

/// The resolved enrollment of one learner in one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub course: EntityId,
    pub user: UserId,
    pub status: EnrollmentStatus,
    pub enrollment_date: Option<Timestamp>,
    pub completion_date: Option<Timestamp>,
}

impl EnrollmentRecord {
    /// The record for a pair with no facts at all.
    #[must_use]
    pub fn none(course: EntityId, user: UserId) -> Self {
        Self {
            course,
            user,
            status: EnrollmentStatus::NotEnrolled,
            enrollment_date: None,
            completion_date: None,
        }
    }
}

// =============================================================================
// COMPLETION
// =============================================================================

/// A learner finished (or has a completion fact for) one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub entity: EntityKey,
    pub user: UserId,
    pub is_complete: bool,
    pub completed_date: Option<Timestamp>,
}

impl CompletionRecord {
    /// A completed record dated `at`.
    #[must_use]
    pub fn complete(entity: EntityKey, user: UserId, at: Timestamp) -> Self {
        Self {
            entity,
            user,
            is_complete: true,
            completed_date: Some(at),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the evaluator.
///
/// Data absence is never an error at the evaluation surface; these variants
/// surface from ingest, persistence and storage faults.
#[derive(Debug, Error)]
pub enum CourseGateError {
    /// A referenced entity does not resolve.
    #[error("Entity not found: {0}")]
    NotFound(EntityKey),

    /// Course configuration cannot be interpreted.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A record violates a structural invariant.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A status row would create a forbidden lifecycle transition.
    #[error("Invalid enrollment transition: {from} -> {to}")]
    InvalidTransition {
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
