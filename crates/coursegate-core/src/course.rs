//! # Course Model
//!
//! Typed course configuration.
//!
//! Stored configuration arrives as loosely typed string fields
//! ([`CourseMeta`]). It is scrubbed exactly once, at load time, into a
//! [`Course`] so that no evaluation ever re-interprets raw strings.
//!
//! Scrubbing rules:
//! - A flag is enabled iff its value is exactly `"yes"`
//! - `capacity` is read as an absolute integer; non-numeric means unlimited
//! - Dates that cannot be parsed are treated as unset (unbounded)

use crate::primitives::{FLAG_DISABLED, FLAG_ENABLED};
use crate::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};

// =============================================================================
// PREREQUISITES
// =============================================================================

/// Which kind of prerequisite to look up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteKind {
    #[default]
    Course,
    Track,
}

/// Prerequisite configuration of a course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteConfig {
    /// The prerequisite feature toggle.
    pub enabled: bool,
    /// Course that must be completed first.
    pub course: Option<EntityId>,
    /// Track that must be completed first.
    pub track: Option<EntityId>,
}

impl PrerequisiteConfig {
    /// The configured id for `kind`, ignoring the feature toggle.
    #[must_use]
    pub fn id_for(&self, kind: PrerequisiteKind) -> Option<EntityId> {
        match kind {
            PrerequisiteKind::Course => self.course,
            PrerequisiteKind::Track => self.track,
        }
    }
}

// =============================================================================
// NOTICES
// =============================================================================

/// Texts shown to visitors when access is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseNotices {
    /// Shown before the course start date.
    pub course_opens: Option<String>,
    /// Shown after the course end date.
    pub course_closed: Option<String>,
    /// Shown to non-enrolled visitors before enrollment opens.
    pub enrollment_opens: Option<String>,
    /// Shown to non-enrolled visitors after enrollment closes.
    pub enrollment_closed: Option<String>,
    /// Shown to non-enrolled visitors trying to reach lessons directly.
    pub content_restricted: Option<String>,
}

// =============================================================================
// COURSE
// =============================================================================

/// A course and its access configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: EntityId,
    pub title: String,
    /// Content time-window restriction toggle.
    pub time_period: bool,
    /// Enrollment time-window restriction toggle.
    pub enrollment_period: bool,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub enrollment_start_date: Option<Timestamp>,
    pub enrollment_end_date: Option<Timestamp>,
    pub capacity_enabled: bool,
    /// Seat limit. `None` or `Some(0)` means unlimited.
    pub capacity: Option<u32>,
    pub prerequisite: PrerequisiteConfig,
    /// Publication date, used when no start date is configured.
    pub published_at: Option<Timestamp>,
    pub notices: CourseNotices,
}

impl Course {
    /// An unrestricted course.
    #[must_use]
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            time_period: false,
            enrollment_period: false,
            start_date: None,
            end_date: None,
            enrollment_start_date: None,
            enrollment_end_date: None,
            capacity_enabled: false,
            capacity: None,
            prerequisite: PrerequisiteConfig::default(),
            published_at: None,
            notices: CourseNotices::default(),
        }
    }

    /// Enable the content window.
    #[must_use]
    pub fn with_time_period(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.time_period = true;
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Enable the enrollment window.
    #[must_use]
    pub fn with_enrollment_period(
        mut self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Self {
        self.enrollment_period = true;
        self.enrollment_start_date = start;
        self.enrollment_end_date = end;
        self
    }

    /// Enable a seat limit.
    #[must_use]
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity_enabled = true;
        self.capacity = Some(capacity);
        self
    }

    /// Require another course to be completed first.
    #[must_use]
    pub fn with_prerequisite_course(mut self, course: EntityId) -> Self {
        self.prerequisite.enabled = true;
        self.prerequisite.course = Some(course);
        self
    }

    /// Require a track to be completed first.
    #[must_use]
    pub fn with_prerequisite_track(mut self, track: EntityId) -> Self {
        self.prerequisite.enabled = true;
        self.prerequisite.track = Some(track);
        self
    }

    /// The effective seat limit, or `None` when enrollment is unlimited.
    #[must_use]
    pub fn capacity_limit(&self) -> Option<u32> {
        if !self.capacity_enabled {
            return None;
        }
        self.capacity.filter(|&c| c > 0)
    }

    /// Start date, falling back to the publication date.
    #[must_use]
    pub fn effective_start_date(&self) -> Option<Timestamp> {
        self.start_date.or(self.published_at)
    }
}

// =============================================================================
// RAW META
// =============================================================================

/// Course configuration as stored: every field is an untyped string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseMeta {
    pub id: u64,
    pub title: String,
    pub time_period: String,
    pub enrollment_period: String,
    pub start_date: String,
    pub end_date: String,
    pub enrollment_start_date: String,
    pub enrollment_end_date: String,
    pub enable_capacity: String,
    pub capacity: String,
    pub has_prerequisite: String,
    pub prerequisite: String,
    pub prerequisite_track: String,
    pub published_at: String,
    pub course_opens_message: String,
    pub course_closed_message: String,
    pub enrollment_opens_message: String,
    pub enrollment_closed_message: String,
    pub content_restricted_message: String,
}

impl CourseMeta {
    /// Scrub the raw fields into a typed [`Course`].
    ///
    /// Never fails: malformed values fall back to their disabled/unset
    /// meaning and are logged.
    #[must_use]
    pub fn scrub(&self) -> Course {
        let id = EntityId(self.id);
        Course {
            id,
            title: self.title.trim().to_string(),
            time_period: flag(&self.time_period),
            enrollment_period: flag(&self.enrollment_period),
            start_date: date(id, "start_date", &self.start_date),
            end_date: date(id, "end_date", &self.end_date),
            enrollment_start_date: date(id, "enrollment_start_date", &self.enrollment_start_date),
            enrollment_end_date: date(id, "enrollment_end_date", &self.enrollment_end_date),
            capacity_enabled: flag(&self.enable_capacity),
            capacity: absint(id, "capacity", &self.capacity)
                .map(|c| u32::try_from(c).unwrap_or(u32::MAX)),
            prerequisite: PrerequisiteConfig {
                enabled: flag(&self.has_prerequisite),
                course: absint(id, "prerequisite", &self.prerequisite)
                    .filter(|&v| v > 0)
                    .map(EntityId),
                track: absint(id, "prerequisite_track", &self.prerequisite_track)
                    .filter(|&v| v > 0)
                    .map(EntityId),
            },
            published_at: date(id, "published_at", &self.published_at),
            notices: CourseNotices {
                course_opens: text(&self.course_opens_message),
                course_closed: text(&self.course_closed_message),
                enrollment_opens: text(&self.enrollment_opens_message),
                enrollment_closed: text(&self.enrollment_closed_message),
                content_restricted: text(&self.content_restricted_message),
            },
        }
    }
}

impl From<&Course> for CourseMeta {
    fn from(course: &Course) -> Self {
        let flag_str = |b: bool| if b { FLAG_ENABLED } else { FLAG_DISABLED }.to_string();
        let date_str = |d: Option<Timestamp>| d.map(Timestamp::to_rfc3339).unwrap_or_default();
        let id_str = |id: Option<EntityId>| id.map(|i| i.0.to_string()).unwrap_or_default();
        let text_str = |t: &Option<String>| t.clone().unwrap_or_default();

        Self {
            id: course.id.0,
            title: course.title.clone(),
            time_period: flag_str(course.time_period),
            enrollment_period: flag_str(course.enrollment_period),
            start_date: date_str(course.start_date),
            end_date: date_str(course.end_date),
            enrollment_start_date: date_str(course.enrollment_start_date),
            enrollment_end_date: date_str(course.enrollment_end_date),
            enable_capacity: flag_str(course.capacity_enabled),
            capacity: course.capacity.map(|c| c.to_string()).unwrap_or_default(),
            has_prerequisite: flag_str(course.prerequisite.enabled),
            prerequisite: id_str(course.prerequisite.course),
            prerequisite_track: id_str(course.prerequisite.track),
            published_at: date_str(course.published_at),
            course_opens_message: text_str(&course.notices.course_opens),
            course_closed_message: text_str(&course.notices.course_closed),
            enrollment_opens_message: text_str(&course.notices.enrollment_opens),
            enrollment_closed_message: text_str(&course.notices.enrollment_closed),
            content_restricted_message: text_str(&course.notices.content_restricted),
        }
    }
}

fn flag(raw: &str) -> bool {
    raw == FLAG_ENABLED
}

fn text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn date(course: EntityId, key: &str, raw: &str) -> Option<Timestamp> {
    if raw.trim().is_empty() {
        return None;
    }
    let parsed = Timestamp::parse(raw);
    if parsed.is_none() {
        tracing::warn!(
            course = course.0,
            key,
            value = raw,
            "unparsable course date treated as unset"
        );
    }
    parsed
}

/// Absolute integer value of a stored number; `None` if empty or non-numeric.
fn absint(course: EntityId, key: &str, raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<i64>() {
        Ok(v) => Some(v.unsigned_abs()),
        Err(_) => {
            tracing::warn!(
                course = course.0,
                key,
                value = raw,
                "non-numeric course setting treated as unset"
            );
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
