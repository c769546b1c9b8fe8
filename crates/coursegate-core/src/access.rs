//! # Access Gate
//!
//! Decides whether a learner may view course content or enroll, at one
//! instant.
//!
//! Two independent time axes:
//!
//! | Axis       | Toggle              | States                                                       |
//! |------------|---------------------|--------------------------------------------------------------|
//! | Content    | `time_period`       | `NotYetOpen` → `Open` → `Closed`                             |
//! | Enrollment | `enrollment_period` | `EnrollmentNotYetOpen` → `EnrollmentOpen` → `EnrollmentClosed` |
//!
//! A disabled toggle pins its axis open. Otherwise an axis is open while
//! `start <= now < end`; a missing boundary is unbounded on that side.
//!
//! Every comparison within one call uses the single `now` the caller passes.

use crate::enrollment::EnrollmentResolver;
use crate::store::StatusStore;
use crate::{
    Course, CourseGateError, EnrollmentStatus, EntityId, EntityKey, EntityKind, PrerequisiteKind,
    Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// AXIS STATES
// =============================================================================

/// Content axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAccess {
    NotYetOpen,
    Open,
    Closed,
}

/// Enrollment axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentAccess {
    EnrollmentNotYetOpen,
    EnrollmentOpen,
    EnrollmentClosed,
}

/// Position of an instant relative to a `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Before,
    Inside,
    After,
}

fn window(start: Option<Timestamp>, end: Option<Timestamp>, now: Timestamp) -> Window {
    if start.is_some_and(|s| now < s) {
        Window::Before
    } else if end.is_some_and(|e| now >= e) {
        Window::After
    } else {
        Window::Inside
    }
}

/// Content axis state of a course at `now`.
#[must_use]
pub fn content_state(course: &Course, now: Timestamp) -> ContentAccess {
    if !course.time_period {
        return ContentAccess::Open;
    }
    match window(course.start_date, course.end_date, now) {
        Window::Before => ContentAccess::NotYetOpen,
        Window::Inside => ContentAccess::Open,
        Window::After => ContentAccess::Closed,
    }
}

/// Enrollment axis state of a course at `now`.
#[must_use]
pub fn enrollment_state(course: &Course, now: Timestamp) -> EnrollmentAccess {
    if !course.enrollment_period {
        return EnrollmentAccess::EnrollmentOpen;
    }
    match window(
        course.enrollment_start_date,
        course.enrollment_end_date,
        now,
    ) {
        Window::Before => EnrollmentAccess::EnrollmentNotYetOpen,
        Window::Inside => EnrollmentAccess::EnrollmentOpen,
        Window::After => EnrollmentAccess::EnrollmentClosed,
    }
}

// =============================================================================
// DECISION
// =============================================================================

/// Why lesson access is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessBlock {
    CourseNotOpen,
    CourseClosed,
    EnrollmentNotOpen,
    EnrollmentClosed,
    AtCapacity,
    ContentRestricted,
    PrerequisiteIncomplete,
}

/// Everything the gate knows about one learner and one course at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub course: EntityId,
    pub user: UserId,
    pub now: Timestamp,
    /// Displayed start: the configured start date, else the publication date.
    pub start_date: Option<Timestamp>,
    pub content: ContentAccess,
    pub enrollment: EnrollmentAccess,
    pub status: EnrollmentStatus,
    pub is_enrolled: bool,
    pub has_capacity: bool,
    pub has_prerequisite: bool,
    /// `true` when no prerequisite is configured.
    pub prerequisite_met: bool,
    pub can_view_content: bool,
    pub can_enroll: bool,
    /// Content open, learner enrolled and prerequisites met.
    pub can_access_lessons: bool,
    pub blocked_by: Option<AccessBlock>,
    /// The course's configured text for `blocked_by`, if any.
    pub notice: Option<String>,
}

// =============================================================================
// GATE
// =============================================================================

/// Access policy over a [`StatusStore`].
#[derive(Debug)]
pub struct AccessGate<'a, S: StatusStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: StatusStore + ?Sized> AccessGate<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn resolver(&self) -> EnrollmentResolver<'a, S> {
        EnrollmentResolver::new(self.store)
    }

    /// Whether content is viewable at `now` (time axis only).
    #[must_use]
    pub fn can_view_content(&self, course: &Course, now: Timestamp) -> bool {
        content_state(course, now) == ContentAccess::Open
    }

    /// Enrollment window open and a seat available.
    pub fn can_enroll(&self, course: &Course, now: Timestamp) -> Result<bool, CourseGateError> {
        if enrollment_state(course, now) != EnrollmentAccess::EnrollmentOpen {
            return Ok(false);
        }
        self.has_capacity(course)
    }

    /// Capacity disabled, unlimited, or fewer enrolled learners than seats.
    pub fn has_capacity(&self, course: &Course) -> Result<bool, CourseGateError> {
        let Some(limit) = course.capacity_limit() else {
            return Ok(true);
        };
        let enrolled = self.resolver().count_enrolled(course.id)?;
        Ok(enrolled < limit as usize)
    }

    /// Prerequisites enabled and at least one configured.
    #[must_use]
    pub fn has_prerequisite(&self, course: &Course) -> bool {
        let p = &course.prerequisite;
        p.enabled && (p.course.is_some() || p.track.is_some())
    }

    /// The configured prerequisite of `kind`, or `None` when prerequisites
    /// are not in effect.
    #[must_use]
    pub fn prerequisite_id(&self, course: &Course, kind: PrerequisiteKind) -> Option<EntityId> {
        if !self.has_prerequisite(course) {
            return None;
        }
        course.prerequisite.id_for(kind)
    }

    /// Whether the learner completed the prerequisite of `kind`.
    pub fn prerequisite_complete(
        &self,
        course: &Course,
        user: UserId,
        kind: PrerequisiteKind,
    ) -> Result<bool, CourseGateError> {
        if user.is_anonymous() {
            return Ok(false);
        }
        let Some(id) = self.prerequisite_id(course, kind) else {
            return Ok(false);
        };
        let entity = match kind {
            PrerequisiteKind::Course => EntityKey::new(EntityKind::Course, id),
            PrerequisiteKind::Track => EntityKey::new(EntityKind::Track, id),
        };
        Ok(self
            .store
            .completion(entity, user)?
            .is_some_and(|c| c.is_complete))
    }

    /// Every configured prerequisite is complete.
    ///
    /// False for the anonymous user and when no prerequisite is configured.
    pub fn prerequisite_satisfied(
        &self,
        course: &Course,
        user: UserId,
    ) -> Result<bool, CourseGateError> {
        if user.is_anonymous() || !self.has_prerequisite(course) {
            return Ok(false);
        }
        for kind in [PrerequisiteKind::Course, PrerequisiteKind::Track] {
            if self.prerequisite_id(course, kind).is_some()
                && !self.prerequisite_complete(course, user, kind)?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Full decision for one learner at `now`.
    pub fn evaluate(
        &self,
        course: &Course,
        user: UserId,
        now: Timestamp,
    ) -> Result<AccessDecision, CourseGateError> {
        let content = content_state(course, now);
        let enrollment = enrollment_state(course, now);
        let status = self.resolver().get_status(course.id, user)?;
        let is_enrolled = status == EnrollmentStatus::Enrolled;
        let has_capacity = self.has_capacity(course)?;
        let has_prerequisite = self.has_prerequisite(course);
        let prerequisite_met = !has_prerequisite || self.prerequisite_satisfied(course, user)?;

        let can_view_content = content == ContentAccess::Open;
        let can_enroll = enrollment == EnrollmentAccess::EnrollmentOpen && has_capacity;

        let blocked_by = match content {
            ContentAccess::NotYetOpen => Some(AccessBlock::CourseNotOpen),
            ContentAccess::Closed => Some(AccessBlock::CourseClosed),
            ContentAccess::Open if !is_enrolled => Some(match enrollment {
                EnrollmentAccess::EnrollmentNotYetOpen => AccessBlock::EnrollmentNotOpen,
                EnrollmentAccess::EnrollmentClosed => AccessBlock::EnrollmentClosed,
                EnrollmentAccess::EnrollmentOpen if !has_capacity => AccessBlock::AtCapacity,
                EnrollmentAccess::EnrollmentOpen => AccessBlock::ContentRestricted,
            }),
            ContentAccess::Open if !prerequisite_met => Some(AccessBlock::PrerequisiteIncomplete),
            ContentAccess::Open => None,
        };

        let notices = &course.notices;
        let notice = match blocked_by {
            Some(AccessBlock::CourseNotOpen) => notices.course_opens.clone(),
            Some(AccessBlock::CourseClosed) => notices.course_closed.clone(),
            Some(AccessBlock::EnrollmentNotOpen) => notices.enrollment_opens.clone(),
            Some(AccessBlock::EnrollmentClosed) => notices.enrollment_closed.clone(),
            Some(AccessBlock::ContentRestricted) => notices.content_restricted.clone(),
            Some(AccessBlock::AtCapacity | AccessBlock::PrerequisiteIncomplete) | None => None,
        };

        tracing::debug!(
            course = course.id.0,
            user = user.0,
            ?content,
            ?enrollment,
            ?blocked_by,
            "access evaluated"
        );

        Ok(AccessDecision {
            course: course.id,
            user,
            now,
            start_date: course.effective_start_date(),
            content,
            enrollment,
            status,
            is_enrolled,
            has_capacity,
            has_prerequisite,
            prerequisite_met,
            can_view_content,
            can_enroll,
            can_access_lessons: blocked_by.is_none(),
            blocked_by,
            notice,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
