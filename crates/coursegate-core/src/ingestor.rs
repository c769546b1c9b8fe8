//! # Ingestor Module
//!
//! Record validation and ingestion for the evaluator's stores.
//!
//! - Validate records before any store mutation
//! - Reject records that break the content tree or the enrollment lifecycle
//! - Keep completion monotonic
//! - No enrichment: records are stored as given

use crate::formats::Dataset;
use crate::primitives::{
    MAX_DATASET_RECORDS, MAX_LESSONS_PER_SECTION, MAX_SECTIONS_PER_COURSE, MAX_TEXT_LENGTH,
};
use crate::store::{ContentStore, StatusStore};
use crate::{
    CompletionRecord, Course, CourseGateError, EnrollmentStatus, EntityKey, EntityKind, Lesson,
    Section, StatusRow, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Counts of records written by [`Ingestor::ingest_dataset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub courses: usize,
    pub sections: usize,
    pub lessons: usize,
    pub status_rows: usize,
    pub completions: usize,
    /// Completion records ignored because the entity was already complete.
    pub completions_unchanged: usize,
}

/// Whether `to` may follow `from` in a pair's status history.
///
/// `none → enrolled → {expired, enrolled}`, and `expired → enrolled` for
/// re-enrollment. Nothing returns to `none` once an enrollment exists.
fn transition_allowed(from: EnrollmentStatus, to: EnrollmentStatus) -> bool {
    match to {
        EnrollmentStatus::Enrolled => true,
        EnrollmentStatus::Expired => from == EnrollmentStatus::Enrolled,
        EnrollmentStatus::NotEnrolled => from == EnrollmentStatus::NotEnrolled,
    }
}

fn check_text(what: &str, text: &str) -> Result<(), CourseGateError> {
    if text.len() > MAX_TEXT_LENGTH {
        return Err(CourseGateError::InvalidRecord(format!(
            "{what} exceeds {MAX_TEXT_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// An enabled window whose end does not come after its start.
fn inverted(enabled: bool, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
    matches!((enabled, start, end), (true, Some(s), Some(e)) if e <= s)
}

/// The Ingestor validates records and writes them to a store.
pub struct Ingestor;

impl Ingestor {
    /// Validate a course.
    ///
    /// A course is valid if its id is non-zero and its title and notices
    /// are within length limits. An inverted window is accepted: it can
    /// never be open, which is the fail-closed reading.
    pub fn validate_course(course: &Course) -> Result<(), CourseGateError> {
        if course.id.0 == 0 {
            return Err(CourseGateError::InvalidRecord(
                "course id must be non-zero".to_string(),
            ));
        }
        check_text("course title", &course.title)?;
        let notices = &course.notices;
        for text in [
            &notices.course_opens,
            &notices.course_closed,
            &notices.enrollment_opens,
            &notices.enrollment_closed,
            &notices.content_restricted,
        ]
        .into_iter()
        .flatten()
        {
            check_text("course notice", text)?;
        }

        if inverted(course.time_period, course.start_date, course.end_date) {
            tracing::warn!(course = course.id.0, "course window ends before it starts");
        }
        if inverted(
            course.enrollment_period,
            course.enrollment_start_date,
            course.enrollment_end_date,
        ) {
            tracing::warn!(course = course.id.0, "enrollment window ends before it starts");
        }
        Ok(())
    }

    /// Validate and store a course.
    pub fn ingest_course<S>(store: &mut S, course: Course) -> Result<(), CourseGateError>
    where
        S: ContentStore + ?Sized,
    {
        Self::validate_course(&course)?;
        if store.section(course.id)?.is_some() || store.lesson(course.id)?.is_some() {
            return Err(CourseGateError::InvalidRecord(format!(
                "id {} is already used by another entity",
                course.id
            )));
        }
        store.put_course(course)
    }

    /// Validate and store a section.
    ///
    /// The parent course must exist. A section never moves to another
    /// course, since its lessons would follow it.
    pub fn ingest_section<S>(store: &mut S, section: Section) -> Result<(), CourseGateError>
    where
        S: ContentStore + ?Sized,
    {
        if section.id.0 == 0 {
            return Err(CourseGateError::InvalidRecord(
                "section id must be non-zero".to_string(),
            ));
        }
        check_text("section title", &section.title)?;
        if store.course(section.course)?.is_none() {
            return Err(CourseGateError::NotFound(EntityKey::course(section.course)));
        }
        if store.course(section.id)?.is_some() || store.lesson(section.id)?.is_some() {
            return Err(CourseGateError::InvalidRecord(format!(
                "id {} is already used by another entity",
                section.id
            )));
        }

        let siblings = store.sections()?;
        if let Some(existing) = siblings.iter().find(|s| s.id == section.id) {
            if existing.course != section.course {
                return Err(CourseGateError::InvalidRecord(format!(
                    "section {} belongs to course {}, not {}",
                    section.id, existing.course, section.course
                )));
            }
        } else if siblings.iter().filter(|s| s.course == section.course).count()
            >= MAX_SECTIONS_PER_COURSE
        {
            return Err(CourseGateError::InvalidRecord(format!(
                "course {} already has {MAX_SECTIONS_PER_COURSE} sections",
                section.course
            )));
        }

        store.put_section(section)
    }

    /// Validate and store a lesson. The parent section must exist.
    pub fn ingest_lesson<S>(store: &mut S, lesson: Lesson) -> Result<(), CourseGateError>
    where
        S: ContentStore + ?Sized,
    {
        if lesson.id.0 == 0 {
            return Err(CourseGateError::InvalidRecord(
                "lesson id must be non-zero".to_string(),
            ));
        }
        check_text("lesson title", &lesson.title)?;
        if store.section(lesson.section)?.is_none() {
            return Err(CourseGateError::NotFound(EntityKey::section(lesson.section)));
        }
        if store.course(lesson.id)?.is_some() || store.section(lesson.id)?.is_some() {
            return Err(CourseGateError::InvalidRecord(format!(
                "id {} is already used by another entity",
                lesson.id
            )));
        }

        let lessons = store.lessons()?;
        let is_new = lessons.iter().all(|l| l.id != lesson.id);
        if is_new
            && lessons.iter().filter(|l| l.section == lesson.section).count()
                >= MAX_LESSONS_PER_SECTION
        {
            return Err(CourseGateError::InvalidRecord(format!(
                "section {} already has {MAX_LESSONS_PER_SECTION} lessons",
                lesson.section
            )));
        }

        store.put_lesson(lesson)
    }

    /// Validate and append a status row. Returns the assigned sequence.
    ///
    /// The pair's history, with the new row placed last among rows sharing
    /// its timestamp, must follow the enrollment lifecycle.
    pub fn record_status<S>(store: &mut S, row: StatusRow) -> Result<u64, CourseGateError>
    where
        S: ContentStore + StatusStore + ?Sized,
    {
        if row.user.is_anonymous() {
            return Err(CourseGateError::InvalidRecord(
                "status rows require a signed-in user".to_string(),
            ));
        }
        if store.course(row.course)?.is_none() {
            return Err(CourseGateError::NotFound(EntityKey::course(row.course)));
        }

        let mut history = store.status_rows(row.course, row.user)?;
        history.sort_by_key(StatusRow::recency);
        let at = history.partition_point(|r| r.updated_at <= row.updated_at);
        history.insert(at, row.clone());

        let mut previous = EnrollmentStatus::NotEnrolled;
        for step in &history {
            if !transition_allowed(previous, step.status) {
                return Err(CourseGateError::InvalidTransition {
                    from: previous,
                    to: step.status,
                });
            }
            previous = step.status;
        }

        store.append_status(row)
    }

    /// Validate and store a completion record.
    ///
    /// Returns `false` without writing when the entity is already complete
    /// for this learner.
    pub fn record_completion<S>(
        store: &mut S,
        record: CompletionRecord,
    ) -> Result<bool, CourseGateError>
    where
        S: ContentStore + StatusStore + ?Sized,
    {
        if record.user.is_anonymous() {
            return Err(CourseGateError::InvalidRecord(
                "completion records require a signed-in user".to_string(),
            ));
        }

        let id = record.entity.id;
        let exists = match record.entity.kind {
            EntityKind::Course => store.course(id)?.is_some(),
            EntityKind::Section => store.section(id)?.is_some(),
            EntityKind::Lesson => store.lesson(id)?.is_some(),
            // Tracks have no content records of their own.
            EntityKind::Track => true,
        };
        if !exists {
            return Err(CourseGateError::NotFound(record.entity));
        }

        if store
            .completion(record.entity, record.user)?
            .is_some_and(|c| c.is_complete)
        {
            tracing::debug!(entity = %record.entity, user = record.user.0, "already complete");
            return Ok(false);
        }

        store.put_completion(record)?;
        Ok(true)
    }

    /// Ingest a whole dataset.
    ///
    /// Content goes first (courses, sections, lessons), then status rows in
    /// timestamp order (stable for ties), then completions. Stops at the
    /// first invalid record; records before it stay written.
    pub fn ingest_dataset<S>(
        store: &mut S,
        dataset: &Dataset,
    ) -> Result<IngestReport, CourseGateError>
    where
        S: ContentStore + StatusStore + ?Sized,
    {
        if dataset.record_count() > MAX_DATASET_RECORDS {
            return Err(CourseGateError::InvalidRecord(format!(
                "dataset holds {} records, limit is {MAX_DATASET_RECORDS}",
                dataset.record_count()
            )));
        }

        let mut report = IngestReport::default();

        for meta in &dataset.courses {
            Self::ingest_course(store, meta.scrub())?;
            report.courses += 1;
        }
        for section in &dataset.sections {
            Self::ingest_section(store, section.clone())?;
            report.sections += 1;
        }
        for lesson in &dataset.lessons {
            Self::ingest_lesson(store, lesson.clone())?;
            report.lessons += 1;
        }

        let mut rows: Vec<&StatusRow> = dataset.enrollments.iter().collect();
        rows.sort_by_key(|r| r.updated_at);
        for row in rows {
            Self::record_status(store, row.clone())?;
            report.status_rows += 1;
        }

        for record in &dataset.completions {
            if Self::record_completion(store, record.clone())? {
                report.completions += 1;
            } else {
                report.completions_unchanged += 1;
            }
        }

        tracing::info!(
            courses = report.courses,
            sections = report.sections,
            lessons = report.lessons,
            status_rows = report.status_rows,
            completions = report.completions,
            "dataset ingested"
        );
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
