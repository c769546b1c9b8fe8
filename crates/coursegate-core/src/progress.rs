//! # Progress Aggregator
//!
//! Walks a course's content tree in syllabus order and joins it with the
//! learner's completion records.
//!
//! A learner without enrollment history still gets the full structure, with
//! every completion flag false. Missing completion records mean incomplete.

use crate::enrollment::EnrollmentResolver;
use crate::primitives::PERCENT_SCALE;
use crate::store::{ContentStore, StatusStore};
use crate::{
    ContentTree, CourseGateError, EnrollmentStatus, EntityId, EntityKey, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

/// Completion of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub id: EntityId,
    pub title: String,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_date: Option<Timestamp>,
}

/// Completion of one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: EntityId,
    pub title: String,
    pub parent_section: EntityId,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_date: Option<Timestamp>,
}

/// A learner's progress through one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub course: EntityId,
    pub user: UserId,
    /// Enrolled or expired.
    pub is_enrolled: bool,
    pub status: EnrollmentStatus,
    pub enrollment_date: Option<Timestamp>,
    pub is_complete: bool,
    pub completed_date: Option<Timestamp>,
    /// Sections in syllabus order.
    pub sections: Vec<SectionProgress>,
    /// Lessons in syllabus order.
    pub lessons: Vec<LessonProgress>,
}

impl ProgressSnapshot {
    /// Number of completed lessons.
    #[must_use]
    pub fn completed_lesson_count(&self) -> usize {
        self.lessons.iter().filter(|l| l.is_complete).count()
    }

    /// Completed lessons as an integer percentage, rounded down. An empty
    /// course is 0%.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        let total = self.lessons.len();
        if total == 0 {
            return 0;
        }
        let pct = self.completed_lesson_count() * PERCENT_SCALE / total;
        u8::try_from(pct).unwrap_or(u8::MAX)
    }

    /// First lesson in syllabus order that is not complete.
    #[must_use]
    pub fn next_incomplete_lesson(&self) -> Option<EntityId> {
        self.lessons.iter().find(|l| !l.is_complete).map(|l| l.id)
    }
}

/// Builds [`ProgressSnapshot`]s from a store.
#[derive(Debug)]
pub struct ProgressAggregator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: StatusStore + ?Sized> ProgressAggregator<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Completion flag and date of one entity; incomplete when no record.
    fn completion_of(
        &self,
        entity: EntityKey,
        user: UserId,
    ) -> Result<(bool, Option<Timestamp>), CourseGateError> {
        Ok(match self.store.completion(entity, user)? {
            Some(record) if record.is_complete => (true, record.completed_date),
            _ => (false, None),
        })
    }

    /// Snapshot of an already fetched tree.
    pub fn snapshot(
        &self,
        tree: &ContentTree,
        user: UserId,
    ) -> Result<ProgressSnapshot, CourseGateError> {
        let course = tree.course.id;
        let resolver = EnrollmentResolver::new(self.store);
        let status = resolver.get_status(course, user)?;
        let is_enrolled = status.was_enrolled();
        let enrollment_date = if is_enrolled {
            resolver.enrollment_date(course, user)?
        } else {
            None
        };

        let read = |entity: EntityKey| -> Result<(bool, Option<Timestamp>), CourseGateError> {
            if is_enrolled {
                self.completion_of(entity, user)
            } else {
                Ok((false, None))
            }
        };

        let (is_complete, completed_date) = read(EntityKey::course(course))?;

        let mut sections = Vec::with_capacity(tree.sections.len());
        let mut lessons = Vec::with_capacity(tree.lesson_count());
        for node in &tree.sections {
            let (is_complete, completed_date) = read(EntityKey::section(node.section.id))?;
            sections.push(SectionProgress {
                id: node.section.id,
                title: node.section.title.clone(),
                is_complete,
                completed_date,
            });

            for lesson in node.lessons.iter().filter(|l| l.section == node.section.id) {
                let (is_complete, completed_date) = read(EntityKey::lesson(lesson.id))?;
                lessons.push(LessonProgress {
                    id: lesson.id,
                    title: lesson.title.clone(),
                    parent_section: node.section.id,
                    is_complete,
                    completed_date,
                });
            }
        }

        Ok(ProgressSnapshot {
            course,
            user,
            is_enrolled,
            status,
            enrollment_date,
            is_complete,
            completed_date,
            sections,
            lessons,
        })
    }
}

impl<S: ContentStore + StatusStore + ?Sized> ProgressAggregator<'_, S> {
    /// Progress of `user` through `course`, or `None` if the course does not
    /// exist. The tree is fetched in a single call.
    pub fn compute_progress(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Option<ProgressSnapshot>, CourseGateError> {
        let Some(tree) = self.store.tree(course)? else {
            return Ok(None);
        };
        self.snapshot(&tree, user).map(Some)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{CompletionRecord, Course, Lesson, Section, StatusRow};

    const COURSE: EntityId = EntityId(1);
    const LEARNER: UserId = UserId(7);

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.put_course(Course::new(COURSE, "Course")).expect("put");
        store
            .put_section(Section::new(EntityId(10), COURSE, "One", 1))
            .expect("put");
        store
            .put_section(Section::new(EntityId(20), COURSE, "Two", 2))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(102), EntityId(10), "b", 2))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(101), EntityId(10), "a", 1))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(201), EntityId(20), "c", 1))
            .expect("put");
        store
    }

    fn complete(store: &mut MemoryStore, entity: EntityKey, at: i64) {
        store
            .put_completion(CompletionRecord::complete(
                entity,
                LEARNER,
                Timestamp::from_unix(at),
            ))
            .expect("put");
    }

    fn enroll(store: &mut MemoryStore) {
        store
            .append_status(StatusRow::new(
                COURSE,
                LEARNER,
                EnrollmentStatus::Enrolled,
                Timestamp::from_unix(5),
            ))
            .expect("append");
    }

    #[test]
    fn missing_course_yields_none() {
        let store = MemoryStore::new();
        let progress = ProgressAggregator::new(&store)
            .compute_progress(COURSE, LEARNER)
            .expect("progress");
        assert!(progress.is_none());
    }

    #[test]
    fn not_enrolled_learner_sees_structure_without_completion() {
        let mut store = store();
        complete(&mut store, EntityKey::lesson(EntityId(101)), 10);

        let snapshot = ProgressAggregator::new(&store)
            .compute_progress(COURSE, LEARNER)
            .expect("progress")
            .expect("course exists");

        assert!(!snapshot.is_enrolled);
        assert_eq!(snapshot.sections.len(), 2);
        assert_eq!(snapshot.lessons.len(), 3);
        assert!(snapshot.lessons.iter().all(|l| !l.is_complete));
        assert_eq!(snapshot.percent_complete(), 0);
    }

    #[test]
    fn lessons_follow_syllabus_order() {
        let mut store = store();
        enroll(&mut store);
        complete(&mut store, EntityKey::lesson(EntityId(101)), 10);
        complete(&mut store, EntityKey::section(EntityId(10)), 11);

        let snapshot = ProgressAggregator::new(&store)
            .compute_progress(COURSE, LEARNER)
            .expect("progress")
            .expect("course exists");

        let ids: Vec<EntityId> = snapshot.lessons.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![EntityId(101), EntityId(102), EntityId(201)]);
        assert_eq!(snapshot.lessons[0].parent_section, EntityId(10));
        assert!(snapshot.lessons[0].is_complete);
        assert_eq!(
            snapshot.lessons[0].completed_date,
            Some(Timestamp::from_unix(10))
        );
        assert!(snapshot.sections[0].is_complete);
        assert!(!snapshot.sections[1].is_complete);
        assert_eq!(snapshot.percent_complete(), 33);
        assert_eq!(snapshot.next_incomplete_lesson(), Some(EntityId(102)));
        assert_eq!(snapshot.enrollment_date, Some(Timestamp::from_unix(5)));
    }

    #[test]
    fn expired_learner_keeps_progress() {
        let mut store = store();
        enroll(&mut store);
        store
            .append_status(StatusRow::new(
                COURSE,
                LEARNER,
                EnrollmentStatus::Expired,
                Timestamp::from_unix(50),
            ))
            .expect("append");
        complete(&mut store, EntityKey::lesson(EntityId(201)), 20);

        let snapshot = ProgressAggregator::new(&store)
            .compute_progress(COURSE, LEARNER)
            .expect("progress")
            .expect("course exists");

        assert!(snapshot.is_enrolled);
        assert_eq!(snapshot.status, EnrollmentStatus::Expired);
        assert_eq!(snapshot.completed_lesson_count(), 1);
    }

    #[test]
    fn course_completion_is_reported() {
        let mut store = store();
        enroll(&mut store);
        for (i, lesson) in [101, 102, 201].into_iter().enumerate() {
            complete(&mut store, EntityKey::lesson(EntityId(lesson)), i as i64);
        }
        complete(&mut store, EntityKey::course(COURSE), 99);

        let snapshot = ProgressAggregator::new(&store)
            .compute_progress(COURSE, LEARNER)
            .expect("progress")
            .expect("course exists");

        assert!(snapshot.is_complete);
        assert_eq!(snapshot.completed_date, Some(Timestamp::from_unix(99)));
        assert_eq!(snapshot.percent_complete(), 100);
        assert_eq!(snapshot.next_incomplete_lesson(), None);
    }

    #[test]
    fn empty_course_is_zero_percent() {
        let mut store = MemoryStore::new();
        store.put_course(Course::new(COURSE, "Empty")).expect("put");
        enroll(&mut store);

        let snapshot = ProgressAggregator::new(&store)
            .compute_progress(COURSE, LEARNER)
            .expect("progress")
            .expect("course exists");
        assert_eq!(snapshot.percent_complete(), 0);
        assert!(snapshot.sections.is_empty());
    }
}
