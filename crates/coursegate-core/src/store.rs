//! # Record Stores
//!
//! The collaborator interfaces the evaluator reads through, plus the
//! deterministic in-memory implementation.
//!
//! - [`ContentStore`]: courses and their section/lesson tree
//! - [`StatusStore`]: enrollment status rows and completion records
//!
//! All fallible operations return `Result<T, CourseGateError>` so in-memory
//! and persistent backends can be used uniformly. A missing entity is
//! `Ok(None)`, never an error.

use crate::{
    CompletionRecord, ContentTree, Course, CourseGateError, EntityId, EntityKey, Lesson, Section,
    StatusRow, UserId,
};
use std::collections::BTreeMap;

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Read/write access to the content tree.
pub trait ContentStore {
    /// Look up a course by id.
    fn course(&self, id: EntityId) -> Result<Option<Course>, CourseGateError>;

    /// Look up a section by id.
    fn section(&self, id: EntityId) -> Result<Option<Section>, CourseGateError>;

    /// Look up a lesson by id.
    fn lesson(&self, id: EntityId) -> Result<Option<Lesson>, CourseGateError>;

    /// Fetch a course and its entire ordered syllabus in one call.
    fn tree(&self, id: EntityId) -> Result<Option<ContentTree>, CourseGateError>;

    /// All courses in id order.
    fn courses(&self) -> Result<Vec<Course>, CourseGateError>;

    /// All sections in id order.
    fn sections(&self) -> Result<Vec<Section>, CourseGateError>;

    /// All lessons in id order.
    fn lessons(&self) -> Result<Vec<Lesson>, CourseGateError>;

    /// Insert or replace a course.
    fn put_course(&mut self, course: Course) -> Result<(), CourseGateError>;

    /// Insert or replace a section.
    fn put_section(&mut self, section: Section) -> Result<(), CourseGateError>;

    /// Insert or replace a lesson.
    fn put_lesson(&mut self, lesson: Lesson) -> Result<(), CourseGateError>;
}

/// Read/append access to enrollment and completion facts.
pub trait StatusStore {
    /// Every status row of one `(course, user)` pair, in unspecified order.
    fn status_rows(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Vec<StatusRow>, CourseGateError>;

    /// Every status row of one course, in unspecified order.
    fn status_rows_for_course(&self, course: EntityId) -> Result<Vec<StatusRow>, CourseGateError>;

    /// Every status row in the store.
    fn all_status_rows(&self) -> Result<Vec<StatusRow>, CourseGateError>;

    /// Completion record of one entity for one user.
    fn completion(
        &self,
        entity: EntityKey,
        user: UserId,
    ) -> Result<Option<CompletionRecord>, CourseGateError>;

    /// Every completion record in the store.
    fn completions(&self) -> Result<Vec<CompletionRecord>, CourseGateError>;

    /// Append a status row. The store assigns and returns its `seq`.
    fn append_status(&mut self, row: StatusRow) -> Result<u64, CourseGateError>;

    /// Insert or replace a completion record.
    fn put_completion(&mut self, record: CompletionRecord) -> Result<(), CourseGateError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// In-memory store.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    courses: BTreeMap<EntityId, Course>,
    sections: BTreeMap<EntityId, Section>,
    lessons: BTreeMap<EntityId, Lesson>,
    /// Status rows keyed by `(course, user)`, append order preserved.
    status: BTreeMap<(EntityId, UserId), Vec<StatusRow>>,
    completions: BTreeMap<(EntityKey, UserId), CompletionRecord>,
    /// Next sequence number handed out by `append_status`.
    next_seq: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored status rows.
    #[must_use]
    pub fn status_row_count(&self) -> usize {
        self.status.values().map(Vec::len).sum()
    }
}

impl ContentStore for MemoryStore {
    fn course(&self, id: EntityId) -> Result<Option<Course>, CourseGateError> {
        Ok(self.courses.get(&id).cloned())
    }

    fn section(&self, id: EntityId) -> Result<Option<Section>, CourseGateError> {
        Ok(self.sections.get(&id).cloned())
    }

    fn lesson(&self, id: EntityId) -> Result<Option<Lesson>, CourseGateError> {
        Ok(self.lessons.get(&id).cloned())
    }

    fn tree(&self, id: EntityId) -> Result<Option<ContentTree>, CourseGateError> {
        let Some(course) = self.courses.get(&id).cloned() else {
            return Ok(None);
        };
        let sections: Vec<Section> = self
            .sections
            .values()
            .filter(|s| s.course == id)
            .cloned()
            .collect();
        let lessons: Vec<Lesson> = self
            .lessons
            .values()
            .filter(|l| sections.iter().any(|s| s.id == l.section))
            .cloned()
            .collect();
        Ok(Some(ContentTree::assemble(course, sections, lessons)))
    }

    fn courses(&self) -> Result<Vec<Course>, CourseGateError> {
        Ok(self.courses.values().cloned().collect())
    }

    fn sections(&self) -> Result<Vec<Section>, CourseGateError> {
        Ok(self.sections.values().cloned().collect())
    }

    fn lessons(&self) -> Result<Vec<Lesson>, CourseGateError> {
        Ok(self.lessons.values().cloned().collect())
    }

    fn put_course(&mut self, course: Course) -> Result<(), CourseGateError> {
        self.courses.insert(course.id, course);
        Ok(())
    }

    fn put_section(&mut self, section: Section) -> Result<(), CourseGateError> {
        self.sections.insert(section.id, section);
        Ok(())
    }

    fn put_lesson(&mut self, lesson: Lesson) -> Result<(), CourseGateError> {
        self.lessons.insert(lesson.id, lesson);
        Ok(())
    }
}

impl StatusStore for MemoryStore {
    fn status_rows(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Vec<StatusRow>, CourseGateError> {
        Ok(self.status.get(&(course, user)).cloned().unwrap_or_default())
    }

    fn status_rows_for_course(&self, course: EntityId) -> Result<Vec<StatusRow>, CourseGateError> {
        Ok(self
            .status
            .range((course, UserId(0))..=(course, UserId(u64::MAX)))
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect())
    }

    fn all_status_rows(&self) -> Result<Vec<StatusRow>, CourseGateError> {
        let mut rows: Vec<StatusRow> = self.status.values().flatten().cloned().collect();
        rows.sort_by_key(|r| r.seq);
        Ok(rows)
    }

    fn completion(
        &self,
        entity: EntityKey,
        user: UserId,
    ) -> Result<Option<CompletionRecord>, CourseGateError> {
        Ok(self.completions.get(&(entity, user)).cloned())
    }

    fn completions(&self) -> Result<Vec<CompletionRecord>, CourseGateError> {
        Ok(self.completions.values().cloned().collect())
    }

    fn append_status(&mut self, mut row: StatusRow) -> Result<u64, CourseGateError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        row.seq = seq;
        self.status.entry((row.course, row.user)).or_default().push(row);
        Ok(seq)
    }

    fn put_completion(&mut self, record: CompletionRecord) -> Result<(), CourseGateError> {
        self.completions.insert((record.entity, record.user), record);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnrollmentStatus, Timestamp};

    #[test]
    fn tree_of_missing_course_is_none() {
        let store = MemoryStore::new();
        assert!(store.tree(EntityId(1)).expect("tree").is_none());
    }

    #[test]
    fn tree_collects_only_own_sections() {
        let mut store = MemoryStore::new();
        store
            .put_course(Course::new(EntityId(1), "a"))
            .expect("put");
        store
            .put_course(Course::new(EntityId(2), "b"))
            .expect("put");
        store
            .put_section(Section::new(EntityId(10), EntityId(1), "s", 1))
            .expect("put");
        store
            .put_section(Section::new(EntityId(20), EntityId(2), "s", 1))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(100), EntityId(10), "l", 1))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(200), EntityId(20), "l", 1))
            .expect("put");

        let tree = store.tree(EntityId(1)).expect("tree").expect("exists");
        assert_eq!(tree.section_ids(), vec![EntityId(10)]);
        assert_eq!(tree.lesson_ids(), vec![EntityId(100)]);
    }

    #[test]
    fn append_assigns_increasing_seq() {
        let mut store = MemoryStore::new();
        let ts = Timestamp::from_unix(100);
        let a = store
            .append_status(StatusRow::new(
                EntityId(1),
                UserId(1),
                EnrollmentStatus::Enrolled,
                ts,
            ))
            .expect("append");
        let b = store
            .append_status(StatusRow::new(
                EntityId(1),
                UserId(2),
                EnrollmentStatus::Enrolled,
                ts,
            ))
            .expect("append");
        assert!(b > a);
        assert_eq!(store.status_row_count(), 2);
        assert_eq!(
            store
                .status_rows_for_course(EntityId(1))
                .expect("rows")
                .len(),
            2
        );
        assert!(
            store
                .status_rows_for_course(EntityId(2))
                .expect("rows")
                .is_empty()
        );
    }
}
