//! # Dataset
//!
//! The complete, storage-independent record set: course configuration as
//! stored, the content tree, and every learner fact.
//!
//! A dataset is what `load` ingests and what `export` writes. Record order
//! is canonical (ids ascending, status rows by sequence) so two exports of
//! the same store are byte-identical.

use crate::store::{ContentStore, StatusStore};
use crate::{CompletionRecord, CourseGateError, CourseMeta, Lesson, Section, StatusRow};
use serde::{Deserialize, Serialize};

/// A full record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub courses: Vec<CourseMeta>,
    pub sections: Vec<Section>,
    pub lessons: Vec<Lesson>,
    /// Status rows in append order.
    pub enrollments: Vec<StatusRow>,
    pub completions: Vec<CompletionRecord>,
}

impl Dataset {
    /// Read every record out of a store.
    pub fn from_store<S>(store: &S) -> Result<Self, CourseGateError>
    where
        S: ContentStore + StatusStore + ?Sized,
    {
        Ok(Self {
            courses: store.courses()?.iter().map(CourseMeta::from).collect(),
            sections: store.sections()?,
            lessons: store.lessons()?,
            enrollments: store.all_status_rows()?,
            completions: store.completions()?,
        })
    }

    /// Total number of records of every kind.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.courses.len()
            + self.sections.len()
            + self.lessons.len()
            + self.enrollments.len()
            + self.completions.len()
    }

    /// Check whether the dataset holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Course, EnrollmentStatus, EntityId, EntityKey, MemoryStore, Timestamp, UserId,
    };

    #[test]
    fn from_store_collects_everything_in_canonical_order() {
        let mut store = MemoryStore::new();
        store
            .put_course(Course::new(EntityId(2), "b"))
            .expect("put");
        store
            .put_course(Course::new(EntityId(1), "a"))
            .expect("put");
        store
            .put_section(Section::new(EntityId(10), EntityId(1), "s", 1))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(100), EntityId(10), "l", 1))
            .expect("put");
        store
            .append_status(StatusRow::new(
                EntityId(2),
                UserId(9),
                EnrollmentStatus::Enrolled,
                Timestamp::from_unix(1),
            ))
            .expect("append");
        store
            .append_status(StatusRow::new(
                EntityId(1),
                UserId(3),
                EnrollmentStatus::Enrolled,
                Timestamp::from_unix(2),
            ))
            .expect("append");
        store
            .put_completion(CompletionRecord::complete(
                EntityKey::lesson(EntityId(100)),
                UserId(3),
                Timestamp::from_unix(3),
            ))
            .expect("put");

        let dataset = Dataset::from_store(&store).expect("dataset");

        assert_eq!(dataset.courses.len(), 2);
        assert_eq!(dataset.sections.len(), 1);
        assert_eq!(dataset.lessons.len(), 1);
        assert_eq!(dataset.enrollments.len(), 2);
        assert_eq!(dataset.completions.len(), 1);
        assert_eq!(dataset.record_count(), 7);
        assert!(!dataset.is_empty());
        assert_eq!(dataset.courses[0].id, 1);
        assert_eq!(dataset.courses[1].id, 2);
        let seqs: Vec<u64> = dataset.enrollments.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn empty_store_gives_empty_dataset() {
        let dataset = Dataset::from_store(&MemoryStore::new()).expect("dataset");
        assert!(dataset.is_empty());
    }
}
