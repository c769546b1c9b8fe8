//! # Catalog Metrics
//!
//! Counts over everything a store holds. Integer arithmetic only: averages
//! are reported in thousandths.

use crate::enrollment::EnrollmentResolver;
use crate::store::{ContentStore, StatusStore};
use crate::CourseGateError;
use serde::{Deserialize, Serialize};

/// Metrics extracted from a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMetrics {
    pub course_count: usize,
    pub section_count: usize,
    pub lesson_count: usize,
    /// Raw status rows, including superseded ones.
    pub status_row_count: usize,
    /// Distinct `(course, user)` pairs whose current status is `enrolled`.
    pub active_enrollment_count: usize,
    /// Completion records marked complete.
    pub completion_count: usize,
    /// Lessons per course, times 1000 (0 if no courses).
    pub lessons_per_course_thousandths: u64,
}

impl CatalogMetrics {
    /// Metrics of an empty store.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute metrics from a store.
    pub fn from_store<S>(store: &S) -> Result<Self, CourseGateError>
    where
        S: ContentStore + StatusStore + ?Sized,
    {
        let courses = store.courses()?;
        let course_count = courses.len();
        let section_count = store.sections()?.len();
        let lesson_count = store.lessons()?.len();
        let status_row_count = store.all_status_rows()?.len();
        let completion_count = store
            .completions()?
            .iter()
            .filter(|c| c.is_complete)
            .count();

        let resolver = EnrollmentResolver::new(store);
        let mut active_enrollment_count = 0usize;
        for course in &courses {
            active_enrollment_count += resolver.count_enrolled(course.id)?;
        }

        let lessons_per_course_thousandths = if course_count > 0 {
            (lesson_count as u64).saturating_mul(1000) / (course_count as u64)
        } else {
            0
        };

        Ok(Self {
            course_count,
            section_count,
            lesson_count,
            status_row_count,
            active_enrollment_count,
            completion_count,
            lessons_per_course_thousandths,
        })
    }
}
