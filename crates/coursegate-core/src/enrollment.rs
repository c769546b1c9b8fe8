//! # Enrollment Resolver
//!
//! Derives a learner's enrollment from raw, append-only status rows.
//!
//! ## Recency
//!
//! A pair may carry any number of rows. The row with the greatest
//! `updated_at` decides; rows sharing a timestamp are ordered by their
//! storage sequence number. Storage iteration order is never consulted.
//!
//! ## Fail-closed
//!
//! The anonymous user and pairs without rows resolve to
//! [`EnrollmentStatus::NotEnrolled`] without touching the store.

use crate::store::StatusStore;
use crate::{
    CourseGateError, EnrollmentRecord, EnrollmentStatus, EntityId, EntityKey, StatusRow,
    Timestamp, UserId,
};
use std::collections::BTreeMap;

/// Read-only enrollment queries over a [`StatusStore`].
#[derive(Debug)]
pub struct EnrollmentResolver<'a, S: StatusStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: StatusStore + ?Sized> EnrollmentResolver<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The deciding row of a pair, if any.
    pub fn latest_row(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Option<StatusRow>, CourseGateError> {
        if user.is_anonymous() {
            return Ok(None);
        }
        Ok(self
            .store
            .status_rows(course, user)?
            .into_iter()
            .max_by_key(StatusRow::recency))
    }

    /// Current status of a pair.
    pub fn get_status(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<EnrollmentStatus, CourseGateError> {
        Ok(self
            .latest_row(course, user)?
            .map(|row| row.status)
            .unwrap_or_default())
    }

    /// True iff the current status is exactly `enrolled`.
    pub fn is_enrolled(&self, course: EntityId, user: UserId) -> Result<bool, CourseGateError> {
        Ok(self.get_status(course, user)? == EnrollmentStatus::Enrolled)
    }

    /// True if the learner is enrolled or was enrolled before expiry.
    pub fn has_enrollment_history(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<bool, CourseGateError> {
        Ok(self.get_status(course, user)?.was_enrolled())
    }

    /// Date of the most recent transition into `enrolled`.
    ///
    /// A row counts as a transition when the row before it (in recency
    /// order) was not `enrolled`. Re-affirming rows do not move the date.
    pub fn enrollment_date(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Option<Timestamp>, CourseGateError> {
        if user.is_anonymous() {
            return Ok(None);
        }
        let mut rows = self.store.status_rows(course, user)?;
        rows.sort_by_key(StatusRow::recency);

        let mut previous = EnrollmentStatus::NotEnrolled;
        let mut date = None;
        for row in rows {
            if row.status == EnrollmentStatus::Enrolled && previous != EnrollmentStatus::Enrolled {
                date = Some(row.updated_at);
            }
            previous = row.status;
        }
        Ok(date)
    }

    /// The full resolved record of a pair, including the course completion
    /// date when the learner has completed the course.
    pub fn record(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<EnrollmentRecord, CourseGateError> {
        if user.is_anonymous() {
            return Ok(EnrollmentRecord::none(course, user));
        }
        let completion_date = self
            .store
            .completion(EntityKey::course(course), user)?
            .filter(|c| c.is_complete)
            .and_then(|c| c.completed_date);

        Ok(EnrollmentRecord {
            course,
            user,
            status: self.get_status(course, user)?,
            enrollment_date: self.enrollment_date(course, user)?,
            completion_date,
        })
    }

    /// Learners whose current status is `enrolled`, ascending by id.
    pub fn enrolled_users(&self, course: EntityId) -> Result<Vec<UserId>, CourseGateError> {
        let mut latest: BTreeMap<UserId, StatusRow> = BTreeMap::new();
        for row in self.store.status_rows_for_course(course)? {
            if row.user.is_anonymous() {
                continue;
            }
            match latest.get(&row.user) {
                Some(current) if current.recency() >= row.recency() => {}
                _ => {
                    latest.insert(row.user, row);
                }
            }
        }
        Ok(latest
            .into_iter()
            .filter(|(_, row)| row.status == EnrollmentStatus::Enrolled)
            .map(|(user, _)| user)
            .collect())
    }

    /// Number of distinct learners currently enrolled. Expired learners do
    /// not occupy a seat.
    pub fn count_enrolled(&self, course: EntityId) -> Result<usize, CourseGateError> {
        Ok(self.enrolled_users(course)?.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::CompletionRecord;

    const COURSE: EntityId = EntityId(1);

    fn append(store: &mut MemoryStore, user: u64, status: EnrollmentStatus, at: i64) {
        store
            .append_status(StatusRow::new(
                COURSE,
                UserId(user),
                status,
                Timestamp::from_unix(at),
            ))
            .expect("append");
    }

    #[test]
    fn no_rows_is_not_enrolled() {
        let store = MemoryStore::new();
        let resolver = EnrollmentResolver::new(&store);
        assert_eq!(
            resolver.get_status(COURSE, UserId(1)).expect("status"),
            EnrollmentStatus::NotEnrolled
        );
        assert!(!resolver.is_enrolled(COURSE, UserId(1)).expect("enrolled"));
    }

    #[test]
    fn later_timestamp_wins_regardless_of_append_order() {
        let mut store = MemoryStore::new();
        append(&mut store, 1, EnrollmentStatus::Expired, 200);
        append(&mut store, 1, EnrollmentStatus::Enrolled, 100);

        let resolver = EnrollmentResolver::new(&store);
        assert_eq!(
            resolver.get_status(COURSE, UserId(1)).expect("status"),
            EnrollmentStatus::Expired
        );
        assert!(
            resolver
                .has_enrollment_history(COURSE, UserId(1))
                .expect("history")
        );
    }

    #[test]
    fn equal_timestamps_break_ties_by_sequence() {
        let mut store = MemoryStore::new();
        append(&mut store, 1, EnrollmentStatus::Enrolled, 100);
        append(&mut store, 1, EnrollmentStatus::Expired, 100);

        let resolver = EnrollmentResolver::new(&store);
        assert_eq!(
            resolver.get_status(COURSE, UserId(1)).expect("status"),
            EnrollmentStatus::Expired
        );
    }

    #[test]
    fn anonymous_is_never_enrolled() {
        let mut store = MemoryStore::new();
        append(&mut store, 0, EnrollmentStatus::Enrolled, 100);

        let resolver = EnrollmentResolver::new(&store);
        assert!(!resolver.is_enrolled(COURSE, UserId::ANONYMOUS).expect("enrolled"));
        assert_eq!(resolver.count_enrolled(COURSE).expect("count"), 0);
    }

    #[test]
    fn enrollment_date_tracks_latest_transition_into_enrolled() {
        let mut store = MemoryStore::new();
        append(&mut store, 1, EnrollmentStatus::Enrolled, 100);
        append(&mut store, 1, EnrollmentStatus::Enrolled, 150);
        append(&mut store, 1, EnrollmentStatus::Expired, 200);
        append(&mut store, 1, EnrollmentStatus::Enrolled, 300);
        append(&mut store, 1, EnrollmentStatus::Enrolled, 400);

        let resolver = EnrollmentResolver::new(&store);
        assert_eq!(
            resolver.enrollment_date(COURSE, UserId(1)).expect("date"),
            Some(Timestamp::from_unix(300))
        );
    }

    #[test]
    fn enrollment_date_survives_expiry() {
        let mut store = MemoryStore::new();
        append(&mut store, 1, EnrollmentStatus::Enrolled, 100);
        append(&mut store, 1, EnrollmentStatus::Expired, 200);

        let resolver = EnrollmentResolver::new(&store);
        assert_eq!(
            resolver.enrollment_date(COURSE, UserId(1)).expect("date"),
            Some(Timestamp::from_unix(100))
        );
    }

    #[test]
    fn count_ignores_expired_and_counts_users_once() {
        let mut store = MemoryStore::new();
        append(&mut store, 1, EnrollmentStatus::Enrolled, 100);
        append(&mut store, 1, EnrollmentStatus::Enrolled, 110);
        append(&mut store, 2, EnrollmentStatus::Enrolled, 100);
        append(&mut store, 3, EnrollmentStatus::Enrolled, 100);
        append(&mut store, 3, EnrollmentStatus::Expired, 120);

        let resolver = EnrollmentResolver::new(&store);
        assert_eq!(resolver.count_enrolled(COURSE).expect("count"), 2);
        assert_eq!(
            resolver.enrolled_users(COURSE).expect("users"),
            vec![UserId(1), UserId(2)]
        );
    }

    #[test]
    fn record_carries_course_completion_date() {
        let mut store = MemoryStore::new();
        append(&mut store, 1, EnrollmentStatus::Enrolled, 100);
        store
            .put_completion(CompletionRecord::complete(
                EntityKey::course(COURSE),
                UserId(1),
                Timestamp::from_unix(500),
            ))
            .expect("put");

        let record = EnrollmentResolver::new(&store)
            .record(COURSE, UserId(1))
            .expect("record");
        assert_eq!(record.status, EnrollmentStatus::Enrolled);
        assert_eq!(record.enrollment_date, Some(Timestamp::from_unix(100)));
        assert_eq!(record.completion_date, Some(Timestamp::from_unix(500)));
    }
}
