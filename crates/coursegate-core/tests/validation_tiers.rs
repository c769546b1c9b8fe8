//! # Validation Tier Tests (T0-T4)
//!
//! If ANY tier fails, the evaluator is INVALID.
//!
//! ## Tiers
//! - T0: Record Integrity
//! - T1: Enrollment Resolution
//! - T2: Access Gating
//! - T3: Progress Aggregation
//! - T4: Persistence Parity

use coursegate_core::{
    CompletionRecord, Course, CourseGateError, CourseMeta, Dataset, EnrollmentStatus, EntityId,
    EntityKey, Evaluator, FixedClock, Lesson, Section, StatusRow, Timestamp, UserId,
};

fn date(year: i32, month: u32, day: u32) -> Timestamp {
    Timestamp::from_ymd(year, month, day).expect("valid date")
}

const COURSE: EntityId = EntityId(1);
const LEARNER: UserId = UserId(42);

/// Course C: open 2024-01-01 to 2024-06-01, no enrollment window, no
/// capacity, with one section of two lessons.
fn course_c() -> Evaluator {
    let mut eval = Evaluator::new();
    eval.put_course(
        Course::new(COURSE, "Course C")
            .with_time_period(Some(date(2024, 1, 1)), Some(date(2024, 6, 1))),
    )
    .expect("course");
    eval.put_section(Section::new(EntityId(10), COURSE, "Week 1", 1))
        .expect("section");
    eval.put_lesson(Lesson::new(EntityId(100), EntityId(10), "Hello", 1))
        .expect("lesson");
    eval.put_lesson(Lesson::new(EntityId(101), EntityId(10), "World", 2))
        .expect("lesson");
    eval
}

fn enroll(eval: &mut Evaluator, user: UserId, status: EnrollmentStatus, at: Timestamp) {
    eval.record_status(StatusRow::new(COURSE, user, status, at))
        .expect("status");
}

// =============================================================================
// TIER T0: RECORD INTEGRITY
// =============================================================================

mod t0_record_integrity {
    use super::*;

    /// T0.1: Lessons must hang off an existing section.
    #[test]
    fn dangling_lesson_rejected() {
        let mut eval = course_c();
        let result = eval.put_lesson(Lesson::new(EntityId(200), EntityId(99), "x", 1));
        assert!(matches!(result, Err(CourseGateError::NotFound(_))));
    }

    /// T0.2: Expiry requires a prior enrollment.
    #[test]
    fn expiry_without_enrollment_rejected() {
        let mut eval = course_c();
        let result = eval.record_status(StatusRow::new(
            COURSE,
            LEARNER,
            EnrollmentStatus::Expired,
            date(2024, 2, 1),
        ));
        assert!(matches!(
            result,
            Err(CourseGateError::InvalidTransition {
                from: EnrollmentStatus::NotEnrolled,
                to: EnrollmentStatus::Expired,
            })
        ));
    }

    /// T0.3: Completion never regresses.
    #[test]
    fn completion_monotonic() {
        let mut eval = course_c();
        let key = EntityKey::lesson(EntityId(100));
        assert!(
            eval.record_completion(CompletionRecord::complete(key, LEARNER, date(2024, 2, 1)))
                .expect("first")
        );
        let regress = CompletionRecord {
            entity: key,
            user: LEARNER,
            is_complete: false,
            completed_date: None,
        };
        assert!(!eval.record_completion(regress).expect("second"));
    }

    /// T0.4: Status rows are append-only.
    #[test]
    fn status_rows_accumulate() {
        let mut eval = course_c();
        enroll(&mut eval, LEARNER, EnrollmentStatus::Enrolled, date(2024, 1, 10));
        enroll(&mut eval, LEARNER, EnrollmentStatus::Expired, date(2024, 2, 10));
        assert_eq!(eval.metrics().status_row_count, 2);
    }
}

// =============================================================================
// TIER T1: ENROLLMENT RESOLUTION
// =============================================================================

mod t1_enrollment {
    use super::*;
    use coursegate_core::{ContentStore, MemoryStore, StatusStore};

    /// T1.1: Later timestamp wins regardless of storage order.
    #[test]
    fn recency_beats_storage_order() {
        let mut store = MemoryStore::new();
        store.put_course(Course::new(COURSE, "c")).expect("course");
        store
            .append_status(StatusRow::new(
                COURSE,
                LEARNER,
                EnrollmentStatus::Enrolled,
                date(2024, 3, 1),
            ))
            .expect("append");
        store
            .append_status(StatusRow::new(
                COURSE,
                LEARNER,
                EnrollmentStatus::Expired,
                date(2024, 1, 1),
            ))
            .expect("append");

        let eval = Evaluator::with_store(store);
        assert_eq!(eval.get_status(COURSE, LEARNER), EnrollmentStatus::Enrolled);
    }

    /// T1.2: Anonymous visitors are never enrolled.
    #[test]
    fn anonymous_not_enrolled() {
        let eval = course_c();
        assert_eq!(
            eval.get_status(COURSE, UserId::ANONYMOUS),
            EnrollmentStatus::NotEnrolled
        );
        assert!(eval.enrollment_date(COURSE, UserId::ANONYMOUS).is_none());
    }

    /// T1.3: Enrollment record reflects the lifecycle.
    #[test]
    fn record_after_expiry() {
        let mut eval = course_c();
        enroll(&mut eval, LEARNER, EnrollmentStatus::Enrolled, date(2024, 1, 10));
        enroll(&mut eval, LEARNER, EnrollmentStatus::Expired, date(2024, 4, 1));

        let record = eval.enrollment_record(COURSE, LEARNER);
        assert_eq!(record.status, EnrollmentStatus::Expired);
        assert_eq!(record.enrollment_date, Some(date(2024, 1, 10)));
        assert!(!eval.is_enrolled(COURSE, LEARNER));
        assert!(eval.has_enrollment_history(COURSE, LEARNER));
    }
}

// =============================================================================
// TIER T2: ACCESS GATING
// =============================================================================

mod t2_access {
    use super::*;

    /// T2.1: Scenario C during the window.
    #[test]
    fn scenario_c_open() {
        let mut eval = course_c();
        enroll(&mut eval, LEARNER, EnrollmentStatus::Enrolled, date(2024, 1, 10));
        let eval = eval.with_clock(FixedClock(date(2024, 3, 1)));

        assert!(eval.can_view_content(COURSE));
        assert!(eval.is_enrolled(COURSE, LEARNER));
        assert!(eval.can_enroll(COURSE));
    }

    /// T2.2: Scenario C after the window.
    #[test]
    fn scenario_c_closed() {
        let mut eval = course_c();
        enroll(&mut eval, LEARNER, EnrollmentStatus::Enrolled, date(2024, 1, 10));
        let eval = eval.with_clock(FixedClock(date(2024, 7, 1)));

        assert!(!eval.can_view_content(COURSE));
        let decision = eval.access(COURSE, LEARNER).expect("decision");
        assert!(!decision.can_access_lessons);
    }

    /// T2.3: Capacity counts enrolled learners only.
    #[test]
    fn capacity_two() {
        let mut eval = Evaluator::new();
        eval.put_course(Course::new(COURSE, "c").with_capacity(2))
            .expect("course");

        enroll(&mut eval, UserId(1), EnrollmentStatus::Enrolled, date(2024, 1, 1));
        enroll(&mut eval, UserId(2), EnrollmentStatus::Enrolled, date(2024, 1, 1));
        enroll(&mut eval, UserId(2), EnrollmentStatus::Expired, date(2024, 1, 2));
        assert!(eval.has_capacity(COURSE));

        enroll(&mut eval, UserId(3), EnrollmentStatus::Enrolled, date(2024, 1, 3));
        assert!(!eval.has_capacity(COURSE));
        assert_eq!(eval.count_enrolled(COURSE), 2);
    }

    /// T2.4: Prerequisites need a signed-in learner.
    #[test]
    fn anonymous_prerequisite_never_satisfied() {
        let mut eval = Evaluator::new();
        eval.put_course(Course::new(EntityId(2), "base")).expect("course");
        eval.put_course(Course::new(COURSE, "next").with_prerequisite_course(EntityId(2)))
            .expect("course");
        eval.record_completion(CompletionRecord::complete(
            EntityKey::course(EntityId(2)),
            LEARNER,
            date(2024, 1, 1),
        ))
        .expect("complete");

        assert!(eval.prerequisite_satisfied(COURSE, LEARNER));
        assert!(!eval.prerequisite_satisfied(COURSE, UserId::ANONYMOUS));
    }

    /// T2.5: Scrubbed configuration drives the gate.
    #[test]
    fn meta_flags_must_be_exactly_yes() {
        let mut eval = Evaluator::new().with_clock(FixedClock(date(2030, 1, 1)));
        let meta = CourseMeta {
            id: 1,
            title: "c".to_string(),
            time_period: "YES".to_string(),
            end_date: "2024-06-01".to_string(),
            ..CourseMeta::default()
        };
        eval.put_course(meta.scrub()).expect("course");
        assert!(eval.can_view_content(COURSE));
    }
}

// =============================================================================
// TIER T3: PROGRESS AGGREGATION
// =============================================================================

mod t3_progress {
    use super::*;

    /// T3.1: compute_progress is idempotent.
    #[test]
    fn progress_idempotent() {
        let mut eval = course_c();
        enroll(&mut eval, LEARNER, EnrollmentStatus::Enrolled, date(2024, 1, 10));
        eval.record_completion(CompletionRecord::complete(
            EntityKey::lesson(EntityId(100)),
            LEARNER,
            date(2024, 1, 11),
        ))
        .expect("complete");

        let first = eval.compute_progress(COURSE, LEARNER);
        let second = eval.compute_progress(COURSE, LEARNER);
        assert_eq!(first, second);

        let snapshot = first.expect("course exists");
        assert_eq!(snapshot.percent_complete(), 50);
        assert_eq!(snapshot.next_incomplete_lesson(), Some(EntityId(101)));
    }

    /// T3.2: Non-enrolled learners get structure without completion.
    #[test]
    fn not_enrolled_structure_only() {
        let eval = course_c();
        let snapshot = eval
            .compute_progress(COURSE, LEARNER)
            .expect("course exists");
        assert!(!snapshot.is_enrolled);
        assert_eq!(snapshot.lessons.len(), 2);
        assert_eq!(snapshot.sections.len(), 1);
    }
}

// =============================================================================
// TIER T4: PERSISTENCE PARITY
// =============================================================================

mod t4_persistence {
    use super::*;
    use coursegate_core::{dataset_from_bytes, dataset_to_bytes};
    use tempfile::tempdir;

    fn populated() -> Evaluator {
        let mut eval = course_c();
        enroll(&mut eval, LEARNER, EnrollmentStatus::Enrolled, date(2024, 1, 10));
        eval.record_completion(CompletionRecord::complete(
            EntityKey::lesson(EntityId(101)),
            LEARNER,
            date(2024, 2, 2),
        ))
        .expect("complete");
        eval
    }

    /// T4.1: redb and in-memory backends give identical answers.
    #[test]
    fn redb_matches_memory() {
        let memory = populated();
        let dataset = memory.export_dataset().expect("export");

        let dir = tempdir().expect("tempdir");
        let mut disk = Evaluator::with_redb(dir.path().join("cg.redb")).expect("open");
        disk.load_dataset(&dataset).expect("load");

        let now = date(2024, 3, 1);
        assert!(disk.is_persistent());
        assert_eq!(
            disk.access_at(COURSE, LEARNER, now),
            memory.access_at(COURSE, LEARNER, now)
        );
        assert_eq!(
            disk.compute_progress(COURSE, LEARNER),
            memory.compute_progress(COURSE, LEARNER)
        );
        assert_eq!(disk.export_dataset().expect("export"), dataset);
    }

    /// T4.2: Snapshot bytes restore the same dataset.
    #[test]
    fn snapshot_restores_dataset() {
        let dataset = populated().export_dataset().expect("export");
        let bytes = dataset_to_bytes(&dataset).expect("encode");
        assert_eq!(&bytes[0..4], b"CGAT");
        assert_eq!(dataset_from_bytes(&bytes).expect("decode"), dataset);
    }

    /// T4.3: JSON fixtures accept human-readable dates.
    #[test]
    fn json_dataset_fixture_loads() {
        let json = r#"{
            "courses": [{"id": 1, "title": "C", "time_period": "yes",
                         "start_date": "2024-01-01", "end_date": "2024-06-01"}],
            "sections": [{"id": 10, "course": 1, "title": "S", "order": 1}],
            "lessons": [{"id": 100, "section": 10, "title": "L", "order": 1}],
            "enrollments": [{"course": 1, "user": 42, "status": "enrolled",
                             "updated_at": "2024-01-10T00:00:00Z"}],
            "completions": []
        }"#;
        let dataset: Dataset = serde_json::from_str(json).expect("parse");

        let mut eval = Evaluator::new();
        let report = eval.load_dataset(&dataset).expect("load");
        assert_eq!(report.status_rows, 1);
        assert!(eval.can_view_content_at(COURSE, date(2024, 3, 1)));
        assert_eq!(eval.enrollment_date(COURSE, LEARNER), Some(date(2024, 1, 10)));
    }
}
