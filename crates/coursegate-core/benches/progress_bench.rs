//! # Evaluator Benchmarks
//!
//! Performance benchmarks for coursegate-core evaluations.
//!
//! Run with: `cargo bench -p coursegate-core`

use coursegate_core::{
    CompletionRecord, Course, Dataset, EnrollmentStatus, EntityId, EntityKey, Evaluator, Lesson,
    Section, StatusRow, Timestamp, UserId, dataset_to_bytes,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const COURSE: EntityId = EntityId(1);
const LEARNER: UserId = UserId(7);

/// A course with `sections` sections of 10 lessons each, one enrolled
/// learner who completed every other lesson, and `crowd` other learners.
fn create_course(sections: u64, crowd: u64) -> Evaluator {
    let mut eval = Evaluator::new();
    eval.put_course(Course::new(COURSE, "bench").with_capacity(u32::MAX))
        .expect("course");

    let at = Timestamp::from_unix(1_700_000_000);
    for user in std::iter::once(LEARNER.0).chain(100..100 + crowd) {
        eval.record_status(StatusRow::new(
            COURSE,
            UserId(user),
            EnrollmentStatus::Enrolled,
            at,
        ))
        .expect("status");
    }

    for s in 0..sections {
        let section = EntityId(1_000 + s);
        eval.put_section(Section::new(section, COURSE, "section", s as u32))
            .expect("section");
        for l in 0..10 {
            let lesson = EntityId(100_000 + s * 10 + l);
            eval.put_lesson(Lesson::new(lesson, section, "lesson", l as u32))
                .expect("lesson");
            if l % 2 == 0 {
                eval.record_completion(CompletionRecord::complete(
                    EntityKey::lesson(lesson),
                    LEARNER,
                    at,
                ))
                .expect("completion");
            }
        }
    }

    eval
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_compute_progress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_progress");

    for sections in [1u64, 10, 50].iter() {
        let eval = create_course(*sections, 0);
        group.bench_with_input(BenchmarkId::from_parameter(sections), sections, |b, _| {
            b.iter(|| black_box(eval.compute_progress(COURSE, LEARNER)));
        });
    }

    group.finish();
}

fn bench_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("access");
    let now = Timestamp::from_unix(1_700_000_100);

    for crowd in [10u64, 100, 1000].iter() {
        let eval = create_course(1, *crowd);
        group.bench_with_input(BenchmarkId::from_parameter(crowd), crowd, |b, _| {
            b.iter(|| black_box(eval.access_at(COURSE, LEARNER, now)));
        });
    }

    group.finish();
}

fn bench_count_enrolled(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_enrolled");

    for crowd in [10u64, 100, 1000].iter() {
        let eval = create_course(1, *crowd);
        group.bench_with_input(BenchmarkId::from_parameter(crowd), crowd, |b, _| {
            b.iter(|| black_box(eval.count_enrolled(COURSE)));
        });
    }

    group.finish();
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_encode");

    for sections in [1u64, 10, 50].iter() {
        let dataset: Dataset = create_course(*sections, 100)
            .export_dataset()
            .expect("export");
        group.bench_with_input(BenchmarkId::from_parameter(sections), sections, |b, _| {
            b.iter(|| black_box(dataset_to_bytes(&dataset)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compute_progress,
    bench_access,
    bench_count_enrolled,
    bench_snapshot_encode
);
criterion_main!(benches);
