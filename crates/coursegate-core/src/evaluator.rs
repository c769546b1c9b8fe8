//! # Evaluator
//!
//! The public façade: a storage backend plus a clock.
//!
//! Every evaluation reads the clock once and threads that instant through
//! all comparisons. The `_at` variants take the instant explicitly.
//!
//! ## Fail-closed
//!
//! Evaluations never return errors. A missing course resolves to `false` /
//! `None`; a storage fault is logged with `tracing::warn!` and resolves the
//! same way. Writes (`record_*`, `put_*`, `load_dataset`) propagate errors.
//!
//! ## Storage Backends
//!
//! - `InMemory`: [`MemoryStore`] (fast, volatile unless exported)
//! - `Persistent`: [`RedbStore`] for disk-backed ACID storage

use crate::access::{AccessDecision, AccessGate};
use crate::clock::{Clock, SystemClock};
use crate::enrollment::EnrollmentResolver;
use crate::formats::Dataset;
use crate::ingestor::{IngestReport, Ingestor};
use crate::progress::{ProgressAggregator, ProgressSnapshot};
use crate::storage::RedbStore;
use crate::store::{ContentStore, MemoryStore, StatusStore};
use crate::system::CatalogMetrics;
use crate::{
    CompletionRecord, ContentTree, Course, CourseGateError, EnrollmentRecord, EnrollmentStatus,
    EntityId, EntityKey, Lesson, PrerequisiteKind, Section, StatusRow, Timestamp, UserId,
};
use std::path::Path;

// =============================================================================
// ERROR LOGGING HELPERS
// =============================================================================

/// Log a storage error and fall back to the type's default.
///
/// The default is always the closed answer (`false`, `None`, `0`, empty).
#[inline]
fn log_and_default<T: Default>(result: Result<T, CourseGateError>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, context, "storage error, failing closed");
            T::default()
        }
    }
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for an [`Evaluator`].
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbStore (database handle) cannot be safely cloned.

/// Forward a call to whichever store backs the enum.
macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StorageBackend::InMemory($store) => $call,
            StorageBackend::Persistent($store) => $call,
        }
    };
}

impl ContentStore for StorageBackend {
    fn course(&self, id: EntityId) -> Result<Option<Course>, CourseGateError> {
        delegate!(self, s => s.course(id))
    }

    fn section(&self, id: EntityId) -> Result<Option<Section>, CourseGateError> {
        delegate!(self, s => s.section(id))
    }

    fn lesson(&self, id: EntityId) -> Result<Option<Lesson>, CourseGateError> {
        delegate!(self, s => s.lesson(id))
    }

    fn tree(&self, id: EntityId) -> Result<Option<ContentTree>, CourseGateError> {
        delegate!(self, s => s.tree(id))
    }

    fn courses(&self) -> Result<Vec<Course>, CourseGateError> {
        delegate!(self, s => s.courses())
    }

    fn sections(&self) -> Result<Vec<Section>, CourseGateError> {
        delegate!(self, s => s.sections())
    }

    fn lessons(&self) -> Result<Vec<Lesson>, CourseGateError> {
        delegate!(self, s => s.lessons())
    }

    fn put_course(&mut self, course: Course) -> Result<(), CourseGateError> {
        delegate!(self, s => s.put_course(course))
    }

    fn put_section(&mut self, section: Section) -> Result<(), CourseGateError> {
        delegate!(self, s => s.put_section(section))
    }

    fn put_lesson(&mut self, lesson: Lesson) -> Result<(), CourseGateError> {
        delegate!(self, s => s.put_lesson(lesson))
    }
}

impl StatusStore for StorageBackend {
    fn status_rows(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Vec<StatusRow>, CourseGateError> {
        delegate!(self, s => s.status_rows(course, user))
    }

    fn status_rows_for_course(&self, course: EntityId) -> Result<Vec<StatusRow>, CourseGateError> {
        delegate!(self, s => s.status_rows_for_course(course))
    }

    fn all_status_rows(&self) -> Result<Vec<StatusRow>, CourseGateError> {
        delegate!(self, s => s.all_status_rows())
    }

    fn completion(
        &self,
        entity: EntityKey,
        user: UserId,
    ) -> Result<Option<CompletionRecord>, CourseGateError> {
        delegate!(self, s => s.completion(entity, user))
    }

    fn completions(&self) -> Result<Vec<CompletionRecord>, CourseGateError> {
        delegate!(self, s => s.completions())
    }

    fn append_status(&mut self, row: StatusRow) -> Result<u64, CourseGateError> {
        delegate!(self, s => s.append_status(row))
    }

    fn put_completion(&mut self, record: CompletionRecord) -> Result<(), CourseGateError> {
        delegate!(self, s => s.put_completion(record))
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// A storage backend combined with a clock.
pub struct Evaluator {
    backend: StorageBackend,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Empty in-memory evaluator on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(StorageBackend::default())
    }

    /// Evaluator over an existing in-memory store.
    #[must_use]
    pub fn with_store(store: MemoryStore) -> Self {
        Self::with_backend(StorageBackend::InMemory(store))
    }

    /// Evaluator over a redb database, created if missing.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, CourseGateError> {
        Ok(Self::with_backend(StorageBackend::Persistent(
            RedbStore::open(path)?,
        )))
    }

    #[must_use]
    pub fn with_backend(backend: StorageBackend) -> Self {
        Self {
            backend,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// The current instant according to the clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Look up a course; `None` when absent or unreadable.
    #[must_use]
    pub fn course(&self, id: EntityId) -> Option<Course> {
        let course = log_and_default(self.backend.course(id), "course");
        if course.is_none() {
            tracing::debug!(course = id.0, "course not found");
        }
        course
    }

    /// All courses in id order.
    #[must_use]
    pub fn courses(&self) -> Vec<Course> {
        log_and_default(self.backend.courses(), "courses")
    }

    fn resolver(&self) -> EnrollmentResolver<'_, StorageBackend> {
        EnrollmentResolver::new(&self.backend)
    }

    fn gate(&self) -> AccessGate<'_, StorageBackend> {
        AccessGate::new(&self.backend)
    }

    // =========================================================================
    // ENROLLMENT
    // =========================================================================

    #[must_use]
    pub fn get_status(&self, course: EntityId, user: UserId) -> EnrollmentStatus {
        log_and_default(self.resolver().get_status(course, user), "get_status")
    }

    #[must_use]
    pub fn is_enrolled(&self, course: EntityId, user: UserId) -> bool {
        log_and_default(self.resolver().is_enrolled(course, user), "is_enrolled")
    }

    #[must_use]
    pub fn has_enrollment_history(&self, course: EntityId, user: UserId) -> bool {
        log_and_default(
            self.resolver().has_enrollment_history(course, user),
            "has_enrollment_history",
        )
    }

    #[must_use]
    pub fn enrollment_date(&self, course: EntityId, user: UserId) -> Option<Timestamp> {
        log_and_default(
            self.resolver().enrollment_date(course, user),
            "enrollment_date",
        )
    }

    /// Resolved enrollment record; the empty record on storage faults.
    #[must_use]
    pub fn enrollment_record(&self, course: EntityId, user: UserId) -> EnrollmentRecord {
        match self.resolver().record(course, user) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, context = "enrollment_record", "storage error, failing closed");
                EnrollmentRecord::none(course, user)
            }
        }
    }

    #[must_use]
    pub fn count_enrolled(&self, course: EntityId) -> usize {
        log_and_default(self.resolver().count_enrolled(course), "count_enrolled")
    }

    #[must_use]
    pub fn enrolled_users(&self, course: EntityId) -> Vec<UserId> {
        log_and_default(self.resolver().enrolled_users(course), "enrolled_users")
    }

    // =========================================================================
    // ACCESS
    // =========================================================================

    #[must_use]
    pub fn can_view_content(&self, course: EntityId) -> bool {
        self.can_view_content_at(course, self.now())
    }

    #[must_use]
    pub fn can_view_content_at(&self, course: EntityId, now: Timestamp) -> bool {
        self.course(course)
            .is_some_and(|c| self.gate().can_view_content(&c, now))
    }

    #[must_use]
    pub fn can_enroll(&self, course: EntityId) -> bool {
        self.can_enroll_at(course, self.now())
    }

    #[must_use]
    pub fn can_enroll_at(&self, course: EntityId, now: Timestamp) -> bool {
        self.course(course).is_some_and(|c| {
            log_and_default(self.gate().can_enroll(&c, now), "can_enroll")
        })
    }

    #[must_use]
    pub fn has_capacity(&self, course: EntityId) -> bool {
        self.course(course)
            .is_some_and(|c| log_and_default(self.gate().has_capacity(&c), "has_capacity"))
    }

    #[must_use]
    pub fn has_prerequisite(&self, course: EntityId) -> bool {
        self.course(course)
            .is_some_and(|c| self.gate().has_prerequisite(&c))
    }

    #[must_use]
    pub fn prerequisite_id(&self, course: EntityId, kind: PrerequisiteKind) -> Option<EntityId> {
        self.course(course)
            .and_then(|c| self.gate().prerequisite_id(&c, kind))
    }

    #[must_use]
    pub fn prerequisite_complete(
        &self,
        course: EntityId,
        user: UserId,
        kind: PrerequisiteKind,
    ) -> bool {
        self.course(course).is_some_and(|c| {
            log_and_default(
                self.gate().prerequisite_complete(&c, user, kind),
                "prerequisite_complete",
            )
        })
    }

    #[must_use]
    pub fn prerequisite_satisfied(&self, course: EntityId, user: UserId) -> bool {
        self.course(course).is_some_and(|c| {
            log_and_default(
                self.gate().prerequisite_satisfied(&c, user),
                "prerequisite_satisfied",
            )
        })
    }

    /// Full access decision at the clock's current instant.
    #[must_use]
    pub fn access(&self, course: EntityId, user: UserId) -> Option<AccessDecision> {
        self.access_at(course, user, self.now())
    }

    #[must_use]
    pub fn access_at(
        &self,
        course: EntityId,
        user: UserId,
        now: Timestamp,
    ) -> Option<AccessDecision> {
        let course = self.course(course)?;
        log_and_default(self.gate().evaluate(&course, user, now).map(Some), "access")
    }

    // =========================================================================
    // PROGRESS
    // =========================================================================

    /// Progress snapshot, or `None` if the course does not exist.
    #[must_use]
    pub fn compute_progress(&self, course: EntityId, user: UserId) -> Option<ProgressSnapshot> {
        log_and_default(
            ProgressAggregator::new(&self.backend).compute_progress(course, user),
            "compute_progress",
        )
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    pub fn put_course(&mut self, course: Course) -> Result<(), CourseGateError> {
        Ingestor::ingest_course(&mut self.backend, course)
    }

    pub fn put_section(&mut self, section: Section) -> Result<(), CourseGateError> {
        Ingestor::ingest_section(&mut self.backend, section)
    }

    pub fn put_lesson(&mut self, lesson: Lesson) -> Result<(), CourseGateError> {
        Ingestor::ingest_lesson(&mut self.backend, lesson)
    }

    /// Append a validated status row; returns its sequence number.
    pub fn record_status(&mut self, row: StatusRow) -> Result<u64, CourseGateError> {
        Ingestor::record_status(&mut self.backend, row)
    }

    /// Store a completion; `false` if the entity was already complete.
    pub fn record_completion(&mut self, record: CompletionRecord) -> Result<bool, CourseGateError> {
        Ingestor::record_completion(&mut self.backend, record)
    }

    pub fn load_dataset(&mut self, dataset: &Dataset) -> Result<IngestReport, CourseGateError> {
        Ingestor::ingest_dataset(&mut self.backend, dataset)
    }

    // =========================================================================
    // EXPORT & METRICS
    // =========================================================================

    /// Reclaim free space in a persistent backend after bulk writes. No-op in
    /// memory.
    pub fn compact(&mut self) -> Result<(), CourseGateError> {
        match &mut self.backend {
            StorageBackend::InMemory(_) => Ok(()),
            StorageBackend::Persistent(store) => store.compact(),
        }
    }

    /// Every record in the backend, in canonical order.
    pub fn export_dataset(&self) -> Result<Dataset, CourseGateError> {
        Dataset::from_store(&self.backend)
    }

    #[must_use]
    pub fn metrics(&self) -> CatalogMetrics {
        log_and_default(CatalogMetrics::from_store(&self.backend), "metrics")
    }
}

// =============================================================================
// TESTS
// =============================================================================
