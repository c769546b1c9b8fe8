//! # coursegate-core
//!
//! The deterministic course access and progress engine for Coursegate - THE LOGIC.
//!
//! Given stored course configuration, a content tree and learner facts, it
//! answers three questions for a learner and a course:
//! - Is the learner enrolled, and since when?
//! - May the learner view content or enroll right now?
//! - How far through the syllabus is the learner?
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Has NO async, NO network dependencies (pure Rust)
//! - Uses ordered maps only, so every answer is reproducible
//! - Uses integer arithmetic only (no floating point)
//! - Reads time only through a [`Clock`], once per evaluation
//! - Fails closed: missing or unreadable data never grants access

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod clock;
pub mod content;
pub mod course;
pub mod enrollment;
pub mod evaluator;
pub mod formats;
pub mod ingestor;
pub mod primitives;
pub mod progress;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CompletionRecord, CourseGateError, EnrollmentRecord, EnrollmentStatus, EntityId, EntityKey,
    EntityKind, StatusRow, Timestamp, UserId,
};

// =============================================================================
// RE-EXPORTS: Content Model
// =============================================================================

pub use content::{ContentTree, Lesson, Section, SectionNode};
pub use course::{Course, CourseMeta, CourseNotices, PrerequisiteConfig, PrerequisiteKind};

// =============================================================================
// RE-EXPORTS: Evaluation
// =============================================================================

pub use access::{
    AccessBlock, AccessDecision, AccessGate, ContentAccess, EnrollmentAccess, content_state,
    enrollment_state,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use enrollment::EnrollmentResolver;
pub use evaluator::{Evaluator, StorageBackend};
pub use ingestor::{IngestReport, Ingestor};
pub use progress::{LessonProgress, ProgressAggregator, ProgressSnapshot, SectionProgress};
pub use storage::RedbStore;
pub use store::{ContentStore, MemoryStore, StatusStore};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    Dataset, MAX_SNAPSHOT_PAYLOAD_SIZE, PersistenceHeader, dataset_from_bytes, dataset_to_bytes,
    snapshot_checksum,
};

#[cfg(feature = "crypto-hash")]
pub use formats::compute_blake3_hash;

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::CatalogMetrics;
