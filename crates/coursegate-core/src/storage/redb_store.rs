//! # redb-backed Record Storage
//!
//! A disk-backed implementation of [`ContentStore`] and [`StatusStore`]
//! using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Values are postcard-encoded. Status rows are keyed by
//! `(course, user, seq)` so both per-pair and per-course lookups are range
//! scans, and append order survives restarts.

use crate::store::{ContentStore, StatusStore};
use crate::{
    CompletionRecord, ContentTree, Course, CourseGateError, EntityId, EntityKey, Lesson, Section,
    StatusRow, UserId,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Table for courses: course id -> serialized Course
const COURSES: TableDefinition<u64, &[u8]> = TableDefinition::new("courses");

/// Table for sections: section id -> serialized Section
const SECTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("sections");

/// Table for lessons: lesson id -> serialized Lesson
const LESSONS: TableDefinition<u64, &[u8]> = TableDefinition::new("lessons");

/// Table for status rows: (course, user, seq) -> serialized StatusRow
const STATUS_ROWS: TableDefinition<(u64, u64, u64), &[u8]> = TableDefinition::new("status_rows");

/// Table for completions: (kind tag, entity id, user) -> serialized CompletionRecord
const COMPLETIONS: TableDefinition<(u8, u64, u64), &[u8]> = TableDefinition::new("completions");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Metadata key holding the next status row sequence number.
const NEXT_SEQ_KEY: &str = "next_seq";

fn io_err(e: impl std::fmt::Display) -> CourseGateError {
    CourseGateError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CourseGateError> {
    postcard::to_allocvec(value).map_err(|e| CourseGateError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CourseGateError> {
    postcard::from_bytes(bytes).map_err(|e| CourseGateError::DeserializationError(e.to_string()))
}

/// A disk-backed record store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next status row sequence number.
    next_seq: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_seq", &self.next_seq)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CourseGateError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(COURSES).map_err(io_err)?;
            let _ = write_txn.open_table(SECTIONS).map_err(io_err)?;
            let _ = write_txn.open_table(LESSONS).map_err(io_err)?;
            let _ = write_txn.open_table(STATUS_ROWS).map_err(io_err)?;
            let _ = write_txn.open_table(COMPLETIONS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let next_seq = {
            let read_txn = db.begin_read().map_err(io_err)?;
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            table
                .get(NEXT_SEQ_KEY)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_seq })
    }

    /// Compact the database.
    pub fn compact(&mut self) -> Result<(), CourseGateError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    /// Number of stored status rows.
    pub fn status_row_count(&self) -> Result<u64, CourseGateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(STATUS_ROWS).map_err(io_err)?;
        table.len().map_err(io_err)
    }

    /// Fetch and decode one value from an id-keyed table.
    fn get_by_id<T: DeserializeOwned>(
        &self,
        def: TableDefinition<u64, &[u8]>,
        id: EntityId,
    ) -> Result<Option<T>, CourseGateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(def).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(data) => decode(data.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every value of an id-keyed table, in id order.
    fn scan<T: DeserializeOwned>(
        &self,
        def: TableDefinition<u64, &[u8]>,
    ) -> Result<Vec<T>, CourseGateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(def).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    /// Encode and write one value to an id-keyed table.
    fn put_by_id<T: Serialize>(
        &mut self,
        def: TableDefinition<u64, &[u8]>,
        id: EntityId,
        value: &T,
    ) -> Result<(), CourseGateError> {
        let bytes = encode(value)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(def).map_err(io_err)?;
            table.insert(id.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    /// Decode the status rows within a key range.
    fn status_range(
        &self,
        from: (u64, u64, u64),
        to: (u64, u64, u64),
    ) -> Result<Vec<StatusRow>, CourseGateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(STATUS_ROWS).map_err(io_err)?;
        let mut rows = Vec::new();
        for entry in table.range(from..=to).map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }
}

impl ContentStore for RedbStore {
    fn course(&self, id: EntityId) -> Result<Option<Course>, CourseGateError> {
        self.get_by_id(COURSES, id)
    }

    fn section(&self, id: EntityId) -> Result<Option<Section>, CourseGateError> {
        self.get_by_id(SECTIONS, id)
    }

    fn lesson(&self, id: EntityId) -> Result<Option<Lesson>, CourseGateError> {
        self.get_by_id(LESSONS, id)
    }

    fn tree(&self, id: EntityId) -> Result<Option<ContentTree>, CourseGateError> {
        // One read transaction for the whole tree so the snapshot is consistent.
        let read_txn = self.db.begin_read().map_err(io_err)?;

        let course: Course = {
            let table = read_txn.open_table(COURSES).map_err(io_err)?;
            match table.get(id.0).map_err(io_err)? {
                Some(data) => decode(data.value())?,
                None => return Ok(None),
            }
        };

        let sections: Vec<Section> = {
            let table = read_txn.open_table(SECTIONS).map_err(io_err)?;
            let mut out = Vec::new();
            for entry in table.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                let section: Section = decode(value.value())?;
                if section.course == id {
                    out.push(section);
                }
            }
            out
        };

        let lessons: Vec<Lesson> = {
            let table = read_txn.open_table(LESSONS).map_err(io_err)?;
            let mut out = Vec::new();
            for entry in table.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                let lesson: Lesson = decode(value.value())?;
                if sections.iter().any(|s| s.id == lesson.section) {
                    out.push(lesson);
                }
            }
            out
        };

        Ok(Some(ContentTree::assemble(course, sections, lessons)))
    }

    fn courses(&self) -> Result<Vec<Course>, CourseGateError> {
        self.scan(COURSES)
    }

    fn sections(&self) -> Result<Vec<Section>, CourseGateError> {
        self.scan(SECTIONS)
    }

    fn lessons(&self) -> Result<Vec<Lesson>, CourseGateError> {
        self.scan(LESSONS)
    }

    fn put_course(&mut self, course: Course) -> Result<(), CourseGateError> {
        self.put_by_id(COURSES, course.id, &course)
    }

    fn put_section(&mut self, section: Section) -> Result<(), CourseGateError> {
        self.put_by_id(SECTIONS, section.id, &section)
    }

    fn put_lesson(&mut self, lesson: Lesson) -> Result<(), CourseGateError> {
        self.put_by_id(LESSONS, lesson.id, &lesson)
    }
}

impl StatusStore for RedbStore {
    fn status_rows(
        &self,
        course: EntityId,
        user: UserId,
    ) -> Result<Vec<StatusRow>, CourseGateError> {
        self.status_range((course.0, user.0, 0), (course.0, user.0, u64::MAX))
    }

    fn status_rows_for_course(&self, course: EntityId) -> Result<Vec<StatusRow>, CourseGateError> {
        self.status_range((course.0, 0, 0), (course.0, u64::MAX, u64::MAX))
    }

    fn all_status_rows(&self) -> Result<Vec<StatusRow>, CourseGateError> {
        let mut rows = self.status_range((0, 0, 0), (u64::MAX, u64::MAX, u64::MAX))?;
        rows.sort_by_key(|r| r.seq);
        Ok(rows)
    }

    fn completion(
        &self,
        entity: EntityKey,
        user: UserId,
    ) -> Result<Option<CompletionRecord>, CourseGateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(COMPLETIONS).map_err(io_err)?;
        match table
            .get((entity.kind.tag(), entity.id.0, user.0))
            .map_err(io_err)?
        {
            Some(data) => decode(data.value()).map(Some),
            None => Ok(None),
        }
    }

    fn completions(&self) -> Result<Vec<CompletionRecord>, CourseGateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(COMPLETIONS).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn append_status(&mut self, mut row: StatusRow) -> Result<u64, CourseGateError> {
        let seq = self.next_seq;
        let next = seq.saturating_add(1);
        row.seq = seq;
        let bytes = encode(&row)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut rows = write_txn.open_table(STATUS_ROWS).map_err(io_err)?;
            rows.insert((row.course.0, row.user.0, seq), bytes.as_slice())
                .map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert(NEXT_SEQ_KEY, next).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        // Update in-memory state only after successful commit.
        self.next_seq = next;
        Ok(seq)
    }

    fn put_completion(&mut self, record: CompletionRecord) -> Result<(), CourseGateError> {
        let bytes = encode(&record)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(COMPLETIONS).map_err(io_err)?;
            table
                .insert(
                    (record.entity.kind.tag(), record.entity.id.0, record.user.0),
                    bytes.as_slice(),
                )
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnrollmentStatus, Timestamp};
    use tempfile::tempdir;

    #[test]
    fn course_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");

        let course = Course::new(EntityId(7), "Chemistry").with_capacity(3);
        store.put_course(course.clone()).expect("put");

        assert_eq!(store.course(EntityId(7)).expect("get"), Some(course));
        assert_eq!(store.course(EntityId(8)).expect("get"), None);
    }

    #[test]
    fn tree_is_assembled_from_disk() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");

        store
            .put_course(Course::new(EntityId(1), "c"))
            .expect("put");
        store
            .put_section(Section::new(EntityId(11), EntityId(1), "later", 2))
            .expect("put");
        store
            .put_section(Section::new(EntityId(12), EntityId(1), "earlier", 1))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(100), EntityId(11), "l", 1))
            .expect("put");
        store
            .put_lesson(Lesson::new(EntityId(101), EntityId(12), "l", 1))
            .expect("put");

        let tree = store.tree(EntityId(1)).expect("tree").expect("exists");
        assert_eq!(tree.section_ids(), vec![EntityId(12), EntityId(11)]);
        assert_eq!(tree.lesson_ids(), vec![EntityId(101), EntityId(100)]);
    }

    #[test]
    fn status_rows_and_seq_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("test.redb");

        {
            let mut store = RedbStore::open(&path).expect("open");
            store
                .append_status(StatusRow::new(
                    EntityId(1),
                    UserId(5),
                    EnrollmentStatus::Enrolled,
                    Timestamp::from_unix(10),
                ))
                .expect("append");
        }

        let mut store = RedbStore::open(&path).expect("reopen");
        let seq = store
            .append_status(StatusRow::new(
                EntityId(1),
                UserId(5),
                EnrollmentStatus::Expired,
                Timestamp::from_unix(20),
            ))
            .expect("append");
        assert_eq!(seq, 1);

        let rows = store.status_rows(EntityId(1), UserId(5)).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(store.status_row_count().expect("count"), 2);
        assert!(
            store
                .status_rows(EntityId(1), UserId(6))
                .expect("rows")
                .is_empty()
        );
    }

    #[test]
    fn compact_then_reopen_keeps_records() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("test.redb");

        {
            let mut store = RedbStore::open(&path).expect("open");
            for id in 1..=20 {
                store
                    .put_course(Course::new(EntityId(id), "c"))
                    .expect("put");
                store
                    .append_status(StatusRow::new(
                        EntityId(id),
                        UserId(5),
                        EnrollmentStatus::Enrolled,
                        Timestamp::from_unix(10),
                    ))
                    .expect("append");
            }
            store.compact().expect("compact");
        }

        let mut store = RedbStore::open(&path).expect("reopen");
        assert_eq!(store.courses().expect("courses").len(), 20);
        assert_eq!(store.status_row_count().expect("count"), 20);
        let seq = store
            .append_status(StatusRow::new(
                EntityId(1),
                UserId(6),
                EnrollmentStatus::Enrolled,
                Timestamp::from_unix(11),
            ))
            .expect("append");
        assert_eq!(seq, 20);
    }

    #[test]
    fn completion_keys_separate_kinds() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");

        let record = CompletionRecord::complete(
            EntityKey::track(EntityId(3)),
            UserId(1),
            Timestamp::from_unix(50),
        );
        store.put_completion(record.clone()).expect("put");

        assert_eq!(
            store
                .completion(EntityKey::track(EntityId(3)), UserId(1))
                .expect("get"),
            Some(record)
        );
        assert_eq!(
            store
                .completion(EntityKey::course(EntityId(3)), UserId(1))
                .expect("get"),
            None
        );
    }
}
