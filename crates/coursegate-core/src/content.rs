//! # Content Tree
//!
//! The ordered course → sections → lessons hierarchy.
//!
//! Sections and lessons point at their parent through a back-reference; the
//! tree is assembled in one pass from a bulk fetch and then walked in memory.
//! Sections and lessons are ordered by their `order` key, ties broken by id,
//! never by storage order.

use crate::{Course, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A section of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: EntityId,
    /// Parent course (back-reference).
    pub course: EntityId,
    pub title: String,
    /// Position within the course, ascending.
    pub order: u32,
}

impl Section {
    #[must_use]
    pub fn new(id: EntityId, course: EntityId, title: impl Into<String>, order: u32) -> Self {
        Self {
            id,
            course,
            title: title.into(),
            order,
        }
    }
}

/// A lesson of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: EntityId,
    /// Parent section (back-reference).
    pub section: EntityId,
    pub title: String,
    /// Position within the section, ascending.
    pub order: u32,
}

impl Lesson {
    #[must_use]
    pub fn new(id: EntityId, section: EntityId, title: impl Into<String>, order: u32) -> Self {
        Self {
            id,
            section,
            title: title.into(),
            order,
        }
    }
}

/// A section together with its ordered lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub section: Section,
    pub lessons: Vec<Lesson>,
}

/// A course with its full ordered syllabus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTree {
    pub course: Course,
    pub sections: Vec<SectionNode>,
}

impl ContentTree {
    /// Assemble a tree from unordered sections and lessons.
    ///
    /// Sections that belong to another course are dropped. Lessons whose
    /// parent section is not part of this course are dangling and dropped.
    #[must_use]
    pub fn assemble(
        course: Course,
        sections: impl IntoIterator<Item = Section>,
        lessons: impl IntoIterator<Item = Lesson>,
    ) -> Self {
        let mut by_section: BTreeMap<EntityId, Vec<Lesson>> = BTreeMap::new();
        for lesson in lessons {
            by_section.entry(lesson.section).or_default().push(lesson);
        }

        let mut sections: Vec<Section> = sections
            .into_iter()
            .filter(|s| s.course == course.id)
            .collect();
        sections.sort_by_key(|s| (s.order, s.id));

        let nodes = sections
            .into_iter()
            .map(|section| {
                let mut lessons = by_section.remove(&section.id).unwrap_or_default();
                lessons.sort_by_key(|l| (l.order, l.id));
                SectionNode { section, lessons }
            })
            .collect();

        Self {
            course,
            sections: nodes,
        }
    }

    /// Section ids in syllabus order.
    #[must_use]
    pub fn section_ids(&self) -> Vec<EntityId> {
        self.sections.iter().map(|n| n.section.id).collect()
    }

    /// Lesson ids in syllabus order.
    #[must_use]
    pub fn lesson_ids(&self) -> Vec<EntityId> {
        self.lessons().map(|l| l.id).collect()
    }

    /// All lessons in syllabus order.
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.sections.iter().flat_map(|n| n.lessons.iter())
    }

    /// Total number of lessons.
    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.sections.iter().map(|n| n.lessons.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> Course {
        Course::new(EntityId(1), "Course")
    }

    #[test]
    fn assemble_orders_by_order_key_not_input_order() {
        let sections = vec![
            Section::new(EntityId(20), EntityId(1), "Second", 2),
            Section::new(EntityId(10), EntityId(1), "First", 1),
        ];
        let lessons = vec![
            Lesson::new(EntityId(103), EntityId(10), "c", 3),
            Lesson::new(EntityId(101), EntityId(10), "a", 1),
            Lesson::new(EntityId(201), EntityId(20), "d", 1),
            Lesson::new(EntityId(102), EntityId(10), "b", 2),
        ];

        let tree = ContentTree::assemble(course(), sections, lessons);

        assert_eq!(tree.section_ids(), vec![EntityId(10), EntityId(20)]);
        assert_eq!(
            tree.lesson_ids(),
            vec![EntityId(101), EntityId(102), EntityId(103), EntityId(201)]
        );
        assert_eq!(tree.lesson_count(), 4);
    }

    #[test]
    fn equal_order_keys_break_ties_by_id() {
        let sections = vec![
            Section::new(EntityId(30), EntityId(1), "b", 0),
            Section::new(EntityId(5), EntityId(1), "a", 0),
        ];
        let tree = ContentTree::assemble(course(), sections, Vec::new());
        assert_eq!(tree.section_ids(), vec![EntityId(5), EntityId(30)]);
    }

    #[test]
    fn dangling_and_foreign_entries_are_dropped() {
        let sections = vec![
            Section::new(EntityId(10), EntityId(1), "mine", 1),
            Section::new(EntityId(11), EntityId(2), "other course", 1),
        ];
        let lessons = vec![
            Lesson::new(EntityId(100), EntityId(10), "kept", 1),
            Lesson::new(EntityId(101), EntityId(11), "foreign", 1),
            Lesson::new(EntityId(102), EntityId(99), "dangling", 1),
        ];

        let tree = ContentTree::assemble(course(), sections, lessons);

        assert_eq!(tree.section_ids(), vec![EntityId(10)]);
        assert_eq!(tree.lesson_ids(), vec![EntityId(100)]);
    }
}
