//! # Storage Module
//!
//! Disk-backed storage for course content and learner facts.

mod redb_store;

pub use redb_store::RedbStore;
