//! # Formats Module
//!
//! Dataset fixtures and the binary snapshot format.

mod dataset;
mod persistence;

pub use dataset::Dataset;
pub use persistence::*;
