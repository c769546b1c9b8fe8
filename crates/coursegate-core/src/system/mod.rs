//! # System Module
//!
//! Store-wide catalog metrics, reported by `status` and `/status`.

mod metrics;

pub use metrics::*;
