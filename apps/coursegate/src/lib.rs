//! # coursegate
//!
//! The Coursegate binary crate: HTTP API, CLI and configuration around
//! [`coursegate_core`]. Exposed as a library so integration tests can build
//! the router without starting a server.

pub mod api;
pub mod cli;
pub mod config;
