//! # Coursegate CLI Module
//!
//! This module implements the CLI interface for Coursegate.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show catalog status
//! - `init` - Initialize new database
//! - `load` - Load a JSON dataset (courses, content, learner facts)
//! - `export` - Export the catalog to file
//! - `enrollment` - Show a learner's enrollment in a course
//! - `access` - Evaluate whether a learner may view or enroll in a course
//! - `progress` - Show a learner's progress through a course
//! - `hash` - Compute BLAKE3 cryptographic hash of the catalog snapshot

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use coursegate_core::CourseGateError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use commands::*;

/// Database path used when neither the flag nor the config file sets one.
pub const DEFAULT_DATABASE: &str = "coursegate.db";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Coursegate - Course Access & Progress Server
///
/// Answers whether a learner is enrolled in a course, whether they may view
/// or enroll in it right now, and how far through the syllabus they are.
#[derive(Parser, Debug)]
#[command(name = "coursegate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database [default: coursegate.db]
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "file" (snapshot file) or "redb" (ACID database) [default: redb]
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Configuration file [default: coursegate.toml if present]
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to [default: 127.0.0.1]
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to [default: 8080]
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show catalog status
    Status,

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Load courses, content and learner facts from a JSON dataset
    Load {
        /// Path to the dataset file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export the catalog
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (snapshot, json)
        #[arg(short = 't', long, default_value = "snapshot")]
        format: String,
    },

    /// Show a learner's enrollment in a course
    Enrollment {
        /// Course ID
        #[arg(short, long)]
        course: u64,

        /// User ID (0 = anonymous)
        #[arg(short, long, default_value = "0")]
        user: u64,
    },

    /// Evaluate course access for a learner
    Access {
        /// Course ID
        #[arg(short, long)]
        course: u64,

        /// User ID (0 = anonymous)
        #[arg(short, long, default_value = "0")]
        user: u64,

        /// Evaluate at this instant instead of now (RFC 3339, YYYY-MM-DD or unix seconds)
        #[arg(short, long)]
        now: Option<String>,
    },

    /// Show a learner's progress through a course
    Progress {
        /// Course ID
        #[arg(short, long)]
        course: u64,

        /// User ID
        #[arg(short, long)]
        user: u64,
    },

    /// Compute BLAKE3 cryptographic hash of the catalog snapshot
    Hash,
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Where the catalog lives between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Snapshot file, rewritten after every mutating command.
    File,
    /// redb database, written through.
    Redb,
}

impl FromStr for Backend {
    type Err = CourseGateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "redb" => Ok(Backend::Redb),
            other => Err(CourseGateError::InvalidConfiguration(format!(
                "Unknown backend: {}. Use: redb, file",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::File => "file",
            Backend::Redb => "redb",
        })
    }
}

/// Resolved global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
    pub verbose: bool,
}

impl Context {
    /// Flags win over the config file, which wins over built-in defaults.
    pub fn resolve(cli: &Cli, config: &AppConfig) -> Result<Self, CourseGateError> {
        let database = cli
            .database
            .clone()
            .or_else(|| config.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

        let backend = match cli.backend.as_deref().or(config.backend.as_deref()) {
            Some(raw) => raw.parse()?,
            None => Backend::Redb,
        };

        Ok(Self {
            database,
            backend,
            json_mode: cli.json_mode,
            verbose: cli.verbose,
        })
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CourseGateError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = Context::resolve(&cli, &config)?;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let mut settings = config.server;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            cmd_server(&ctx, settings).await
        }
        Some(Commands::Status) => cmd_status(&ctx),
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Load { file }) => cmd_load(&ctx, &file),
        Some(Commands::Export { output, format }) => cmd_export(&ctx, &output, &format),
        Some(Commands::Enrollment { course, user }) => cmd_enrollment(&ctx, course, user),
        Some(Commands::Access { course, user, now }) => {
            cmd_access(&ctx, course, user, now.as_deref())
        }
        Some(Commands::Progress { course, user }) => cmd_progress(&ctx, course, user),
        Some(Commands::Hash) => cmd_hash(&ctx),
        None => {
            // No subcommand - show status by default
            cmd_status(&ctx)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
