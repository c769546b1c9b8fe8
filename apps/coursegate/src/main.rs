//! # Coursegate - Course Access & Progress Server
//!
//! The main binary for the Coursegate evaluator.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for loading data and answering access questions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               apps/coursegate (THE BINARY)          │
//! │                                                     │
//! │    ┌─────────────┐            ┌─────────────┐       │
//! │    │    CLI      │            │  HTTP API   │       │
//! │    │   (clap)    │            │   (axum)    │       │
//! │    └──────┬──────┘            └──────┬──────┘       │
//! │           └─────────────┬────────────┘              │
//! │                         ▼                           │
//! │               ┌──────────────────┐                  │
//! │               │ coursegate-core  │                  │
//! │               │   (THE LOGIC)    │                  │
//! │               └──────────────────┘                  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Load a dataset and start the HTTP server
//! coursegate load -f catalog.json
//! coursegate server --host 0.0.0.0 --port 8080
//!
//! # CLI evaluations
//! coursegate access -c 12 -u 7 --now 2024-03-01
//! coursegate progress -c 12 -u 7
//! ```

use clap::Parser;
use coursegate::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // COURSEGATE_LOG_FORMAT=json enables machine-parseable log output.
    let log_format = std::env::var("COURSEGATE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coursegate=info,coursegate_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Coursegate startup banner.
fn print_banner() {
    println!(
        r#"
   ___                                   _
  / __\___  _   _ _ __ ___  ___  __ _  __ _| |_ ___
 / /  / _ \| | | | '__/ __|/ _ \/ _` |/ _` | __/ _ \
/ /__| (_) | |_| | |  \__ \  __/ (_| | (_| | ||  __/
\____/\___/ \__,_|_|  |___/\___|\__, |\__,_|\__\___|
                                |___/
  Course Access & Progress Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
