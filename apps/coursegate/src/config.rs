//! # Configuration
//!
//! Settings are resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`, or `coursegate.toml` when present)
//! 3. Environment variables
//!
//! ## Environment Variables
//!
//! - `COURSEGATE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all
//! - `COURSEGATE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `COURSEGATE_API_KEY`: If set, requires Bearer token authentication
//!
//! ## Example
//!
//! ```toml
//! database = "coursegate.db"
//! backend = "redb"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! rate_limit = 50
//! cors_origins = ["https://lms.example.com"]
//! ```

use coursegate_core::CourseGateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "coursegate.toml";

/// Maximum accepted size of a configuration file (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

// =============================================================================
// FILE LAYOUT
// =============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database path used when `--database` is not given.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Storage backend used when `--backend` is not given.
    #[serde(default)]
    pub backend: Option<String>,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. `None` means localhost only; `["*"]` allows all.
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,

    /// Requests per second; 0 disables rate limiting.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Bearer token required on every endpoint except `/health`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            api_key: None,
        }
    }
}

impl ServerSettings {
    /// Overlay `COURSEGATE_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var("COURSEGATE_CORS_ORIGINS") {
            self.cors_origins = Some(
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        if let Ok(raw) = std::env::var("COURSEGATE_RATE_LIMIT") {
            match raw.trim().parse() {
                Ok(rps) => self.rate_limit = rps,
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        "Ignoring unparsable COURSEGATE_RATE_LIMIT"
                    );
                }
            }
        }

        if let Ok(key) = std::env::var("COURSEGATE_API_KEY") {
            self.api_key = Some(key);
        }
        // An empty key disables authentication rather than accepting "".
        if self.api_key.as_deref().is_some_and(str::is_empty) {
            self.api_key = None;
        }
    }

    /// Socket address string for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Parse a configuration document.
    pub fn from_toml(raw: &str) -> Result<Self, CourseGateError> {
        toml::from_str(raw)
            .map_err(|e| CourseGateError::InvalidConfiguration(format!("Config file: {}", e)))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `coursegate.toml` in the
    /// working directory is read when present and defaults are used otherwise.
    /// Environment variables are applied last in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self, CourseGateError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::read_file(default)?
                } else {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.server.apply_env();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, CourseGateError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            CourseGateError::IoError(format!("Config file '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(CourseGateError::InvalidConfiguration(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            CourseGateError::IoError(format!("Config file '{}': {}", path.display(), e))
        })?;
        tracing::info!("Loaded configuration from {}", path.display());
        Self::from_toml(&raw)
    }
}

// =============================================================================
// TESTS
// =============================================================================
