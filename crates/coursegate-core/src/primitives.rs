//! # Primitives
//!
//! Hardcoded runtime constants for the evaluator.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Value a course flag must hold to count as enabled.
///
/// Any other value, including the empty string, means disabled.
pub const FLAG_ENABLED: &str = "yes";

/// Value written for a disabled flag when exporting course configuration.
pub const FLAG_DISABLED: &str = "no";

/// Magic bytes for the dataset snapshot header.
///
/// - File Header = Magic Bytes ("CGAT") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"CGAT";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Scale used for integer completion percentages.
pub const PERCENT_SCALE: usize = 100;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of sections a single course may hold.
pub const MAX_SECTIONS_PER_COURSE: usize = 500;

/// Maximum number of lessons a single section may hold.
pub const MAX_LESSONS_PER_SECTION: usize = 500;

/// Maximum length for titles and notice texts.
pub const MAX_TEXT_LENGTH: usize = 65536;

/// Maximum number of records accepted in a single dataset load.
pub const MAX_DATASET_RECORDS: usize = 1_000_000;
