//! # Snapshot Format
//!
//! Binary serialization for datasets.
//!
//! File I/O happens in the app layer; this module only transforms bytes.
//!
//! Format: Header (5 bytes) + postcard-serialized [`Dataset`].
//! - 4 bytes: Magic ("CGAT")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded, so a
//! corrupted or hostile file cannot force a large allocation.

use crate::formats::Dataset;
use crate::{CourseGateError, primitives};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed snapshot size in bytes.
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 500 * 1024 * 1024; // 500 MB

/// Header length: magic + version.
const HEADER_LEN: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The snapshot header precedes all dataset bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), CourseGateError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(CourseGateError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(CourseGateError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CourseGateError> {
        let Some(head) = bytes.get(..HEADER_LEN) else {
            return Err(CourseGateError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a dataset to bytes (header + payload).
pub fn dataset_to_bytes(dataset: &Dataset) -> Result<Vec<u8>, CourseGateError> {
    let header = PersistenceHeader::new();

    let payload = postcard::to_stdvec(dataset)
        .map_err(|e| CourseGateError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);

    Ok(result)
}

/// Deserialize a dataset from bytes.
///
/// Validates, in order: minimum size, maximum size, header magic and
/// version. The payload is only decoded once all three pass.
pub fn dataset_from_bytes(bytes: &[u8]) -> Result<Dataset, CourseGateError> {
    if bytes.len() < HEADER_LEN {
        return Err(CourseGateError::DeserializationError(format!(
            "Data too short: minimum {HEADER_LEN} bytes required"
        )));
    }

    if bytes.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(CourseGateError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        CourseGateError::DeserializationError(format!("Failed to decode dataset: {e}"))
    })
}

// =============================================================================
// CHECKSUMS
// =============================================================================

/// Deterministic 64-bit checksum (FNV-1a) of snapshot bytes.
///
/// Detects accidental corruption only. It is not collision resistant; use
/// [`compute_blake3_hash`] where tampering matters.
#[must_use]
pub fn snapshot_checksum(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    bytes.iter().fold(OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(PRIME)
    })
}

/// Compute a BLAKE3 hash of raw bytes as a 64-character hex string.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CourseMeta, EntityId, Section};

    fn sample() -> Dataset {
        Dataset {
            courses: vec![CourseMeta {
                id: 1,
                title: "Intro".to_string(),
                time_period: "yes".to_string(),
                start_date: "2024-01-01".to_string(),
                ..CourseMeta::default()
            }],
            sections: vec![Section::new(EntityId(10), EntityId(1), "Basics", 1)],
            ..Dataset::default()
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = PersistenceHeader::new();
        let restored = PersistenceHeader::from_bytes(&header.to_bytes()).expect("parse header");
        assert_eq!(restored, header);
        assert!(restored.validate().is_ok());
    }

    #[test]
    fn bytes_are_stable_across_reload() {
        let bytes1 = dataset_to_bytes(&sample()).expect("first serialize");
        let restored = dataset_from_bytes(&bytes1).expect("deserialize");
        let bytes2 = dataset_to_bytes(&restored).expect("second serialize");

        assert_eq!(
            bytes1, bytes2,
            "save -> load -> save must produce identical bytes"
        );
        assert_eq!(snapshot_checksum(&bytes1), snapshot_checksum(&bytes2));
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(dataset_from_bytes(&bytes).is_err());
    }

    #[test]
    fn future_version_rejected() {
        let mut bytes = dataset_to_bytes(&sample()).expect("serialize");
        bytes[4] = primitives::FORMAT_VERSION + 1;
        assert!(dataset_from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_data_rejected() {
        assert!(dataset_from_bytes(b"CGA").is_err());
    }

    #[test]
    fn checksum_detects_single_bit_flip() {
        let bytes = dataset_to_bytes(&sample()).expect("serialize");
        let mut corrupted = bytes.clone();
        if let Some(last) = corrupted.last_mut() {
            *last ^= 1;
        }
        assert_ne!(snapshot_checksum(&bytes), snapshot_checksum(&corrupted));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn blake3_hash_is_hex() {
        let hash = compute_blake3_hash(b"coursegate");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_blake3_hash(b"coursegate"));
    }
}
