//! Common types used throughout parquet-stream
//!
//! This module contains shared type definitions, type aliases,
//! and the summary types reported after a write session.

use crate::error::{Error, Result};
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// One row: a JSON object mapping column names to scalar values
pub type Record = serde_json::Map<String, JsonValue>;

// ============================================================================
// Compression Codec
// ============================================================================

/// Compression codec applied to every block in one output file.
///
/// Fixed for the lifetime of a stream; the default trades ratio for speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Fast default
    #[default]
    Snappy,
    /// Higher ratio, slower
    Zstd,
    /// Widely compatible
    Gzip,
    /// No compression
    Uncompressed,
}

impl Codec {
    /// Map to the parquet writer's compression setting
    pub fn to_parquet(self) -> Compression {
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Codec::Gzip => Compression::GZIP(GzipLevel::default()),
            Codec::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::Snappy => "snappy",
            Codec::Zstd => "zstd",
            Codec::Gzip => "gzip",
            Codec::Uncompressed => "uncompressed",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Codec::Snappy),
            "zstd" => Ok(Codec::Zstd),
            "gzip" => Ok(Codec::Gzip),
            "uncompressed" | "none" => Ok(Codec::Uncompressed),
            other => Err(Error::InvalidConfigValue {
                field: "compression".to_string(),
                message: format!("unknown codec '{other}' (snappy, zstd, gzip, uncompressed)"),
            }),
        }
    }
}

// ============================================================================
// Upload Mode
// ============================================================================

/// How the finished object reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// One atomic PUT at commit time (total size stayed below the part threshold)
    SinglePut,
    /// Multipart session: parts streamed out, assembled on complete
    Multipart,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::SinglePut => write!(f, "single_put"),
            UploadMode::Multipart => write!(f, "multipart"),
        }
    }
}

// ============================================================================
// Write Summary
// ============================================================================

/// Final statistics for one completed write session.
///
/// Produced by `StreamingBlockWriter::finish` after the upload session
/// committed, i.e. only once the object is durably visible.
#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    /// Total rows across all blocks
    pub row_count: u64,
    /// Number of encoded blocks (Parquet row groups)
    pub block_count: u64,
    /// Total bytes handed to the transport
    pub byte_size: u64,
    /// Codec used for every block
    pub codec: Codec,
    /// Wall-clock time from `start` to commit
    pub elapsed: Duration,
    /// Single PUT or multipart
    pub upload_mode: UploadMode,
    /// Number of uploaded parts (1 for a single PUT)
    pub part_count: u64,
    /// Handle of the committed object
    pub object: String,
}

impl WriteSummary {
    /// Average serialized bytes per row, for sizing diagnostics
    pub fn avg_row_bytes(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.byte_size as f64 / self.row_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_from_str() {
        assert_eq!(Codec::from_str("snappy").unwrap(), Codec::Snappy);
        assert_eq!(Codec::from_str("ZSTD").unwrap(), Codec::Zstd);
        assert_eq!(Codec::from_str("none").unwrap(), Codec::Uncompressed);
        assert!(Codec::from_str("lz77").is_err());
    }

    #[test]
    fn test_codec_roundtrips_display() {
        for codec in [Codec::Snappy, Codec::Zstd, Codec::Gzip, Codec::Uncompressed] {
            assert_eq!(Codec::from_str(&codec.to_string()).unwrap(), codec);
        }
    }

    #[test]
    fn test_avg_row_bytes() {
        let summary = WriteSummary {
            row_count: 100,
            block_count: 2,
            byte_size: 2500,
            codec: Codec::Snappy,
            elapsed: Duration::from_secs(1),
            upload_mode: UploadMode::SinglePut,
            part_count: 1,
            object: "data.parquet".to_string(),
        };
        assert!((summary.avg_row_bytes() - 25.0).abs() < f64::EPSILON);
    }
}
