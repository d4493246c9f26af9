//! Configuration for the write pipeline
//!
//! All tunables are collected once into an explicit [`AppConfig`] that is
//! passed into constructors. The core never reads environment variables on
//! its own, so it stays testable without environment mutation. S3
//! credentials are the transport's concern and are picked up by
//! `object_store`'s `from_env` builders (see `store.rs`).

use crate::error::{Error, Result};
use crate::types::Codec;
use std::str::FromStr;

mod defaults {
    /// Total records to generate when none is specified
    pub const NUM_RECORDS: usize = 100_000;
    /// Target encoded size of one block (row group)
    pub const BLOCK_SIZE_MB: usize = 1;
    /// Multipart part threshold; 5 MB is the S3 minimum part size
    pub const PART_SIZE_MB: usize = 5;
    /// Where the file lands when no destination is given
    pub const OUTPUT_URL: &str = "./output/data.parquet";
    /// Generator seed, for reproducible runs
    pub const SEED: u64 = 42;
}

/// Pipeline configuration, sourced from the environment with CLI overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Number of fake records to generate
    pub num_records: usize,
    /// Target encoded block size in megabytes
    pub block_size_mb: usize,
    /// Multipart part-size threshold in megabytes
    pub part_size_mb: usize,
    /// Compression codec for every block
    pub codec: Codec,
    /// Destination URL (`s3://bucket/key`, `r2://bucket/key`, or a local path)
    pub output: String,
    /// Seed for the fake record generator
    pub seed: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            num_records: defaults::NUM_RECORDS,
            block_size_mb: defaults::BLOCK_SIZE_MB,
            part_size_mb: defaults::PART_SIZE_MB,
            codec: Codec::default(),
            output: defaults::OUTPUT_URL.to_string(),
            seed: defaults::SEED,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `NUM_RECORDS`, `BLOCK_SIZE_MB`, `PART_SIZE_MB`,
    /// `PARQUET_COMPRESSION`, `OUTPUT_URL`, `GENERATOR_SEED`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            num_records: env_parse("NUM_RECORDS", defaults::NUM_RECORDS)?,
            block_size_mb: env_parse("BLOCK_SIZE_MB", defaults::BLOCK_SIZE_MB)?,
            part_size_mb: env_parse("PART_SIZE_MB", defaults::PART_SIZE_MB)?,
            codec: match std::env::var("PARQUET_COMPRESSION") {
                Ok(value) => Codec::from_str(&value)?,
                Err(_) => Codec::default(),
            },
            output: std::env::var("OUTPUT_URL")
                .unwrap_or_else(|_| defaults::OUTPUT_URL.to_string()),
            seed: env_parse("GENERATOR_SEED", defaults::SEED)?,
        })
    }

    /// Target block size in bytes
    pub fn block_size_bytes(&self) -> usize {
        self.block_size_mb * 1024 * 1024
    }

    /// Part-size threshold in bytes
    pub fn part_size_bytes(&self) -> usize {
        self.part_size_mb * 1024 * 1024
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.block_size_mb == 0 {
            return Err(Error::InvalidConfigValue {
                field: "block_size_mb".to_string(),
                message: "block size must be at least 1 MB".to_string(),
            });
        }
        if self.part_size_mb == 0 {
            return Err(Error::InvalidConfigValue {
                field: "part_size_mb".to_string(),
                message: "part size must be at least 1 MB".to_string(),
            });
        }
        if self.output.trim().is_empty() {
            return Err(Error::InvalidConfigValue {
                field: "output".to_string(),
                message: "destination must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse an environment variable, or fall back to a default when unset
fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) => value.parse::<T>().map_err(|_| Error::InvalidConfigValue {
            field: name.to_string(),
            message: format!("could not parse '{value}'"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.num_records, 100_000);
        assert_eq!(config.block_size_bytes(), 1024 * 1024);
        assert_eq!(config.part_size_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.codec, Codec::Snappy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = AppConfig {
            block_size_mb: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            part_size_mb: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_output() {
        let config = AppConfig {
            output: "  ".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
