//! Error types for parquet-stream
//!
//! This module defines the error taxonomy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for parquet-stream
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    // ============================================================================
    // Encoding Errors
    // ============================================================================
    #[error("Schema mismatch on field '{field}': expected {expected}, got {actual}")]
    SchemaMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Encoding failed: {message}")]
    Encoding { message: String },

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    // ============================================================================
    // Stream / Session State Errors
    // ============================================================================
    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    #[error("No blocks were written; refusing to finalize an empty file")]
    EmptyStream,

    // ============================================================================
    // Record Source Errors
    // ============================================================================
    #[error("Record generation failed: {message}")]
    Generate { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a record generation error
    pub fn generate(message: impl Into<String>) -> Self {
        Self::Generate {
            message: message.into(),
        }
    }

    /// Check if this error is retryable at the transport layer.
    ///
    /// Only sink failures qualify; schema and protocol errors are fatal to
    /// the stream no matter how often they are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::ObjectStore(_))
    }
}

/// Result type alias for parquet-stream
pub type Result<T> = std::result::Result<T, Error>;
