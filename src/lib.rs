//! # parquet-stream
//!
//! Streams generated tabular records into block-structured Parquet files
//! and uploads them to an S3-style object store, choosing between a single
//! atomic PUT for small files and a multipart session for large ones.
//!
//! ## Pipeline
//!
//! ```text
//! records ──► Batcher ──► size estimate (first records only)
//!                │
//!                ▼
//!     StreamingBlockWriter ── one Parquet row group per batch
//!                │
//!                ▼ bytes
//!       PartUploadSession ── single PUT below the part threshold,
//!                │           multipart above it
//!                ▼
//!        ObjectTransport (object_store: S3, R2, local)
//! ```
//!
//! The object becomes visible only when the upload session commits; an
//! aborted or failed session leaves nothing readable behind.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use parquet_stream::{config::AppConfig, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> parquet_stream::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let summary = pipeline::run(&config).await?;
//!     println!("wrote {} rows in {} blocks", summary.row_count, summary.block_count);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Pipeline configuration
pub mod config;

/// Fake record generation
pub mod generate;

/// Record batching
pub mod batch;

/// Block size estimation
pub mod estimate;

/// Schema inference and record conversion
pub mod schema;

/// Streaming block writer
pub mod writer;

/// Part-based upload session and transports
pub mod upload;

/// Destination parsing
pub mod store;

/// End-to-end write pipeline
pub mod pipeline;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::{Codec, Record, UploadMode, WriteSummary};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
