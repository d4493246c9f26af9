//! Destination parsing
//!
//! Turns a destination URL into an `object_store` implementation plus the
//! object path inside it. Credentials and endpoints come from the
//! environment via the builders' `from_env`, so the core stays free of
//! ad-hoc env reads.

use crate::error::{Error, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;

/// Object key used when a bucket URL carries no key
const DEFAULT_KEY: &str = "data.parquet";

/// A parsed output destination
#[derive(Debug, Clone)]
pub struct Destination {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Object path within the store
    path: ObjectPath,
    /// Original URL scheme for logging
    scheme: String,
    /// Canonical display form of the destination
    url: String,
}

impl Destination {
    /// Parse a destination URL and create the matching object store.
    ///
    /// Supported formats:
    /// - `s3://bucket/key` - AWS S3
    /// - `r2://bucket/key` - Cloudflare R2 (S3-compatible, endpoint from `R2_ENDPOINT_URL`)
    /// - `/local/path/file.parquet` or `./path/file.parquet` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url, false)
        } else if url.starts_with("r2://") {
            Self::parse_s3(url, true)
        } else {
            Self::parse_local(url)
        }
    }

    /// Parse S3 or R2 URL
    fn parse_s3(url: &str, is_r2: bool) -> Result<Self> {
        let scheme = if is_r2 { "r2" } else { "s3" };
        let without_scheme = url
            .strip_prefix(&format!("{scheme}://"))
            .ok_or_else(|| Error::config(format!("Invalid {scheme} URL: {url}")))?;

        let (bucket, key) = match without_scheme.find('/') {
            Some(idx) => (&without_scheme[..idx], &without_scheme[idx + 1..]),
            None => (without_scheme, ""),
        };
        if bucket.is_empty() {
            return Err(Error::config(format!("Missing bucket in {scheme} URL: {url}")));
        }
        let key = if key.is_empty() { DEFAULT_KEY } else { key };

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        // R2 endpoint: https://<account_id>.r2.cloudflarestorage.com
        // AWS_ENDPOINT is read automatically by from_env()
        if is_r2 {
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create {scheme} client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            path: ObjectPath::from(key),
            scheme: scheme.to_string(),
            url: format!("{scheme}://{bucket}/{key}"),
        })
    }

    /// Parse a local filesystem path
    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);
        let path = std::path::Path::new(path);

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::config(format!("Local destination has no file name: {}", path.display()))
            })?
            .to_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => std::path::Path::new("."),
        };

        std::fs::create_dir_all(dir).map_err(|e| {
            Error::config(format!("Failed to create directory {}: {e}", dir.display()))
        })?;

        let store = LocalFileSystem::new_with_prefix(dir)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            path: ObjectPath::from(file_name.as_str()),
            scheme: "file".to_string(),
            url: path.display().to_string(),
        })
    }

    /// Check if this is a remote destination (not local)
    pub fn is_remote(&self) -> bool {
        self.scheme != "file"
    }

    /// Get the scheme (s3, r2, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The object store implementation
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    /// Object path within the store
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Canonical display form of the destination
    pub fn url(&self) -> &str {
        &self.url
    }
}
