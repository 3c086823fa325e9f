//! # docconv-store
//!
//! The object-store contract used by `docconv-bridge`: look up an object's
//! metadata, stream its bytes to a local file, and store a new object with
//! user metadata.
//!
//! ## Backends
//!
//! | Type | Backend |
//! |------|---------|
//! | [`S3ObjectStore`] | AWS S3 and S3-compatible services (MinIO, R2, Ceph, ...) |
//! | [`MemoryObjectStore`] | In-process map, for tests and local experiments |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docconv_store::{ObjectLocation, ObjectStore, S3ObjectStore, StoreConfig};
//!
//! # async fn run() -> Result<(), docconv_store::StoreError> {
//! let config = StoreConfig::from_env()?;
//! let store = S3ObjectStore::new(&config);
//!
//! let meta = store.head(&ObjectLocation::new("docs", "report.docx")).await?;
//! println!("etag = {}", meta.etag);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment variables
//!
//! - `AWS_ACCESS_KEY`: access key id (required)
//! - `AWS_SECRET`: secret access key (required)
//! - `AWS_ENDPOINT`: custom endpoint, with or without scheme
//! - `AWS_REGION`: region, default `us-east-1`
//! - `AWS_S3FORCEPATHSTYLE`: `true` enables path-style addressing
//! - `AWS_SSLENABLED`: `false` switches the endpoint to plain HTTP

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Region used when `AWS_REGION` is not set.
pub const DEFAULT_REGION: &str = "us-east-1";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by object-store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object (or its bucket) does not exist.
    #[error("object not found: {location}")]
    NotFound {
        location: ObjectLocation,
        /// HTTP status reported by the provider, when there was a response.
        status: Option<u16>,
    },

    /// The provider answered with an error other than not-found, or could
    /// not be reached at all.
    #[error("object store error for {location}: {message}")]
    Provider {
        location: ObjectLocation,
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Local file I/O while streaming an object body.
    #[error("I/O error while transferring {location}: {source}")]
    Io {
        location: ObjectLocation,
        #[source]
        source: std::io::Error,
    },

    /// A required credential is missing from the configuration.
    #[error("missing {0}: please, set it")]
    MissingCredential(&'static str),
}

impl StoreError {
    /// HTTP status reported by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::NotFound { status, .. } | StoreError::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// Provider error code (e.g. `AccessDenied`), if any.
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            StoreError::Provider { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Human-readable provider message, if any.
    pub fn provider_message(&self) -> Option<&str> {
        match self {
            StoreError::Provider { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// ── Data types ───────────────────────────────────────────────────────────────

/// Bucket + key coordinates of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Metadata of a stored object, as returned by a HEAD request.
///
/// `etag` is kept exactly as the provider sent it, quotes included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObjectMeta {
    pub etag: String,
    pub metadata: HashMap<String, String>,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
}

/// Provider response to a successful PUT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutReceipt {
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "VersionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// An object to be written.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub location: ObjectLocation,
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
}

// ── Store contract ───────────────────────────────────────────────────────────

/// Fetch/store operations on named objects.
///
/// Implementations must be cheap to share behind an `Arc`; every request of
/// the bridge holds one reference.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Look up an object's metadata without transferring its body.
    async fn head(&self, location: &ObjectLocation) -> Result<StoredObjectMeta, StoreError>;

    /// Stream an object's body into the file at `dest`, truncating it.
    /// Returns the number of bytes written.
    async fn fetch_to_file(&self, location: &ObjectLocation, dest: &Path) -> Result<u64, StoreError>;

    /// Store an object, overwriting any existing object at the same location.
    async fn put(&self, object: PutObject) -> Result<PutReceipt, StoreError>;
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Connection settings for an S3-compatible store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
    pub tls_enabled: bool,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .field("tls_enabled", &self.tls_enabled)
            .finish()
    }
}

impl StoreConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let access_key = get("AWS_ACCESS_KEY").ok_or(StoreError::MissingCredential("AWS_ACCESS_KEY"))?;
        let secret_key = get("AWS_SECRET").ok_or(StoreError::MissingCredential("AWS_SECRET"))?;

        Ok(Self {
            access_key,
            secret_key,
            endpoint: get("AWS_ENDPOINT"),
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            force_path_style: get("AWS_S3FORCEPATHSTYLE").as_deref() == Some("true"),
            tls_enabled: get("AWS_SSLENABLED").as_deref() != Some("false"),
        })
    }

    /// The endpoint URL handed to the SDK, if it must be overridden.
    ///
    /// A scheme-less endpoint gets `https://` or `http://` depending on
    /// `tls_enabled`. Without a custom endpoint, disabling TLS points the
    /// client at the regional AWS endpoint over plain HTTP.
    pub fn resolved_endpoint(&self) -> Option<String> {
        let scheme = if self.tls_enabled { "https" } else { "http" };
        match self.endpoint.as_deref() {
            Some(e) if e.contains("://") => Some(e.to_string()),
            Some(e) => Some(format!("{scheme}://{e}")),
            None if !self.tls_enabled => Some(format!("http://s3.{}.amazonaws.com", self.region)),
            None => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
