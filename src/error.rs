//! Error types for the docconv-bridge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BridgeError`] is **fatal**: the service cannot run at all (missing
//!   object-store credentials, the conversion listener cannot be spawned,
//!   the liveness probe itself fails). The binary exits with status 1.
//!
//! * [`RequestError`] is **non-fatal**: one request failed at one stage of
//!   the pipeline. Each variant maps 1:1 to a response code (1..10) and is
//!   turned into a [`crate::response::ResponseEnvelope`] for the client; the
//!   service keeps serving.

use std::net::SocketAddr;
use std::path::PathBuf;

use docconv_store::{ObjectLocation, StoreError};
use thiserror::Error;

use crate::engine::job::FailureReason;
use crate::response::{Overrides, ResultCode};

/// All fatal errors of the bridge service.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object-store configuration is incomplete (missing credentials).
    #[error("Object store configuration: {0}")]
    Store(#[from] StoreError),

    // ── Listener errors ───────────────────────────────────────────────────
    /// The long-running conversion listener could not be spawned.
    #[error("{name} can't be started ('{program}'): {source}")]
    ListenerSpawnFailed {
        name: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The liveness check could not determine whether the listener runs.
    #[error("Listener liveness check failed: {0}")]
    ProbeFailed(String),

    /// The listener kept exiting and the restart budget is exhausted.
    #[error("{name} exited {attempts} times in a row; giving up")]
    ListenerGaveUp { name: String, attempts: u32 },

    // ── HTTP errors ───────────────────────────────────────────────────────
    /// The HTTP listening socket could not be bound.
    #[error("Failed to bind HTTP server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("HTTP server error: {0}")]
    Server(#[source] std::io::Error),
}

/// A failed request, one variant per response code.
///
/// Produced by the stage that failed; the pipeline stops at the first one.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Code 1: the path does not name a bucket and a key.
    #[error("missing source object path")]
    MissingSourcePath,

    /// Code 2: the `format` query parameter is missing or empty.
    #[error("missing destination format")]
    MissingFormat,

    /// Code 3: HEAD on the source object reported not-found.
    #[error("source object not found: {0}")]
    SourceNotFound(#[source] StoreError),

    /// Code 4: HEAD on the source object failed for another reason.
    #[error("source object unavailable: {0}")]
    SourceUnavailable(#[source] StoreError),

    /// Code 5: the scoped temporary file could not be created.
    #[error("temporary data can't be instantiated: {0}")]
    TempUnavailable(#[source] std::io::Error),

    /// Code 6: the source body could not be streamed into the temp file.
    #[error("source datablock can't be retrieved: {0}")]
    SourceFetchFailed(#[source] StoreError),

    /// Code 7: the engine reported a converted file that cannot be read.
    #[error("converted datablock '{path}' can't be read: {source}")]
    ConvertedReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Code 8: the conversion subprocess could not be spawned.
    #[error("conversion process can't be started: {0}")]
    EngineNotStarted(String),

    /// Code 9: the conversion subprocess ran but produced no document.
    #[error("conversion process didn't create a converted document: {0}")]
    NoConvertedDocument(FailureReason),

    /// Code 10: the converted document could not be stored.
    #[error("converted datablock can't be stored at {location}: {source}")]
    StoreFailed {
        location: ObjectLocation,
        #[source]
        source: StoreError,
    },
}

impl RequestError {
    /// Response code for this failure.
    pub fn code(&self) -> ResultCode {
        match self {
            RequestError::MissingSourcePath => ResultCode::MissingSourcePath,
            RequestError::MissingFormat => ResultCode::MissingFormat,
            RequestError::SourceNotFound(_) => ResultCode::SourceNotFound,
            RequestError::SourceUnavailable(_) => ResultCode::SourceUnavailable,
            RequestError::TempUnavailable(_) => ResultCode::TempUnavailable,
            RequestError::SourceFetchFailed(_) => ResultCode::SourceFetchFailed,
            RequestError::ConvertedReadFailed { .. } => ResultCode::ConvertedReadFailed,
            RequestError::EngineNotStarted(_) => ResultCode::EngineNotStarted,
            RequestError::NoConvertedDocument(_) => ResultCode::NoConvertedDocument,
            RequestError::StoreFailed { .. } => ResultCode::StoreFailed,
        }
    }

    /// What the client gets to see beyond the code-derived defaults.
    ///
    /// Only storage-read failures surface provider details: the provider's
    /// HTTP status for not-found, and status, error code and message for any
    /// other HEAD failure. Everything else stays in the server log.
    pub fn overrides(&self) -> Overrides {
        match self {
            RequestError::SourceNotFound(e) => Overrides {
                status: e.status(),
                ..Overrides::default()
            },
            RequestError::SourceUnavailable(e) => Overrides {
                status: e.status(),
                status_text: e.provider_code().map(str::to_string),
                message: e.provider_message().map(str::to_string),
            },
            _ => Overrides::default(),
        }
    }
}
