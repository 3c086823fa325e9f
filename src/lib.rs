//! # docconv-bridge
//!
//! HTTP bridge that converts documents stored in S3-compatible object
//! storage through an external conversion engine (unoconv / LibreOffice).
//!
//! One request names a source object and a target format; the bridge
//! downloads the object, lets the engine convert it, uploads the result and
//! answers with a JSON envelope describing the outcome.
//!
//! ## Pipeline Overview
//!
//! ```text
//! GET /<bucket>/<key>?format=pdf[&dbucket=..][&dkey=..]
//!  │
//!  ├─ 1. Validate   bucket, key and format present        (codes 1, 2)
//!  ├─ 2. Check      HEAD on the source object             (codes 3, 4)
//!  ├─ 3. Allocate   scoped temp file keyed by extension   (code 5)
//!  ├─ 4. Fetch      stream the body into the temp file    (code 6)
//!  ├─ 5. Convert    engine subprocess + output marker     (codes 7, 8, 9)
//!  ├─ 6. Store      PUT with merged metadata              (code 10)
//!  └─ 7. Respond    { code: 0, result: { key, bucket, data, metadata } }
//! ```
//!
//! Next to the request path, a [`ListenerSupervisor`] keeps the engine's
//! long-running listener alive so that each conversion does not have to
//! boot an office suite.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docconv_bridge::{BridgeConfig, RequestPipeline};
//! use docconv_bridge::request::ConversionParams;
//! use docconv_store::{S3ObjectStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(S3ObjectStore::new(&StoreConfig::from_env()?));
//!     let config = BridgeConfig::default();
//!     let pipeline = RequestPipeline::from_config(store, &config);
//!
//!     let envelope = pipeline
//!         .handle("/docs/report.docx", ConversionParams::with_format("pdf"))
//!         .await;
//!     println!("{}: {}", envelope.code, envelope.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv-bridge` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;
pub mod tempfiles;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BridgeConfig, BridgeConfigBuilder, ProbeKind};
pub use convert::RequestPipeline;
pub use engine::job::{ConversionJobRunner, ConversionOutcome, FailureReason};
pub use engine::supervisor::{ListenerStatus, ListenerSupervisor, RestartPolicy};
pub use engine::EngineCommand;
pub use error::{BridgeError, RequestError};
pub use response::{ConversionResult, ResponseEnvelope, ResultCode};
pub use tempfiles::{ScopedTempFile, TempFileManager};
