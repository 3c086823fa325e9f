//! Request orchestration.
//!
//! [`RequestPipeline::handle`] turns one HTTP request into exactly one
//! [`ResponseEnvelope`]. The stages run strictly in order and the first
//! failure ends the request with its response code; nothing is retried here.

use std::sync::Arc;

use docconv_store::ObjectStore;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::engine::job::ConversionJobRunner;
use crate::error::RequestError;
use crate::pipeline::{check_source, Stored};
use crate::request::{ConversionParams, ConversionRequest};
use crate::response::{Overrides, PendingResponse, ResponseEnvelope, ResultCode};
use crate::tempfiles::TempFileManager;

/// Everything a request needs; shared by all requests.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    store: Arc<dyn ObjectStore>,
    temps: TempFileManager,
    runner: ConversionJobRunner,
}

impl RequestPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, temps: TempFileManager, runner: ConversionJobRunner) -> Self {
        Self {
            store,
            temps,
            runner,
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &BridgeConfig) -> Self {
        Self::new(store, config.temp_files(), config.job_runner())
    }

    /// Handle one request.
    ///
    /// `raw_path` is the request path as received (percent-encoded).
    pub async fn handle(&self, raw_path: &str, params: ConversionParams) -> ResponseEnvelope {
        let pending = PendingResponse::begin();

        match self.execute(raw_path, params).await {
            Ok(stored) => {
                let envelope = pending.send(ResultCode::Complete, Overrides::default(), Some(stored.result.clone()));
                // The envelope is final; cleanup can only log.
                stored.release_temp_files().await;
                info!(
                    code = envelope.code,
                    exec_time = envelope.exec_time,
                    "Conversion complete"
                );
                envelope
            }
            Err(e) => {
                let code = e.code();
                match code {
                    ResultCode::MissingSourcePath | ResultCode::MissingFormat => {
                        info!(code = code.as_i64(), path = raw_path, "Rejected request: {}", e)
                    }
                    _ => warn!(code = code.as_i64(), path = raw_path, "Request failed: {}", e),
                }
                pending.send(code, e.overrides(), None)
            }
        }
    }

    async fn execute(&self, raw_path: &str, params: ConversionParams) -> Result<Stored, RequestError> {
        // ── Step 1: Validate ─────────────────────────────────────────────────
        let request = ConversionRequest::validate(raw_path, params)?;
        info!(
            bucket = %request.source.bucket,
            key = %request.source.key,
            format = %request.target_format,
            "Conversion requested"
        );

        // ── Step 2: Check the source object ──────────────────────────────────
        let checked = check_source(self.store.as_ref(), request).await?;

        // ── Step 3: Allocate the source temp file ────────────────────────────
        let allocated = checked.allocate_temp(&self.temps).await?;

        // ── Step 4: Fetch the source body ────────────────────────────────────
        let fetched = allocated.fetch(self.store.as_ref()).await?;

        // ── Step 5: Convert and read the result ──────────────────────────────
        let converted = fetched.convert(&self.runner, &self.temps).await?;

        // ── Step 6: Store the converted document ─────────────────────────────
        converted.store(self.store.as_ref()).await
    }
}
