//! Conversion stage: run the engine, read what it produced.

use docconv_store::StoredObjectMeta;
use tracing::{debug, warn};

use super::source::SourceFetched;
use crate::engine::job::{ConversionJobRunner, ConversionOutcome, FailureReason};
use crate::error::RequestError;
use crate::request::ConversionRequest;
use crate::tempfiles::{ScopedTempFile, TempFileManager};

/// The converted document is in memory.
#[derive(Debug)]
pub struct ConvertedRead {
    pub request: ConversionRequest,
    pub meta: StoredObjectMeta,
    pub source_file: ScopedTempFile,
    /// `None` when the engine wrote outside the source's directory (not ours
    /// to delete) or over the source file itself.
    pub converted_file: Option<ScopedTempFile>,
    /// Without the dot.
    pub converted_extension: String,
    pub body: Vec<u8>,
}

impl SourceFetched {
    /// SourceFetched → Converting → ConvertedRead.
    pub async fn convert(
        self,
        runner: &ConversionJobRunner,
        temps: &TempFileManager,
    ) -> Result<ConvertedRead, RequestError> {
        let outcome = runner
            .run(self.source_file.path(), &self.request.target_format)
            .await;

        let (converted_path, converted_extension) = match outcome {
            ConversionOutcome::Success {
                converted_path,
                converted_extension,
            } => (converted_path, converted_extension),
            ConversionOutcome::Failure {
                reason: FailureReason::SpawnFailed(detail),
            } => return Err(RequestError::EngineNotStarted(detail)),
            ConversionOutcome::Failure { reason } => {
                return Err(RequestError::NoConvertedDocument(reason))
            }
        };

        // Adopt before reading so a failed read still cleans up.
        let source_path = self.source_file.path();
        let converted_file = if converted_path.as_path() == source_path {
            // Same format in and out: the source temp file already owns it.
            None
        } else if converted_path.parent() == source_path.parent() {
            Some(temps.adopt(&converted_path))
        } else {
            warn!(
                path = %converted_path.display(),
                "Engine wrote outside the temp directory; leaving the file in place"
            );
            None
        };

        let body = tokio::fs::read(&converted_path)
            .await
            .map_err(|source| RequestError::ConvertedReadFailed {
                path: converted_path.clone(),
                source,
            })?;
        debug!(path = %converted_path.display(), bytes = body.len(), "Converted document read");

        Ok(ConvertedRead {
            request: self.request,
            meta: self.meta,
            source_file: self.source_file,
            converted_file,
            converted_extension,
            body,
        })
    }
}
