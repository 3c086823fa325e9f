//! Source stages: HEAD, temp allocation, streamed fetch.

use docconv_store::{ObjectStore, StoredObjectMeta};
use tracing::{debug, info};

use crate::error::RequestError;
use crate::request::ConversionRequest;
use crate::tempfiles::{ScopedTempFile, TempFileManager};

/// The source object exists and its metadata is known.
#[derive(Debug)]
pub struct SourceChecked {
    pub request: ConversionRequest,
    pub meta: StoredObjectMeta,
}

/// A scoped temp file is reserved for the source body.
#[derive(Debug)]
pub struct TempAllocated {
    pub request: ConversionRequest,
    pub meta: StoredObjectMeta,
    pub source_file: ScopedTempFile,
}

/// The source body is completely on disk.
#[derive(Debug)]
pub struct SourceFetched {
    pub request: ConversionRequest,
    pub meta: StoredObjectMeta,
    pub source_file: ScopedTempFile,
    pub bytes: u64,
}

/// Validated → SourceChecked.
pub async fn check_source(
    store: &dyn ObjectStore,
    request: ConversionRequest,
) -> Result<SourceChecked, RequestError> {
    let meta = store.head(&request.source).await.map_err(|e| {
        if e.is_not_found() {
            RequestError::SourceNotFound(e)
        } else {
            RequestError::SourceUnavailable(e)
        }
    })?;
    debug!(source = %request.source, etag = %meta.etag, "Source object found");
    Ok(SourceChecked { request, meta })
}

impl SourceChecked {
    /// SourceChecked → TempAllocated. The temp file keeps the source
    /// extension so the engine recognises the input format.
    pub async fn allocate_temp(self, temps: &TempFileManager) -> Result<TempAllocated, RequestError> {
        let source_file = temps
            .acquire(&self.request.extension)
            .await
            .map_err(RequestError::TempUnavailable)?;
        Ok(TempAllocated {
            request: self.request,
            meta: self.meta,
            source_file,
        })
    }
}

impl TempAllocated {
    /// TempAllocated → SourceFetched. Completes only once the whole body is
    /// written and flushed.
    pub async fn fetch(self, store: &dyn ObjectStore) -> Result<SourceFetched, RequestError> {
        let bytes = store
            .fetch_to_file(&self.request.source, self.source_file.path())
            .await
            .map_err(RequestError::SourceFetchFailed)?;
        info!(
            source = %self.request.source,
            bytes,
            file = %self.source_file.path().display(),
            "Source fetched"
        );
        Ok(SourceFetched {
            request: self.request,
            meta: self.meta,
            source_file: self.source_file,
            bytes,
        })
    }
}
