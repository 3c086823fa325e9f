//! Destination stage: naming, metadata merge, store.

use std::collections::HashMap;

use docconv_store::{ObjectLocation, ObjectStore, PutObject};
use tracing::info;

use super::conversion::ConvertedRead;
use crate::error::RequestError;
use crate::request::{replace_extension, ConversionRequest};
use crate::response::ConversionResult;
use crate::tempfiles::ScopedTempFile;

/// Metadata key carrying the source object's content hash.
pub const MASTER_DOC_MD5: &str = "masterDocMD5";

/// Metadata key whose value is a file name.
pub const NAME_KEY: &str = "name";

/// The converted document is stored; only cleanup is left.
#[derive(Debug)]
pub struct Stored {
    pub result: ConversionResult,
    pub source_file: ScopedTempFile,
    pub converted_file: Option<ScopedTempFile>,
}

/// Destination bucket and key: overrides win, otherwise the source bucket
/// and the source key with the converted extension.
pub fn destination_location(request: &ConversionRequest, converted_extension: &str) -> ObjectLocation {
    let bucket = request
        .dest_bucket
        .clone()
        .unwrap_or_else(|| request.source.bucket.clone());
    let key = request
        .dest_key
        .clone()
        .unwrap_or_else(|| replace_extension(&request.source.key, converted_extension));
    ObjectLocation::new(bucket, key)
}

/// Source metadata plus `masterDocMD5`, with a non-empty `name` renamed to
/// the converted extension.
pub fn merge_metadata(
    source: &HashMap<String, String>,
    etag: &str,
    converted_extension: &str,
) -> HashMap<String, String> {
    let mut metadata = source.clone();
    metadata.insert(MASTER_DOC_MD5.to_string(), strip_etag_quotes(etag).to_string());
    if let Some(name) = metadata.get_mut(NAME_KEY) {
        if !name.is_empty() {
            *name = replace_extension(name, converted_extension);
        }
    }
    metadata
}

/// Remove one leading and one trailing `"`.
pub fn strip_etag_quotes(etag: &str) -> &str {
    let etag = etag.strip_prefix('"').unwrap_or(etag);
    etag.strip_suffix('"').unwrap_or(etag)
}

impl ConvertedRead {
    /// ConvertedRead → Stored. An existing object at the destination is
    /// overwritten.
    pub async fn store(self, store: &dyn ObjectStore) -> Result<Stored, RequestError> {
        let location = destination_location(&self.request, &self.converted_extension);
        let metadata = merge_metadata(&self.meta.metadata, &self.meta.etag, &self.converted_extension);

        let data = store
            .put(PutObject {
                location: location.clone(),
                body: self.body,
                metadata: metadata.clone(),
                content_type: None,
            })
            .await
            .map_err(|source| RequestError::StoreFailed {
                location: location.clone(),
                source,
            })?;

        info!(destination = %location, etag = ?data.etag, "Converted document stored");

        Ok(Stored {
            result: ConversionResult {
                key: location.key,
                bucket: location.bucket,
                data,
                metadata,
            },
            source_file: self.source_file,
            converted_file: self.converted_file,
        })
    }
}

impl Stored {
    /// Delete both temp files; failures are only logged.
    pub async fn release_temp_files(self) {
        self.source_file.release().await;
        if let Some(converted) = self.converted_file {
            converted.release().await;
        }
    }
}
