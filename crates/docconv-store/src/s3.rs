//! S3-compatible backend over the AWS SDK.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{ObjectLocation, ObjectStore, PutObject, PutReceipt, StoreConfig, StoreError, StoredObjectMeta};

/// Provider error codes that mean "the object is not there".
const NOT_FOUND_CODES: &[&str] = &["NotFound", "NoSuchKey", "NoSuchBucket"];

/// [`ObjectStore`] backed by an S3-compatible service.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from static credentials and endpoint settings.
    ///
    /// No request is made here; connectivity problems surface on the first
    /// operation.
    pub fn new(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "docconv-bridge",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = config.resolved_endpoint() {
            debug!(%endpoint, "using custom object store endpoint");
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, location: &ObjectLocation) -> Result<StoredObjectMeta, StoreError> {
        let out = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| map_sdk_error(location, e))?;

        Ok(StoredObjectMeta {
            etag: out.e_tag().unwrap_or_default().to_string(),
            metadata: out.metadata().cloned().unwrap_or_default(),
            content_length: out.content_length(),
            content_type: out.content_type().map(str::to_string),
        })
    }

    async fn fetch_to_file(&self, location: &ObjectLocation, dest: &Path) -> Result<u64, StoreError> {
        let out = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| map_sdk_error(location, e))?;

        let io_err = |source| StoreError::Io {
            location: location.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut body = out.body;
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await.map_err(|e| StoreError::Provider {
            location: location.clone(),
            status: None,
            code: None,
            message: format!("body stream interrupted: {e}"),
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        debug!(%location, bytes = written, dest = %dest.display(), "object fetched");
        Ok(written)
    }

    async fn put(&self, object: PutObject) -> Result<PutReceipt, StoreError> {
        let PutObject {
            location,
            body,
            metadata,
            content_type,
        } = object;

        let out = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(body))
            .set_metadata(Some(metadata))
            .set_content_type(content_type)
            .send()
            .await
            .map_err(|e| map_sdk_error(&location, e))?;

        Ok(PutReceipt {
            etag: out.e_tag().map(str::to_string),
            version_id: out.version_id().map(str::to_string),
        })
    }
}

/// Classify an SDK error into [`StoreError`], keeping the provider's
/// HTTP status, error code and message.
fn map_sdk_error<E>(location: &ObjectLocation, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);

    let not_found = status == Some(404)
        || code
            .as_deref()
            .is_some_and(|c| NOT_FOUND_CODES.contains(&c));
    if not_found {
        return StoreError::NotFound {
            location: location.clone(),
            status,
        };
    }

    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    StoreError::Provider {
        location: location.clone(),
        status,
        code,
        message,
    }
}
