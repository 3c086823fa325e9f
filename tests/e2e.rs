//! End-to-end tests against a real object store and a real unoconv.
//!
//! These tests upload a small document, convert it through the full
//! pipeline and read the converted object back. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 E2E_BUCKET=docconv-test AWS_ACCESS_KEY=... AWS_SECRET=... \
//!     cargo test --test e2e -- --nocapture
//!
//! Against a local MinIO add:
//!   AWS_ENDPOINT=localhost:9000 AWS_S3FORCEPATHSTYLE=true AWS_SSLENABLED=false

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use docconv_bridge::request::ConversionParams;
use docconv_bridge::{BridgeConfig, RequestPipeline};
use docconv_store::{ObjectLocation, ObjectStore, PutObject, S3ObjectStore, StoreConfig};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED and E2E_BUCKET are set; yields the bucket.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match std::env::var("E2E_BUCKET") {
            Ok(bucket) if !bucket.is_empty() => bucket,
            _ => {
                println!("SKIP: set E2E_BUCKET to a writable bucket");
                return;
            }
        }
    }};
}

fn unique_key(stem: &str, ext: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("docconv-e2e/{stem}-{nanos}.{ext}")
}

fn store() -> Arc<S3ObjectStore> {
    let config = StoreConfig::from_env().expect("AWS_ACCESS_KEY / AWS_SECRET must be set");
    Arc::new(S3ObjectStore::new(&config))
}

fn pipeline(store: Arc<S3ObjectStore>) -> RequestPipeline {
    let config = BridgeConfig::builder()
        .job_timeout(Some(Duration::from_secs(120)))
        .build()
        .unwrap();
    RequestPipeline::from_config(store, &config)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_txt_to_pdf_round_trip() {
    let bucket = e2e_skip_unless_ready!();
    let store = store();

    let key = unique_key("hello", "txt");
    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), "hello.txt".to_string());
    let receipt = store
        .put(PutObject {
            location: ObjectLocation::new(&bucket, &key),
            body: b"Hello from docconv-bridge\n".to_vec(),
            metadata,
            content_type: Some("text/plain".into()),
        })
        .await
        .expect("upload source");
    let source_etag = receipt.etag.unwrap_or_default();

    let envelope = pipeline(store.clone())
        .handle(&format!("/{bucket}/{key}"), ConversionParams::with_format("pdf"))
        .await;
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap());
    assert_eq!(envelope.code, 0, "{}", envelope.text);

    let result = envelope.result.unwrap();
    assert!(result.key.ends_with(".pdf"));
    assert_eq!(result.metadata["name"], "hello.pdf");
    assert_eq!(result.metadata["masterDocMD5"], source_etag.trim_matches('"'));

    let converted = store
        .head(&ObjectLocation::new(&result.bucket, &result.key))
        .await
        .expect("converted object exists");
    assert!(converted.content_length.unwrap_or_default() > 0);
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let bucket = e2e_skip_unless_ready!();
    let envelope = pipeline(store())
        .handle(
            &format!("/{bucket}/{}", unique_key("missing", "docx")),
            ConversionParams::with_format("pdf"),
        )
        .await;
    assert_eq!(envelope.code, 3);
}
