//! HTTP surface: one method-agnostic endpoint, `/<bucket>/<key...>`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::Uri;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::convert::RequestPipeline;
use crate::error::BridgeError;
use crate::request::ConversionParams;
use crate::response::ResponseEnvelope;

/// Router sending every request, whatever its method or path, through the
/// pipeline.
pub fn router(pipeline: Arc<RequestPipeline>) -> Router {
    Router::new()
        .fallback(convert_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn convert_handler(
    State(pipeline): State<Arc<RequestPipeline>>,
    uri: Uri,
    params: Option<Query<ConversionParams>>,
) -> ResponseEnvelope {
    // A malformed query string is treated like an absent one.
    let params = params.map(|Query(p)| p).unwrap_or_default();
    pipeline.handle(uri.path(), params).await
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, pipeline: Arc<RequestPipeline>, shutdown: F) -> Result<(), BridgeError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(BridgeError::Server)
}
