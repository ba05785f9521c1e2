use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use opentelemetry::metrics::{Counter, Meter, Unit};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::error::Result;
use crate::purge::DeleteOrchestrator;
use crate::registry::{BlobReclaimer, Registry};

// Metrics recorded by the handlers
pub struct AppMetrics {
    pub request_counter: Counter<u64>,
    pub purge_layers: Counter<u64>,
    pub purge_layer_failures: Counter<u64>,
    pub purge_failures: Counter<u64>,
}

impl AppMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            request_counter: meter
                .u64_counter("http_requests_total")
                .with_description("Total number of HTTP requests")
                .with_unit(Unit::new("requests"))
                .init(),
            purge_layers: meter
                .u64_counter("purge_layers_total")
                .with_description("Layer evictions attempted by purges")
                .with_unit(Unit::new("layers"))
                .init(),
            purge_layer_failures: meter
                .u64_counter("purge_layer_failures_total")
                .with_description("Layer evictions that failed and were skipped")
                .with_unit(Unit::new("layers"))
                .init(),
            purge_failures: meter
                .u64_counter("purge_failures_total")
                .with_description("Purges that failed")
                .with_unit(Unit::new("purges"))
                .init(),
        }
    }
}

/// Handles shared by every request. The registry is the local cache, never the upstream.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn Registry>,
    pub reclaimer: Arc<dyn BlobReclaimer>,
    pub metrics: Arc<AppMetrics>,
}

// Create the router for the cache API
pub fn registry_router(state: AppState) -> Router {
    Router::new()
        // API Version Check
        .route("/v2/", get(api_version_check))

        // Cascading purge of a cached image: /v2/{name}/proxy/{reference}, where
        // the name may span several path segments
        .route("/v2/{*path}", delete(purge_image))

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// API Version Check
#[instrument(name = "api_version_check", skip_all)]
async fn api_version_check(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.request_counter.add(1, &[]);

    info!("API version check");
    StatusCode::OK
}

/// Split `{name}/proxy/{reference}` at the last `/proxy/`
fn split_proxy_path(path: &str) -> Option<(&str, &str)> {
    let (name, reference) = path.trim_start_matches('/').rsplit_once("/proxy/")?;
    if name.is_empty() || reference.is_empty() || reference.contains('/') {
        return None;
    }
    Some((name, reference))
}

// Purge an image (tag or digest) and every layer it references from the cache
#[instrument(name = "purge_image", skip(state))]
async fn purge_image(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response> {
    state.metrics.request_counter.add(1, &[]);

    let Some((name, reference)) = split_proxy_path(&path) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    info!("Purging {}:{}", name, reference);

    let mut orchestrator =
        DeleteOrchestrator::new(state.registry.as_ref(), state.reclaimer.as_ref());
    let outcome = orchestrator.purge(name, reference).await;

    let layers = match &outcome {
        Ok(report) => &report.layers,
        Err(failure) => &failure.layers,
    };
    state.metrics.purge_layers.add(layers.len() as u64, &[]);
    state
        .metrics
        .purge_layer_failures
        .add(layers.iter().filter(|l| !l.is_ok()).count() as u64, &[]);

    match outcome {
        Ok(report) => {
            info!("Purged {}:{} (manifest {})", name, reference, report.manifest_digest);

            let mut response = Response::new(Body::empty());
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            Ok(response)
        }
        Err(failure) => {
            state.metrics.purge_failures.add(1, &[]);
            Err(failure.into())
        }
    }
}
