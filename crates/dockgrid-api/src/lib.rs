//! dockgrid-api: REST API for DockGrid.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness of the daemon itself |
//! | POST | `/create?project=<name>&compose=<base64>` | Ingest a compose definition |
//! | GET | `/ps` | Projects, services, volumes and per-service status |
//!
//! Responses use a `{success, data, error}` JSON envelope.

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tracing::{Instrument, info, info_span};

use dockgrid_runtime::RuntimeClient;
use dockgrid_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub runtime: Arc<dyn RuntimeClient>,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, runtime: Arc<dyn RuntimeClient>) -> Router {
    let api_state = ApiState { store, runtime };

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/create", post(handlers::create_project))
        .route("/ps", get(handlers::list_fleet))
        .with_state(api_state)
        .layer(middleware::from_fn(log_request))
}

/// One span per request, with the outcome logged on the way out.
async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("request", %method, %path);

    let response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request handled"
        );
    });
    response
}
