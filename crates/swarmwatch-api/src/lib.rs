//! swarmwatch-api — HTTP surface of the exporter.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of both swarm gauge families |
//! | GET | `/healthz` | Liveness probe |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use swarmwatch_metrics::GaugeStore;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    pub gauges: GaugeStore,
}

/// Build the exporter router.
pub fn build_router(gauges: GaugeStore) -> Router {
    let state = ApiState { gauges };

    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
