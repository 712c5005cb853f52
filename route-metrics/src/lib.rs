//! Per-route HTTP request metrics for axum and tower services.
//!
//! Wrap a router with [`HttpMetricsLayer`] and every served request is
//! counted in `http_requests_total` and timed in
//! `http_request_duration_seconds`, both labeled by `code`, `method` and the
//! matched route template `path`.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use route_metrics::{HttpMetrics, HttpMetricsLayer, MetricsOptions};
//!
//! # fn main() -> route_metrics::Result<()> {
//! let metrics = HttpMetrics::new(MetricsOptions::new())?;
//! let app: Router = Router::new()
//!     .route("/users/{id}", get(|| async { "user" }))
//!     .route_layer(HttpMetricsLayer::new(metrics));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod observer;
pub mod route;

pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{
    gather_metrics, HttpMetrics, MetricLabelSet, MetricsOptions, DEFAULT_BUCKETS,
    HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS, LABEL_NAMES, UNMATCHED_PATH,
};
pub use middleware::{HttpMetricsLayer, HttpMetricsService, InstrumentedBody};
pub use observer::{Completion, ObservedOutcome, ResponseObserver};
pub use route::{MatchedPathResolver, RouteResolver};
