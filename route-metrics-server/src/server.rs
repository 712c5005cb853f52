use std::convert::Infallible;

use anyhow::Result;
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::Registry;
use route_metrics::{gather_metrics, HttpMetrics, HttpMetricsLayer};
use tower::{service_fn, Layer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the demo application.
///
/// Matched routes are instrumented through `route_layer` so their template
/// is known; the fallback is wrapped separately and recorded under the
/// unmatched placeholder.
pub fn build_router(metrics: HttpMetrics, registry: Registry, metrics_path: &str) -> Router {
    let layer = HttpMetricsLayer::new(metrics);
    let fallback = layer.layer(service_fn(|_req: Request| async {
        Ok::<_, Infallible>((StatusCode::NOT_FOUND, "not found").into_response())
    }));

    Router::new()
        .route("/", get(root))
        .route("/users/{id}", get(user))
        .route(metrics_path, get(scrape))
        .route_layer(layer)
        .fallback_service(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn root() -> &'static str {
    "ok"
}

async fn user(Path(id): Path<u64>) -> String {
    format!("user {id}")
}

async fn scrape(State(registry): State<Registry>) -> Response {
    match gather_metrics(&registry) {
        Ok(text) => (
            [(axum::http::header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Bind and serve until a shutdown signal arrives.
pub async fn serve(router: Router, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
