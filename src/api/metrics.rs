use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::AppState;
use crate::metrics::Metrics;

/// Records outcome and latency of every `/v1` request.
pub async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();
    metrics.record_request(status.is_success() || status.is_redirection(), latency);

    info!(
        "Request completed: method={}, path={}, status={}, duration_ms={}",
        method,
        path,
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render_prometheus(),
    )
}
