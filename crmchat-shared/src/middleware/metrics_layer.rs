use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Label for requests that matched no route. Raw paths would let scanners
/// grow the label set without bound.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Which part of the API a route belongs to: the polled chat endpoints, the
/// service-to-service `/internal` routes, or health and scrape endpoints.
fn surface(route: &str) -> &'static str {
    if route.starts_with("/chat/") {
        "chat"
    } else if route.starts_with("/internal/") {
        "internal"
    } else if route == UNMATCHED_ROUTE {
        UNMATCHED_ROUTE
    } else {
        "ops"
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds` labelled
/// by method, route template, surface and status. Poll traffic dominates the
/// chat surface, so dashboards split on `surface` before `route`.
pub async fn metrics_middleware(
    matched_path: Option<MatchedPath>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_owned();
    let route = matched_path.map_or_else(|| UNMATCHED_ROUTE.to_owned(), |p| p.as_str().to_owned());
    let surface = surface(&route);

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("route", route),
        ("surface", surface.to_owned()),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}

/// Installs the global Prometheus recorder. Call once per process.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
