use std::any::Any;
use std::future::{Future, IntoFuture};
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{self, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_prometheus::metrics_exporter_prometheus::PrometheusHandle;
use axum_prometheus::PrometheusMetricLayer;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::app::AppState;
use crate::ingest::handler::ingest;
use crate::shutdown::{ShutdownCoordinator, ShutdownError};

/// HTTP request metrics from `axum-prometheus`. The pair installs a global
/// recorder, so it is created once per process.
pub struct HttpMetrics {
    pub layer: PrometheusMetricLayer<'static>,
    pub handle: PrometheusHandle,
}

impl HttpMetrics {
    pub fn install() -> Self {
        let (layer, handle) = PrometheusMetricLayer::pair();
        Self { layer, handle }
    }
}

pub fn router(state: AppState, http_metrics: Option<HttpMetrics>) -> Router {
    let cfg = state.cfg.clone();

    let mut app = Router::new()
        .route("/", post(ingest))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz));

    if cfg.diagnostics.enabled {
        let metrics = state.metrics.clone();
        let handle = http_metrics.as_ref().map(|m| m.handle.clone());
        app = app.route(
            "/metrics",
            get(move || async move {
                let mut out = handle.map(|h| h.render()).unwrap_or_default();
                out.push_str(&metrics.render());
                out
            }),
        );
    }
    if let Some(m) = http_metrics {
        app = app.layer(m.layer);
    }

    let app = app
        .layer(DefaultBodyLimit::max(cfg.http.max_body_bytes))
        .with_state(state);
    with_interceptors(app, cfg.http.request_log)
}

/// Wraps any router with panic recovery and, when enabled, request logging.
pub fn with_interceptors(app: Router, request_log: bool) -> Router {
    let app = app.layer(CatchPanicLayer::custom(panic_response));
    if !request_log {
        return app;
    }
    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &http::Request<_>| {
                tracing::info_span!(
                  "http_request",
                  method = %req.method(),
                  path = %req.uri().path(),
                )
            })
            .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                tracing::info!(
                  status = %res.status(),
                  latency_ms = %latency.as_millis(),
                  "response"
                )
            })
            .on_failure(|_error: _, latency: Duration, _span: &Span| {
                tracing::warn!(latency_ms = %latency.as_millis(), "request_failed");
            }),
    )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");

    let body = serde_json::json!({ "Error": format!("internal error: {detail}") });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Serves `app` until `signal` fires, then drains through `coordinator`.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    coordinator: &ShutdownCoordinator,
    signal: F,
) -> Result<(), ShutdownError>
where
    F: Future<Output = ()>,
{
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(coordinator.drain_signal())
        .into_future();
    coordinator.run(server, signal).await
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn readyz(State(st): State<AppState>) -> impl IntoResponse {
    if st.ready.is_ready(&st.cfg.health) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
