//! HTTP surface: the send route plus the operational endpoints.

use crate::error::SendError;
use crate::models::WebhookMessage;
use crate::notification::{send_notification, NotificationBuilder};
use crate::reload::Reloader;
use crate::state::StateHolder;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, error, info, instrument};

/// Shared handler state. Cheap to clone; every clone sees the same
/// configuration generations.
#[derive(Clone)]
pub struct Api {
    holder: Arc<StateHolder>,
    reloader: Option<Arc<Reloader>>,
    metrics: Option<PrometheusHandle>,
}

impl Api {
    pub fn new(holder: Arc<StateHolder>) -> Self {
        Self {
            holder,
            reloader: None,
            metrics: None,
        }
    }

    /// Enables `POST /-/reload` (still gated by `enable_lifecycle`).
    pub fn with_reloader(mut self, reloader: Arc<Reloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Serves `GET /metrics` from `handle`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn holder(&self) -> &Arc<StateHolder> {
        &self.holder
    }

    /// Relays one Alertmanager payload to the robot registered as `name`.
    ///
    /// The whole request runs against the snapshot taken on entry.
    pub async fn send(&self, name: &str, body: &[u8]) -> Result<(), SendError> {
        let state = self.holder.snapshot();
        let target = state.target(name).ok_or(SendError::TargetNotFound)?;

        let message = WebhookMessage::from_slice(body)?;
        let notification =
            NotificationBuilder::new(&state.templates, &state.config, target).build(&message)?;

        let response = match &state.fanout {
            Some(sink) => {
                let ((), response) = tokio::join!(
                    sink.forward(&message, target),
                    send_notification(&notification, &state.http_client, target)
                );
                response?
            }
            None => send_notification(&notification, &state.http_client, target).await?,
        };

        if !response.is_success() {
            return Err(SendError::Remote {
                code: response.error_code,
                message: response.error_message,
            });
        }
        Ok(())
    }
}

/// Builds the router with request tracing and panic recovery attached.
pub fn routes(api: Api) -> Router {
    Router::new()
        // Alert groups can be arbitrarily large; the body is never capped.
        .route(
            "/{name}/send",
            post(serve_send).layer(DefaultBodyLimit::disable()),
        )
        .route("/-/healthy", get(serve_ok))
        .route("/-/ready", get(serve_ok))
        .route("/-/reload", post(serve_reload))
        .route("/metrics", get(serve_metrics))
        .fallback(serve_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(api)
}

#[instrument(skip_all, fields(target = %name))]
async fn serve_send(
    State(api): State<Api>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<&'static str, SendError> {
    let started = Instant::now();
    let result = api.send(&name, &body).await;

    let (target_label, outcome) = match &result {
        Ok(()) => (name, "success"),
        // Unknown names are caller-controlled; keep them out of the label set.
        Err(SendError::TargetNotFound) => (String::new(), "target_not_found"),
        Err(e) => (name, e.outcome()),
    };
    metrics::counter!(
        "dingrelay_notifications_total",
        "target" => target_label,
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("dingrelay_send_duration_seconds")
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            debug!("Notification sent");
            Ok("OK")
        }
        Err(e) => {
            e.log();
            Err(e)
        }
    }
}

async fn serve_ok() -> &'static str {
    "OK"
}

async fn serve_reload(State(api): State<Api>) -> Response {
    let enabled = api.holder.snapshot().config.enable_lifecycle;
    let Some(reloader) = api.reloader.as_ref().filter(|_| enabled) else {
        return (StatusCode::FORBIDDEN, "Lifecycle API is not enabled.").into_response();
    };

    match reloader.reload().await {
        Ok(generation) => {
            info!(generation, "Configuration reloaded via lifecycle API");
            "OK".into_response()
        }
        Err(e) => {
            error!("Failed to reload configuration, keeping the current one: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to reload config: {:#}", e),
            )
                .into_response()
        }
    }
}

async fn serve_metrics(State(api): State<Api>) -> Response {
    match &api.metrics {
        Some(handle) => handle.render().into_response(),
        None => serve_not_found().await.into_response(),
    }
}

async fn serve_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 page not found\n")
}
