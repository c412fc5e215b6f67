/*!
 * Metrics scrape server
 *
 * - `GET /metrics` - Prometheus text exposition
 * - `GET /report`  - latest run report (periodic mode only)
 * - anything else  - 404 `not found`
 */

use crate::error::{CheckupError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use orbit_observability::CheckupMetrics;
use orbit_sentinel::ReportSlot;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// State shared by every handler
#[derive(Clone)]
pub struct ServerState {
    pub metrics: Arc<CheckupMetrics>,

    /// Present in periodic mode
    pub reports: Option<Arc<ReportSlot>>,
}

/// Build the scrape router
pub fn router(state: ServerState) -> Router {
    let mut app = Router::new().route("/metrics", get(metrics_handler));

    if state.reports.is_some() {
        app = app.route("/report", get(report_handler));
    }

    app.fallback(not_found).with_state(state)
}

async fn metrics_handler(State(state): State<ServerState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn report_handler(State(state): State<ServerState>) -> Response {
    let Some(reports) = state.reports else {
        return not_found().await.into_response();
    };

    let view = reports.view().await;
    let status = if view.is_servable() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(view)).into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// A running scrape server
pub struct MetricsServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl MetricsServer {
    /// Listen on all interfaces at `port`
    pub async fn start(port: u16, state: ServerState) -> Result<Self> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], port)), state).await
    }

    pub async fn bind(addr: SocketAddr, state: ServerState) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CheckupError::Server(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = router(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    signal.await.ok();
                })
                .await
        });

        info!("📈 Metrics server listening on: http://{}/metrics", local_addr);

        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight scrapes
    pub async fn shutdown(self) -> Result<()> {
        info!("Closing metrics server...");
        self.shutdown.send(()).ok();

        match self.handle.await {
            Ok(result) => result.map_err(CheckupError::from),
            Err(e) => Err(CheckupError::Server(format!("Metrics server task failed: {}", e))),
        }
    }
}
