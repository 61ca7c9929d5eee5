//! Emulator server plumbing: lifecycle, request recording, canned fallbacks

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fern_common::{MockRequest, RequestLedger};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Readiness endpoint served by every emulator. Not recorded in the ledger.
pub const HEALTH_PATH: &str = "/__health";

/// Largest request body the recorder will buffer
const MAX_RECORDED_BODY: usize = 8 * 1024 * 1024;

/// How long shutdown waits for open connections before aborting the server task
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// An in-process test double for an external service.
pub trait Emulator {
    /// Short name used in logs and the health payload
    fn name(&self) -> &'static str;

    /// Protocol routes, without health or recording layers
    fn routes(&self) -> Router;

    /// Shared request log and canned-response table
    fn ledger(&self) -> &Arc<RequestLedger>;

    /// Restore the emulator to its freshly constructed state
    fn reset(&self);

    /// Full router: protocol routes plus health endpoint, ledger recording
    /// and HTTP tracing
    fn router(&self) -> Router {
        let name = self.name();
        Router::new()
            .route(
                HEALTH_PATH,
                get(move || async move { Json(serde_json::json!({ "status": "ok", "emulator": name })) }),
            )
            .merge(self.routes())
            .layer(middleware::from_fn_with_state(self.ledger().clone(), record_requests))
            .layer(TraceLayer::new_for_http())
    }
}

/// Append every inbound request to the ledger before handling it.
async fn record_requests(
    State(ledger): State<Arc<RequestLedger>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_RECORDED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to buffer request body for {}: {}", parts.uri.path(), e);
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({ "error": "Request body too large" })),
            )
                .into_response();
        }
    };

    ledger.record(MockRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body: String::from_utf8_lossy(&bytes).into_owned(),
        received_at: fern_common::now(),
    });

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Serve the canned response registered for `METHOD path`, if any.
///
/// A response carrying a delay is held for that long before it is written.
pub async fn canned_response(ledger: &RequestLedger, method: &Method, path: &str) -> Option<Response> {
    let canned = ledger.response_for(method.as_str(), path)?;
    if let Some(delay) = canned.delay {
        tokio::time::sleep(delay).await;
    }
    Some(canned.into_response())
}

/// Handle to an emulator listening on a local port.
///
/// Dropping the handle signals the server to stop; call
/// [`EmulatorHandle::shutdown`] to also wait for it.
pub struct EmulatorHandle {
    name: &'static str,
    addr: SocketAddr,
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl EmulatorHandle {
    /// Bind an ephemeral port on the loopback interface and start serving
    pub async fn spawn<E: Emulator + ?Sized>(emulator: &E) -> fern_common::Result<Self> {
        Self::spawn_on(emulator, SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    /// Bind `addr` (port 0 = ephemeral) and start serving
    pub async fn spawn_on<E: Emulator + ?Sized>(emulator: &E, addr: SocketAddr) -> fern_common::Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);
        let router = emulator.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("{} emulator listening on {}", emulator.name(), base_url);

        Ok(Self {
            name: emulator.name(),
            addr,
            base_url,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Base URL to point the system under test at
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path` on this emulator
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(mut self) -> fern_common::Result<()> {
        info!("Stopping {} emulator at {}", self.name, self.base_url);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => warn!("{} emulator task failed: {}", self.name, e),
                Err(_) => {
                    warn!("{} emulator still has open connections, aborting", self.name);
                    task.abort();
                }
            }
        }
        Ok(())
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
