//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that hands every path to the dispatch table
//! - Buffer the request body (bounded) and build the routing [`Request`]
//! - Map dispatch errors onto status codes when the chain left none
//! - Bind, serve and shut down gracefully

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ListenerConfig, RouterConfig};
use crate::http::{Request, Response};
use crate::routing::DispatchTable;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub table: DispatchTable,
    pub mount_path: Arc<str>,
    pub max_body_bytes: usize,
}

/// HTTP front end for one dispatch table.
pub struct DispatchServer {
    router: Router,
    table: DispatchTable,
}

impl DispatchServer {
    pub fn new(table: DispatchTable, listener: &ListenerConfig, router: &RouterConfig) -> Self {
        let state = AppState {
            table: table.clone(),
            mount_path: Arc::from(router.mount_path.as_str()),
            max_body_bytes: listener.max_body_bytes,
        };
        Self {
            router: Self::build_router(state),
            table,
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// The axum router, for embedding or driving with `tower::ServiceExt`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` completes, then stop accepting and finish open connections.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> HttpResponse {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "dispatch",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    let mut response = handle(state, request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

async fn handle(state: AppState, request: axum::extract::Request) -> HttpResponse {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.max_body_bytes, "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut request = Request::from_parts(parts, body).with_mount_path(state.mount_path.as_ref());
    let mut response = Response::new();

    if let Err(e) = state.table.dispatch(&mut request, &mut response).await {
        let status = e.status();
        if status.is_server_error() {
            tracing::error!(error = %e, "Dispatch failed");
        } else {
            tracing::debug!(error = %e, status = %status, "Dispatch rejected");
        }
        if response.is_committed() {
            tracing::warn!(error = %e, "Error after response was committed");
        } else {
            response.send_error(status);
        }
    }

    tracing::debug!(
        status = %response.status(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request complete"
    );
    response.into_http()
}
