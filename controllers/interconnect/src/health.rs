//! Health probe endpoints
//!
//! `GET /healthz` answers `ok` as soon as the server is up. `GET /readyz`
//! answers 503 until every controller task has been spawned.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Readiness flag shared between the controller and the probe server
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

async fn ready(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Probe routes
pub fn routes(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(ready))
        .with_state(readiness)
}

/// Serve the probe routes on `addr` until the process exits
pub async fn serve(addr: SocketAddr, readiness: Readiness) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving health probes");
    axum::serve(listener, routes(readiness)).await.map_err(|e| {
        error!(error = %e, "Health probe server error");
        ControllerError::Probe(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status(readiness: &Readiness, path: &str) -> StatusCode {
        routes(readiness.clone())
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_healthz_is_always_ok() {
        let readiness = Readiness::new();
        assert_eq!(status(&readiness, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_follows_readiness() {
        let readiness = Readiness::new();
        assert_eq!(status(&readiness, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);

        readiness.set_ready();
        assert_eq!(status(&readiness, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let readiness = Readiness::new();
        assert_eq!(status(&readiness, "/metrics").await, StatusCode::NOT_FOUND);
    }
}
