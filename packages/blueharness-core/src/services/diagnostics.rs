//! Internal diagnostics service.
//!
//! The only module constructed without a platform context: it reports on
//! the composed endpoint itself (version, uptime, registered services)
//! rather than on any protocol surface.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::HarnessResult;
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// Internal diagnostics service.
pub struct Diagnostics {
    inner: Arc<DiagnosticsInner>,
}

struct DiagnosticsInner {
    started: Instant,
    /// Names of every service composed into the endpoint, this one included.
    services: Vec<&'static str>,
    guard: TeardownGuard,
}

impl Diagnostics {
    /// Creates the diagnostics service over the composed service list.
    pub fn new(services: Vec<&'static str>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(DiagnosticsInner {
                started: Instant::now(),
                services,
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Diagnostics/Info", post(info))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Diagnostics {
    fn name(&self) -> &'static str {
        "Diagnostics"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if self.inner.guard.first_call() {
            log::info!("[Diagnostics] Deinitialized");
        }
        Ok(())
    }
}

async fn info(State(diag): State<Arc<DiagnosticsInner>>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_ms": diag.started.elapsed().as_millis() as u64,
        "services": diag.services,
    }))
}
