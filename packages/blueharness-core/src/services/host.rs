//! Link-layer host control service.
//!
//! Exposes the adapter-level surface a test driver needs: reading the
//! local identity, toggling discoverability, and bringing emulated ACL
//! connections up and down. Connections live in the shared
//! [`PlatformContext`] table because other services validate against them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use crate::context::{EndpointEvent, PlatformContext};
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// Link-layer host control service.
pub struct Host {
    inner: Arc<HostInner>,
}

struct HostInner {
    ctx: Arc<PlatformContext>,
    discoverable: AtomicBool,
    guard: TeardownGuard,
}

impl Host {
    /// Creates the host service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(HostInner {
                ctx,
                discoverable: AtomicBool::new(false),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Host/ReadLocalAddress", post(read_local_address))
            .route("/Host/SetDiscoverabilityMode", post(set_discoverability))
            .route("/Host/Connect", post(connect))
            .route("/Host/Disconnect", post(disconnect))
            .route("/Host/WaitConnection", post(wait_connection))
            .route("/Host/FactoryReset", post(factory_reset))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Host {
    fn name(&self) -> &'static str {
        "Host"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        let dropped = self.inner.ctx.clear_connections();
        self.inner.discoverable.store(false, Ordering::SeqCst);
        log::info!("[Host] Deinitialized, dropped {} connection(s)", dropped);
        Ok(())
    }
}

#[derive(Deserialize)]
struct DiscoverabilityRequest {
    discoverable: bool,
}

#[derive(Deserialize)]
struct ConnectRequest {
    address: String,
}

#[derive(Deserialize)]
struct DisconnectRequest {
    token: String,
}

#[derive(Deserialize)]
struct WaitConnectionRequest {
    address: String,
}

async fn read_local_address(State(host): State<Arc<HostInner>>) -> Json<Value> {
    let adapter = host.ctx.adapter();
    Json(json!({
        "address": adapter.address(),
        "name": adapter.name(),
    }))
}

async fn set_discoverability(
    State(host): State<Arc<HostInner>>,
    Json(req): Json<DiscoverabilityRequest>,
) -> Json<Value> {
    host.discoverable.store(req.discoverable, Ordering::SeqCst);
    log::info!("[Host] Discoverability set to {}", req.discoverable);
    Json(json!({ "discoverable": req.discoverable }))
}

async fn connect(
    State(host): State<Arc<HostInner>>,
    Json(req): Json<ConnectRequest>,
) -> HarnessResult<Json<Value>> {
    if req.address.is_empty() {
        return Err(HarnessError::InvalidRequest("address cannot be empty".into()));
    }
    let token = host.ctx.register_connection(&req.address);
    log::info!("[Host] Connected to {} (token {})", req.address, token);
    Ok(Json(json!({ "token": token })))
}

async fn disconnect(
    State(host): State<Arc<HostInner>>,
    Json(req): Json<DisconnectRequest>,
) -> HarnessResult<Json<Value>> {
    let record = host
        .ctx
        .drop_connection(&req.token)
        .ok_or_else(|| HarnessError::NotFound(format!("connection {}", req.token)))?;
    log::info!("[Host] Disconnected from {}", record.address);
    Ok(Json(json!({ "address": record.address })))
}

/// Blocks until the next connection from `address` comes up.
///
/// This is the endpoint's long-poll primitive: a driver arms the wait,
/// then triggers the peer. The call is drained like any other in-flight
/// call on shutdown.
async fn wait_connection(
    State(host): State<Arc<HostInner>>,
    Json(req): Json<WaitConnectionRequest>,
) -> HarnessResult<Json<Value>> {
    let mut events = host.ctx.subscribe();
    log::debug!("[Host] Waiting for connection from {}", req.address);
    loop {
        match events.recv().await {
            Ok(EndpointEvent::ConnectionUp { token, address }) if address == req.address => {
                return Ok(Json(json!({ "token": token })));
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(missed)) => {
                log::warn!("[Host] Event feed lagged by {} events", missed);
                continue;
            }
            Err(RecvError::Closed) => {
                return Err(HarnessError::Internal("event feed closed".into()));
            }
        }
    }
}

async fn factory_reset(State(host): State<Arc<HostInner>>) -> Json<Value> {
    let dropped = host.ctx.clear_connections();
    host.discoverable.store(false, Ordering::SeqCst);
    log::info!("[Host] Factory reset, dropped {} connection(s)", dropped);
    Json(json!({ "dropped_connections": dropped }))
}
