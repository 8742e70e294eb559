//! Remote-control service (AVRCP).
//!
//! Passthrough commands and absolute volume against a connected peer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::PlatformContext;
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// Absolute volume ceiling defined by AVRCP (7-bit value).
const MAX_ABSOLUTE_VOLUME: u8 = 127;

/// Remote-control service.
pub struct Avrcp {
    inner: Arc<AvrcpInner>,
}

struct AvrcpInner {
    ctx: Arc<PlatformContext>,
    volume: AtomicU8,
    last_command: Mutex<Option<String>>,
    guard: TeardownGuard,
}

impl Avrcp {
    /// Creates the remote-control service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(AvrcpInner {
                ctx,
                volume: AtomicU8::new(MAX_ABSOLUTE_VOLUME / 2),
                last_command: Mutex::new(None),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Avrcp/Passthrough", post(passthrough))
            .route("/Avrcp/SetAbsoluteVolume", post(set_absolute_volume))
            .route("/Avrcp/GetVolume", post(get_volume))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Avrcp {
    fn name(&self) -> &'static str {
        "Avrcp"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        *self.inner.last_command.lock() = None;
        log::info!("[Avrcp] Deinitialized");
        Ok(())
    }
}

#[derive(Deserialize)]
struct PassthroughRequest {
    connection: String,
    /// One of: play, pause, stop, next, previous.
    command: String,
}

#[derive(Deserialize)]
struct SetVolumeRequest {
    connection: String,
    volume: u8,
}

async fn passthrough(
    State(avrcp): State<Arc<AvrcpInner>>,
    Json(req): Json<PassthroughRequest>,
) -> HarnessResult<Json<Value>> {
    if !avrcp.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    match req.command.as_str() {
        "play" | "pause" | "stop" | "next" | "previous" => {}
        other => {
            return Err(HarnessError::InvalidRequest(format!(
                "unknown passthrough command: {}",
                other
            )));
        }
    }
    log::info!("[Avrcp] Passthrough {} on {}", req.command, req.connection);
    *avrcp.last_command.lock() = Some(req.command.clone());
    Ok(Json(json!({ "command": req.command })))
}

async fn set_absolute_volume(
    State(avrcp): State<Arc<AvrcpInner>>,
    Json(req): Json<SetVolumeRequest>,
) -> HarnessResult<Json<Value>> {
    if !avrcp.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    let volume = req.volume.min(MAX_ABSOLUTE_VOLUME);
    avrcp.volume.store(volume, Ordering::SeqCst);
    Ok(Json(json!({ "volume": volume })))
}

async fn get_volume(State(avrcp): State<Arc<AvrcpInner>>) -> Json<Value> {
    Json(json!({ "volume": avrcp.volume.load(Ordering::SeqCst) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn service() -> (Avrcp, String) {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        let conn = ctx.register_connection("11:22:33:44:55:66");
        (Avrcp::new(ctx).unwrap(), conn)
    }

    #[tokio::test]
    async fn volume_is_clamped_to_avrcp_range() {
        let (service, conn) = service();
        let Json(body) = set_absolute_volume(
            State(Arc::clone(&service.inner)),
            Json(SetVolumeRequest { connection: conn, volume: 200 }),
        )
        .await
        .unwrap();
        assert_eq!(body["volume"], 127);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let (service, conn) = service();
        let result = passthrough(
            State(Arc::clone(&service.inner)),
            Json(PassthroughRequest { connection: conn, command: "rewind".into() }),
        )
        .await;
        assert!(matches!(result, Err(HarnessError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn passthrough_records_last_command() {
        let (service, conn) = service();
        passthrough(
            State(Arc::clone(&service.inner)),
            Json(PassthroughRequest { connection: conn, command: "play".into() }),
        )
        .await
        .unwrap();
        assert_eq!(service.inner.last_command.lock().as_deref(), Some("play"));
    }
}
