//! Link-channel service (L2CAP).
//!
//! Connection-oriented channels over an existing ACL connection. Channel
//! ids are allocated from the dynamic range; PSMs must be odd per the
//! L2CAP assigned-numbers convention.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
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

/// First channel id in the dynamically allocated range.
const FIRST_DYNAMIC_CID: u16 = 0x0040;

struct Channel {
    psm: u16,
    tx_bytes: u64,
}

/// Link-channel service.
pub struct L2cap {
    inner: Arc<L2capInner>,
}

struct L2capInner {
    ctx: Arc<PlatformContext>,
    channels: Mutex<HashMap<u16, Channel>>,
    next_cid: AtomicU16,
    guard: TeardownGuard,
}

impl L2cap {
    /// Creates the link-channel service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(L2capInner {
                ctx,
                channels: Mutex::new(HashMap::new()),
                next_cid: AtomicU16::new(FIRST_DYNAMIC_CID),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/L2cap/OpenChannel", post(open_channel))
            .route("/L2cap/Send", post(send))
            .route("/L2cap/CloseChannel", post(close_channel))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for L2cap {
    fn name(&self) -> &'static str {
        "L2cap"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        let dropped = {
            let mut channels = self.inner.channels.lock();
            let count = channels.len();
            channels.clear();
            count
        };
        log::info!("[L2cap] Deinitialized, closed {} channel(s)", dropped);
        Ok(())
    }
}

#[derive(Deserialize)]
struct OpenChannelRequest {
    connection: String,
    psm: u16,
}

#[derive(Deserialize)]
struct SendRequest {
    cid: u16,
    /// Payload bytes, hex-encoded.
    data: String,
}

#[derive(Deserialize)]
struct CloseChannelRequest {
    cid: u16,
}

async fn open_channel(
    State(l2cap): State<Arc<L2capInner>>,
    Json(req): Json<OpenChannelRequest>,
) -> HarnessResult<Json<Value>> {
    if !l2cap.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    if req.psm % 2 == 0 {
        return Err(HarnessError::InvalidRequest(format!(
            "PSM must be odd, got {}",
            req.psm
        )));
    }
    let cid = l2cap.next_cid.fetch_add(1, Ordering::SeqCst);
    l2cap.channels.lock().insert(
        cid,
        Channel {
            psm: req.psm,
            tx_bytes: 0,
        },
    );
    log::info!("[L2cap] Opened channel {:#06x} (PSM {})", cid, req.psm);
    Ok(Json(json!({ "cid": cid })))
}

async fn send(
    State(l2cap): State<Arc<L2capInner>>,
    Json(req): Json<SendRequest>,
) -> HarnessResult<Json<Value>> {
    if req.data.len() % 2 != 0 {
        return Err(HarnessError::InvalidRequest("data must be hex-encoded".into()));
    }
    let mut channels = l2cap.channels.lock();
    let channel = channels
        .get_mut(&req.cid)
        .ok_or_else(|| HarnessError::NotFound(format!("channel {:#06x}", req.cid)))?;
    let bytes = (req.data.len() / 2) as u64;
    channel.tx_bytes += bytes;
    Ok(Json(json!({ "sent": bytes, "total": channel.tx_bytes })))
}

async fn close_channel(
    State(l2cap): State<Arc<L2capInner>>,
    Json(req): Json<CloseChannelRequest>,
) -> HarnessResult<Json<Value>> {
    let channel = l2cap
        .channels
        .lock()
        .remove(&req.cid)
        .ok_or_else(|| HarnessError::NotFound(format!("channel {:#06x}", req.cid)))?;
    log::info!("[L2cap] Closed channel {:#06x} (PSM {})", req.cid, channel.psm);
    Ok(Json(json!({ "cid": req.cid, "tx_bytes": channel.tx_bytes })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn service() -> (L2cap, String) {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        let conn = ctx.register_connection("11:22:33:44:55:66");
        (L2cap::new(ctx).unwrap(), conn)
    }

    #[tokio::test]
    async fn channel_send_accumulates_bytes() {
        let (l2cap, conn) = service();
        let inner = || Arc::clone(&l2cap.inner);

        let Json(opened) = open_channel(
            State(inner()),
            Json(OpenChannelRequest { connection: conn, psm: 0x1001 }),
        )
        .await
        .unwrap();
        let cid = opened["cid"].as_u64().unwrap() as u16;

        send(State(inner()), Json(SendRequest { cid, data: "deadbeef".into() }))
            .await
            .unwrap();
        let Json(closed) = close_channel(State(inner()), Json(CloseChannelRequest { cid }))
            .await
            .unwrap();
        assert_eq!(closed["tx_bytes"], 4);
    }

    #[tokio::test]
    async fn even_psm_is_rejected() {
        let (l2cap, conn) = service();
        let result = open_channel(
            State(Arc::clone(&l2cap.inner)),
            Json(OpenChannelRequest { connection: conn, psm: 0x1000 }),
        )
        .await;
        assert!(matches!(result, Err(HarnessError::InvalidRequest(_))));
    }
}
