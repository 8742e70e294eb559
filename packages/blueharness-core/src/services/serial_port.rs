//! Serial-port emulation service (RFCOMM).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::PlatformContext;
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// RFCOMM server channels are limited to 1..=30.
const MAX_SERVER_CHANNEL: u8 = 30;

struct Session {
    channel: u8,
    tx_bytes: u64,
}

/// Serial-port emulation service.
pub struct Rfcomm {
    inner: Arc<RfcommInner>,
}

struct RfcommInner {
    ctx: Arc<PlatformContext>,
    sessions: Mutex<HashMap<String, Session>>,
    guard: TeardownGuard,
}

impl Rfcomm {
    /// Creates the serial-port service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(RfcommInner {
                ctx,
                sessions: Mutex::new(HashMap::new()),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Rfcomm/Open", post(open))
            .route("/Rfcomm/Write", post(write))
            .route("/Rfcomm/Close", post(close))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Rfcomm {
    fn name(&self) -> &'static str {
        "Rfcomm"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        let dropped = {
            let mut sessions = self.inner.sessions.lock();
            let count = sessions.len();
            sessions.clear();
            count
        };
        log::info!("[Rfcomm] Deinitialized, closed {} session(s)", dropped);
        Ok(())
    }
}

#[derive(Deserialize)]
struct OpenRequest {
    connection: String,
    channel: u8,
}

#[derive(Deserialize)]
struct WriteRequest {
    session: String,
    /// Payload bytes, hex-encoded.
    data: String,
}

#[derive(Deserialize)]
struct CloseRequest {
    session: String,
}

async fn open(
    State(rfcomm): State<Arc<RfcommInner>>,
    Json(req): Json<OpenRequest>,
) -> HarnessResult<Json<Value>> {
    if !rfcomm.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    if req.channel == 0 || req.channel > MAX_SERVER_CHANNEL {
        return Err(HarnessError::InvalidRequest(format!(
            "server channel must be 1..={}, got {}",
            MAX_SERVER_CHANNEL, req.channel
        )));
    }
    let session = Uuid::new_v4().to_string();
    rfcomm.sessions.lock().insert(
        session.clone(),
        Session {
            channel: req.channel,
            tx_bytes: 0,
        },
    );
    log::info!("[Rfcomm] Opened session {} on channel {}", session, req.channel);
    Ok(Json(json!({ "session": session })))
}

async fn write(
    State(rfcomm): State<Arc<RfcommInner>>,
    Json(req): Json<WriteRequest>,
) -> HarnessResult<Json<Value>> {
    if req.data.len() % 2 != 0 {
        return Err(HarnessError::InvalidRequest("data must be hex-encoded".into()));
    }
    let mut sessions = rfcomm.sessions.lock();
    let session = sessions
        .get_mut(&req.session)
        .ok_or_else(|| HarnessError::NotFound(format!("session {}", req.session)))?;
    let bytes = (req.data.len() / 2) as u64;
    session.tx_bytes += bytes;
    Ok(Json(json!({ "sent": bytes, "total": session.tx_bytes })))
}

async fn close(
    State(rfcomm): State<Arc<RfcommInner>>,
    Json(req): Json<CloseRequest>,
) -> HarnessResult<Json<Value>> {
    let session = rfcomm
        .sessions
        .lock()
        .remove(&req.session)
        .ok_or_else(|| HarnessError::NotFound(format!("session {}", req.session)))?;
    log::info!("[Rfcomm] Closed session on channel {}", session.channel);
    Ok(Json(json!({ "tx_bytes": session.tx_bytes })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn service() -> (Rfcomm, String) {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        let conn = ctx.register_connection("11:22:33:44:55:66");
        (Rfcomm::new(ctx).unwrap(), conn)
    }

    #[tokio::test]
    async fn session_round_trip() {
        let (rfcomm, conn) = service();
        let inner = || Arc::clone(&rfcomm.inner);

        let Json(opened) = open(
            State(inner()),
            Json(OpenRequest { connection: conn, channel: 3 }),
        )
        .await
        .unwrap();
        let session = opened["session"].as_str().unwrap().to_string();

        write(
            State(inner()),
            Json(WriteRequest { session: session.clone(), data: "0102".into() }),
        )
        .await
        .unwrap();

        let Json(closed) = close(State(inner()), Json(CloseRequest { session })).await.unwrap();
        assert_eq!(closed["tx_bytes"], 2);
    }

    #[tokio::test]
    async fn channel_out_of_range_is_rejected() {
        let (rfcomm, conn) = service();
        let result = open(
            State(Arc::clone(&rfcomm.inner)),
            Json(OpenRequest { connection: conn, channel: 31 }),
        )
        .await;
        assert!(matches!(result, Err(HarnessError::InvalidRequest(_))));
    }
}
