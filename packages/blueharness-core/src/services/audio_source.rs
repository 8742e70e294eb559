//! Audio streaming service, source role.
//!
//! Composed into the endpoint only when the adapter advertises source
//! support; mutually exclusive with [`A2dpSink`](super::A2dpSink). Models
//! the stream endpoint state machine (open, started, suspended) a test
//! driver exercises, keyed by stream token.

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    Open,
    Started,
    Suspended,
}

impl StreamPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Started => "started",
            Self::Suspended => "suspended",
        }
    }
}

/// Audio source service (sends audio towards the peer).
pub struct A2dpSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    ctx: Arc<PlatformContext>,
    streams: Mutex<HashMap<String, StreamPhase>>,
    guard: TeardownGuard,
}

impl A2dpSource {
    /// Creates the audio source service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(SourceInner {
                ctx,
                streams: Mutex::new(HashMap::new()),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/A2dpSource/OpenSource", post(open_source))
            .route("/A2dpSource/Start", post(start))
            .route("/A2dpSource/Suspend", post(suspend))
            .route("/A2dpSource/Close", post(close))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for A2dpSource {
    fn name(&self) -> &'static str {
        "A2dpSource"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        let dropped = {
            let mut streams = self.inner.streams.lock();
            let count = streams.len();
            streams.clear();
            count
        };
        log::info!("[A2dpSource] Deinitialized, closed {} stream(s)", dropped);
        Ok(())
    }
}

#[derive(Deserialize)]
struct OpenRequest {
    /// Token of the ACL connection to open the stream on.
    connection: String,
}

#[derive(Deserialize)]
struct StreamRequest {
    stream: String,
}

async fn open_source(
    State(src): State<Arc<SourceInner>>,
    Json(req): Json<OpenRequest>,
) -> HarnessResult<Json<Value>> {
    if !src.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    let stream = Uuid::new_v4().to_string();
    src.streams.lock().insert(stream.clone(), StreamPhase::Open);
    log::info!("[A2dpSource] Opened stream {} on {}", stream, req.connection);
    Ok(Json(json!({ "stream": stream })))
}

async fn start(
    State(src): State<Arc<SourceInner>>,
    Json(req): Json<StreamRequest>,
) -> HarnessResult<Json<Value>> {
    transition(&src, &req.stream, StreamPhase::Started)
}

async fn suspend(
    State(src): State<Arc<SourceInner>>,
    Json(req): Json<StreamRequest>,
) -> HarnessResult<Json<Value>> {
    transition(&src, &req.stream, StreamPhase::Suspended)
}

async fn close(
    State(src): State<Arc<SourceInner>>,
    Json(req): Json<StreamRequest>,
) -> HarnessResult<Json<Value>> {
    src.streams
        .lock()
        .remove(&req.stream)
        .ok_or_else(|| HarnessError::NotFound(format!("stream {}", req.stream)))?;
    log::info!("[A2dpSource] Closed stream {}", req.stream);
    Ok(Json(json!({ "stream": req.stream })))
}

fn transition(src: &SourceInner, stream: &str, to: StreamPhase) -> HarnessResult<Json<Value>> {
    let mut streams = src.streams.lock();
    let phase = streams
        .get_mut(stream)
        .ok_or_else(|| HarnessError::NotFound(format!("stream {}", stream)))?;
    *phase = to;
    Ok(Json(json!({ "stream": stream, "state": to.as_str() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn service() -> (A2dpSource, Arc<PlatformContext>) {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        (A2dpSource::new(Arc::clone(&ctx)).unwrap(), ctx)
    }

    #[tokio::test]
    async fn stream_lifecycle() {
        let (service, ctx) = service();
        let conn = ctx.register_connection("11:22:33:44:55:66");

        let Json(opened) = open_source(
            State(Arc::clone(&service.inner)),
            Json(OpenRequest { connection: conn }),
        )
        .await
        .unwrap();
        let stream = opened["stream"].as_str().unwrap().to_string();

        let Json(started) = start(
            State(Arc::clone(&service.inner)),
            Json(StreamRequest { stream: stream.clone() }),
        )
        .await
        .unwrap();
        assert_eq!(started["state"], "started");

        close(
            State(Arc::clone(&service.inner)),
            Json(StreamRequest { stream: stream.clone() }),
        )
        .await
        .unwrap();
        assert!(service.inner.streams.lock().is_empty());
    }

    #[tokio::test]
    async fn open_on_unknown_connection_fails() {
        let (service, _ctx) = service();
        let result = open_source(
            State(Arc::clone(&service.inner)),
            Json(OpenRequest { connection: "bogus".into() }),
        )
        .await;
        assert!(matches!(result, Err(HarnessError::NotFound(_))));
    }

    #[test]
    fn deinit_clears_streams() {
        let (service, _ctx) = service();
        service.inner.streams.lock().insert("s".into(), StreamPhase::Open);
        service.deinit().unwrap();
        assert!(service.inner.streams.lock().is_empty());
        service.deinit().unwrap();
    }
}
