//! Audio streaming service, sink role.
//!
//! The mutually exclusive counterpart of
//! [`A2dpSource`](super::A2dpSource): composed when the adapter does not
//! advertise source support. A sink does not drive the stream state
//! machine itself, so the surface is smaller - the peer opens, the
//! harness only observes and closes.

use std::collections::HashSet;
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

/// Audio sink service (receives audio from the peer).
pub struct A2dpSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    ctx: Arc<PlatformContext>,
    streams: Mutex<HashSet<String>>,
    guard: TeardownGuard,
}

impl A2dpSink {
    /// Creates the audio sink service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(SinkInner {
                ctx,
                streams: Mutex::new(HashSet::new()),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/A2dpSink/OpenSink", post(open_sink))
            .route("/A2dpSink/ListStreams", post(list_streams))
            .route("/A2dpSink/Close", post(close))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for A2dpSink {
    fn name(&self) -> &'static str {
        "A2dpSink"
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
        log::info!("[A2dpSink] Deinitialized, closed {} stream(s)", dropped);
        Ok(())
    }
}

#[derive(Deserialize)]
struct OpenRequest {
    connection: String,
}

#[derive(Deserialize)]
struct CloseRequest {
    stream: String,
}

async fn open_sink(
    State(sink): State<Arc<SinkInner>>,
    Json(req): Json<OpenRequest>,
) -> HarnessResult<Json<Value>> {
    if !sink.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    let stream = Uuid::new_v4().to_string();
    sink.streams.lock().insert(stream.clone());
    log::info!("[A2dpSink] Accepting stream {} on {}", stream, req.connection);
    Ok(Json(json!({ "stream": stream })))
}

async fn list_streams(State(sink): State<Arc<SinkInner>>) -> Json<Value> {
    let streams: Vec<String> = sink.streams.lock().iter().cloned().collect();
    Json(json!({ "streams": streams }))
}

async fn close(
    State(sink): State<Arc<SinkInner>>,
    Json(req): Json<CloseRequest>,
) -> HarnessResult<Json<Value>> {
    if !sink.streams.lock().remove(&req.stream) {
        return Err(HarnessError::NotFound(format!("stream {}", req.stream)));
    }
    log::info!("[A2dpSink] Closed stream {}", req.stream);
    Ok(Json(json!({ "stream": req.stream })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    #[tokio::test]
    async fn open_and_close_round_trip() {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        let service = A2dpSink::new(Arc::clone(&ctx)).unwrap();
        let conn = ctx.register_connection("11:22:33:44:55:66");

        let Json(opened) = open_sink(
            State(Arc::clone(&service.inner)),
            Json(OpenRequest { connection: conn }),
        )
        .await
        .unwrap();
        let stream = opened["stream"].as_str().unwrap().to_string();

        close(
            State(Arc::clone(&service.inner)),
            Json(CloseRequest { stream }),
        )
        .await
        .unwrap();
        assert!(service.inner.streams.lock().is_empty());

        service.deinit().unwrap();
        service.deinit().unwrap();
    }
}
