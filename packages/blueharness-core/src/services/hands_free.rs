//! Hands-free service (HFP).
//!
//! Drives a three-state call model (idle, dialing, active) and publishes
//! every transition on the endpoint event feed.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::{EndpointEvent, PlatformContext};
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError, TeardownGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CallState {
    Idle,
    Dialing { number: String },
    Active { number: String },
}

impl CallState {
    fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dialing { .. } => "dialing",
            Self::Active { .. } => "active",
        }
    }
}

/// Hands-free service.
pub struct Hfp {
    inner: Arc<HfpInner>,
}

struct HfpInner {
    ctx: Arc<PlatformContext>,
    call: Mutex<CallState>,
    guard: TeardownGuard,
}

impl Hfp {
    /// Creates the hands-free service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(HfpInner {
                ctx,
                call: Mutex::new(CallState::Idle),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Hfp/MakeCall", post(make_call))
            .route("/Hfp/AnswerCall", post(answer_call))
            .route("/Hfp/EndCall", post(end_call))
            .route("/Hfp/QueryCallState", post(query_call_state))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Hfp {
    fn name(&self) -> &'static str {
        "Hfp"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        *self.inner.call.lock() = CallState::Idle;
        log::info!("[Hfp] Deinitialized");
        Ok(())
    }
}

fn set_call_state(hfp: &HfpInner, next: CallState) -> Json<Value> {
    let label = next.label();
    *hfp.call.lock() = next;
    hfp.ctx.emit(EndpointEvent::CallState { state: label.into() });
    log::info!("[Hfp] Call state -> {}", label);
    Json(json!({ "state": label }))
}

#[derive(Deserialize)]
struct MakeCallRequest {
    number: String,
}

async fn make_call(
    State(hfp): State<Arc<HfpInner>>,
    Json(req): Json<MakeCallRequest>,
) -> HarnessResult<Json<Value>> {
    {
        let call = hfp.call.lock();
        if *call != CallState::Idle {
            return Err(HarnessError::InvalidRequest(format!(
                "cannot dial while {}",
                call.label()
            )));
        }
    }
    Ok(set_call_state(&hfp, CallState::Dialing { number: req.number }))
}

async fn answer_call(State(hfp): State<Arc<HfpInner>>) -> HarnessResult<Json<Value>> {
    let number = {
        let call = hfp.call.lock();
        match &*call {
            CallState::Dialing { number } => number.clone(),
            other => {
                return Err(HarnessError::InvalidRequest(format!(
                    "no call to answer while {}",
                    other.label()
                )));
            }
        }
    };
    Ok(set_call_state(&hfp, CallState::Active { number }))
}

async fn end_call(State(hfp): State<Arc<HfpInner>>) -> HarnessResult<Json<Value>> {
    {
        let call = hfp.call.lock();
        if *call == CallState::Idle {
            return Err(HarnessError::InvalidRequest("no call in progress".into()));
        }
    }
    Ok(set_call_state(&hfp, CallState::Idle))
}

async fn query_call_state(State(hfp): State<Arc<HfpInner>>) -> Json<Value> {
    let call = hfp.call.lock();
    let number = match &*call {
        CallState::Dialing { number } | CallState::Active { number } => Some(number.clone()),
        CallState::Idle => None,
    };
    Json(json!({ "state": call.label(), "number": number }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn service() -> Hfp {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        Hfp::new(ctx).unwrap()
    }

    #[tokio::test]
    async fn full_call_sequence() {
        let hfp = service();
        let inner = || Arc::clone(&hfp.inner);

        make_call(State(inner()), Json(MakeCallRequest { number: "555-0100".into() }))
            .await
            .unwrap();
        let Json(answered) = answer_call(State(inner())).await.unwrap();
        assert_eq!(answered["state"], "active");

        let Json(queried) = query_call_state(State(inner())).await;
        assert_eq!(queried["number"], "555-0100");

        let Json(ended) = end_call(State(inner())).await.unwrap();
        assert_eq!(ended["state"], "idle");
    }

    #[tokio::test]
    async fn answer_without_dial_is_rejected() {
        let hfp = service();
        let result = answer_call(State(Arc::clone(&hfp.inner))).await;
        assert!(matches!(result, Err(HarnessError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn dial_while_active_is_rejected() {
        let hfp = service();
        let inner = || Arc::clone(&hfp.inner);
        make_call(State(inner()), Json(MakeCallRequest { number: "555-0100".into() }))
            .await
            .unwrap();
        let result = make_call(State(inner()), Json(MakeCallRequest { number: "555-0101".into() })).await;
        assert!(matches!(result, Err(HarnessError::InvalidRequest(_))));
    }
}
