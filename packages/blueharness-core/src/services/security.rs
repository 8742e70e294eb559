//! Security service.
//!
//! Pairing and bond management. The IO capability setting shapes which
//! association model a real pairing flow would negotiate; here it is held
//! so a driver can read back what it configured.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{EndpointEvent, PlatformContext};
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// Pairing IO capability, per the security manager association models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IoCapability {
    /// Can display a passkey but not accept input.
    DisplayOnly,
    /// Can display a passkey and confirm yes/no.
    DisplayYesNo,
    /// Can accept passkey input but not display.
    KeyboardOnly,
    /// Neither input nor output; falls back to Just Works.
    NoInputNoOutput,
}

/// Security service.
pub struct Security {
    inner: Arc<SecurityInner>,
}

struct SecurityInner {
    ctx: Arc<PlatformContext>,
    io_capability: Mutex<IoCapability>,
    /// Bonded peer addresses, ordered for stable listing.
    bonds: Mutex<BTreeSet<String>>,
    guard: TeardownGuard,
}

impl Security {
    /// Creates the security service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(SecurityInner {
                ctx,
                io_capability: Mutex::new(IoCapability::NoInputNoOutput),
                bonds: Mutex::new(BTreeSet::new()),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Security/SetIoCapability", post(set_io_capability))
            .route("/Security/Pair", post(pair))
            .route("/Security/RemoveBond", post(remove_bond))
            .route("/Security/ListBonds", post(list_bonds))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Security {
    fn name(&self) -> &'static str {
        "Security"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        let dropped = {
            let mut bonds = self.inner.bonds.lock();
            let count = bonds.len();
            bonds.clear();
            count
        };
        log::info!("[Security] Deinitialized, removed {} bond(s)", dropped);
        Ok(())
    }
}

#[derive(Deserialize)]
struct IoCapabilityRequest {
    capability: IoCapability,
}

#[derive(Deserialize)]
struct PairRequest {
    address: String,
}

async fn set_io_capability(
    State(security): State<Arc<SecurityInner>>,
    Json(req): Json<IoCapabilityRequest>,
) -> Json<Value> {
    *security.io_capability.lock() = req.capability;
    log::info!("[Security] IO capability set to {:?}", req.capability);
    Json(json!({ "capability": req.capability }))
}

async fn pair(
    State(security): State<Arc<SecurityInner>>,
    Json(req): Json<PairRequest>,
) -> HarnessResult<Json<Value>> {
    if req.address.is_empty() {
        return Err(HarnessError::InvalidRequest("address cannot be empty".into()));
    }
    let newly_bonded = security.bonds.lock().insert(req.address.clone());
    if newly_bonded {
        security.ctx.emit(EndpointEvent::Paired {
            address: req.address.clone(),
        });
        log::info!("[Security] Paired with {}", req.address);
    }
    Ok(Json(json!({ "address": req.address, "bonded": true })))
}

async fn remove_bond(
    State(security): State<Arc<SecurityInner>>,
    Json(req): Json<PairRequest>,
) -> HarnessResult<Json<Value>> {
    if !security.bonds.lock().remove(&req.address) {
        return Err(HarnessError::NotFound(format!("bond with {}", req.address)));
    }
    log::info!("[Security] Removed bond with {}", req.address);
    Ok(Json(json!({ "address": req.address })))
}

async fn list_bonds(State(security): State<Arc<SecurityInner>>) -> Json<Value> {
    let bonds: Vec<String> = security.bonds.lock().iter().cloned().collect();
    Json(json!({ "bonds": bonds }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn service() -> Security {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        Security::new(ctx).unwrap()
    }

    #[tokio::test]
    async fn pair_is_idempotent_and_listable() {
        let security = service();
        let inner = || Arc::clone(&security.inner);

        pair(State(inner()), Json(PairRequest { address: "11:22:33:44:55:66".into() }))
            .await
            .unwrap();
        pair(State(inner()), Json(PairRequest { address: "11:22:33:44:55:66".into() }))
            .await
            .unwrap();

        let Json(body) = list_bonds(State(inner())).await;
        assert_eq!(body["bonds"], json!(["11:22:33:44:55:66"]));
    }

    #[tokio::test]
    async fn pairing_publishes_event_once() {
        let security = service();
        let mut events = security.inner.ctx.subscribe();

        pair(
            State(Arc::clone(&security.inner)),
            Json(PairRequest { address: "11:22:33:44:55:66".into() }),
        )
        .await
        .unwrap();

        match events.try_recv().unwrap() {
            EndpointEvent::Paired { address } => assert_eq!(address, "11:22:33:44:55:66"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn remove_unknown_bond_is_not_found() {
        let security = service();
        let result = remove_bond(
            State(Arc::clone(&security.inner)),
            Json(PairRequest { address: "00:00:00:00:00:01".into() }),
        )
        .await;
        assert!(matches!(result, Err(HarnessError::NotFound(_))));
    }
}
