//! Generic attribute service.
//!
//! A small attribute database keyed by service handle. The database is
//! seeded with the Generic Access service (0x1800) carrying the adapter's
//! device name, which is what a peer reads first after discovery.

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

/// Generic Access service UUID (16-bit form).
const GAP_SERVICE_UUID: &str = "1800";
/// Device Name characteristic UUID (16-bit form).
const DEVICE_NAME_UUID: &str = "2a00";

struct GattServiceEntry {
    uuid: String,
    /// Characteristic UUID -> value (UTF-8 or hex, caller's choice).
    characteristics: HashMap<String, String>,
}

/// Generic attribute service.
pub struct Gatt {
    inner: Arc<GattInner>,
}

struct GattInner {
    db: Mutex<HashMap<u16, GattServiceEntry>>,
    next_handle: AtomicU16,
    guard: TeardownGuard,
}

impl Gatt {
    /// Creates the GATT service, seeding the database with the Generic
    /// Access service built from the adapter identity.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        let mut db = HashMap::new();
        let mut gap = GattServiceEntry {
            uuid: GAP_SERVICE_UUID.to_string(),
            characteristics: HashMap::new(),
        };
        gap.characteristics
            .insert(DEVICE_NAME_UUID.to_string(), ctx.adapter().name());
        db.insert(1, gap);

        Ok(Self {
            inner: Arc::new(GattInner {
                db: Mutex::new(db),
                next_handle: AtomicU16::new(2),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Gatt/RegisterService", post(register_service))
            .route("/Gatt/ReadCharacteristic", post(read_characteristic))
            .route("/Gatt/WriteCharacteristic", post(write_characteristic))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Gatt {
    fn name(&self) -> &'static str {
        "Gatt"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        let count = {
            let mut db = self.inner.db.lock();
            let count = db.len();
            db.clear();
            count
        };
        log::info!("[Gatt] Deinitialized, dropped {} service entries", count);
        Ok(())
    }
}

#[derive(Deserialize)]
struct RegisterServiceRequest {
    uuid: String,
    #[serde(default)]
    characteristics: Vec<String>,
}

#[derive(Deserialize)]
struct ReadRequest {
    service: u16,
    characteristic: String,
}

#[derive(Deserialize)]
struct WriteRequest {
    service: u16,
    characteristic: String,
    value: String,
}

async fn register_service(
    State(gatt): State<Arc<GattInner>>,
    Json(req): Json<RegisterServiceRequest>,
) -> HarnessResult<Json<Value>> {
    if req.uuid.is_empty() {
        return Err(HarnessError::InvalidRequest("uuid cannot be empty".into()));
    }
    let handle = gatt.next_handle.fetch_add(1, Ordering::SeqCst);
    let entry = GattServiceEntry {
        uuid: req.uuid.clone(),
        characteristics: req
            .characteristics
            .into_iter()
            .map(|uuid| (uuid, String::new()))
            .collect(),
    };
    gatt.db.lock().insert(handle, entry);
    log::info!("[Gatt] Registered service {} as handle {}", req.uuid, handle);
    Ok(Json(json!({ "service": handle })))
}

async fn read_characteristic(
    State(gatt): State<Arc<GattInner>>,
    Json(req): Json<ReadRequest>,
) -> HarnessResult<Json<Value>> {
    let db = gatt.db.lock();
    let entry = db
        .get(&req.service)
        .ok_or_else(|| HarnessError::NotFound(format!("service handle {}", req.service)))?;
    let value = entry
        .characteristics
        .get(&req.characteristic)
        .ok_or_else(|| HarnessError::NotFound(format!("characteristic {}", req.characteristic)))?;
    Ok(Json(json!({ "uuid": entry.uuid, "value": value })))
}

async fn write_characteristic(
    State(gatt): State<Arc<GattInner>>,
    Json(req): Json<WriteRequest>,
) -> HarnessResult<Json<Value>> {
    let mut db = gatt.db.lock();
    let entry = db
        .get_mut(&req.service)
        .ok_or_else(|| HarnessError::NotFound(format!("service handle {}", req.service)))?;
    let slot = entry
        .characteristics
        .get_mut(&req.characteristic)
        .ok_or_else(|| HarnessError::NotFound(format!("characteristic {}", req.characteristic)))?;
    *slot = req.value;
    Ok(Json(json!({ "written": true })))
}
