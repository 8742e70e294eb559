//! Input-device service (HID).

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::constants::MAX_REPORT_QUEUE;
use crate::context::PlatformContext;
use crate::error::{HarnessError, HarnessResult};
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// Input-device service. Queues emulated input reports for the peer;
/// the oldest report is dropped once the queue is full.
pub struct Hid {
    inner: Arc<HidInner>,
}

struct HidInner {
    ctx: Arc<PlatformContext>,
    reports: Mutex<VecDeque<String>>,
    guard: TeardownGuard,
}

impl Hid {
    /// Creates the input-device service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(HidInner {
                ctx,
                reports: Mutex::new(VecDeque::new()),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/Hid/SendReport", post(send_report))
            .route("/Hid/ReadReports", post(read_reports))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for Hid {
    fn name(&self) -> &'static str {
        "Hid"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        self.inner.reports.lock().clear();
        log::info!("[Hid] Deinitialized");
        Ok(())
    }
}

#[derive(Deserialize)]
struct SendReportRequest {
    connection: String,
    /// Raw report bytes, hex-encoded.
    report: String,
}

async fn send_report(
    State(hid): State<Arc<HidInner>>,
    Json(req): Json<SendReportRequest>,
) -> HarnessResult<Json<Value>> {
    if !hid.ctx.connection_exists(&req.connection) {
        return Err(HarnessError::NotFound(format!("connection {}", req.connection)));
    }
    if req.report.is_empty() || req.report.len() % 2 != 0 {
        return Err(HarnessError::InvalidRequest(
            "report must be a non-empty hex string".into(),
        ));
    }
    let mut reports = hid.reports.lock();
    if reports.len() >= MAX_REPORT_QUEUE {
        reports.pop_front();
        log::warn!("[Hid] Report queue full, dropping oldest");
    }
    reports.push_back(req.report);
    Ok(Json(json!({ "queued": reports.len() })))
}

async fn read_reports(State(hid): State<Arc<HidInner>>) -> Json<Value> {
    let drained: Vec<String> = hid.reports.lock().drain(..).collect();
    Json(json!({ "reports": drained }))
}
