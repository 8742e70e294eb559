//! Protocol-control service modules.
//!
//! Each submodule implements one RPC-registrable service: a constructor
//! taking the platform context, a registration hook that attaches its
//! routes to the shared listener, and a teardown hook. The composition
//! layer owns exactly one handle per module for the process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use thiserror::Error;

pub mod audio_sink;
pub mod audio_source;
pub mod diagnostics;
pub mod gatt;
pub mod hands_free;
pub mod host;
pub mod input;
pub mod link_channel;
pub mod media_player;
pub mod remote_control;
pub mod security;
pub mod serial_port;

pub use audio_sink::A2dpSink;
pub use audio_source::A2dpSource;
pub use diagnostics::Diagnostics;
pub use gatt::Gatt;
pub use hands_free::Hfp;
pub use host::Host;
pub use input::Hid;
pub use link_channel::L2cap;
pub use media_player::MediaPlayer;
pub use remote_control::Avrcp;
pub use security::Security;
pub use serial_port::Rfcomm;

/// One registrable RPC service.
///
/// Registration is commutative across services: each service owns a
/// disjoint `/{Name}/...` route prefix, so the order in which services
/// attach to the router is insignificant.
pub trait RpcService: Send + Sync {
    /// Stable service identity; the route prefix its methods live under.
    fn name(&self) -> &'static str;

    /// Attaches the service's routes to the shared listener router.
    fn register(&self, app: Router) -> Router;

    /// Releases the service's held resources.
    ///
    /// Called exactly once by the lifecycle controller during teardown.
    /// Must be safe to call even if the module never fully initialized,
    /// and must treat a repeated call as a no-op success.
    fn deinit(&self) -> Result<(), TeardownError>;
}

/// Failure of a single service's teardown.
///
/// Isolated per handle: one module's teardown error never prevents the
/// remaining modules from being torn down.
#[derive(Debug, Error)]
#[error("Teardown of {service} failed: {reason}")]
pub struct TeardownError {
    /// The service whose teardown failed.
    pub service: &'static str,
    /// Human-readable failure description.
    pub reason: String,
}

/// Once-guard shared by service teardown implementations.
///
/// `first_call` returns `true` only for the first caller; later calls see
/// `false` and treat teardown as an idempotent no-op.
pub(crate) struct TeardownGuard(AtomicBool);

impl TeardownGuard {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub(crate) fn first_call(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn is_torn_down(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
