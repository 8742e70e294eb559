//! BlueHarness Core - composition and lifecycle for a Bluetooth test endpoint.
//!
//! This crate wires a fixed set of protocol-control services - plus one
//! capability-dependent audio service - behind a single HTTP/JSON RPC
//! listener, and manages the endpoint's lifecycle from composition through
//! teardown.
//!
//! # Architecture
//!
//! - [`adapter`]: platform adapter seam and the capability query contract
//! - [`context`]: shared platform context handed to service constructors
//! - [`probe`]: one-shot audio role selection from adapter capabilities
//! - [`services`]: the protocol-control service modules
//! - [`compose`]: the composition root (build + register, no sockets)
//! - [`server`]: listener startup and lifecycle control
//! - [`error`]: centralized error types
//!
//! # Lifecycle
//!
//! ```ignore
//! let ctx = Arc::new(PlatformContext::new(adapter));
//! let server = compose(&ctx)?.serve(addr).await?;
//! // ... external shutdown signal ...
//! server.shutdown();
//! server.await_termination().await?;
//! server.deinit();
//! ```

#![warn(clippy::all)]

pub mod adapter;
pub mod compose;
pub mod constants;
pub mod context;
pub mod error;
pub mod probe;
pub mod server;
pub mod services;

// Re-export commonly used types at the crate root
pub use adapter::{Adapter, AdapterError, Profile, StaticAdapter};
pub use compose::{build_services, compose, compose_with, ComposedServer};
pub use constants::RPC_PORT;
pub use context::{ConnectionRecord, EndpointEvent, PlatformContext};
pub use error::{HarnessError, HarnessResult};
pub use probe::{probe_audio_role, AudioRole};
pub use server::{RunningServer, ServerState};
pub use services::{RpcService, TeardownError};
