//! Fixed endpoint constants.
//!
//! These values are part of the endpoint's external contract (well-known
//! port, identity strings) - changing them breaks clients that are wired
//! against a running harness.

/// Well-known port the RPC listener binds to.
///
/// Test drivers are configured against this port; it is fixed rather than
/// auto-assigned so that a harness is reachable without discovery.
pub const RPC_PORT: u16 = 8999;

/// Service identifier reported by the `/health` endpoint.
///
/// Clients probe `/health` and expect this exact string to identify a
/// BlueHarness endpoint.
pub const SERVICE_ID: &str = "blueharness";

/// Capacity of the endpoint event broadcast channel.
///
/// Events are best-effort notifications; a lagging subscriber misses old
/// events rather than blocking publishers.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Maximum number of unread input reports buffered per HID queue.
///
/// The oldest report is dropped once the queue is full.
pub const MAX_REPORT_QUEUE: usize = 32;
