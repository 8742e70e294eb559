//! Shared platform context for service modules.
//!
//! This module provides [`PlatformContext`], the handle every service
//! constructor receives. It bundles the adapter seam with the small amount
//! of cross-service runtime state a test endpoint needs: the table of
//! emulated ACL connections and the endpoint event feed.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::adapter::Adapter;
use crate::constants::EVENT_CHANNEL_CAPACITY;

/// One emulated ACL connection to a peer device.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRecord {
    /// Peer device address.
    pub address: String,
}

/// Events published on the endpoint feed.
///
/// Best-effort notifications consumed by blocking RPC methods (e.g.
/// `Host/WaitConnection`) and by the diagnostics surface. A lagging
/// subscriber misses old events rather than blocking the publisher.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EndpointEvent {
    /// A connection to a peer came up.
    ConnectionUp {
        /// Opaque connection token.
        token: String,
        /// Peer device address.
        address: String,
    },
    /// A connection to a peer went down.
    ConnectionDown {
        /// Opaque connection token.
        token: String,
        /// Peer device address.
        address: String,
    },
    /// A bond with a peer completed.
    Paired {
        /// Peer device address.
        address: String,
    },
    /// The hands-free call state changed.
    CallState {
        /// New call state name.
        state: String,
    },
    /// Media playback started or stopped.
    Playback {
        /// Whether playback is active.
        playing: bool,
    },
}

/// Platform context shared by all service modules.
///
/// Owned by the composition layer and passed to each service constructor
/// as `Arc<PlatformContext>`. Services exclusively own their protocol
/// state; the context only carries what genuinely crosses service
/// boundaries.
pub struct PlatformContext {
    adapter: Arc<dyn Adapter>,
    connections: DashMap<String, ConnectionRecord>,
    events: broadcast::Sender<EndpointEvent>,
}

impl PlatformContext {
    /// Creates a context around the given adapter.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            adapter,
            connections: DashMap::new(),
            events,
        }
    }

    /// The platform adapter handle.
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Subscribes to the endpoint event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.events.subscribe()
    }

    /// Publishes an event on the endpoint feed.
    ///
    /// Delivery is best-effort: an event with no live subscribers is
    /// silently dropped.
    pub fn emit(&self, event: EndpointEvent) {
        let _ = self.events.send(event);
    }

    /// Registers a new connection to `address` and returns its token.
    pub fn register_connection(&self, address: impl Into<String>) -> String {
        let address = address.into();
        let token = Uuid::new_v4().to_string();
        self.connections.insert(
            token.clone(),
            ConnectionRecord {
                address: address.clone(),
            },
        );
        self.emit(EndpointEvent::ConnectionUp {
            token: token.clone(),
            address,
        });
        token
    }

    /// Removes a connection by token, returning its record if it existed.
    pub fn drop_connection(&self, token: &str) -> Option<ConnectionRecord> {
        let (token, record) = self.connections.remove(token)?;
        self.emit(EndpointEvent::ConnectionDown {
            token,
            address: record.address.clone(),
        });
        Some(record)
    }

    /// Looks up a connection by token.
    pub fn connection(&self, token: &str) -> Option<ConnectionRecord> {
        self.connections.get(token).map(|r| r.value().clone())
    }

    /// Whether a connection with the given token exists.
    pub fn connection_exists(&self, token: &str) -> bool {
        self.connections.contains_key(token)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Drops every live connection. Used by `Host/FactoryReset` and by
    /// host teardown.
    pub fn clear_connections(&self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    fn test_context() -> PlatformContext {
        PlatformContext::new(StaticAdapter::arc("AA:BB:CC:DD:EE:FF", "harness-0", []))
    }

    #[test]
    fn connection_round_trip() {
        let ctx = test_context();
        let token = ctx.register_connection("11:22:33:44:55:66");
        assert!(ctx.connection_exists(&token));
        assert_eq!(ctx.connection(&token).unwrap().address, "11:22:33:44:55:66");

        let record = ctx.drop_connection(&token).unwrap();
        assert_eq!(record.address, "11:22:33:44:55:66");
        assert!(!ctx.connection_exists(&token));
    }

    #[test]
    fn drop_unknown_connection_returns_none() {
        let ctx = test_context();
        assert!(ctx.drop_connection("no-such-token").is_none());
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let ctx = test_context();
        let mut rx = ctx.subscribe();
        let token = ctx.register_connection("11:22:33:44:55:66");

        match rx.recv().await.unwrap() {
            EndpointEvent::ConnectionUp { token: t, address } => {
                assert_eq!(t, token);
                assert_eq!(address, "11:22:33:44:55:66");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn clear_connections_empties_table() {
        let ctx = test_context();
        ctx.register_connection("11:22:33:44:55:66");
        ctx.register_connection("66:55:44:33:22:11");
        assert_eq!(ctx.clear_connections(), 2);
        assert_eq!(ctx.connection_count(), 0);
    }
}
