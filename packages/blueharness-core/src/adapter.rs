//! Platform adapter seam.
//!
//! This module provides the [`Adapter`] trait, the read-only capability
//! query contract the composition layer consumes. A real platform backend
//! (BlueZ, a vendor HAL) would implement it; the shipped implementation is
//! [`StaticAdapter`], an emulated adapter configured from the server config,
//! which is what a test endpoint runs against.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A Bluetooth profile the adapter may advertise support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Advanced audio distribution, source role (sends audio).
    A2dpSource,
    /// Advanced audio distribution, sink role (receives audio).
    A2dpSink,
    /// Audio/video remote control.
    Avrcp,
    /// Generic attribute profile (LE).
    Gatt,
    /// Hands-free profile.
    Hfp,
    /// Human interface device profile.
    Hid,
    /// Serial port emulation over RFCOMM.
    Spp,
}

/// Read-only query surface of the platform Bluetooth adapter.
///
/// The capability query is synchronous: it is answered from the adapter's
/// advertised state, not from live radio traffic. Implementations must be
/// cheap to call, although the composition layer only queries once.
pub trait Adapter: Send + Sync {
    /// The adapter's public device address (`AA:BB:CC:DD:EE:FF`).
    fn address(&self) -> String;

    /// The adapter's human-readable device name.
    fn name(&self) -> String;

    /// The set of profiles the adapter advertises support for.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be reached. Callers treat
    /// this as fatal at startup.
    fn supported_profiles(&self) -> Result<HashSet<Profile>, AdapterError>;
}

/// Emulated adapter backed by static configuration.
///
/// The default backend for the test endpoint: identity and capability set
/// come from the server config rather than from platform hardware.
#[derive(Debug, Clone)]
pub struct StaticAdapter {
    address: String,
    name: String,
    profiles: HashSet<Profile>,
}

impl StaticAdapter {
    /// Creates an emulated adapter with the given identity and profile set.
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        profiles: impl IntoIterator<Item = Profile>,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            profiles: profiles.into_iter().collect(),
        }
    }

    /// Creates a new `StaticAdapter` wrapped in an Arc.
    #[must_use]
    pub fn arc(
        address: impl Into<String>,
        name: impl Into<String>,
        profiles: impl IntoIterator<Item = Profile>,
    ) -> Arc<dyn Adapter> {
        Arc::new(Self::new(address, name, profiles))
    }
}

impl Adapter for StaticAdapter {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn supported_profiles(&self) -> Result<HashSet<Profile>, AdapterError> {
        Ok(self.profiles.clone())
    }
}

/// Errors that can occur when querying the platform adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The adapter is not present or powered off.
    #[error("Adapter unavailable: {0}")]
    Unavailable(String),

    /// The capability query itself failed.
    #[error("Capability query failed: {0}")]
    Query(String),
}
