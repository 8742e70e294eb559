//! Audio role capability probe.
//!
//! Exactly one of the two audio services (source or sink) is composed into
//! the endpoint, chosen once at startup from the adapter's advertised
//! profile set and never re-evaluated.

use crate::adapter::{Adapter, Profile};
use crate::error::HarnessResult;

/// The audio role the endpoint exposes.
///
/// A sum type rather than two optional fields: exactly one variant is
/// instantiated per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRole {
    /// The adapter can act as an audio source; expose `A2dpSource`.
    Source,
    /// No source support; expose `A2dpSink`.
    Sink,
}

impl AudioRole {
    /// The RPC service name registered for this role.
    #[must_use]
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Source => "A2dpSource",
            Self::Sink => "A2dpSink",
        }
    }
}

/// Probes the adapter for the audio role to expose.
///
/// Source support wins when advertised; everything else falls back to the
/// sink role. An unreachable adapter is a fatal startup error - the
/// endpoint must not come up with an ambiguous role.
pub fn probe_audio_role(adapter: &dyn Adapter) -> HarnessResult<AudioRole> {
    let profiles = adapter.supported_profiles()?;
    let role = if profiles.contains(&Profile::A2dpSource) {
        AudioRole::Source
    } else {
        AudioRole::Sink
    };
    log::info!("[Probe] Adapter supports {} profiles, audio role: {:?}", profiles.len(), role);
    Ok(role)
}
