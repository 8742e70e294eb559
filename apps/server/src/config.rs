//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use blueharness_core::Profile;
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the RPC listener to.
    /// Override: `BLUEHARNESS_BIND_PORT`
    pub bind_port: u16,

    /// Device address the emulated adapter reports.
    /// Override: `BLUEHARNESS_ADAPTER_ADDRESS`
    pub adapter_address: String,

    /// Device name the emulated adapter reports.
    /// Override: `BLUEHARNESS_ADAPTER_NAME`
    pub adapter_name: String,

    /// Profiles the emulated adapter advertises support for. The audio
    /// role exposed by the endpoint is derived from this set at startup.
    pub profiles: Vec<Profile>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: blueharness_core::RPC_PORT,
            adapter_address: "AA:BB:CC:DD:EE:FF".to_string(),
            adapter_name: "blueharness".to_string(),
            profiles: vec![
                Profile::A2dpSource,
                Profile::Avrcp,
                Profile::Gatt,
                Profile::Hfp,
                Profile::Hid,
                Profile::Spp,
            ],
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BLUEHARNESS_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("BLUEHARNESS_ADAPTER_ADDRESS") {
            if !val.is_empty() {
                self.adapter_address = val;
            }
        }

        if let Ok(val) = std::env::var("BLUEHARNESS_ADAPTER_NAME") {
            if !val.is_empty() {
                self.adapter_name = val;
            }
        }
    }
}
