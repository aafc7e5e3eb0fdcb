// src/config.rs

//! Client configuration: the environment a `ConfigurationProvider` is created
//! with. Owned by the caller and passed in explicitly; there is no process-wide
//! singleton.

use crate::core::cluster::network::NetworkResolution;
use serde::{Deserialize, Serialize};

/// The environment for a single client instance.
///
/// All fields have serde defaults so a `ClientConfig` can be deserialized from
/// a partial document (e.g. an application config file) as well as built in
/// code via `ClientConfig::default()`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    /// How node addresses are selected from a bucket config (default vs.
    /// alternate network). See [`NetworkResolution`].
    #[serde(default)]
    pub network_resolution: NetworkResolution,

    /// The management port used by the HTTP config loader and refresher.
    #[serde(default = "default_config_port")]
    pub config_port: u16,

    /// Timeout for a single HTTP config request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Interval between refresher polls for an opened bucket, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network_resolution: NetworkResolution::default(),
            config_port: default_config_port(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_config_port() -> u16 {
    8091
}
fn default_request_timeout_ms() -> u64 {
    5000 // 5 seconds
}
fn default_poll_interval_ms() -> u64 {
    2500
}
