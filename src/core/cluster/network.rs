// src/core/cluster/network.rs

//! Decides whether clients address nodes by their default addresses or by an
//! alternate set a node advertises (e.g. behind a NAT or ingress boundary).

use crate::core::cluster::bucket::BucketConfig;
use crate::core::cluster::node::NetworkAddress;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the conventional alternate network advertised for clients outside
/// the cluster's own network.
pub const EXTERNAL_NETWORK: &str = "external";

/// The address-selection policy configured on the environment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkResolution {
    /// Always use the default address set.
    Default,
    /// Use the `external` alternate set whenever any node advertises one.
    External,
    /// Match the seed addresses against the config to decide which set the
    /// client can actually reach.
    #[default]
    Auto,
    /// Like `External`, keyed by a custom network name.
    Custom(String),
}

impl From<String> for NetworkResolution {
    fn from(value: String) -> Self {
        match value.as_str() {
            "default" => NetworkResolution::Default,
            "external" => NetworkResolution::External,
            "auto" => NetworkResolution::Auto,
            _ => NetworkResolution::Custom(value),
        }
    }
}

impl From<NetworkResolution> for String {
    fn from(value: NetworkResolution) -> Self {
        match value {
            NetworkResolution::Default => "default".to_string(),
            NetworkResolution::External => "external".to_string(),
            NetworkResolution::Auto => "auto".to_string(),
            NetworkResolution::Custom(name) => name,
        }
    }
}

/// Applies the resolution policy to a freshly parsed config, assigning its
/// `use_alternate_network`. Called by the provider before a config is
/// published, never by the parser.
pub fn resolve(
    config: &mut BucketConfig,
    resolution: &NetworkResolution,
    seeds: &[NetworkAddress],
) {
    let selected = match resolution {
        NetworkResolution::Default => None,
        NetworkResolution::External => advertised_network(config, EXTERNAL_NETWORK),
        NetworkResolution::Custom(name) => advertised_network(config, name),
        NetworkResolution::Auto => match auto_resolve(config, seeds) {
            Some(network) => network,
            None => {
                debug!(
                    bucket = config.name(),
                    "no seed matched either address set, falling back to the default network"
                );
                None
            }
        },
    };
    config.set_use_alternate_network(selected);
}

/// `Some(name)` when any node advertises an alternate under `name`.
fn advertised_network(config: &BucketConfig, name: &str) -> Option<String> {
    config
        .nodes()
        .iter()
        .any(|node| node.alternate_address(name).is_some())
        .then(|| name.to_string())
}

/// The first seed matching either a default hostname (`Some(None)`: stay on
/// the default network) or an external alternate hostname
/// (`Some(Some("external"))`) decides. `None` when no seed matches at all.
fn auto_resolve(config: &BucketConfig, seeds: &[NetworkAddress]) -> Option<Option<String>> {
    for seed in seeds {
        for node in config.nodes() {
            if node.hostname().same_host(seed) {
                return Some(None);
            }
            if node
                .alternate_address(EXTERNAL_NETWORK)
                .is_some_and(|alt| alt.hostname().same_host(seed))
            {
                return Some(Some(EXTERNAL_NETWORK.to_string()));
            }
        }
    }
    None
}
