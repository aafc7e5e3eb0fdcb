// src/core/cluster/parser.rs

//! Turns a raw JSON configuration payload into a [`BucketConfig`].
//!
//! The parser is strict about ports (zero ports are rejected) and lenient
//! about everything additive: unknown service names and unknown top-level
//! fields are skipped, a missing `uuid` or `rev` is carried as `None`.

use crate::core::cluster::bucket::{
    BucketConfig, BucketInfo, DocumentBucketConfig, EphemeralBucketConfig, MemcachedBucketConfig,
};
use crate::core::cluster::ketama::KetamaRing;
use crate::core::cluster::node::{AlternateAddress, NetworkAddress, NodeInfo};
use crate::core::errors::LarimarError;
use crate::core::service::ServiceType;
use serde::Deserialize;
use std::collections::HashMap;

/// Placeholder the server uses for "the host this payload was fetched from".
const HOST_PLACEHOLDER: &str = "$HOST";

#[derive(Deserialize)]
struct WireConfig {
    name: String,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    rev: Option<u64>,
    #[serde(rename = "nodeLocator", default)]
    node_locator: Option<String>,
    #[serde(rename = "bucketType", default)]
    bucket_type: Option<String>,
    #[serde(default)]
    nodes: Vec<WireNode>,
    #[serde(rename = "nodesExt", default)]
    nodes_ext: Vec<WireNode>,
    #[serde(rename = "vBucketServerMap", default)]
    vbucket_server_map: Option<serde_json::Value>,
}

/// One node record. Legacy entries in `nodes` carry `hostname` (with a
/// management port suffix) and `ports`; current entries in `nodesExt` carry
/// `services` and `alternateAddresses`.
#[derive(Deserialize, Default)]
struct WireNode {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    ports: HashMap<String, u32>,
    #[serde(default)]
    services: HashMap<String, u32>,
    #[serde(rename = "alternateAddresses", default)]
    alternate_addresses: HashMap<String, WireAlternate>,
}

#[derive(Deserialize)]
struct WireAlternate {
    hostname: String,
    #[serde(default)]
    ports: HashMap<String, u32>,
}

/// Parses a raw configuration payload.
///
/// `origin` is the address the payload was fetched from. It replaces the
/// `$HOST` placeholder and loopback hostnames the server emits for "this
/// host"; without an origin, `$HOST` degrades to the loopback address.
pub fn parse(raw: &str, origin: Option<&NetworkAddress>) -> Result<BucketConfig, LarimarError> {
    let wire: WireConfig = serde_json::from_str(raw)
        .map_err(|e| LarimarError::InvalidConfig(format!("malformed config payload: {e}")))?;

    if wire.name.is_empty() {
        return Err(LarimarError::InvalidConfig("bucket name is empty".into()));
    }
    if wire.nodes.is_empty() {
        return Err(LarimarError::InvalidConfig(format!(
            "config for bucket '{}' contains no nodes",
            wire.name
        )));
    }

    // nodes[i] and nodesExt[i] describe the same node; nodesExt entries past
    // the end of the nodes array join the node list but stay off the ring.
    let ring_eligible = wire.nodes.len();
    let mut nodes = Vec::new();
    if wire.nodes_ext.is_empty() {
        for legacy in &wire.nodes {
            nodes.push(build_node(None, Some(legacy), origin)?);
        }
    } else {
        for (i, ext) in wire.nodes_ext.iter().enumerate() {
            nodes.push(build_node(Some(ext), wire.nodes.get(i), origin)?);
        }
        for legacy in wire.nodes.iter().skip(wire.nodes_ext.len()) {
            nodes.push(build_node(None, Some(legacy), origin)?);
        }
    }

    match wire.node_locator.as_deref() {
        Some("ketama") => {
            let ring = KetamaRing::build(
                nodes
                    .iter()
                    .take(ring_eligible)
                    .enumerate()
                    .filter(|(_, node)| node.services().contains_key(&ServiceType::KeyValue)),
            );
            let info = BucketInfo::new(wire.name, wire.uuid, wire.rev, nodes);
            Ok(BucketConfig::Memcached(MemcachedBucketConfig::new(
                info, ring,
            )))
        }
        Some("vbucket") | None => {
            let info = BucketInfo::new(wire.name, wire.uuid, wire.rev, nodes);
            if wire.bucket_type.as_deref() == Some("ephemeral") {
                Ok(BucketConfig::Ephemeral(EphemeralBucketConfig::new(info)))
            } else {
                let partition_map = wire.vbucket_server_map.unwrap_or(serde_json::Value::Null);
                Ok(BucketConfig::Document(DocumentBucketConfig::new(
                    info,
                    partition_map,
                )))
            }
        }
        Some(other) => Err(LarimarError::InvalidConfig(format!(
            "unknown node locator '{other}'"
        ))),
    }
}

fn build_node(
    current: Option<&WireNode>,
    legacy: Option<&WireNode>,
    origin: Option<&NetworkAddress>,
) -> Result<NodeInfo, LarimarError> {
    let (hostname, raw_hostname) = node_hostname(current, legacy, origin);

    // Current-style `services` wins over the legacy `ports` map, whichever
    // record carries it.
    let service_source = [
        current.map(|n| &n.services),
        legacy.map(|n| &n.services),
        current.map(|n| &n.ports),
        legacy.map(|n| &n.ports),
    ]
    .into_iter()
    .flatten()
    .find(|map| !map.is_empty());
    let (services, ssl_services) = match service_source {
        Some(map) => split_services(map)?,
        None => (HashMap::new(), HashMap::new()),
    };

    let mut alternates = HashMap::new();
    let alternate_source = [current, legacy]
        .into_iter()
        .flatten()
        .find(|n| !n.alternate_addresses.is_empty());
    if let Some(record) = alternate_source {
        for (network, wire_alternate) in &record.alternate_addresses {
            let (alt_services, alt_ssl) = split_services(&wire_alternate.ports)?;
            alternates.insert(
                network.clone(),
                AlternateAddress::new(
                    NetworkAddress::new(wire_alternate.hostname.clone()),
                    wire_alternate.hostname.clone(),
                    alt_services,
                    alt_ssl,
                ),
            );
        }
    }

    Ok(NodeInfo::new(
        hostname,
        raw_hostname,
        services,
        ssl_services,
        alternates,
    ))
}

/// Resolves a node's address, returning both the resolved form and the wire
/// string it came from. The two diverge exactly when the server encoded
/// "this host" as `$HOST` or a loopback literal and an origin substitutes it.
fn node_hostname(
    current: Option<&WireNode>,
    legacy: Option<&WireNode>,
    origin: Option<&NetworkAddress>,
) -> (NetworkAddress, String) {
    let raw = current
        .and_then(|c| c.hostname.as_deref())
        .or_else(|| legacy.and_then(|l| l.hostname.as_deref()))
        .map(strip_management_port)
        .unwrap_or(HOST_PLACEHOLDER);

    if raw == HOST_PLACEHOLDER {
        let resolved = origin.cloned().unwrap_or_else(NetworkAddress::localhost);
        return (resolved, raw.to_string());
    }
    let address = NetworkAddress::new(raw);
    let resolved = match origin {
        // Loopback stands for "this host" in single-node payloads.
        Some(origin) if address.is_loopback() => origin.clone(),
        _ => address,
    };
    (resolved, raw.to_string())
}

/// Strips the `:port` management suffix legacy hostnames carry. Bare IPv6
/// literals contain multiple colons and are left untouched.
fn strip_management_port(hostname: &str) -> &str {
    match hostname.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => hostname,
    }
}

/// Splits a wire service map into plaintext and TLS port maps, validating
/// every port along the way.
fn split_services(
    wire: &HashMap<String, u32>,
) -> Result<(HashMap<ServiceType, u16>, HashMap<ServiceType, u16>), LarimarError> {
    let mut services = HashMap::new();
    let mut ssl_services = HashMap::new();
    for (name, &port) in wire {
        if port == 0 || port > u32::from(u16::MAX) {
            return Err(LarimarError::InvalidConfig(format!(
                "service '{name}' advertises invalid port {port}"
            )));
        }
        let Some((service, ssl)) = ServiceType::from_wire(name) else {
            continue;
        };
        if ssl {
            ssl_services.insert(service, port as u16);
        } else {
            services.insert(service, port as u16);
        }
    }
    Ok((services, ssl_services))
}
