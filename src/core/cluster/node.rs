// src/core/cluster/node.rs

//! Pure data carriers describing a single cluster node and its advertised
//! address sets.

use crate::core::service::ServiceType;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// A network address as handed to or advertised by the cluster.
///
/// Keeps both the original string and, when the string is an IP literal, the
/// parsed numeric form. The client never resolves names itself; address
/// resolution primitives live with the wire-level client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    raw: String,
    ip: Option<IpAddr>,
}

impl NetworkAddress {
    pub fn new(host: impl Into<String>) -> Self {
        let raw = host.into();
        let ip = raw.parse::<IpAddr>().ok();
        Self { raw, ip }
    }

    pub fn localhost() -> Self {
        Self::new("127.0.0.1")
    }

    /// The numeric form when the address is an IP literal, the raw string
    /// otherwise. IPv6 literals are kept verbatim.
    pub fn address(&self) -> String {
        match self.ip {
            Some(ip) => ip.to_string(),
            None => self.raw.clone(),
        }
    }

    /// The original string this address was created from.
    pub fn name_or_address(&self) -> &str {
        &self.raw
    }

    pub fn is_loopback(&self) -> bool {
        self.ip.is_some_and(|ip| ip.is_loopback())
    }

    /// Whether two addresses refer to the same host, comparing numeric forms
    /// when available.
    pub fn same_host(&self, other: &NetworkAddress) -> bool {
        match (self.ip, other.ip) {
            (Some(a), Some(b)) => a == b,
            _ => self.raw == other.raw,
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for NetworkAddress {
    fn from(host: &str) -> Self {
        Self::new(host)
    }
}

/// A second address set a node advertises for clients reaching the cluster
/// through a NAT or ingress boundary.
#[derive(Debug, Clone)]
pub struct AlternateAddress {
    hostname: NetworkAddress,
    raw_hostname: String,
    services: HashMap<ServiceType, u16>,
    ssl_services: HashMap<ServiceType, u16>,
}

impl AlternateAddress {
    pub(crate) fn new(
        hostname: NetworkAddress,
        raw_hostname: String,
        services: HashMap<ServiceType, u16>,
        ssl_services: HashMap<ServiceType, u16>,
    ) -> Self {
        Self {
            hostname,
            raw_hostname,
            services,
            ssl_services,
        }
    }

    pub fn hostname(&self) -> &NetworkAddress {
        &self.hostname
    }

    /// The hostname string as it appeared on the wire.
    pub fn raw_hostname(&self) -> &str {
        &self.raw_hostname
    }

    pub fn services(&self) -> &HashMap<ServiceType, u16> {
        &self.services
    }

    pub fn ssl_services(&self) -> &HashMap<ServiceType, u16> {
        &self.ssl_services
    }
}

/// One node of the cluster as described by a bucket configuration.
///
/// Service maps may be empty but never contain a zero port; the parser
/// rejects configs violating that.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    hostname: NetworkAddress,
    raw_hostname: String,
    services: HashMap<ServiceType, u16>,
    ssl_services: HashMap<ServiceType, u16>,
    alternate_addresses: HashMap<String, AlternateAddress>,
}

impl NodeInfo {
    pub(crate) fn new(
        hostname: NetworkAddress,
        raw_hostname: String,
        services: HashMap<ServiceType, u16>,
        ssl_services: HashMap<ServiceType, u16>,
        alternate_addresses: HashMap<String, AlternateAddress>,
    ) -> Self {
        Self {
            hostname,
            raw_hostname,
            services,
            ssl_services,
            alternate_addresses,
        }
    }

    /// The resolved address clients connect to. Placeholder and loopback
    /// hostnames have already been substituted with the config's origin.
    pub fn hostname(&self) -> &NetworkAddress {
        &self.hostname
    }

    /// The hostname string as it appeared on the wire, before any
    /// substitution (it may still be the `$HOST` placeholder or a loopback
    /// literal).
    pub fn raw_hostname(&self) -> &str {
        &self.raw_hostname
    }

    pub fn services(&self) -> &HashMap<ServiceType, u16> {
        &self.services
    }

    pub fn ssl_services(&self) -> &HashMap<ServiceType, u16> {
        &self.ssl_services
    }

    pub fn alternate_addresses(&self) -> &HashMap<String, AlternateAddress> {
        &self.alternate_addresses
    }

    /// The alternate address advertised under `network`, if any.
    pub fn alternate_address(&self, network: &str) -> Option<&AlternateAddress> {
        self.alternate_addresses.get(network)
    }
}
