// src/core/service.rs

//! The services a cluster node can expose, and the mapping from the wire
//! format's service names.

/// One service exposed by a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// The binary key-value service. Only nodes carrying this service
    /// participate in the ketama ring of a memcached bucket.
    KeyValue,
    /// The cluster management / configuration service.
    Config,
    /// The view engine.
    Views,
    /// The query service.
    Query,
    /// The full-text search service.
    Search,
    /// The analytics service.
    Analytics,
}

impl ServiceType {
    /// Maps a wire-format service name to a service type plus whether the
    /// entry refers to the TLS port. Unknown names return `None` and are
    /// skipped by the parser so newer servers can add services without
    /// breaking older clients.
    ///
    /// The legacy `ports` map spells the key-value port `direct`.
    pub fn from_wire(name: &str) -> Option<(ServiceType, bool)> {
        let (base, ssl) = match name.strip_suffix("SSL") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let service = match base {
            "kv" | "direct" => ServiceType::KeyValue,
            "mgmt" => ServiceType::Config,
            "capi" => ServiceType::Views,
            "n1ql" => ServiceType::Query,
            "fts" => ServiceType::Search,
            "cbas" => ServiceType::Analytics,
            _ => return None,
        };
        Some((service, ssl))
    }
}
