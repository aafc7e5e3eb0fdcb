// src/core/cluster/mod.rs

//! The parsed, immutable view of cluster topology: node records, bucket
//! configurations, the ketama ring for memcached buckets, and the network
//! resolution policy.

pub mod bucket;
pub mod ketama;
pub mod network;
pub mod node;
pub mod parser;

// Re-export key types for easier access from other modules.
pub use bucket::{
    BucketConfig, ClusterConfig, DocumentBucketConfig, EphemeralBucketConfig,
    MemcachedBucketConfig,
};
pub use ketama::KetamaRing;
pub use network::NetworkResolution;
pub use node::{AlternateAddress, NetworkAddress, NodeInfo};
