// src/core/cluster/bucket.rs

//! Bucket configurations and the immutable cluster-wide snapshot.
//!
//! A `BucketConfig` is produced by the parser and never mutated afterwards,
//! with one exception: the provider assigns `use_alternate_network` through
//! the network resolution policy before publishing. Consumers branch on the
//! variant tag.

use crate::core::cluster::ketama::KetamaRing;
use crate::core::cluster::node::NodeInfo;
use std::collections::HashMap;

/// Fields shared by every bucket config variant.
#[derive(Debug, Clone)]
pub struct BucketInfo {
    name: String,
    uuid: Option<String>,
    rev: Option<u64>,
    nodes: Vec<NodeInfo>,
    use_alternate_network: Option<String>,
}

impl BucketInfo {
    pub(crate) fn new(
        name: String,
        uuid: Option<String>,
        rev: Option<u64>,
        nodes: Vec<NodeInfo>,
    ) -> Self {
        Self {
            name,
            uuid,
            rev,
            nodes,
            use_alternate_network: None,
        }
    }
}

/// A parsed, immutable view of one bucket's topology at a given revision.
#[derive(Debug, Clone)]
pub enum BucketConfig {
    /// A document bucket: hash-partitioned with a vBucket map.
    Document(DocumentBucketConfig),
    /// An ephemeral bucket: vBucket-partitioned, memory only.
    Ephemeral(EphemeralBucketConfig),
    /// A memcached bucket: node selection via the ketama ring.
    Memcached(MemcachedBucketConfig),
}

impl BucketConfig {
    fn info(&self) -> &BucketInfo {
        match self {
            BucketConfig::Document(c) => &c.info,
            BucketConfig::Ephemeral(c) => &c.info,
            BucketConfig::Memcached(c) => &c.info,
        }
    }

    fn info_mut(&mut self) -> &mut BucketInfo {
        match self {
            BucketConfig::Document(c) => &mut c.info,
            BucketConfig::Ephemeral(c) => &mut c.info,
            BucketConfig::Memcached(c) => &mut c.info,
        }
    }

    /// The bucket name, unique within a [`ClusterConfig`].
    pub fn name(&self) -> &str {
        &self.info().name
    }

    /// The bucket identity, absent when the server has not assigned one yet.
    pub fn uuid(&self) -> Option<&str> {
        self.info().uuid.as_deref()
    }

    /// The server-assigned revision. Absent for configs parsed during
    /// bootstrap from servers that do not report one; such configs are
    /// rejected by the acceptance engine.
    pub fn rev(&self) -> Option<u64> {
        self.info().rev
    }

    /// The nodes of this bucket, in server-provided order.
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.info().nodes
    }

    /// The alternate network selected by the resolution policy, if any.
    pub fn use_alternate_network(&self) -> Option<&str> {
        self.info().use_alternate_network.as_deref()
    }

    /// Assigned by the network resolver before the config is published, never
    /// by the parser.
    pub(crate) fn set_use_alternate_network(&mut self, network: Option<String>) {
        self.info_mut().use_alternate_network = network;
    }
}

/// Bucket variant for document buckets. The partition map is carried as
/// opaque JSON; only higher layers interpret it.
#[derive(Debug, Clone)]
pub struct DocumentBucketConfig {
    pub(crate) info: BucketInfo,
    partition_map: serde_json::Value,
}

impl DocumentBucketConfig {
    pub(crate) fn new(info: BucketInfo, partition_map: serde_json::Value) -> Self {
        Self {
            info,
            partition_map,
        }
    }

    /// The raw `vBucketServerMap` of this config.
    pub fn partition_map(&self) -> &serde_json::Value {
        &self.partition_map
    }
}

/// Bucket variant for ephemeral buckets.
#[derive(Debug, Clone)]
pub struct EphemeralBucketConfig {
    pub(crate) info: BucketInfo,
}

impl EphemeralBucketConfig {
    pub(crate) fn new(info: BucketInfo) -> Self {
        Self { info }
    }
}

/// Bucket variant for memcached buckets, carrying the derived ketama ring.
#[derive(Debug, Clone)]
pub struct MemcachedBucketConfig {
    pub(crate) info: BucketInfo,
    ring: KetamaRing,
}

impl MemcachedBucketConfig {
    pub(crate) fn new(info: BucketInfo, ring: KetamaRing) -> Self {
        Self { info, ring }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn uuid(&self) -> Option<&str> {
        self.info.uuid.as_deref()
    }

    pub fn rev(&self) -> Option<u64> {
        self.info.rev
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.info.nodes
    }

    pub fn ring(&self) -> &KetamaRing {
        &self.ring
    }

    /// All ring points with the node each maps to. Every node yielded here is
    /// a member of `nodes()` carrying the key-value service.
    pub fn ketama_nodes(&self) -> impl Iterator<Item = (u64, &NodeInfo)> {
        self.ring.iter().map(|(point, index)| {
            (point, &self.info.nodes[index])
        })
    }

    /// The node owning `key`, by 64-bit ketama hash with wrap-around. `None`
    /// only when no node carries the key-value service.
    pub fn locate(&self, key: &[u8]) -> Option<&NodeInfo> {
        let hash = KetamaRing::hash_key(key);
        self.ring.locate_index(hash).map(|index| &self.info.nodes[index])
    }
}

/// An immutable snapshot mapping bucket names to their configurations. The
/// provider replaces the whole snapshot atomically on every accepted change;
/// readers never observe torn state.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    buckets: HashMap<String, BucketConfig>,
}

impl ClusterConfig {
    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    pub fn bucket_config(&self, name: &str) -> Option<&BucketConfig> {
        self.buckets.get(name)
    }

    pub fn bucket_configs(&self) -> &HashMap<String, BucketConfig> {
        &self.buckets
    }

    /// A new snapshot with the config's bucket entry replaced.
    pub(crate) fn with_bucket(&self, config: BucketConfig) -> Self {
        let mut buckets = self.buckets.clone();
        buckets.insert(config.name().to_string(), config);
        Self { buckets }
    }
}
