// src/core/cluster/ketama.rs

//! The consistent-hashing ring used by memcached-type buckets.
//!
//! Each data node contributes 160 points on a 64-bit ring: 40 repetitions of
//! `MD5("<address>-<i>")`, each digest yielding 4 points. Lookup walks to the
//! first point at or after the key hash and wraps around at the end.

use crate::core::cluster::node::NodeInfo;
use std::collections::BTreeMap;

const REPETITIONS: usize = 40;
const POINTS_PER_DIGEST: usize = 4;

/// Ring points mapped to indices into the owning bucket config's node list.
/// Storing indices keeps the ring small; callers resolve them against the
/// node list they built the ring from.
#[derive(Debug, Clone, Default)]
pub struct KetamaRing {
    points: BTreeMap<u64, usize>,
}

impl KetamaRing {
    /// Builds the ring from `(index, node)` pairs. Callers are expected to
    /// pass only ring-eligible nodes (those carrying the key-value service).
    pub(crate) fn build<'a>(nodes: impl Iterator<Item = (usize, &'a NodeInfo)>) -> Self {
        let mut points = BTreeMap::new();
        for (index, node) in nodes {
            let address = node.hostname().address();
            for repetition in 0..REPETITIONS {
                let digest = md5::compute(format!("{address}-{repetition}"));
                for part in 0..POINTS_PER_DIGEST {
                    points.insert(point_from_digest(&digest.0, part), index);
                }
            }
        }
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points on the ring (160 per participating node).
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// The 64-bit ring position of a key.
    pub fn hash_key(key: &[u8]) -> u64 {
        let digest = md5::compute(key);
        point_from_digest(&digest.0, 0)
    }

    /// The node index owning `hash`: the first point at or after it, wrapping
    /// to the lowest point past the end of the ring.
    pub(crate) fn locate_index(&self, hash: u64) -> Option<usize> {
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, &index)| index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.points.iter().map(|(&point, &index)| (point, index))
    }
}

/// One of the four ring points carried by a 16-byte digest, composed from
/// bytes `[4*part, 4*part+3]` low-to-high.
fn point_from_digest(digest: &[u8; 16], part: usize) -> u64 {
    let base = part * 4;
    (u64::from(digest[base + 3]) << 24)
        | (u64::from(digest[base + 2]) << 16)
        | (u64::from(digest[base + 1]) << 8)
        | u64::from(digest[base])
}
