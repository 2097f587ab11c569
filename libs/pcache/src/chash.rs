//! Weighted consistent-hash ring used to route blocks to PCP hosts.
//!
//! Every physical node owns `round(150 × (1 + priority))` virtual nodes, so a
//! node with priority 1.0 absorbs twice the keyspace of a priority-0 node.
//! Keys and virtual nodes hash to the first 8 bytes of their MD5 digest,
//! interpreted big-endian.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Number of virtual nodes a priority-0 physical node contributes.
const BASE_VIRTUAL_NODES: f64 = 150.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalNode {
    pub host: String,
    #[serde(default)]
    pub priority: f64,
}

/// The PCP topology as published by the PMS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PcpTable {
    #[serde(default)]
    pub checksum: String,
    #[serde(rename = "pcpList", default)]
    pub pcp_list: Vec<PhysicalNode>,
}

fn hash_key(key: &str) -> u64 {
    let digest = md5::compute(key.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("md5 digest is 16 bytes"))
}

#[derive(Default)]
struct RingInner {
    /// Sorted virtual-node hashes.
    keys: Vec<u64>,
    /// Virtual-node hash -> owning host.
    ring: HashMap<u64, String>,
    /// Host -> its virtual-node hashes.
    node_hashes: HashMap<String, Vec<u64>>,
}

/// A weighted consistent-hash ring.
///
/// Reads vastly outnumber writes (writes only happen while a new
/// `PcpManager` is being built), hence the `RwLock`.
pub struct ConsistentHash {
    inner: RwLock<RingInner>,
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistentHash {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RingInner::default()),
        }
    }

    /// Inserts a node and its virtual nodes. Idempotent on host: re-adding
    /// an existing host is a no-op.
    pub fn add(&self, node: &PhysicalNode) {
        let mut inner = self.inner.write().expect("chash lock poisoned");
        if inner.node_hashes.contains_key(&node.host) {
            return;
        }

        let virtual_count = (BASE_VIRTUAL_NODES * (1.0 + node.priority)).round() as usize;
        let mut hashes = Vec::with_capacity(virtual_count);
        for i in 0..virtual_count {
            let hash = hash_key(&format!("{}#{}", node.host, i));
            hashes.push(hash);
            inner.ring.insert(hash, node.host.clone());
        }

        inner.keys.extend_from_slice(&hashes);
        inner.keys.sort_unstable();
        inner.node_hashes.insert(node.host.clone(), hashes);
    }

    /// Removes a node and all of its virtual nodes. Unknown hosts are a
    /// no-op.
    pub fn remove(&self, node: &PhysicalNode) {
        let mut inner = self.inner.write().expect("chash lock poisoned");
        let Some(hashes) = inner.node_hashes.remove(&node.host) else {
            return;
        };
        for hash in &hashes {
            inner.ring.remove(hash);
        }
        inner.keys.retain(|k| !hashes.contains(k));
    }

    /// Maps a key to the host owning the first virtual node at or after the
    /// key's hash, wrapping around the ring. An empty ring yields an empty
    /// host, meaning "no PCP, use the origin store".
    pub fn get(&self, key: &str) -> String {
        let inner = self.inner.read().expect("chash lock poisoned");
        if inner.keys.is_empty() {
            return String::new();
        }

        let hash = hash_key(key);
        let mut idx = inner.keys.partition_point(|&k| k < hash);
        if idx == inner.keys.len() {
            idx = 0;
        }
        inner.ring[&inner.keys[idx]].clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("chash lock poisoned").keys.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.inner
            .read()
            .expect("chash lock poisoned")
            .node_hashes
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, priority: f64) -> PhysicalNode {
        PhysicalNode {
            host: host.to_string(),
            priority,
        }
    }

    #[test]
    fn empty_ring_returns_empty_host() {
        let ring = ConsistentHash::new();
        assert_eq!(ring.get("anything"), "");
        assert!(ring.is_empty());
    }

    #[test]
    fn lookup_returns_member_host() {
        let ring = ConsistentHash::new();
        ring.add(&node("node1", 0.5));
        ring.add(&node("node2", 0.2));

        for i in 0..100 {
            let host = ring.get(&format!("key-{i}"));
            assert!(host == "node1" || host == "node2", "unexpected host {host}");
        }
    }

    #[test]
    fn lookup_is_deterministic() {
        let ring = ConsistentHash::new();
        ring.add(&node("node1", 0.0));
        ring.add(&node("node2", 0.0));
        ring.add(&node("node3", 1.0));

        let first: Vec<String> = (0..64).map(|i| ring.get(&format!("k{i}"))).collect();
        let second: Vec<String> = (0..64).map(|i| ring.get(&format!("k{i}"))).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn remove_and_readd_restores_mapping() {
        let ring = ConsistentHash::new();
        ring.add(&node("node1", 0.5));
        ring.add(&node("node2", 0.2));

        let before: Vec<String> = (0..128).map(|i| ring.get(&format!("k{i}"))).collect();

        ring.remove(&node("node1", 0.5));
        assert_eq!(ring.node_count(), 1);
        for i in 0..128 {
            assert_eq!(ring.get(&format!("k{i}")), "node2");
        }

        ring.add(&node("node1", 0.5));
        let after: Vec<String> = (0..128).map(|i| ring.get(&format!("k{i}"))).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn add_is_idempotent_on_host() {
        let ring = ConsistentHash::new();
        ring.add(&node("node1", 0.0));
        ring.add(&node("node1", 3.0));
        assert_eq!(ring.node_count(), 1);

        let inner = ring.inner.read().unwrap();
        assert_eq!(inner.keys.len(), 150);
    }

    #[test]
    fn virtual_node_count_scales_with_priority() {
        let ring = ConsistentHash::new();
        ring.add(&node("a", 0.0));
        ring.add(&node("b", 1.0));

        let inner = ring.inner.read().unwrap();
        assert_eq!(inner.node_hashes["a"].len(), 150);
        assert_eq!(inner.node_hashes["b"].len(), 300);
    }

    #[test]
    fn higher_priority_receives_more_keys() {
        let ring = ConsistentHash::new();
        ring.add(&node("small", 0.0));
        ring.add(&node("big", 2.0));

        let mut big = 0;
        let total = 4000;
        for i in 0..total {
            if ring.get(&format!("object/{i}")) == "big" {
                big += 1;
            }
        }
        // "big" owns 3x the virtual nodes; allow generous slack for hash
        // variance.
        assert!(big > total / 2, "big got only {big}/{total} keys");
    }
}
