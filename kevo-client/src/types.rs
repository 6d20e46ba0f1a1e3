/// Data model shared by the client, the transports and callers
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A key-value pair returned by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Storage statistics snapshot reported by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub key_count: i64,
    pub storage_size_bytes: i64,
    pub memtable_count: i32,
    pub sstable_count: i32,
    pub write_amplification: f64,
    pub read_amplification: f64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keys={} storage={}B memtables={} sstables={} write_amp={:.2} read_amp={:.2}",
            self.key_count,
            self.storage_size_bytes,
            self.memtable_count,
            self.sstable_count,
            self.write_amplification,
            self.read_amplification
        )
    }
}

/// Role of the node behind an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Standalone,
    Primary,
    Replica,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Standalone => write!(f, "standalone"),
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

/// A replica known to a primary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub address: String,
    pub available: bool,
    pub last_sequence: u64,
    pub region: Option<String>,
    pub meta: HashMap<String, String>,
}

/// Topology information for the connected node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub role: NodeRole,
    /// Replicas following this node (primary only)
    pub replicas: Vec<ReplicaInfo>,
    /// Address of the primary this node follows (replica only)
    pub primary_address: Option<String>,
    pub last_sequence: u64,
    /// Whether the node rejects writes (replica only)
    pub read_only: bool,
}

impl NodeInfo {
    /// Info for a node without replication
    pub fn standalone(last_sequence: u64) -> Self {
        Self {
            role: NodeRole::Standalone,
            replicas: Vec::new(),
            primary_address: None,
            last_sequence,
            read_only: false,
        }
    }

    /// Whether the node accepts writes directly
    pub fn accepts_writes(&self) -> bool {
        !self.read_only && self.role != NodeRole::Replica
    }

    /// Replicas currently marked available
    pub fn available_replicas(&self) -> impl DoubleEndedIterator<Item = &ReplicaInfo> {
        self.replicas.iter().filter(|r| r.available)
    }
}

/// One entry of an atomic batch write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

impl BatchOperation {
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Bytes>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }

    pub fn key(&self) -> &Bytes {
        match self {
            BatchOperation::Put { key, .. } | BatchOperation::Delete { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_display() {
        let stats = Stats {
            key_count: 10,
            storage_size_bytes: 2048,
            memtable_count: 1,
            sstable_count: 3,
            write_amplification: 1.5,
            read_amplification: 2.0,
        };
        assert_eq!(
            stats.to_string(),
            "keys=10 storage=2048B memtables=1 sstables=3 write_amp=1.50 read_amp=2.00"
        );
    }

    #[test]
    fn test_replica_does_not_accept_writes() {
        let mut info = NodeInfo::standalone(5);
        assert!(info.accepts_writes());

        info.role = NodeRole::Replica;
        info.read_only = true;
        assert!(!info.accepts_writes());
    }

    #[test]
    fn test_node_role_serializes_lowercase() {
        let json = serde_json::to_string(&NodeRole::Primary).unwrap();
        assert_eq!(json, "\"primary\"");
    }

    #[test]
    fn test_batch_operation_key() {
        assert_eq!(BatchOperation::put("a", "1").key().as_ref(), b"a");
        assert_eq!(BatchOperation::delete("b").key().as_ref(), b"b");
    }
}
