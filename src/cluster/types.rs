//! Wire-adjacent types returned by the Cluster Gateway.
//!
//! These mirror the cat/indices, aliases, data-streams, and cluster-health
//! views described in §3/§4.1 of the design, not the raw cluster JSON —
//! the gateway's parsing functions are responsible for going from raw
//! `serde_json::Value` payloads to these typed records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Cluster health color, ordered `red < yellow < green` so gates can compare
/// with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthColor {
    Red,
    Yellow,
    Green,
}

impl HealthColor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Some(HealthColor::Red),
            "yellow" => Some(HealthColor::Yellow),
            "green" => Some(HealthColor::Green),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            HealthColor::Red => 0,
            HealthColor::Yellow => 1,
            HealthColor::Green => 2,
        }
    }

    pub fn meets(self, required: HealthColor) -> bool {
        self.rank() >= required.rank()
    }
}

impl PartialOrd for HealthColor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}
impl Ord for HealthColor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// One row of `cat/indices`, plus the derived classifier fields (§4.3).
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub name: String,
    pub uuid: String,
    pub health: HealthColor,
    pub primary_shards: u32,
    pub replica_shards: u32,
    pub doc_count: u64,
    pub store_size_bytes: u64,
    pub primary_store_size_bytes: u64,
    pub creation_date: DateTime<Utc>,
    /// Derived: name with trailing date and ordinal stripped (§4.3).
    pub group: String,
    /// Derived: true when this is the writable member of an alias or the
    /// current generation of a data stream.
    pub is_write_index: bool,
    /// Derived: true when the special-index predicate matches (§4.3).
    pub is_special: bool,
}

impl IndexRecord {
    pub fn primary_size_gb(&self) -> f64 {
        self.primary_store_size_bytes as f64 / 1024f64.powi(3)
    }

    pub fn store_size_gb(&self) -> f64 {
        self.store_size_bytes as f64 / 1024f64.powi(3)
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.creation_date).num_days()
    }
}

/// `{ alias, index, is_write_index }` — classic alias or synthesized
/// data-stream member (§3).
#[derive(Debug, Clone)]
pub struct AliasMember {
    pub alias: String,
    pub index: String,
    pub is_write_index: bool,
}

/// A data stream as reported by the cluster, before synthesis into
/// `AliasMember` triples.
#[derive(Debug, Clone, Deserialize)]
pub struct DataStream {
    pub name: String,
    pub generation: u32,
    pub indices: Vec<DataStreamIndex>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataStreamIndex {
    #[serde(rename = "index_name")]
    pub index_name: String,
}

/// `{repository, full_name, short_name, age_days}` (§3).
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub repository: String,
    pub full_name: String,
    pub short_name: String,
    pub age_days: i64,
}

/// Persisted to `elastic-ilm-jobs` with create-only semantics (§3, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub indices: Vec<String>,
    pub operation: String,
    pub reason: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Selected fields of `cluster_stats` (§4.9 step 5).
#[derive(Debug, Clone)]
pub struct ClusterStats {
    pub store_size_bytes: u64,
}

/// Selected fields of `node_stats_jvm` (§4.10's worker-pool sizing formula).
#[derive(Debug, Clone)]
pub struct NodeJvmStats {
    pub lowest_live_thread_count: u32,
}
