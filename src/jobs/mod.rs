//! Job Queue (C8): reindex candidates (small-shard and oversized-shard
//! compaction) emitted as operator-visible documents into `elastic-ilm-jobs`
//! (§3 `JobRecord`, §4.11, §4.11.1).
//!
//! Consumers of these jobs live outside the core (§2's component table);
//! this module only classifies candidates, batches them, and enqueues.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::cluster::types::{IndexRecord, JobRecord};
use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::settings::JobsSettings;

use super::engines::EngineReport;

const JOBS_INDEX: &str = "elastic-ilm-jobs";
/// §4.11.1: "`large` if ≥ 100" — fixed regardless of `shard_minimum_size`.
const LARGE_SHARD_THRESHOLD_GB: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShardSize {
    Small,
    Large,
}

impl ShardSize {
    fn reason(self) -> &'static str {
        match self {
            ShardSize::Small => "small_indices",
            ShardSize::Large => "large_indices",
        }
    }
}

fn classify(index: &IndexRecord, shard_minimum_size_gb: f64) -> Option<ShardSize> {
    if index.primary_shards == 0 {
        return None;
    }
    let per_shard_gb = index.primary_size_gb() / index.primary_shards as f64;
    if per_shard_gb <= shard_minimum_size_gb {
        Some(ShardSize::Small)
    } else if per_shard_gb >= LARGE_SHARD_THRESHOLD_GB {
        Some(ShardSize::Large)
    } else {
        None
    }
}

/// Every index name already referenced by an open (undeleted) job, read
/// back from `elastic-ilm-jobs` itself.
async fn indices_in_open_jobs(gateway: &ClusterGateway) -> Result<HashSet<String>, ClusterError> {
    let dsl = serde_json::json!({ "size": 10_000, "query": { "match_all": {} } });
    let response = gateway.search(JOBS_INDEX, &dsl).await;

    // A fresh cluster without the jobs index yet has nothing open.
    let response = match response {
        Ok(v) => v,
        Err(_) => return Ok(HashSet::new()),
    };

    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut open = HashSet::new();
    for hit in hits {
        if let Some(indices) = hit.pointer("/_source/indices").and_then(Value::as_array) {
            for idx in indices {
                if let Some(name) = idx.as_str() {
                    open.insert(name.to_string());
                }
            }
        }
    }
    Ok(open)
}

struct Batch {
    indices: Vec<String>,
    size_gb: f64,
}

impl Batch {
    fn new() -> Self {
        Batch {
            indices: Vec::new(),
            size_gb: 0.0,
        }
    }
}

/// §4.11: scans all non-special, non-write indices, classifies each by
/// shard size, groups candidates of the same kind by their series `group`,
/// and emits one `JobRecord` per batch once it crosses the size or count
/// threshold.
pub async fn run(
    gateway: &ClusterGateway,
    settings: &JobsSettings,
) -> Result<EngineReport, ClusterError> {
    let mut report = EngineReport::default();
    let indices = gateway.list_classified_indices().await?;
    let already_open = indices_in_open_jobs(gateway).await?;

    let mut pending: HashMap<(ShardSize, String), Batch> = HashMap::new();

    for index in &indices {
        if index.is_special || index.is_write_index {
            continue;
        }
        if already_open.contains(&index.name) {
            continue;
        }
        let Some(size) = classify(index, settings.shard_minimum_size_gb) else {
            continue;
        };
        report.considered += 1;

        let key = (size, index.group.clone());
        let batch = pending.entry(key).or_insert_with(Batch::new);
        batch.indices.push(index.name.clone());
        batch.size_gb += index.primary_size_gb();

        if batch.size_gb > settings.shard_minimum_size_gb || batch.indices.len() as u32 > settings.batch_count_limit {
            let finished = pending.remove(&(size, index.group.clone())).expect("just inserted");
            enqueue(gateway, size, finished).await?;
            report.acted += 1;
        }
    }

    // §4.11: remaining partial batches are flushed at the end of the scan
    // rather than dropped — every eligible index is accounted for in some
    // job, even if it never crossed the threshold on its own.
    for ((size, _group), batch) in pending {
        if batch.indices.is_empty() {
            continue;
        }
        enqueue(gateway, size, batch).await?;
        report.acted += 1;
    }

    Ok(report)
}

async fn enqueue(gateway: &ClusterGateway, size: ShardSize, batch: Batch) -> Result<(), ClusterError> {
    let record = JobRecord {
        indices: batch.indices,
        operation: "reindex".to_string(),
        reason: size.reason().to_string(),
        timestamp: chrono::Utc::now(),
    };
    let doc = serde_json::to_value(&record).expect("JobRecord is always serializable");
    let id = Uuid::new_v4().to_string();
    gateway.bulk_index(JOBS_INDEX, &[(Some(id), doc)], true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::HealthColor;
    use chrono::Utc;

    fn index(primary_shards: u32, primary_gb: f64) -> IndexRecord {
        IndexRecord {
            name: "logs-app-000001".to_string(),
            uuid: "abc".to_string(),
            health: HealthColor::Green,
            primary_shards,
            replica_shards: 1,
            doc_count: 0,
            store_size_bytes: (primary_gb * 1024f64.powi(3)) as u64,
            primary_store_size_bytes: (primary_gb * 1024f64.powi(3)) as u64,
            creation_date: Utc::now(),
            group: "logs-app".to_string(),
            is_write_index: false,
            is_special: false,
        }
    }

    #[test]
    fn classifies_small_shard() {
        let idx = index(10, 20.0); // 2 GB/shard
        assert_eq!(classify(&idx, 5.0), Some(ShardSize::Small));
    }

    #[test]
    fn classifies_large_shard() {
        let idx = index(1, 150.0); // 150 GB/shard
        assert_eq!(classify(&idx, 5.0), Some(ShardSize::Large));
    }

    #[test]
    fn mid_size_shard_is_not_classified() {
        let idx = index(1, 20.0); // 20 GB/shard, between 5 and 100
        assert_eq!(classify(&idx, 5.0), None);
    }
}
