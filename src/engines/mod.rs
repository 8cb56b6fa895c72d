//! Lifecycle Engines (C5): Rollover, Retention, Allocation, ForceMerge, and
//! Backup, each consuming the Cluster Gateway, Index Classifier, and Policy
//! Resolver to make and apply per-index decisions (§4.4-§4.8).

pub mod allocation;
pub mod backup;
pub mod forcemerge;
pub mod retention;
pub mod rollover;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::cluster::types::IndexRecord;
use crate::cluster::ClusterGateway;

/// One summary per engine firing, reported up to the scheduler for
/// notification and logging purposes.
#[derive(Debug, Default, Clone)]
pub struct EngineReport {
    pub considered: u32,
    pub acted: u32,
    pub errors: u32,
}

impl EngineReport {
    pub fn merge(&mut self, other: EngineReport) {
        self.considered += other.considered;
        self.acted += other.acted;
        self.errors += other.errors;
    }
}

/// §4.5/§4.6: "obtain a reference timestamp by searching for the newest
/// `@timestamp` in the index (descending sort, size 1); if no such field
/// exists, fall back to index creation date."
///
/// `original_source/es.py` wraps this search in a broad `try/except` and
/// falls back to `creation.date.string` on *any* exception -- an index
/// with no `@timestamp` mapping makes Elasticsearch/OpenSearch reject a
/// plain `sort` on that field with a 400, not an empty `hits.hits`.
/// `"unmapped_type": "date"` makes the sort tolerate the missing mapping
/// so the existing empty-hits fallback can fire; the search call is also
/// guarded in case the cluster rejects it anyway, so this never bubbles a
/// per-index error up through `?` (§9's exception-as-control-flow note;
/// §7: a per-index failure must never abort the engine).
pub async fn reference_timestamp(gateway: &ClusterGateway, index: &IndexRecord) -> DateTime<Utc> {
    let dsl = json!({
        "size": 1,
        "sort": [{ "@timestamp": { "order": "desc", "unmapped_type": "date" } }],
        "_source": ["@timestamp"],
    });

    let response = match gateway.search(&index.name, &dsl).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(index = %index.name, error = %e, "reference timestamp search failed, falling back to creation date");
            return index.creation_date;
        }
    };

    response
        .pointer("/hits/hits")
        .and_then(serde_json::Value::as_array)
        .and_then(|hits| hits.first())
        .and_then(|h| h.pointer("/_source/@timestamp"))
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(index.creation_date)
}

/// Non-special indices only — every engine except Backup's system-index
/// pass is barred from touching special indices (§3 invariant 4).
pub fn eligible_indices(indices: &[IndexRecord]) -> impl Iterator<Item = &IndexRecord> {
    indices.iter().filter(|i| !i.is_special)
}
