//! Backup Engine (§4.8): snapshot retention and creation per repository/job
//! pair. Policy nests `backup[repository][job]` — a single repository can
//! carry several named jobs (`global`, `.kibana`/`special`, or an arbitrary
//! index-prefix job), each with its own retention, optional `limit_age`
//! window, and `include_special` flag.

use chrono::Utc;
use serde_json::{json, Value};

use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::settings::FamilySettings;
use crate::config::tenant::{BackupJob, TenantConfig};
use crate::notify::{NotificationEvent, Notifier};

use super::EngineReport;

/// Always-present system indices backed up under the `global`, `.kibana`,
/// and `special` job names.
const SYSTEM_INDICES: [&str; 3] = [".kibana", ".opendistro", ".opensearch"];

fn system_index_pattern() -> String {
    SYSTEM_INDICES.iter().map(|p| format!("{p}*")).collect::<Vec<_>>().join(",")
}

pub async fn run(
    gateway: &ClusterGateway,
    tenant: &TenantConfig,
    settings: &FamilySettings,
    notifier: &Notifier,
) -> Result<EngineReport, ClusterError> {
    let mut report = EngineReport::default();

    if tenant.policy.backup.is_empty() {
        return Ok(report);
    }

    let health = gateway.cluster_health().await?;
    if !health.meets(settings.health_check_level) {
        return Err(ClusterError::HealthGate {
            have: format!("{health:?}"),
            need: format!("{:?}", settings.health_check_level),
        });
    }

    for (repository, jobs) in &tenant.policy.backup {
        if !gateway.repository_exists(repository).await? {
            tracing::warn!(repository, "backup repository not registered, skipping");
            report.errors += 1;
            continue;
        }

        for (job, policy) in jobs {
            report.considered += 1;

            if let Err(e) = apply_retention(gateway, repository, job, policy.retention_days).await {
                report.errors += 1;
                notifier
                    .notify(NotificationEvent {
                        client: tenant.client_name.clone(),
                        operation: "backup".to_string(),
                        status: "failed".to_string(),
                        message: format!("retention pass for {job} in {repository} failed: {e}"),
                    })
                    .await;
            }

            match take_snapshot(gateway, repository, job, policy).await {
                Ok(()) => report.acted += 1,
                Err(e) => {
                    report.errors += 1;
                    notifier
                        .notify(NotificationEvent {
                            client: tenant.client_name.clone(),
                            operation: "backup".to_string(),
                            status: "failed".to_string(),
                            message: format!("snapshot for {job} in {repository} failed: {e}"),
                        })
                        .await;
                }
            }
        }
    }

    Ok(report)
}

/// §4.8: delete snapshots whose `short_name` matches `job` and whose age
/// meets or exceeds the job's retention window.
async fn apply_retention(
    gateway: &ClusterGateway,
    repository: &str,
    job: &str,
    retention_days: u32,
) -> Result<(), ClusterError> {
    let snapshots = gateway.snapshot_list(repository).await?;
    for snap in snapshots
        .iter()
        .filter(|s| s.short_name == job && s.age_days >= retention_days as i64)
    {
        gateway.snapshot_delete(repository, &snap.full_name).await?;
    }
    Ok(())
}

async fn take_snapshot(
    gateway: &ClusterGateway,
    repository: &str,
    job: &str,
    policy: &BackupJob,
) -> Result<(), ClusterError> {
    let indices = resolve_index_selector(gateway, job, policy).await?;

    let body = json!({
        "indices": indices,
        "ignore_unavailable": true,
        "include_global_state": true,
        "metadata": {
            "taken_by": "elastic-ilm",
            "taken_because": "scheduled backup per policy",
        }
    });

    let name = format!("{job}_{}", Utc::now().format("%Y-%m-%d_%H:%M:%S"));
    gateway.snapshot_create(repository, &name, &body).await
}

/// §4.8: the index pattern a snapshot targets depends on the job name --
/// `global` grabs every write alias (optionally narrowed by `limit_age`),
/// `.kibana`/`special` grabs only the fixed system indices, and any other
/// job name is treated as an index-name prefix.
async fn resolve_index_selector(
    gateway: &ClusterGateway,
    job: &str,
    policy: &BackupJob,
) -> Result<String, ClusterError> {
    match job {
        "global" => {
            let aliases = gateway.list_aliases().await?;
            let write_aliases: Vec<String> = aliases
                .iter()
                .filter(|m| m.is_write_index)
                .map(|m| m.alias.clone())
                .collect();

            if let Some(limit_age) = policy.limit_age {
                let within = indices_within_limit_age(gateway, &write_aliases, limit_age).await?;
                Ok(format!("{},{}", within.join(","), system_index_pattern()))
            } else {
                Ok(format!("{},{}", write_aliases.join(","), system_index_pattern()))
            }
        }
        ".kibana" | "special" => Ok(system_index_pattern()),
        _ => {
            if let Some(limit_age) = policy.limit_age {
                let within = indices_within_limit_age(gateway, &[job.to_string()], limit_age).await?;
                if policy.include_special {
                    Ok(format!("{},{}", within.join(","), system_index_pattern()))
                } else {
                    Ok(within.join(","))
                }
            } else {
                Ok(format!("{job}*"))
            }
        }
    }
}

/// §4.8.1: retain only concrete indices under `roots` whose newest
/// `@timestamp` falls within `limit_age_days` of now -- a per-root terms
/// aggregation bucketed by concrete index name, each bucket's max
/// `@timestamp` compared against the age cutoff.
async fn indices_within_limit_age(
    gateway: &ClusterGateway,
    roots: &[String],
    limit_age_days: u32,
) -> Result<Vec<String>, ClusterError> {
    let cutoff_seconds = limit_age_days as i64 * 86_400;
    let now = Utc::now();
    let mut within = Vec::new();

    for root in roots {
        let pattern = format!("{root}*");
        let dsl = json!({
            "size": 0,
            "aggs": {
                "by_index": {
                    "terms": { "field": "_index", "size": 50_000 },
                    "aggs": { "newest": { "max": { "field": "@timestamp" } } }
                }
            }
        });

        let response = gateway.search(&pattern, &dsl).await?;
        let buckets = response
            .pointer("/aggregations/by_index/buckets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for bucket in buckets {
            let Some(index_name) = bucket.get("key").and_then(Value::as_str) else {
                continue;
            };
            let Some(newest) = bucket.pointer("/newest/value_as_string").and_then(Value::as_str) else {
                continue;
            };
            let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(newest) else {
                continue;
            };
            let age_seconds = (now - parsed.with_timezone(&Utc)).num_seconds();
            if age_seconds <= cutoff_seconds {
                within.push(index_name.to_string());
            }
        }
    }

    Ok(within)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_index_pattern_wildcards_each_prefix() {
        assert_eq!(system_index_pattern(), ".kibana*,.opendistro*,.opensearch*");
    }
}
