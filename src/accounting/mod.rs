//! Accounting Engine (C6): per-tenant daily inventory snapshot, tier-based
//! cost computation, self-consistency verification against the cluster's
//! own reported total, and an optional device-tracking pass (§4.9).

pub mod record;

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cluster::types::{HealthColor, IndexRecord};
use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::settings::{AccountingSettings, DeviceKind, DeviceTrackingRule};
use crate::config::tenant::TenantConfig;
use crate::notify::{NotificationEvent, Notifier};
use crate::policy;

use record::{AccountingRecord, DeviceCountRecord, DiskTier};

/// §7 `Verification` and `HealthGate` kinds surface here; everything else
/// bubbles as `ClusterError`.
#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("health gate not satisfied: have {have:?}, need {need:?}")]
    HealthGate { have: HealthColor, need: HealthColor },
    #[error("io error writing accounting file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Drift tolerance from §4.9 step 5 / §8.
const DRIFT_TOLERANCE_GB: f64 = 20.0;

pub struct AccountingEngine<'a> {
    pub gateway: &'a ClusterGateway,
    pub settings: &'a AccountingSettings,
    pub notifier: &'a Notifier,
    /// §4.9 step 6's "mirror to a designated aggregator tenant's cluster":
    /// present when `settings.send_copy_to_client_name` names a tenant the
    /// caller was able to resolve and build a gateway for.
    pub aggregator: Option<&'a ClusterGateway>,
}

fn day_file_path(output_folder: &Path, client: &str, day: NaiveDate) -> PathBuf {
    output_folder.join(format!("{client}_accounting-{}.json", day.format("%Y%m%d")))
}

fn device_file_path(output_folder: &Path, client: &str, day: NaiveDate) -> PathBuf {
    output_folder.join(format!(
        "{client}_accounting-device-{}.json",
        day.format("%Y%m%d")
    ))
}

fn append_ndjson_line<T: serde::Serialize>(path: &Path, record: &T) -> Result<(), AccountingError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AccountingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let json = serde_json::to_string(record).expect("accounting record is always serializable");
    writeln!(file, "{json}").map_err(|source| AccountingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    file.flush().map_err(|source| AccountingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

impl<'a> AccountingEngine<'a> {
    /// Runs the full accounting pass for `tenant` on `today` (UTC). §3
    /// invariant (3): idempotent via the per-day file's existence.
    pub async fn run(&self, tenant: &TenantConfig, today: NaiveDate) -> Result<(), AccountingError> {
        let out_path = day_file_path(&self.settings.output_folder, &tenant.client_name, today);
        if out_path.exists() {
            tracing::info!(client = %tenant.client_name, path = %out_path.display(), "accounting file already present, skipping");
            return Ok(());
        }

        let health = self.gateway.cluster_health().await?;
        if !health.meets(self.settings.base.health_check_level) {
            return Err(AccountingError::HealthGate {
                have: health,
                need: self.settings.base.health_check_level,
            });
        }

        fs::create_dir_all(&self.settings.output_folder).map_err(|source| AccountingError::Io {
            path: self.settings.output_folder.clone(),
            source,
        })?;

        let indices = self.gateway.list_classified_indices().await?;
        let now = Utc::now();

        let mut accounted_gb = 0f64;
        let mut special_gb = 0f64;

        for index in &indices {
            if index.is_special {
                special_gb += index.store_size_gb();
                continue;
            }

            let policy_bucket = policy::resolve_bucket_name(&index.name, &tenant.policy.allocation);
            let policy_days = tenant
                .policy
                .allocation
                .get(&policy_bucket)
                .copied()
                .unwrap_or_else(|| tenant.allocation_default());

            let age_days = index.age_days(now);
            let size_gb = round8(index.store_size_gb());
            let disk = if age_days >= policy_days as i64 {
                DiskTier::Sata
            } else {
                DiskTier::Ssd
            };
            let tier_cost = match disk {
                DiskTier::Ssd => self.settings.ssd_cost,
                DiskTier::Sata => self.settings.sata_cost,
            };

            let record = AccountingRecord {
                name: index.name.clone(),
                client: tenant.client_name.clone(),
                size_gb,
                logs: index.doc_count,
                disk,
                cost: size_gb * tier_cost,
                index_creation_date: index.creation_date,
                timestamp: now,
                group: index.group.clone(),
                policy: policy_bucket,
                policy_days,
            };

            append_ndjson_line(&out_path, &record)?;
            accounted_gb += size_gb;
        }

        self.verify_drift(tenant, accounted_gb, special_gb).await?;

        if self.settings.output_to_es {
            self.mirror_to_cluster(self.gateway, tenant, &out_path).await?;
        }
        if let Some(aggregator) = self.aggregator {
            self.mirror_to_cluster(aggregator, tenant, &out_path).await?;
        }

        if !self.settings.device_tracking_inclusion.is_empty() {
            self.run_device_tracking(tenant, today).await?;
        }

        Ok(())
    }

    /// §4.9 step 5: a drift of ≥ 20 GB between the cluster's own reported
    /// total and the sum of what accounting just walked is a verification
    /// failure — non-fatal, notification only.
    async fn verify_drift(
        &self,
        tenant: &TenantConfig,
        accounted_gb: f64,
        special_gb: f64,
    ) -> Result<(), AccountingError> {
        let cluster_stats = self.gateway.cluster_stats().await?;
        let cluster_total_gb = cluster_stats.store_size_bytes as f64 / 1024f64.powi(3);
        let drift = (cluster_total_gb - (accounted_gb + special_gb)).abs();

        if drift >= DRIFT_TOLERANCE_GB {
            tracing::warn!(client = %tenant.client_name, drift, "accounting drift verification failed");
            self.notifier
                .notify(NotificationEvent {
                    client: tenant.client_name.clone(),
                    operation: "accounting".to_string(),
                    status: "verification_failed".to_string(),
                    message: format!("accounting drift of {drift:.2} GB exceeds {DRIFT_TOLERANCE_GB} GB tolerance"),
                })
                .await;
        }
        Ok(())
    }

    /// §4.9 step 6: bulk-index accounting records into a cluster's
    /// `accounting` index -- either the tenant's own (`output_to_es`) or a
    /// designated aggregator tenant's (`send_copy_to_client_name`), both
    /// read back from the same per-day file already written to disk.
    async fn mirror_to_cluster(
        &self,
        target: &ClusterGateway,
        tenant: &TenantConfig,
        out_path: &Path,
    ) -> Result<(), AccountingError> {
        let contents = fs::read_to_string(out_path).map_err(|source| AccountingError::Io {
            path: out_path.to_path_buf(),
            source,
        })?;
        let docs: Vec<(Option<String>, serde_json::Value)> = contents
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .map(|v| (None, v))
            .collect();

        target.bulk_index("accounting", &docs, false).await?;
        tracing::info!(client = %tenant.client_name, count = docs.len(), "mirrored accounting records to cluster");
        Ok(())
    }

    /// §4.9 step 7: inclusion aggregations build a per-kind asset set;
    /// matching exclusions remove assets before the final cardinality sum.
    async fn run_device_tracking(&self, tenant: &TenantConfig, today: NaiveDate) -> Result<(), AccountingError> {
        let mut included: HashMap<DeviceKind, std::collections::HashSet<String>> = HashMap::new();

        for rule in &self.settings.device_tracking_inclusion {
            let buckets = self.value_count_buckets(rule).await?;
            included.entry(rule.count_as).or_default().extend(buckets);
        }

        for rule in &self.settings.device_tracking_exclusion {
            let buckets = self.value_count_buckets(rule).await?;
            if let Some(set) = included.get_mut(&rule.count_as) {
                for b in buckets {
                    set.remove(&b);
                }
            }
        }

        let device_count: u64 = included.values().map(|s| s.len() as u64).sum();
        let record = DeviceCountRecord {
            client: tenant.client_name.clone(),
            device_count,
            timestamp: Utc::now(),
        };
        let path = device_file_path(&self.settings.output_folder, &tenant.client_name, today);
        append_ndjson_line(&path, &record)?;
        Ok(())
    }

    async fn value_count_buckets(&self, rule: &DeviceTrackingRule) -> Result<Vec<String>, AccountingError> {
        let mut agg = serde_json::json!({
            "by_value": {
                "terms": { "field": rule.tracking_field, "size": 10_000 }
            }
        });
        if let Some(search) = &rule.search {
            agg = serde_json::json!({
                "filtered": {
                    "filter": search,
                    "aggs": agg
                }
            });
        }
        let response = self.gateway.aggregate(&rule.index, &agg).await?;
        let buckets = response
            .pointer("/aggregations/by_value/buckets")
            .or_else(|| response.pointer("/aggregations/filtered/by_value/buckets"))
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(buckets
            .iter()
            .filter_map(|b| b.get("key").and_then(serde_json::Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

fn round8(v: f64) -> f64 {
    (v * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_file_path_matches_format() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let path = day_file_path(Path::new("/tmp/acct"), "otava", day);
        assert_eq!(path, PathBuf::from("/tmp/acct/otava_accounting-20240102.json"));
    }

    #[test]
    fn rounds_to_eight_decimals() {
        assert_eq!(round8(1.0 / 3.0), 0.33333333);
    }
}
