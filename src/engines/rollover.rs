//! Rollover Engine (§4.4).

use chrono::Utc;

use crate::cluster::types::IndexRecord;
use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::tenant::{RolloverSize, TenantConfig};
use crate::notify::{NotificationEvent, Notifier};
use crate::policy;

use super::EngineReport;

const EXECUTION_RETRIES: u32 = 3;

fn size_check_gb(index: &IndexRecord, size: RolloverSize) -> f64 {
    match size {
        RolloverSize::Auto => index.primary_shards as f64 * 50.0,
        RolloverSize::Gb(n) => n as f64,
    }
}

/// §4.4: "roll over if size_gb ≥ size_check OR (age_days ≥ policy.days AND
/// size_gb ≥ 1)". The 1 GB floor prevents spurious day-based rollovers on
/// empty indices.
pub fn should_rollover(index: &IndexRecord, size_gb: f64, days: u32, now_age_days: i64) -> bool {
    let size_check = size_gb;
    let primary_gb = index.primary_size_gb();
    primary_gb >= size_check || (now_age_days >= days as i64 && primary_gb >= 1.0)
}

pub async fn run(
    gateway: &ClusterGateway,
    tenant: &TenantConfig,
    notifier: &Notifier,
) -> Result<EngineReport, ClusterError> {
    let indices = gateway.list_classified_indices().await?;
    let aliases = gateway.list_aliases().await?;
    let data_streams = gateway.list_data_streams().await?;

    let mut write_members: Vec<String> = aliases
        .iter()
        .filter(|m| m.is_write_index)
        .map(|m| m.alias.clone())
        .collect();
    write_members.extend(data_streams.iter().map(|ds| ds.name.clone()));

    let mut report = EngineReport::default();
    let now = Utc::now();

    for alias in write_members {
        let Some(write_index) = indices.iter().find(|i| i.is_write_index && belongs_to(i, &alias)) else {
            continue;
        };
        if write_index.is_special {
            continue;
        }

        report.considered += 1;

        let bucket = policy::resolve_bucket_name(&write_index.name, &tenant.policy.rollover);
        let policy = tenant
            .policy
            .rollover
            .get(&bucket)
            .copied()
            .unwrap_or_else(|| tenant.rollover_default());

        let size_check = size_check_gb(write_index, policy.size);
        let age_days = write_index.age_days(now);

        if !should_rollover(write_index, size_check, policy.days, age_days) {
            continue;
        }

        match execute_rollover(gateway, &alias).await {
            Ok(()) => {
                report.acted += 1;
                if let Err(e) = gateway.forcemerge(&write_index.name, 1).await {
                    tracing::warn!(index = %write_index.name, error = %e, "post-rollover forcemerge of old index failed");
                }
            }
            Err(e) => {
                report.errors += 1;
                notifier
                    .notify(NotificationEvent {
                        client: tenant.client_name.clone(),
                        operation: "rollover".to_string(),
                        status: "failed".to_string(),
                        message: format!("rollover of {alias} failed after {EXECUTION_RETRIES} attempts: {e}"),
                    })
                    .await;
            }
        }
    }

    Ok(report)
}

/// Whether `index` is a (possibly write) member of `alias_or_stream`.
/// Approximated by group identity since both classic alias members and
/// data-stream generations share the alias/stream name as their group root.
fn belongs_to(index: &IndexRecord, alias_or_stream: &str) -> bool {
    index.name.starts_with(alias_or_stream) || index.group == alias_or_stream
}

async fn execute_rollover(gateway: &ClusterGateway, alias: &str) -> Result<(), ClusterError> {
    let mut last_err = None;
    for attempt in 1..=EXECUTION_RETRIES {
        match gateway.rollover(alias).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                tracing::warn!(alias, attempt, error = %e, "rollover execution attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::HealthColor;
    use chrono::{Duration, Utc};

    fn index(primary_store_gb: f64, age_days: i64) -> IndexRecord {
        IndexRecord {
            name: "logs-app-000001".to_string(),
            uuid: "abc".to_string(),
            health: HealthColor::Green,
            primary_shards: 1,
            replica_shards: 1,
            doc_count: 0,
            store_size_bytes: (primary_store_gb * 1024f64.powi(3)) as u64,
            primary_store_size_bytes: (primary_store_gb * 1024f64.powi(3)) as u64,
            creation_date: Utc::now() - Duration::days(age_days),
            group: "logs-app".to_string(),
            is_write_index: true,
            is_special: false,
        }
    }

    #[test]
    fn rolls_over_at_size_threshold() {
        let idx = index(151.0, 2);
        assert!(should_rollover(&idx, 150.0, 30, 2));
    }

    #[test]
    fn no_rollover_below_threshold_and_age() {
        let idx = index(149.0, 2);
        assert!(!should_rollover(&idx, 150.0, 30, 2));
    }

    #[test]
    fn rolls_over_by_age_above_one_gb_floor() {
        let idx = index(2.0, 31);
        assert!(should_rollover(&idx, 150.0, 30, 31));
    }

    #[test]
    fn does_not_roll_over_by_age_below_one_gb_floor() {
        let idx = index(0.5, 31);
        assert!(!should_rollover(&idx, 150.0, 30, 31));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::cluster::types::HealthColor;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn index_with(primary_store_gb: f64, age_days: i64) -> IndexRecord {
        IndexRecord {
            name: "logs-app-000001".to_string(),
            uuid: "abc".to_string(),
            health: HealthColor::Green,
            primary_shards: 1,
            replica_shards: 1,
            doc_count: 0,
            store_size_bytes: (primary_store_gb * 1024f64.powi(3)) as u64,
            primary_store_size_bytes: (primary_store_gb * 1024f64.powi(3)) as u64,
            creation_date: Utc::now() - Duration::days(age_days),
            group: "logs-app".to_string(),
            is_write_index: true,
            is_special: false,
        }
    }

    proptest! {
        /// §8: "Rollover decision is monotonic in size and age: if an index
        /// would roll over at (s, a), it does at (s', a') with s' >= s and
        /// a' >= a."
        #[test]
        fn rollover_decision_is_monotonic(
            size_gb in 0.0f64..500.0,
            age_days in 0i64..400,
            size_check in 1.0f64..300.0,
            policy_days in 0u32..200,
            extra_size in 0.0f64..200.0,
            extra_age in 0i64..200,
        ) {
            let idx = index_with(size_gb, age_days);
            let idx_bigger = index_with(size_gb + extra_size, age_days + extra_age);

            if should_rollover(&idx, size_check, policy_days, age_days) {
                prop_assert!(should_rollover(&idx_bigger, size_check, policy_days, age_days + extra_age));
            }
        }
    }
}
