//! Scheduler (C4): the process-wide periodic driver. Registers one
//! `tokio-cron-scheduler` job per enabled lifecycle family, fans each
//! firing out across tenants with a bounded worker pool, retries a
//! tenant's firing under a downgraded health gate on the last pass, and
//! hot-reloads the whole job table when the settings file's digest
//! changes (§4.10).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::cluster::types::HealthColor;
use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::settings::FamilySettings;
use crate::config::{self, Settings, TenantConfig};
use crate::engines::{self, EngineReport};
use crate::jobs;
use crate::notify::{NotificationEvent, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Rollover,
    Retention,
    Allocation,
    Forcemerge,
    Backup,
    Accounting,
    Jobs,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::Rollover => "rollover",
            Family::Retention => "retention",
            Family::Allocation => "allocation",
            Family::Forcemerge => "forcemerge",
            Family::Backup => "backup",
            Family::Accounting => "accounting",
            Family::Jobs => "jobs",
        }
    }

    pub fn all() -> [Family; 7] {
        [
            Family::Rollover,
            Family::Retention,
            Family::Allocation,
            Family::Forcemerge,
            Family::Backup,
            Family::Accounting,
            Family::Jobs,
        ]
    }

    fn family_settings(self, settings: &Settings) -> FamilySettings {
        match self {
            Family::Rollover => settings.rollover.clone(),
            Family::Retention => settings.retention.clone(),
            Family::Allocation => settings.allocation.clone(),
            Family::Forcemerge => settings.forcemerge.clone(),
            Family::Backup => settings.backup.clone(),
            Family::Accounting => settings.accounting.base.clone(),
            Family::Jobs => settings.jobs.base.clone(),
        }
    }
}

/// §7: the three kinds an engine firing can raise that the scheduler has to
/// reason about (everything else is a per-index skip the engine already
/// absorbed).
#[derive(Debug, thiserror::Error)]
pub enum FiringError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("health gate not satisfied: have {have:?}, need {need:?}")]
    HealthGate { have: HealthColor, need: HealthColor },
}

/// Checks `required` against the tenant's live cluster health, used
/// uniformly in front of every engine (several engines additionally gate
/// internally; this is the scheduler-level gate referenced by §4.10's
/// retry/fallback language).
async fn check_health_gate(gateway: &ClusterGateway, required: HealthColor) -> Result<(), FiringError> {
    let have = gateway.cluster_health().await?;
    if !have.meets(required) {
        return Err(FiringError::HealthGate { have, need: required });
    }
    Ok(())
}

/// Runs one family, once, against one tenant, under `health_override` (used
/// by the scheduler's final retry pass to substitute the fallback color).
async fn fire_tenant(
    family: Family,
    tenant: &TenantConfig,
    settings: &Settings,
    tenants: &HashMap<String, TenantConfig>,
    health_override: Option<HealthColor>,
    notify_enabled: bool,
) -> Result<EngineReport, FiringError> {
    let gateway = ClusterGateway::new(tenant)?;
    let mut family_settings = family.family_settings(settings);
    if let Some(h) = health_override {
        family_settings.health_check_level = h;
    }
    let notifier = if notify_enabled {
        Notifier::from_targets(&family_settings.notify)
    } else {
        Notifier::disabled()
    };

    check_health_gate(&gateway, family_settings.health_check_level).await?;

    let report = match family {
        Family::Rollover => engines::rollover::run(&gateway, tenant, &notifier).await?,
        Family::Retention => engines::retention::run(&gateway, tenant, &family_settings).await?,
        Family::Allocation => engines::allocation::run(&gateway, tenant).await?,
        Family::Forcemerge => engines::forcemerge::run(&gateway, tenant).await?,
        Family::Backup => engines::backup::run(&gateway, tenant, &family_settings, &notifier).await?,
        Family::Jobs => jobs::run(&gateway, &settings.jobs).await?,
        Family::Accounting => {
            let aggregator_gateway = settings
                .accounting
                .send_copy_to_client_name
                .as_deref()
                .and_then(|name| tenants.get(name))
                .and_then(|t| ClusterGateway::new(t).ok());
            let acct = crate::accounting::AccountingEngine {
                gateway: &gateway,
                settings: &settings.accounting,
                notifier: &notifier,
                aggregator: aggregator_gateway.as_ref(),
            };
            let today = chrono::Utc::now().date_naive();
            acct.run(tenant, today)
                .await
                .map_err(|e| FiringError::Cluster(accounting_error_to_cluster(e)))?;
            EngineReport {
                considered: 1,
                acted: 1,
                errors: 0,
            }
        }
    };

    Ok(report)
}

/// `AccountingError` isn't a `ClusterError`, but the scheduler's retry logic
/// is generic over one error type; collapse its extra variants (health
/// gate, I/O) into the transport/malformed shape so a single retry path
/// covers every family.
fn accounting_error_to_cluster(e: crate::accounting::AccountingError) -> ClusterError {
    match e {
        crate::accounting::AccountingError::Cluster(c) => c,
        crate::accounting::AccountingError::HealthGate { have, need } => ClusterError::HealthGate {
            have: format!("{have:?}"),
            need: format!("{need:?}"),
        },
        crate::accounting::AccountingError::Io { path, source } => {
            ClusterError::malformed(path.display().to_string(), source.to_string())
        }
    }
}

/// §4.10: "the worker pool size is min(100, lowest_node_jvm_thread_count /
/// 3)", queried once per firing. Each tenant is its own cluster, so the
/// "lowest node" is taken across every tenant about to fire; a tenant whose
/// cluster can't be reached for this query simply doesn't constrain the
/// pool.
async fn worker_pool_size(tenants: &[TenantConfig]) -> usize {
    let mut lowest: Option<u32> = None;
    for tenant in tenants {
        let Ok(gateway) = ClusterGateway::new(tenant) else {
            continue;
        };
        if let Ok(stats) = gateway.node_stats_jvm().await {
            lowest = Some(lowest.map_or(stats.lowest_live_thread_count, |l| l.min(stats.lowest_live_thread_count)));
        }
    }
    pool_size_from_lowest_thread_count(lowest.unwrap_or(300))
}

/// §4.10: `min(100, lowest_node_jvm_thread_count / 3)`.
fn pool_size_from_lowest_thread_count(lowest: u32) -> usize {
    (lowest as usize / 3).clamp(1, 100)
}

/// One firing of `family` across every tenant, with bounded concurrency and
/// the retry-attempts/fallback-health-gate behavior of §4.10.
pub async fn fire_family(
    family: Family,
    settings: Arc<Settings>,
    tenants: Arc<HashMap<String, TenantConfig>>,
    notify_enabled: bool,
) {
    let family_settings = family.family_settings(&settings);
    if !family_settings.enabled {
        return;
    }

    let mut remaining: Vec<TenantConfig> = tenants.values().cloned().collect();
    let total_passes = family_settings.retry_attempts.max(1);

    for pass in 1..=total_passes {
        if remaining.is_empty() {
            break;
        }
        let is_final_pass = pass == total_passes;
        let health_override = if is_final_pass {
            Some(family_settings.fallback_health_check_level)
        } else {
            None
        };

        let pool_size = worker_pool_size(&remaining).await;
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut handles = Vec::with_capacity(remaining.len());

        for tenant in remaining.drain(..) {
            let settings = settings.clone();
            let tenants = tenants.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let result = fire_tenant(family, &tenant, &settings, &tenants, health_override, notify_enabled).await;
                (tenant, result)
            }));
        }

        let mut failed = Vec::new();
        for joined in futures::future::join_all(handles).await {
            let (tenant, result) = joined.expect("firing task panicked");
            match result {
                Ok(report) => {
                    tracing::info!(
                        family = family.name(),
                        client = %tenant.client_name,
                        considered = report.considered,
                        acted = report.acted,
                        errors = report.errors,
                        "firing complete"
                    );
                }
                Err(e) => {
                    tracing::warn!(family = family.name(), client = %tenant.client_name, error = %e, pass, "firing failed, will retry");
                    failed.push(tenant);
                }
            }
        }

        remaining = failed;
        if !remaining.is_empty() && !is_final_pass {
            tokio::time::sleep(Duration::from_secs(family_settings.retry_wait_in_seconds)).await;
        }
    }

    if !remaining.is_empty() {
        let notifier = if notify_enabled {
            Notifier::from_targets(&family_settings.notify)
        } else {
            Notifier::disabled()
        };
        for tenant in &remaining {
            notifier
                .notify(NotificationEvent {
                    client: tenant.client_name.clone(),
                    operation: family.name().to_string(),
                    status: "failed".to_string(),
                    message: format!(
                        "{} exhausted {} retry attempts for {}",
                        family.name(),
                        family_settings.retry_attempts,
                        tenant.client_name
                    ),
                })
                .await;
        }
    }
}

/// Loads settings + tenants fresh from disk, builds and starts a
/// `JobScheduler` with one repeating job per enabled family, and blocks
/// until the settings file's SHA-256 digest changes (§4.10's hot reload),
/// at which point it cancels every job and rebuilds. Runs until the
/// process is killed; used by the `run` subcommand's daemon mode.
pub async fn run_daemon(settings_path: PathBuf, notify_enabled: bool) -> anyhow::Result<()> {
    loop {
        let settings = Arc::new(config::load_settings(&settings_path)?);
        let tenants = Arc::new(config::load_tenant_configs(&settings, settings.limit_to_client.as_deref())?);
        tracing::info!(tenants = tenants.len(), "scheduler starting with loaded settings");

        let sched = JobScheduler::new().await?;

        for family in Family::all() {
            let family_settings = family.family_settings(&settings);
            if !family_settings.enabled {
                continue;
            }
            let period = Duration::from_secs(family_settings.minutes_between_run.max(1) * 60);
            let settings = settings.clone();
            let tenants = tenants.clone();
            let job = Job::new_repeated_async(period, move |_uuid, _lock| {
                let settings = settings.clone();
                let tenants = tenants.clone();
                Box::pin(async move {
                    fire_family(family, settings, tenants, notify_enabled).await;
                })
            })?;
            sched.add(job).await?;
        }

        sched.start().await?;

        let (reload_tx, mut reload_rx) = mpsc::channel(1);
        let watch_handle = tokio::spawn(config::hotreload::watch(settings_path.clone(), reload_tx));

        reload_rx.recv().await;
        watch_handle.abort();
        sched.shutdown().await?;
        tracing::info!("settings changed, cancelling and re-registering every job");
    }
}

/// One-shot invocation (`--manual 1` / the per-family CLI subcommands):
/// fires `family` exactly once across every matching tenant, then returns.
pub async fn run_once(
    family: Family,
    settings_path: PathBuf,
    client_filter: Option<String>,
    notify_enabled: bool,
) -> anyhow::Result<()> {
    let settings = Arc::new(config::load_settings(&settings_path)?);
    let client_filter = client_filter.or_else(|| settings.limit_to_client.clone());
    let tenants = Arc::new(config::load_tenant_configs(&settings, client_filter.as_deref())?);
    fire_family(family, settings, tenants, notify_enabled).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_capped_at_100() {
        assert_eq!(pool_size_from_lowest_thread_count(1_000), 100);
    }

    #[test]
    fn pool_size_floor_divides_by_three() {
        assert_eq!(pool_size_from_lowest_thread_count(90), 30);
    }

    #[test]
    fn pool_size_never_drops_below_one() {
        assert_eq!(pool_size_from_lowest_thread_count(0), 1);
        assert_eq!(pool_size_from_lowest_thread_count(2), 1);
    }
}
