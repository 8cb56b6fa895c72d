//! Retention Engine (§4.5).

use chrono::Utc;

use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::settings::FamilySettings;
use crate::config::tenant::TenantConfig;
use crate::policy;

use super::{eligible_indices, reference_timestamp, EngineReport};

pub async fn run(
    gateway: &ClusterGateway,
    tenant: &TenantConfig,
    settings: &FamilySettings,
) -> Result<EngineReport, ClusterError> {
    let health = gateway.cluster_health().await?;
    if !health.meets(settings.health_check_level) {
        return Err(ClusterError::HealthGate {
            have: format!("{health:?}"),
            need: format!("{:?}", settings.health_check_level),
        });
    }

    let indices = gateway.list_classified_indices().await?;
    let data_streams = gateway.list_data_streams().await?;
    let now = Utc::now();

    let mut report = EngineReport::default();
    let mut to_delete = Vec::new();

    for index in eligible_indices(&indices) {
        report.considered += 1;

        let bucket = policy::resolve_bucket_name(&index.name, &tenant.policy.retention);
        let retention_days = tenant
            .policy
            .retention
            .get(&bucket)
            .copied()
            .unwrap_or_else(|| tenant.retention_default());

        let reference = reference_timestamp(gateway, index).await;
        let age_days = (now - reference).num_days();

        if age_days < retention_days as i64 {
            continue;
        }

        // §4.5: "if the index is the sole member of a data stream, delete
        // the data stream instead; otherwise delete the index." §7: a
        // per-index failure here must not abort the rest of the pass.
        if let Some(stream) = data_streams
            .iter()
            .find(|ds| ds.indices.len() == 1 && ds.indices[0].index_name == index.name)
        {
            match gateway.delete_data_stream(&stream.name).await {
                Ok(()) => report.acted += 1,
                Err(e) => {
                    tracing::warn!(index = %index.name, stream = %stream.name, error = %e, "data stream delete failed, skipping");
                    report.errors += 1;
                }
            }
        } else {
            to_delete.push(index.name.clone());
        }
    }

    // §4.5's "groups of ≤ 50 index names are deleted in a single call" is
    // handled by the gateway's own `delete_indices` chunking.
    if !to_delete.is_empty() {
        report.acted += to_delete.len() as u32;
        gateway.delete_indices(&to_delete).await?;
    }

    Ok(report)
}
