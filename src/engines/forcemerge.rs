//! ForceMerge Engine (§4.7).

use chrono::Utc;

use crate::cluster::{ClusterError, ClusterGateway};
use crate::config::tenant::TenantConfig;
use crate::policy;

use super::{eligible_indices, reference_timestamp, EngineReport};

const MAX_NUM_SEGMENTS: u32 = 1;

pub async fn run(gateway: &ClusterGateway, tenant: &TenantConfig) -> Result<EngineReport, ClusterError> {
    let indices = gateway.list_classified_indices().await?;
    let now = Utc::now();
    let mut report = EngineReport::default();

    for index in eligible_indices(&indices) {
        report.considered += 1;

        let bucket = policy::resolve_bucket_name(&index.name, &tenant.policy.forcemerge);
        let policy_days = tenant
            .policy
            .forcemerge
            .get(&bucket)
            .copied()
            .unwrap_or_else(|| tenant.forcemerge_default());

        let reference = reference_timestamp(gateway, index).await;
        let age_days = (now - reference).num_days();
        if age_days < policy_days as i64 {
            continue;
        }

        // §7: a per-index forcemerge failure is logged and counted, not
        // allowed to abort the rest of the tenant's firing.
        match gateway.forcemerge(&index.name, MAX_NUM_SEGMENTS).await {
            Ok(()) => report.acted += 1,
            Err(e) => {
                tracing::warn!(index = %index.name, error = %e, "forcemerge failed, skipping");
                report.errors += 1;
            }
        }
    }

    Ok(report)
}
