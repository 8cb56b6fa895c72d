//! Allocation Engine (§4.6): hot/warm tiering.

use chrono::Utc;
use serde_json::{json, Value};

use crate::cluster::ClusterError;
use crate::cluster::ClusterGateway;
use crate::config::tenant::TenantConfig;
use crate::policy;

use super::{eligible_indices, reference_timestamp, EngineReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Hot,
    Warm,
}

impl Tier {
    fn tier_preference(self) -> &'static str {
        match self {
            Tier::Hot => "data_hot",
            Tier::Warm => "data_warm",
        }
    }
    fn box_type(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
        }
    }
}

enum CurrentTierSetting {
    TierPreference(String),
    BoxType(String),
    Absent,
}

/// §4.6: "Read the index's current tier from, in order:
/// `index.routing.allocation.include._tier_preference` →
/// `index.routing.allocation.require.box_type`."
fn read_current_tier(settings_body: &Value, index_name: &str) -> CurrentTierSetting {
    let routing = settings_body
        .pointer(&format!("/{index_name}/settings/index/routing/allocation"));

    if let Some(pref) = routing.and_then(|r| r.get("include")).and_then(|i| i.get("_tier_preference")).and_then(Value::as_str) {
        return CurrentTierSetting::TierPreference(pref.to_string());
    }
    if let Some(bt) = routing.and_then(|r| r.get("require")).and_then(|i| i.get("box_type")).and_then(Value::as_str) {
        return CurrentTierSetting::BoxType(bt.to_string());
    }
    CurrentTierSetting::Absent
}

pub async fn run(gateway: &ClusterGateway, tenant: &TenantConfig) -> Result<EngineReport, ClusterError> {
    let indices = gateway.list_classified_indices().await?;
    let now = Utc::now();
    let mut report = EngineReport::default();

    for index in eligible_indices(&indices) {
        report.considered += 1;

        let bucket = policy::resolve_bucket_name(&index.name, &tenant.policy.allocation);
        let allocation_days = tenant
            .policy
            .allocation
            .get(&bucket)
            .copied()
            .unwrap_or_else(|| tenant.allocation_default());

        let reference = reference_timestamp(gateway, index).await;
        let age_days = (now - reference).num_days();
        let target = if age_days >= allocation_days as i64 { Tier::Warm } else { Tier::Hot };

        // §7: a per-index gateway failure is logged and counted, never
        // allowed to abort the rest of the tenant's firing.
        let settings_body = match gateway.get_settings(&index.name).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(index = %index.name, error = %e, "get_settings failed, skipping");
                report.errors += 1;
                continue;
            }
        };
        let current = read_current_tier(&settings_body, &index.name);

        let needs_update = match &current {
            CurrentTierSetting::TierPreference(p) => p != target.tier_preference(),
            CurrentTierSetting::BoxType(b) => b != target.box_type(),
            CurrentTierSetting::Absent => true,
        };
        if !needs_update {
            continue;
        }

        let body = match current {
            CurrentTierSetting::TierPreference(_) => json!({
                "index": { "routing": { "allocation": { "include": { "_tier_preference": target.tier_preference() } } } }
            }),
            CurrentTierSetting::BoxType(_) | CurrentTierSetting::Absent => json!({
                "index": { "routing": { "allocation": { "require": { "box_type": target.box_type() } } } }
            }),
        };

        match gateway.put_settings(&index.name, &body).await {
            Ok(()) => report.acted += 1,
            Err(e) => {
                tracing::warn!(index = %index.name, error = %e, "put_settings failed, skipping");
                report.errors += 1;
            }
        }
    }

    Ok(report)
}
