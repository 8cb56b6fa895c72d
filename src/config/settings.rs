//! Global settings (§6 "Global settings (TOML)"): the `[settings]` table,
//! one table per lifecycle family, and `[accounting]`.
//!
//! Layered `FileX` (all-optional, as parsed straight off disk) →
//! domain-struct (fully resolved, defaults applied) pattern.

use crate::cluster::types::HealthColor;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Computer,
    Ip,
    User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceTrackingRule {
    pub index: String,
    pub tracking_field: String,
    #[serde(default)]
    pub search: Option<serde_json::Value>,
    pub count_as: DeviceKind,
}

#[derive(Debug, Clone)]
pub struct NotificationTargets {
    pub ms_teams: Option<String>,
    pub jira: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FamilySettings {
    pub enabled: bool,
    pub minutes_between_run: u64,
    pub health_check_level: HealthColor,
    pub fallback_health_check_level: HealthColor,
    pub retry_attempts: u32,
    pub retry_wait_in_seconds: u64,
    pub notify: NotificationTargets,
}

#[derive(Debug, Clone)]
pub struct AccountingSettings {
    pub base: FamilySettings,
    pub output_folder: PathBuf,
    pub ssd_cost: f64,
    pub sata_cost: f64,
    pub output_to_es: bool,
    pub send_copy_to_client_name: Option<String>,
    pub device_tracking_inclusion: Vec<DeviceTrackingRule>,
    pub device_tracking_exclusion: Vec<DeviceTrackingRule>,
}

/// §4.11's `shard_minimum_size` classification threshold, plus batching
/// knobs (§4.11: "accumulate indices of the same group until batch size
/// > shard_minimum_size (GB) or count > 30").
#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub base: FamilySettings,
    pub shard_minimum_size_gb: f64,
    pub batch_count_limit: u32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub limit_to_client: Option<String>,
    pub client_json_folder: PathBuf,
    pub ssl_enabled: bool,
    pub check_hostname: bool,
    pub ssl_certificate: crate::config::tenant::CertVerifyMode,
    pub rollover: FamilySettings,
    pub retention: FamilySettings,
    pub allocation: FamilySettings,
    pub forcemerge: FamilySettings,
    pub backup: FamilySettings,
    pub jobs: JobsSettings,
    pub accounting: AccountingSettings,
}

// --- On-disk TOML shape -------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct FileSettingsRoot {
    #[serde(default)]
    pub settings: FileSettingsBlock,
    #[serde(default)]
    pub rollover: FileFamily,
    #[serde(default)]
    pub retention: FileFamily,
    #[serde(default)]
    pub allocation: FileFamily,
    #[serde(default)]
    pub forcemerge: FileFamily,
    #[serde(default)]
    pub backup: FileFamily,
    #[serde(default)]
    pub jobs: FileJobs,
    #[serde(default)]
    pub accounting: FileAccounting,
}

#[derive(Debug, Deserialize, Default)]
pub struct FileJobs {
    #[serde(flatten)]
    pub family: FileFamily,
    pub shard_minimum_size_gb: Option<f64>,
    pub batch_count_limit: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSettingsBlock {
    pub debug: Option<bool>,
    pub limit_to_client: Option<String>,
    pub client_json_folder: Option<PathBuf>,
    pub ssl_enabled: Option<bool>,
    pub check_hostname: Option<bool>,
    pub ssl_certificate: Option<crate::config::tenant::CertVerifyMode>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FileFamily {
    pub enabled: Option<bool>,
    pub minutes_between_run: Option<u64>,
    pub health_check_level: Option<String>,
    pub fallback_health_check_level: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_wait_in_seconds: Option<u64>,
    #[serde(rename = "ms-teams")]
    pub ms_teams: Option<String>,
    pub jira: Option<String>,
}

impl FileFamily {
    fn resolve(&self, defaults: FamilySettings) -> FamilySettings {
        FamilySettings {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            minutes_between_run: self.minutes_between_run.unwrap_or(defaults.minutes_between_run),
            health_check_level: self
                .health_check_level
                .as_deref()
                .and_then(HealthColor::parse)
                .unwrap_or(defaults.health_check_level),
            fallback_health_check_level: self
                .fallback_health_check_level
                .as_deref()
                .and_then(HealthColor::parse)
                .unwrap_or(defaults.fallback_health_check_level),
            retry_attempts: self.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_wait_in_seconds: self
                .retry_wait_in_seconds
                .unwrap_or(defaults.retry_wait_in_seconds),
            notify: NotificationTargets {
                ms_teams: self.ms_teams.clone().or(defaults.notify.ms_teams),
                jira: self.jira.clone().or(defaults.notify.jira),
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileAccounting {
    #[serde(flatten)]
    pub family: FileFamily,
    pub output_folder: Option<PathBuf>,
    pub ssd_cost: Option<f64>,
    pub sata_cost: Option<f64>,
    pub output_to_es: Option<bool>,
    pub send_copy_to_client_name: Option<String>,
    #[serde(default)]
    pub device_tracking_inclusion: Vec<DeviceTrackingRule>,
    #[serde(default)]
    pub device_tracking_exclusion: Vec<DeviceTrackingRule>,
}

fn default_family(minutes: u64) -> FamilySettings {
    FamilySettings {
        enabled: true,
        minutes_between_run: minutes,
        health_check_level: HealthColor::Yellow,
        fallback_health_check_level: HealthColor::Red,
        retry_attempts: 3,
        retry_wait_in_seconds: 300,
        notify: NotificationTargets {
            ms_teams: None,
            jira: None,
        },
    }
}

impl FileSettingsRoot {
    pub fn resolve(self) -> Settings {
        Settings {
            debug: self.settings.debug.unwrap_or(false),
            limit_to_client: self.settings.limit_to_client,
            client_json_folder: self
                .settings
                .client_json_folder
                .unwrap_or_else(|| PathBuf::from("clients")),
            ssl_enabled: self.settings.ssl_enabled.unwrap_or(true),
            check_hostname: self.settings.check_hostname.unwrap_or(true),
            ssl_certificate: self
                .settings
                .ssl_certificate
                .unwrap_or(crate::config::tenant::CertVerifyMode::Required),
            rollover: self.rollover.resolve(default_family(60)),
            retention: self.retention.resolve(default_family(1440)),
            allocation: self.allocation.resolve(default_family(1440)),
            forcemerge: self.forcemerge.resolve(default_family(1440)),
            backup: self.backup.resolve(default_family(1440)),
            jobs: JobsSettings {
                base: self.jobs.family.resolve(default_family(1440)),
                shard_minimum_size_gb: self.jobs.shard_minimum_size_gb.unwrap_or(5.0),
                batch_count_limit: self.jobs.batch_count_limit.unwrap_or(30),
            },
            accounting: AccountingSettings {
                base: self.accounting.family.resolve(default_family(1440)),
                output_folder: self
                    .accounting
                    .output_folder
                    .unwrap_or_else(|| PathBuf::from("accounting")),
                ssd_cost: self.accounting.ssd_cost.unwrap_or(0.001),
                sata_cost: self.accounting.sata_cost.unwrap_or(0.0003),
                output_to_es: self.accounting.output_to_es.unwrap_or(false),
                send_copy_to_client_name: self.accounting.send_copy_to_client_name,
                device_tracking_inclusion: self.accounting.device_tracking_inclusion,
                device_tracking_exclusion: self.accounting.device_tracking_exclusion,
            },
        }
    }
}
