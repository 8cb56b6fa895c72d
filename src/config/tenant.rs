//! Per-tenant configuration: the domain model plus the on-disk JSON shape
//! it's parsed from (§3 `TenantConfig`, §6 "Tenant config file").

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::policy::GLOBAL_BUCKET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Elastic,
    Opensearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertVerifyMode {
    Required,
    Optional,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverSize {
    Auto,
    Gb(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverPolicy {
    pub size: RolloverSize,
    pub days: u32,
}

pub type RetentionPolicy = u32;
pub type AllocationPolicy = u32;
pub type ForcemergePolicy = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct BackupJob {
    pub retention_days: u32,
    pub limit_age: Option<u32>,
    pub include_special: bool,
}

/// Backup policy nests by repository first, job name second
/// (`policy.backup[repository][job]`) — a repository can run several named
/// backup jobs (`global`, `.kibana`, arbitrary index-prefix jobs) each with
/// its own retention/limit_age/include_special.
pub type RepositoryBackupJobs = HashMap<String, BackupJob>;

#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub rollover: HashMap<String, RolloverPolicy>,
    pub retention: HashMap<String, RetentionPolicy>,
    pub allocation: HashMap<String, AllocationPolicy>,
    pub forcemerge: HashMap<String, ForcemergePolicy>,
    pub backup: HashMap<String, RepositoryBackupJobs>,
}

/// Family-specific defaults substituted when `global` is absent (§3).
pub mod defaults {
    use super::*;

    pub fn rollover() -> RolloverPolicy {
        RolloverPolicy {
            size: RolloverSize::Gb(50),
            days: 30,
        }
    }
    pub fn retention() -> RetentionPolicy {
        3660
    }
    // accounting.py's get_allocation_policy default; see DESIGN.md for the
    // resolution of the discrepancy with allocation.py's empty default.
    pub fn allocation() -> AllocationPolicy {
        30
    }
    pub fn forcemerge() -> ForcemergePolicy {
        32
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub ssl_enabled: bool,
    pub check_hostname: bool,
    pub cert_verify: CertVerifyMode,
    pub ca_file: Option<PathBuf>,
    pub user: String,
    pub password: String,
}

impl Connection {
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub client_name: String,
    pub client_number: u32,
    pub platform: Platform,
    pub connection: Connection,
    pub policy: PolicySet,
}

impl TenantConfig {
    /// §6: `es_port` defaults to `9200` when `client_number == 0`, else
    /// `{client_number}03`.
    pub fn default_port(client_number: u32) -> u16 {
        if client_number == 0 {
            9200
        } else {
            format!("{client_number}03").parse().unwrap_or(9200)
        }
    }

    /// §4.1 (carried from `build_es_connection`): the `elastic` platform
    /// authenticates as `elastic`; every other platform authenticates as
    /// `admin` unless overridden by an explicit `es_user`.
    pub fn default_user(platform: Platform) -> &'static str {
        match platform {
            Platform::Elastic => "elastic",
            Platform::Opensearch => "admin",
        }
    }

    pub fn rollover_default(&self) -> RolloverPolicy {
        self.policy
            .rollover
            .get(GLOBAL_BUCKET)
            .copied()
            .unwrap_or_else(defaults::rollover)
    }
    pub fn retention_default(&self) -> RetentionPolicy {
        self.policy
            .retention
            .get(GLOBAL_BUCKET)
            .copied()
            .unwrap_or_else(defaults::retention)
    }
    pub fn allocation_default(&self) -> AllocationPolicy {
        self.policy
            .allocation
            .get(GLOBAL_BUCKET)
            .copied()
            .unwrap_or_else(defaults::allocation)
    }
    pub fn forcemerge_default(&self) -> ForcemergePolicy {
        self.policy
            .forcemerge
            .get(GLOBAL_BUCKET)
            .copied()
            .unwrap_or_else(defaults::forcemerge)
    }
}

// --- On-disk JSON shape -----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FileTenantConfig {
    pub client_name: String,
    #[serde(default)]
    pub client_number: u32,
    pub platform: Platform,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default = "default_true")]
    pub check_hostname: bool,
    #[serde(default = "default_cert_mode")]
    pub ssl_certificate: CertVerifyMode,
    pub ca_file: Option<PathBuf>,
    pub client_file_location: Option<PathBuf>,
    pub es_host: String,
    pub es_port: Option<u16>,
    pub es_user: Option<String>,
    pub es_password: Option<String>,
    pub password: Option<FilePassword>,
    #[serde(default)]
    pub policy: FilePolicySet,
}

fn default_true() -> bool {
    true
}
fn default_cert_mode() -> CertVerifyMode {
    CertVerifyMode::Required
}

#[derive(Debug, Deserialize)]
pub struct FilePassword {
    pub admin_password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct FilePolicySet {
    #[serde(default)]
    pub rollover: HashMap<String, FileRolloverPolicy>,
    #[serde(default)]
    pub retention: HashMap<String, RetentionPolicy>,
    #[serde(default)]
    pub allocation: HashMap<String, AllocationPolicy>,
    #[serde(default)]
    pub forcemerge: HashMap<String, ForcemergePolicy>,
    #[serde(default)]
    pub backup: HashMap<String, HashMap<String, FileBackupJob>>,
}

#[derive(Debug, Deserialize)]
pub struct FileRolloverPolicy {
    pub size_gb: FileRolloverSize,
    pub days: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FileRolloverSize {
    Auto(RolloverSizeAuto),
    Gb(u32),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloverSizeAuto {
    Auto,
}

#[derive(Debug, Deserialize)]
pub struct FileBackupJob {
    pub retention_days: u32,
    pub limit_age: Option<u32>,
    #[serde(default)]
    pub include_special: bool,
}

impl From<FileTenantConfig> for TenantConfig {
    fn from(f: FileTenantConfig) -> Self {
        let port = f
            .es_port
            .unwrap_or_else(|| TenantConfig::default_port(f.client_number));
        let user = f
            .es_user
            .or_else(|| f.password.as_ref().map(|_| TenantConfig::default_user(f.platform).to_string()))
            .unwrap_or_else(|| TenantConfig::default_user(f.platform).to_string());
        let password = f
            .es_password
            .or_else(|| f.password.map(|p| p.admin_password))
            .unwrap_or_default();
        let ca_file = f.ca_file.or_else(|| f.client_file_location.map(|p| p.join("ca/ca.crt")));

        TenantConfig {
            client_name: f.client_name,
            client_number: f.client_number,
            platform: f.platform,
            connection: Connection {
                host: f.es_host,
                port,
                ssl_enabled: f.ssl_enabled,
                check_hostname: f.check_hostname,
                cert_verify: f.ssl_certificate,
                ca_file,
                user,
                password,
            },
            policy: PolicySet {
                rollover: f
                    .policy
                    .rollover
                    .into_iter()
                    .map(|(k, v)| {
                        let size = match v.size_gb {
                            FileRolloverSize::Auto(_) => RolloverSize::Auto,
                            FileRolloverSize::Gb(n) => RolloverSize::Gb(n),
                        };
                        (k, RolloverPolicy { size, days: v.days })
                    })
                    .collect(),
                retention: f.policy.retention,
                allocation: f.policy.allocation,
                forcemerge: f.policy.forcemerge,
                backup: f
                    .policy
                    .backup
                    .into_iter()
                    .map(|(repository, jobs)| {
                        let jobs = jobs
                            .into_iter()
                            .map(|(job, v)| {
                                (
                                    job,
                                    BackupJob {
                                        retention_days: v.retention_days,
                                        limit_age: v.limit_age,
                                        include_special: v.include_special,
                                    },
                                )
                            })
                            .collect();
                        (repository, jobs)
                    })
                    .collect(),
            },
        }
    }
}
