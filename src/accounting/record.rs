//! §3 `AccountingRecord` and the device-tracking record (§4.9 step 7).

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskTier {
    Ssd,
    Sata,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountingRecord {
    pub name: String,
    pub client: String,
    pub size_gb: f64,
    pub logs: u64,
    pub disk: DiskTier,
    pub cost: f64,
    pub index_creation_date: DateTime<Utc>,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub group: String,
    pub policy: String,
    pub policy_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceCountRecord {
    pub client: String,
    pub device_count: u64,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
}
