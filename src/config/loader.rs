//! Loads the global TOML settings and the per-tenant JSON config files
//! (§6). Both failure modes here are the **Configuration** error kind
//! (§7): fatal at startup, never retried.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::settings::{FileSettingsRoot, Settings};
use super::tenant::{FileTenantConfig, TenantConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings file not found at {0}")]
    SettingsMissing(PathBuf),
    #[error("failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to read tenant config {path}: {source}")]
    TenantRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tenant config {0} is missing the client_name key")]
    TenantMissingName(PathBuf),
    #[error("failed to parse tenant config {path}: {source}")]
    TenantParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to list client_json_folder {0}: {1}")]
    FolderUnreadable(PathBuf, std::io::Error),
}

/// Loads `settings_path`, substituting the settings file's own directory
/// for `client_json_folder` when it's left blank, mirroring
/// `load_settings`'s `client_json_folder == ""` special case.
pub fn load_settings(settings_path: &Path) -> Result<Settings, ConfigError> {
    if !settings_path.exists() {
        return Err(ConfigError::SettingsMissing(settings_path.to_path_buf()));
    }
    let raw = fs::read_to_string(settings_path).map_err(|source| ConfigError::TenantRead {
        path: settings_path.to_path_buf(),
        source,
    })?;
    let root: FileSettingsRoot = toml::from_str(&raw).map_err(|source| ConfigError::SettingsParse {
        path: settings_path.to_path_buf(),
        source,
    })?;
    let mut settings = root.resolve();
    if settings.client_json_folder.as_os_str().is_empty() {
        if let Some(parent) = settings_path.parent() {
            settings.client_json_folder = parent.to_path_buf();
        }
    }
    Ok(settings)
}

/// Scans `settings.client_json_folder` for `*.json` tenant files, optionally
/// restricted to those whose filename starts with `client_value` (empty =
/// all), keyed by the parsed `client_name` (§6, `load_configs`).
pub fn load_tenant_configs(
    settings: &Settings,
    client_value: Option<&str>,
) -> Result<HashMap<String, TenantConfig>, ConfigError> {
    let folder = &settings.client_json_folder;
    let mut tenants = HashMap::new();

    let entries = fs::read_dir(folder).map_err(|e| ConfigError::FolderUnreadable(folder.clone(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::FolderUnreadable(folder.clone(), e))?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(".json") {
            continue;
        }
        if let Some(prefix) = client_value {
            if !prefix.is_empty() && !file_name.starts_with(prefix) {
                continue;
            }
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::TenantRead {
            path: path.clone(),
            source,
        })?;
        let raw_value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| ConfigError::TenantParse {
                path: path.clone(),
                source,
            })?;
        if raw_value.get("client_name").is_none() {
            return Err(ConfigError::TenantMissingName(path));
        }
        let file_config: FileTenantConfig =
            serde_json::from_value(raw_value).map_err(|source| ConfigError::TenantParse {
                path: path.clone(),
                source,
            })?;
        let tenant: TenantConfig = file_config.into();
        tenants.insert(tenant.client_name.clone(), tenant);
    }

    Ok(tenants)
}
