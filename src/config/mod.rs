//! Configuration loading: global TOML settings (§6 "Global settings
//! (TOML)") plus per-tenant JSON files (§6 "Tenant config file"), and the
//! SHA-256 hot-reload watcher (§4.10).

pub mod hotreload;
pub mod loader;
pub mod settings;
pub mod tenant;

pub use loader::{load_settings, load_tenant_configs, ConfigError};
pub use settings::Settings;
pub use tenant::TenantConfig;

/// Version info, surfaced in the startup banner and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
