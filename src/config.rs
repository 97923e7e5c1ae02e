use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub fcm: FcmSettings,
    #[serde(default)]
    pub apns: ApnsSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Batched gateway (Android). Enabled only when a credential is present.
#[derive(Debug, Clone, Deserialize)]
pub struct FcmSettings {
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,
    pub credential: Option<String>,
    pub credential_path: Option<String>,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FcmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_fcm_endpoint(),
            credential: None,
            credential_path: None,
            max_batch_size: default_max_batch_size(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Per-device gateway (Apple). Enabled only when team id, key id, bundle id
/// and private key are all present.
#[derive(Debug, Clone, Deserialize)]
pub struct ApnsSettings {
    pub team_id: Option<String>,
    pub key_id: Option<String>,
    pub private_key: Option<String>,
    pub private_key_path: Option<String>,
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub production: bool,
    /// Overrides the production/sandbox endpoint
    pub endpoint: Option<String>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_after_secs")]
    pub refresh_after_secs: u64,
}

impl Default for ApnsSettings {
    fn default() -> Self {
        Self {
            team_id: None,
            key_id: None,
            private_key: None,
            private_key_path: None,
            bundle_id: None,
            production: false,
            endpoint: None,
            timeout_secs: default_provider_timeout_secs(),
            refresh_after_secs: default_refresh_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sends: default_max_concurrent_sends(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com/v1/messages:sendMulticast".to_string()
}
fn default_max_batch_size() -> usize { crate::services::fcm::DEFAULT_MAX_BATCH_SIZE }
fn default_provider_timeout_secs() -> u64 { 10 }
fn default_refresh_after_secs() -> u64 {
    crate::services::apns_token::DEFAULT_REFRESH_AFTER_SECS as u64
}
fn default_max_concurrent_sends() -> usize { 32 }
fn default_deadline_secs() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with LISTING_PUSH__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., LISTING_PUSH__APNS__TEAM_ID -> apns.team_id
            .add_source(
                Environment::with_prefix("LISTING_PUSH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LISTING_PUSH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Apply well-known environment variables that don't follow the prefix scheme
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let fcm = FcmSettings::default();
        assert_eq!(fcm.max_batch_size, 500);
        assert!(fcm.credential.is_none());

        let apns = ApnsSettings::default();
        assert_eq!(apns.refresh_after_secs, 3000);
        assert!(!apns.production);
    }

    #[test]
    fn test_default_dispatch() {
        let dispatch = DispatchSettings::default();
        assert_eq!(dispatch.max_concurrent_sends, 32);
        assert_eq!(dispatch.deadline_secs, 60);
    }

    #[test]
    fn test_load_from_file_with_missing_sections() {
        let dir = std::env::temp_dir().join(format!("listing-push-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(
            &path,
            r#"
                [server]
                host = "127.0.0.1"
                port = 8080

                [database]
                url = "postgres://localhost/listing_push"

                [apns]
                team_id = "TEAM123456"
                production = true
            "#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.apns.team_id.as_deref(), Some("TEAM123456"));
        assert!(settings.apns.production);
        assert_eq!(settings.fcm.max_batch_size, 500);
        assert_eq!(settings.logging.level, "info");

        std::fs::remove_dir_all(dir).ok();
    }
}
