//! Runtime configuration: optional file at `INTENT_CONFIG` (default `config/intent`)
//! overlaid by `INTENT__*` environment variables.

use crate::definition::IntentDraft;
use crate::error::BootstrapError;
use crate::response::DEFAULT_CONFIRM_TTL_SECS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentConfig {
    #[serde(default = "default_ttl")]
    pub confirmation_ttl_secs: u64,
    #[serde(default)]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// TOML file with `[[intent]]` tables seeded at startup.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
    #[serde(default = "default_platform_roles")]
    pub platform_roles: Vec<String>,
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_ttl() -> u64 {
    DEFAULT_CONFIRM_TTL_SECS
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/intent")
}

fn default_platform_roles() -> Vec<String> {
    vec!["super_admin".to_string(), "platform_admin".to_string()]
}

fn default_purge_interval() -> u64 {
    60
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            confirmation_ttl_secs: default_ttl(),
            storage_backend: StorageBackend::default(),
            storage_path: default_storage_path(),
            seed_path: None,
            platform_roles: default_platform_roles(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl IntentConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("INTENT_CONFIG").unwrap_or_else(|_| "config/intent".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Loads `path` when it exists (any extension the `config` crate recognises,
    /// or none), then applies the environment overlay.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("confirmation_ttl_secs", DEFAULT_CONFIRM_TTL_SECS as i64)?
            .set_default("storage_backend", "memory")?
            .set_default("storage_path", "./data/intent")?
            .set_default("purge_interval_secs", 60_i64)?;

        let with_ext = path.with_extension("toml");
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else if with_ext.exists() {
            builder.add_source(config::File::from(with_ext.as_path()))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("INTENT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("platform_roles")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs.max(1))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

/// Seed file: `[[intent]]` tables, each an [`IntentDraft`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub intent: Vec<IntentDraft>,
}

impl SeedFile {
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

pub fn load_seed_file(path: &Path) -> Result<SeedFile, BootstrapError> {
    let seed_error = |message: String| BootstrapError::Seed {
        path: path.display().to_string(),
        message,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
    SeedFile::parse(&raw).map_err(|e| seed_error(e.to_string()))
}
