use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::literature::default_listing_sections;
use crate::path_guard::AllowList;

pub const DEFAULT_PROVIDER: &str = "YUNWU-OPENAI";
pub const DEFAULT_MODEL: &str = "gpt-4.1-2025-04-14";
pub const CONFIG_ENV: &str = "TRIALDIGEST_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Root folder holding one subfolder per section.
    pub base_path: PathBuf,
    /// Defaults to `[base_path]` when empty.
    pub allowed_paths: Vec<String>,
    /// Sections shown by the folder overview, in order.
    pub sections: Vec<String>,
    pub provider: String,
    pub providers_file: PathBuf,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
            allowed_paths: Vec::new(),
            sections: default_listing_sections(),
            provider: DEFAULT_PROVIDER.to_owned(),
            providers_file: PathBuf::from("providers.yaml"),
            model: DEFAULT_MODEL.to_owned(),
            temperature: 0.1,
            request_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Read a YAML config. A relative `providers_file` is resolved against
    /// the config file's directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let mut config: AppConfig = if raw.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("parse config: {}", path.display()))?
        };
        if config.providers_file.is_relative()
            && let Some(dir) = path.parent()
        {
            config.providers_file = dir.join(&config.providers_file);
        }
        config.validate()?;
        Ok(config)
    }

    /// `path` if given, else `$TRIALDIGEST_CONFIG`, else defaults.
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("no config file given; using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("temperature must be within 0.0..=2.0: {}", self.temperature);
        }
        if self.provider.trim().is_empty() {
            anyhow::bail!("provider must not be empty");
        }
        Ok(())
    }

    pub fn allow_list(&self) -> AllowList {
        if self.allowed_paths.is_empty() {
            AllowList::new([self.base_path.to_string_lossy()])
        } else {
            AllowList::new(&self.allowed_paths)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read provider store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse provider store {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("provider not configured: {0}")]
    MissingProvider(String),

    #[error("invalid base_url for provider {provider}: {reason}")]
    InvalidBaseUrl { provider: String, reason: String },
}

/// Provider name to credentials, loaded from a local YAML file.
#[derive(Debug, Clone, Default)]
pub struct ProviderStore {
    entries: BTreeMap<String, ProviderEntry>,
}

impl ProviderStore {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let entries = serde_yaml::from_str(raw)?;
        Ok(Self { entries })
    }

    pub fn get(&self, provider: &str) -> Result<&ProviderEntry, ConfigError> {
        let entry = self
            .entries
            .get(provider)
            .ok_or_else(|| ConfigError::MissingProvider(provider.to_owned()))?;
        let url = url::Url::parse(entry.base_url.trim()).map_err(|err| {
            ConfigError::InvalidBaseUrl {
                provider: provider.to_owned(),
                reason: err.to_string(),
            }
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidBaseUrl {
                provider: provider.to_owned(),
                reason: format!("unsupported scheme: {}", url.scheme()),
            });
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("trialdigest.yaml");
        std::fs::write(&path, "base_path: /srv/trials\nmodel: gpt-4o\n")?;

        let config = AppConfig::load(&path)?;
        assert_eq!(config.base_path, PathBuf::from("/srv/trials"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.provider, DEFAULT_PROVIDER);
        assert_eq!(config.sections.len(), 4);
        assert_eq!(config.providers_file, temp.path().join("providers.yaml"));
        assert!(config.allow_list().is_allowed("/srv/trials/x"));
        assert!(!config.allow_list().is_allowed("/srv/other"));
        Ok(())
    }

    #[test]
    fn unknown_keys_and_bad_temperature_are_rejected() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("c.yaml");

        std::fs::write(&path, "base_pth: /x\n")?;
        assert!(AppConfig::load(&path).is_err());

        std::fs::write(&path, "temperature: 3.5\n")?;
        let err = AppConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("temperature"));
        Ok(())
    }

    #[test]
    fn explicit_allow_list_replaces_base_path() {
        let config = AppConfig {
            base_path: PathBuf::from("/srv/trials"),
            allowed_paths: vec!["/mnt/a".to_owned()],
            ..AppConfig::default()
        };
        let guard = config.allow_list();
        assert!(guard.is_allowed("/mnt/a/b"));
        assert!(!guard.is_allowed("/srv/trials/x"));
    }

    #[test]
    fn provider_lookup() {
        let store = ProviderStore::parse(
            "YUNWU-OPENAI:\n  api_key: sk-test\n  base_url: https://llm.example.com/v1\n\
             BROKEN:\n  api_key: k\n  base_url: not a url\n",
        )
        .unwrap();

        let entry = store.get("YUNWU-OPENAI").unwrap();
        assert_eq!(entry.api_key, "sk-test");
        assert!(matches!(
            store.get("OTHER"),
            Err(ConfigError::MissingProvider(name)) if name == "OTHER"
        ));
        assert!(matches!(
            store.get("BROKEN"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn missing_store_file_is_a_read_error() {
        let err = ProviderStore::load(Path::new("/nonexistent/providers.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
