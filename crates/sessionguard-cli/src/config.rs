//! CLI configuration management.
//!
//! This module handles loading and saving the CLI configuration, which
//! holds the session client settings and the last used username.
//!
//! Configuration is stored at `~/.config/sessionguard/config.json` and can
//! be overridden per run with `SESSIONGUARD_*` environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sessionguard_core::SessionConfig;

/// Application name used for the config directory path
const APP_NAME: &str = "sessionguard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_BASE_URL: &str = "SESSIONGUARD_BASE_URL";
pub const ENV_USERNAME: &str = "SESSIONGUARD_USERNAME";
pub const ENV_PASSWORD: &str = "SESSIONGUARD_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub session: SessionConfig,
    pub last_username: Option<String>,
    /// Per-run values from the environment. Never written back by `save`.
    #[serde(skip)]
    overrides: EnvOverrides,
}

#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    base_url: Option<String>,
    username: Option<String>,
}

impl CliConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Record environment overrides, looked up through `var`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.overrides = EnvOverrides {
            base_url: var(ENV_BASE_URL),
            username: var(ENV_USERNAME),
        };
    }

    /// Session settings with environment overrides applied.
    pub fn effective_session(&self) -> SessionConfig {
        let mut session = self.session.clone();
        if let Some(url) = &self.overrides.base_url {
            session.base_url = url.clone();
        }
        session
    }

    /// Username to log in with: the environment first, then the saved one.
    pub fn username(&self) -> Option<&str> {
        self.overrides
            .username
            .as_deref()
            .or(self.last_username.as_deref())
    }

    /// Whether the username for this run came from the environment.
    pub fn username_from_env(&self) -> bool {
        self.overrides.username.is_some()
    }

    /// The configuration this run actually uses, for display.
    pub fn effective(&self) -> CliConfig {
        CliConfig {
            session: self.effective_session(),
            last_username: self.username().map(str::to_string),
            overrides: EnvOverrides::default(),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let mut config = CliConfig::default();
        config.apply_env(|key| match key {
            ENV_BASE_URL => Some("https://auth.example.com".to_string()),
            ENV_USERNAME => Some("alice".to_string()),
            _ => None,
        });
        assert_eq!(config.effective_session().base_url, "https://auth.example.com");
        assert_eq!(config.username(), Some("alice"));
        assert!(config.username_from_env());
    }

    #[test]
    fn test_env_overrides_are_not_saved() {
        let mut config: CliConfig = serde_json::from_str(
            r#"{"session": {"base_url": "https://saved.example.com"}, "last_username": "bob"}"#,
        )
        .expect("Failed to parse config");
        config.apply_env(|key| match key {
            ENV_BASE_URL => Some("https://env.example.com".to_string()),
            ENV_USERNAME => Some("alice".to_string()),
            _ => None,
        });

        let saved = serde_json::to_string_pretty(&config).expect("Failed to serialize config");
        assert!(saved.contains("https://saved.example.com"));
        assert!(!saved.contains("https://env.example.com"));
        assert!(!saved.contains("alice"));

        let effective = config.effective();
        assert_eq!(effective.session.base_url, "https://env.example.com");
        assert_eq!(effective.last_username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_saved_username_used_without_env() {
        let mut config: CliConfig = serde_json::from_str(r#"{"last_username": "bob"}"#)
            .expect("Failed to parse config");
        config.apply_env(|_| None);
        assert_eq!(config.username(), Some("bob"));
        assert!(!config.username_from_env());
        assert_eq!(config.effective_session(), SessionConfig::default());
    }

    #[test]
    fn test_parse_without_session_section() {
        let config: CliConfig = serde_json::from_str(r#"{"last_username": "bob"}"#)
            .expect("Failed to parse config");
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.last_username.as_deref(), Some("bob"));
    }
}
