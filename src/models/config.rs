// src/models/config.rs

//! User configuration and connector tuning settings.
//!
//! `ConnectorConfig` is the user-saved server binding, persisted in the
//! synced store scope and mutated only through explicit update
//! operations. `Settings` is the TOML tuning file controlling polling
//! budgets and lifecycle behavior.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::host::HostSelectors;

/// User-facing server binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// Analysis server base URL
    #[serde(default)]
    pub server_url: String,

    /// Optional API key sent as a bearer credential
    #[serde(default)]
    pub api_key: String,

    /// Last project the user worked against
    #[serde(default)]
    pub last_project_id: Option<String>,
}

impl ConnectorConfig {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            last_project_id: None,
        }
    }

    /// Server URL with trailing slashes stripped.
    pub fn normalized_server_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// True once a server URL has been saved; network operations are
    /// blocked until then.
    pub fn is_configured(&self) -> bool {
        !self.server_url.trim().is_empty()
    }
}

/// Root tuning settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpSettings,

    /// Page extractor polling budgets
    #[serde(default)]
    pub extractor: ExtractorSettings,

    /// Coordinator lifecycle behavior
    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    /// Library-site selector overrides
    #[serde(default)]
    pub selectors: HostSelectors,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load settings or return defaults if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Settings load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate settings values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.extractor.host_poll_attempts == 0 {
            return Err(AppError::config("extractor.host_poll_attempts must be > 0"));
        }
        if self.extractor.load_poll_attempts == 0 {
            return Err(AppError::config("extractor.load_poll_attempts must be > 0"));
        }
        if regex::Regex::new(&self.coordinator.library_url_pattern).is_err() {
            return Err(AppError::config(
                "coordinator.library_url_pattern is not a valid regex",
            ));
        }
        Ok(())
    }
}

/// HTTP client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Page extractor polling budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    /// Interval between host-readiness polls in milliseconds
    #[serde(default = "defaults::host_poll_interval_ms")]
    pub host_poll_interval_ms: u64,

    /// Host-readiness attempt budget; exhausting it is a hard failure
    #[serde(default = "defaults::host_poll_attempts")]
    pub host_poll_attempts: u32,

    /// Interval between item-load polls in milliseconds
    #[serde(default = "defaults::load_poll_interval_ms")]
    pub load_poll_interval_ms: u64,

    /// Item-load attempt budget; exhausting it proceeds optimistically
    #[serde(default = "defaults::load_poll_attempts")]
    pub load_poll_attempts: u32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            host_poll_interval_ms: defaults::host_poll_interval_ms(),
            host_poll_attempts: defaults::host_poll_attempts(),
            load_poll_interval_ms: defaults::load_poll_interval_ms(),
            load_poll_attempts: defaults::load_poll_attempts(),
        }
    }
}

/// Coordinator lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Regex matched against navigation URLs to detect the library site
    #[serde(default = "defaults::library_url_pattern")]
    pub library_url_pattern: String,

    /// Cleanup pass cadence in seconds
    #[serde(default = "defaults::cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Whether a successful connection probe commits the probed URL/key
    /// as the active configuration
    #[serde(default = "defaults::commit_probed_config")]
    pub commit_probed_config: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            library_url_pattern: defaults::library_url_pattern(),
            cleanup_interval_secs: defaults::cleanup_interval_secs(),
            commit_probed_config: defaults::commit_probed_config(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; AnalyLitConnector/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Extractor defaults
    pub fn host_poll_interval_ms() -> u64 {
        1000
    }
    pub fn host_poll_attempts() -> u32 {
        30
    }
    pub fn load_poll_interval_ms() -> u64 {
        500
    }
    pub fn load_poll_attempts() -> u32 {
        10
    }

    // Coordinator defaults
    pub fn library_url_pattern() -> String {
        r"^https://www\.zotero\.org/".into()
    }
    pub fn cleanup_interval_secs() -> u64 {
        86_400
    }
    pub fn commit_probed_config() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_server_url_strips_trailing_slashes() {
        let config = ConnectorConfig::new("https://analylit.example.org///", "");
        assert_eq!(
            config.normalized_server_url(),
            "https://analylit.example.org"
        );
    }

    #[test]
    fn unconfigured_until_url_saved() {
        assert!(!ConnectorConfig::default().is_configured());
        assert!(ConnectorConfig::new("https://x.example", "").is_configured());
    }

    #[test]
    fn validate_default_settings_ok() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut settings = Settings::default();
        settings.extractor.host_poll_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_url_pattern() {
        let mut settings = Settings::default();
        settings.coordinator.library_url_pattern = "[[".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_parse_from_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            [extractor]
            host_poll_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(settings.extractor.host_poll_attempts, 5);
        assert_eq!(settings.extractor.load_poll_attempts, 10);
    }
}
