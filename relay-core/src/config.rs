//! Relay runtime settings (`<home>/.relay/config.yaml`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::files::{self, load_yaml, save_yaml};

/// Environment variable overriding [`SyncSettings::sync_token`].
pub const SYNC_TOKEN_ENV: &str = "RELAY_SYNC_TOKEN";

pub const DEFAULT_WEBHOOK_PATH: &str = "/sync-webhook";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Host this deployment serves; resolves the current platform.
    pub host: String,
    /// Secret shared by every platform; part of each signature key.
    pub sync_token: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// URL scheme used for outbound deliveries.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Delay between a local mutation and its preparation.
    #[serde(default = "default_capture_delay_secs")]
    pub capture_delay_secs: u64,
    /// Socket address of the webhook listener.
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_apply_max_attempts")]
    pub apply_max_attempts: u32,
}

fn default_webhook_path() -> String {
    DEFAULT_WEBHOOK_PATH.to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_capture_delay_secs() -> u64 {
    5
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_apply_max_attempts() -> u32 {
    3
}

impl SyncSettings {
    /// Settings with every optional field at its default.
    pub fn new(host: impl Into<String>, sync_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            sync_token: sync_token.into(),
            webhook_path: default_webhook_path(),
            scheme: default_scheme(),
            capture_delay_secs: default_capture_delay_secs(),
            listen: default_listen(),
            apply_max_attempts: default_apply_max_attempts(),
        }
    }

    pub fn capture_delay(&self) -> Duration {
        Duration::from_secs(self.capture_delay_secs)
    }

    /// `{scheme}://{domain}{webhook_path}`
    pub fn webhook_url(&self, domain: &str) -> String {
        format!("{}://{}{}", self.scheme, domain, self.webhook_path)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sync_token.is_empty() {
            return Err(invalid("sync_token must not be empty"));
        }
        if !self.webhook_path.starts_with('/') {
            return Err(invalid("webhook_path must start with '/'"));
        }
        if self.apply_max_attempts == 0 {
            return Err(invalid("apply_max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Load `<home>/.relay/config.yaml`, then apply the `RELAY_SYNC_TOKEN`
    /// override.
    pub fn load_at(home: &Path) -> Result<Self, CoreError> {
        let mut settings: Self = load_yaml(&files::config_path_at(home))?;
        if let Ok(token) = std::env::var(SYNC_TOKEN_ENV) {
            if !token.is_empty() {
                settings.sync_token = token;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_at(&files::home()?)
    }

    pub fn save_at(&self, home: &Path) -> Result<(), CoreError> {
        save_yaml(&files::config_path_at(home), self)
    }
}

fn invalid(reason: &str) -> CoreError {
    CoreError::Invalid {
        what: "config",
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings: SyncSettings =
            serde_yaml::from_str("host: a.test\nsync_token: shared\n").expect("parse");
        assert_eq!(settings.webhook_path, "/sync-webhook");
        assert_eq!(settings.capture_delay(), Duration::from_secs(5));
        assert_eq!(settings.apply_max_attempts, 3);
    }

    #[test]
    fn webhook_url_joins_scheme_domain_and_path() {
        let settings = SyncSettings::new("a.test", "shared");
        assert_eq!(
            settings.webhook_url("b.test"),
            "https://b.test/sync-webhook"
        );
    }

    #[test]
    fn empty_sync_token_is_invalid() {
        let settings = SyncSettings::new("a.test", "");
        assert!(settings.validate().is_err());
    }
}
