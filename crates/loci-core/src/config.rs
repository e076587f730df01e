use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LociError, Result};

/// Top-level configuration for the Loci orchestration service.
///
/// Loaded from `~/.loci/config.toml` by default. Each section corresponds
/// to a subsystem or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LociConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl LociConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LociConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| LociError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// General server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Port the HTTP API binds to.
    pub port: u16,
    /// Directory holding the SQLite database and the API token file.
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            port: 3050,
            data_dir: "~/.loci".to_string(),
        }
    }
}

/// Approval-gate policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Per-action-type auto-approve defaults, consulted when an action
    /// input does not state `requires_approval` explicitly.
    pub auto_approve: AutoApproveConfig,
    /// Pending actions older than this are auto-rejected.
    pub pending_ttl_days: u32,
    /// Fixed-window notification cap per tenant.
    pub max_notifications_per_minute: u32,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve: AutoApproveConfig::default(),
            pending_ttl_days: 7,
            max_notifications_per_minute: 10,
        }
    }
}

/// Per-action-type auto-approve preferences.
///
/// `delete` defaults to false: destructive mutations require an explicit
/// approval unless the caller opts out per action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoApproveConfig {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
    pub link: bool,
    pub notify: bool,
    pub schedule: bool,
}

impl Default for AutoApproveConfig {
    fn default() -> Self {
        Self {
            create: true,
            update: true,
            delete: false,
            link: true,
            notify: true,
            schedule: true,
        }
    }
}

/// Retry policy applied to outbound calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Timeout budgets for outbound call classes, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub ai_call_secs: u64,
    pub integration_secs: u64,
    pub storage_query_secs: u64,
    pub webhook_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ai_call_secs: 30,
            integration_secs: 15,
            storage_query_secs: 10,
            webhook_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LociConfig::default();
        assert_eq!(config.general.port, 3050);
        assert_eq!(config.approval.pending_ttl_days, 7);
        assert_eq!(config.approval.max_notifications_per_minute, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert!((config.retry.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.retry.jitter);
        assert_eq!(config.timeouts.ai_call_secs, 30);
        assert_eq!(config.timeouts.integration_secs, 15);
        assert_eq!(config.timeouts.storage_query_secs, 10);
        assert_eq!(config.timeouts.webhook_secs, 5);
    }

    #[test]
    fn test_auto_approve_defaults() {
        let auto = AutoApproveConfig::default();
        assert!(auto.create);
        assert!(auto.update);
        assert!(!auto.delete, "delete must default to requiring approval");
        assert!(auto.link);
        assert!(auto.notify);
        assert!(auto.schedule);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = LociConfig::default();
        config.general.port = 4040;
        config.approval.auto_approve.delete = true;
        config.retry.max_retries = 5;
        config.save(&path).unwrap();

        let loaded = LociConfig::load(&path).unwrap();
        assert_eq!(loaded.general.port, 4040);
        assert!(loaded.approval.auto_approve.delete);
        assert_eq!(loaded.retry.max_retries, 5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(LociConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let config = LociConfig::load_or_default(&path);
        assert_eq!(config.general.port, 3050);
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nport = 9999\ndata_dir = \"/tmp/loci\"\n").unwrap();

        let config = LociConfig::load(&path).unwrap();
        assert_eq!(config.general.port, 9999);
        // Missing sections fall back to defaults.
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.timeouts.ai_call_secs, 30);
    }
}
