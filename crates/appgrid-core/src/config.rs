//! appgrid.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_STORE_PATH: &str = "/var/lib/appgrid/appgrid.redb";
const DEFAULT_DEPLOYMENT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_STALE_AFTER_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppgridConfig {
    pub store: Option<StoreConfig>,
    pub scheduler: Option<SchedulerConfig>,
    pub sweeper: Option<SweeperConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// How long to block on a scheduler deployment before giving up.
    pub deployment_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweeperConfig {
    pub interval_secs: Option<u64>,
    /// Age after which a non-terminal appset or repair is considered stuck.
    pub stale_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub json: Option<bool>,
}

impl AppgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppgridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    pub fn deployment_timeout(&self) -> Duration {
        let secs = self
            .scheduler
            .as_ref()
            .and_then(|s| s.deployment_timeout_secs)
            .unwrap_or(DEFAULT_DEPLOYMENT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        let secs = self
            .sweeper
            .as_ref()
            .and_then(|s| s.interval_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn stale_after(&self) -> Duration {
        let secs = self
            .sweeper
            .as_ref()
            .and_then(|s| s.stale_after_secs)
            .unwrap_or(DEFAULT_STALE_AFTER_SECS);
        Duration::from_secs(secs)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppgridConfig = toml::from_str("").unwrap();
        assert_eq!(config.store_path(), PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.deployment_timeout(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(86_400));
        assert_eq!(config.stale_after(), Duration::from_secs(3_600));
        assert!(!config.json_logs());
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[store]
path = "/tmp/appgrid.redb"

[scheduler]
deployment_timeout_secs = 30

[sweeper]
interval_secs = 600
stale_after_secs = 120

[logging]
json = true
"#;
        let config: AppgridConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/tmp/appgrid.redb"));
        assert_eq!(config.deployment_timeout(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(600));
        assert_eq!(config.stale_after(), Duration::from_secs(120));
        assert!(config.json_logs());

        let round = config.to_toml_string().unwrap();
        assert!(round.contains("deployment_timeout_secs = 30"));
    }
}
