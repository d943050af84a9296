use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub account_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Interval between scheduled refreshes while subscribers are attached.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Upper bound on a single usage fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// How long to wait before re-attempting a not-ready account setup.
    #[serde(default = "default_setup_retry_secs")]
    pub setup_retry_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_setup_retry_secs() -> u64 {
    300
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            setup_retry_secs: default_setup_retry_secs(),
        }
    }
}

impl PollerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn setup_retry(&self) -> Duration {
        Duration::from_secs(self.setup_retry_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub poller: PollerConfig,
    pub api: ApiConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("POLLER_CONFIG").unwrap_or_else(|_| "poller-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [provider]
            base_url = "https://usage.example.com/api"

            [[accounts]]
            account_id = "A-123"

            [poller]
            refresh_interval_secs = 15

            [api]
            bind_addr = "127.0.0.1:8080"

            [metrics]
            bind_addr = "127.0.0.1:9100"
            "#,
        )
        .expect("valid config");

        assert_eq!(cfg.accounts.len(), 1);
        assert_eq!(cfg.poller.refresh_interval_secs, 15);
        // Unset fields keep their defaults.
        assert_eq!(cfg.poller.fetch_timeout_secs, 10);
        assert_eq!(cfg.poller.setup_retry_secs, 300);
        assert!(cfg.metrics.is_some());
    }

    #[test]
    fn poller_section_is_optional() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [provider]
            base_url = "https://usage.example.com/api"

            [[accounts]]
            account_id = "A-123"

            [api]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .expect("valid config");

        assert_eq!(cfg.poller.refresh_interval_secs, 30);
        assert!(cfg.metrics.is_none());
    }
}
