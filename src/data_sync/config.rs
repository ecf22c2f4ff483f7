use super::retry::RetryPolicy;
use crate::logic::path::NetworkId;
use crate::utils::constants::SYNC_TOPIC;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Block polling and log fetch settings shared by every network loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Delay between two block height checks on one network
    pub poll_interval_ms: u64,
    /// Retry schedule of one poll cycle's log fetch
    pub retry: RetryPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1_000, retry: RetryPolicy::default() }
    }
}

impl ListenerConfig {
    /// Apply `POLL_INTERVAL_MS`, `RETRY_MAX_ATTEMPTS` and `RETRY_DELAY_MS` when set.
    pub fn with_env_overrides(self) -> eyre::Result<Self> {
        let mut config = self;

        if let Ok(interval) = std::env::var("POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval.parse().map_err(|e| eyre::eyre!("Invalid POLL_INTERVAL_MS: {}", e))?;
        }

        if let Ok(attempts) = std::env::var("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.parse().map_err(|e| eyre::eyre!("Invalid RETRY_MAX_ATTEMPTS: {}", e))?;
        }

        if let Ok(delay) = std::env::var("RETRY_DELAY_MS") {
            config.retry.initial_delay_ms = delay.parse().map_err(|e| eyre::eyre!("Invalid RETRY_DELAY_MS: {}", e))?;
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One monitored chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub id: NetworkId,
    pub name: String,
    pub rpc_url: String,
    /// Account whose balances cap trade sizes on this network
    #[serde(default)]
    pub holder: Option<Address>,
    /// Reserve-change event topic, `Sync(uint112,uint112)` unless overridden
    #[serde(default)]
    pub sync_topic: Option<B256>,
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> eyre::Result<Url> {
        Url::parse(&self.rpc_url).map_err(|e| eyre::eyre!("Invalid rpc_url for network {} ({}): {}", self.name, self.id, e))
    }

    pub fn sync_topic(&self) -> B256 {
        self.sync_topic.unwrap_or(SYNC_TOPIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 500);
    }

    #[test]
    fn test_network_config() {
        let network: NetworkConfig = toml::from_str(
            r#"
            id = 43114
            name = "avalanche"
            rpc_url = "https://api.avax.network/ext/bc/C/rpc"
            "#,
        )
        .unwrap();
        assert_eq!(network.sync_topic(), SYNC_TOPIC);
        assert!(network.holder.is_none());
        assert_eq!(network.rpc_url().unwrap().host_str(), Some("api.avax.network"));

        let broken = NetworkConfig { rpc_url: "not a url".to_string(), ..network };
        assert!(broken.rpc_url().is_err());
    }
}
