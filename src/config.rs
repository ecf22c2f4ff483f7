use crate::data_sync::config::{ListenerConfig, NetworkConfig};
use crate::logic::path::NetworkId;
use crate::logic::types::SearchConfig;
use crate::utils::config_loader::{ConfigSection, ConfigSectionSync, LoadConfigError, load_from_file, load_from_file_sync};
use ahash::{HashMap, HashSet, HashSetExt};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;

/// Locations of the JSON collections produced by the offline path generator.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegistryFiles {
    pub tokens: String,
    pub pools: String,
    pub paths: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    pub registry: RegistryFiles,
    pub networks: Vec<NetworkConfig>,
}

impl AppConfig {
    /// Reject configurations the monitor cannot start with.
    pub fn validate(&self) -> Result<(), LoadConfigError> {
        if self.networks.is_empty() {
            return Err(LoadConfigError::ConfigError("no [[networks]] configured".to_string()));
        }
        let mut seen = HashSet::new();
        for network in self.networks.iter() {
            if !seen.insert(network.id) {
                return Err(LoadConfigError::ConfigError(format!("network {} configured twice", network.id)));
            }
            network.rpc_url().map_err(|e| LoadConfigError::ConfigError(e.to_string()))?;
        }
        Ok(())
    }

    /// Inventory holder per network, for networks that name one.
    pub fn holders(&self) -> HashMap<NetworkId, Address> {
        self.networks.iter().filter_map(|network| network.holder.map(|holder| (network.id, holder))).collect()
    }
}

#[async_trait]
impl ConfigSection for AppConfig {
    type SectionType = AppConfig;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let config: AppConfig = load_from_file(file_name).await?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigSectionSync for AppConfig {
    type SectionType = AppConfig;

    fn load_section_from_file_sync(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let config: AppConfig = load_from_file_sync(file_name)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize)]
struct SearchConfigRoot {
    #[serde(default)]
    search: SearchConfig,
}

#[async_trait]
impl ConfigSection for SearchConfig {
    type SectionType = SearchConfig;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: SearchConfigRoot = load_from_file(file_name).await?;
        Ok(root.search)
    }
}

#[derive(Deserialize)]
struct ListenerConfigRoot {
    #[serde(default)]
    listener: ListenerConfig,
}

impl ConfigSectionSync for ListenerConfig {
    type SectionType = ListenerConfig;

    fn load_section_from_file_sync(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: ListenerConfigRoot = load_from_file_sync(file_name)?;
        Ok(root.listener)
    }
}
