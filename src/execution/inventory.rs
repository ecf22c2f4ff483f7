use crate::data_sync::listener::{LogBatch, TriggerFilter};
use crate::data_sync::provider::{BlockTag, ChainProviders, ProviderError};
use crate::logic::path::{NetworkId, Token};
use crate::logic::registry::PathRegistry;
use crate::utils::constants::{TRANSFER_TOPIC, balance_of_calldata};
use crate::utils::units::normalize_units;
use ahash::{HashMap, HashSet, HashSetExt};
use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// On-hand token balances, at 18 decimals.
pub trait Inventory: Send + Sync {
    fn balance(&self, network: NetworkId, holder: &Address, token: &Address) -> Option<U256>;
}

/// Balances held in memory. Unknown entries read as `None`.
#[derive(Debug, Default)]
pub struct StaticInventory {
    balances: DashMap<(NetworkId, Address, Address), U256>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, network: NetworkId, holder: Address, token: Address, amount: U256) {
        self.balances.insert((network, holder, token), amount);
    }

    /// `balanceOf` of every registry token for the holder of its network.
    ///
    /// A failed query is stored as a zero balance.
    pub async fn fetch(
        registry: &PathRegistry,
        providers: &ChainProviders,
        holders: &HashMap<NetworkId, Address>,
    ) -> Result<Self, ProviderError> {
        let inventory = Self::new();
        let mut requests = Vec::new();
        for token in registry.tokens() {
            let Some(holder) = holders.get(&token.network) else {
                continue;
            };
            requests.push(inventory.refresh(providers, token, *holder, BlockTag::Latest));
        }
        join_all(requests).await.into_iter().collect::<Result<Vec<_>, _>>()?;
        info!(balances = inventory.balances.len(), "Inventory loaded");
        Ok(inventory)
    }

    /// Re-query one balance and store it.
    async fn refresh(&self, providers: &ChainProviders, token: &Token, holder: Address, block: BlockTag) -> Result<U256, ProviderError> {
        let provider = providers.get(token.network)?;
        let amount = match provider.call(token.id, balance_of_calldata(holder), block).await {
            Ok(raw) if raw.len() >= 32 => normalize_units(U256::from_be_slice(&raw[..32]), token.decimals),
            Ok(raw) => {
                warn!(token = %token.id, network = token.network, len = raw.len(), "Malformed balanceOf result");
                U256::ZERO
            }
            Err(e) => {
                warn!(token = %token.id, network = token.network, "Failed to fetch balance: {}", e);
                U256::ZERO
            }
        };
        self.set_balance(token.network, holder, token.id, amount);
        Ok(amount)
    }
}

impl Inventory for StaticInventory {
    fn balance(&self, network: NetworkId, holder: &Address, token: &Address) -> Option<U256> {
        self.balances.get(&(network, *holder, *token)).map(|amount| *amount)
    }
}

/// Keeps a [`StaticInventory`] current by re-reading balances named in `Transfer` logs.
pub struct InventoryRefresher {
    inventory: Arc<StaticInventory>,
    registry: Arc<PathRegistry>,
    providers: ChainProviders,
    holders: HashMap<NetworkId, Address>,
}

impl InventoryRefresher {
    pub fn new(
        inventory: Arc<StaticInventory>,
        registry: Arc<PathRegistry>,
        providers: ChainProviders,
        holders: HashMap<NetworkId, Address>,
    ) -> Self {
        Self { inventory, registry, providers, holders }
    }

    pub fn inventory(&self) -> &Arc<StaticInventory> {
        &self.inventory
    }

    /// `Transfer` logs of the registry tokens on `network`, when it has a holder.
    pub fn trigger_filter(&self, network: NetworkId) -> Option<TriggerFilter> {
        self.holders.get(&network)?;
        let tokens = self.registry.tokens().filter(|token| token.network == network).map(|token| token.id);
        Some(TriggerFilter::new(vec![TRANSFER_TOPIC], tokens))
    }

    /// Refresh every holder balance a `Transfer` in `batch` moved. Returns the number refreshed.
    pub async fn on_log_batch(&self, batch: LogBatch) -> usize {
        let Some(holder) = self.holders.get(&batch.network).copied() else {
            return 0;
        };
        let holder_topic = holder.into_word();
        let mut tokens = HashSet::new();
        for log in batch.logs.iter() {
            if log.topic0() != Some(&TRANSFER_TOPIC) {
                continue;
            }
            if log.topics.get(1) == Some(&holder_topic) || log.topics.get(2) == Some(&holder_topic) {
                tokens.insert(log.address);
            }
        }

        let mut refreshed = 0;
        for token_id in tokens {
            let token = match self.registry.token_by_id(batch.network, &token_id) {
                Ok(token) => token,
                Err(e) => {
                    debug!(token = %token_id, "Transfer of an unknown token: {}", e);
                    continue;
                }
            };
            match self.inventory.refresh(&self.providers, token, holder, BlockTag::Number(batch.block_number)).await {
                Ok(amount) => {
                    debug!(network = batch.network, token = %token.symbol, balance = %amount, "Balance refreshed");
                    refreshed += 1;
                }
                Err(e) => warn!(network = batch.network, token = %token.symbol, "Balance refresh failed: {}", e),
            }
        }
        refreshed
    }

    /// Consume `Transfer` batches until every sender is gone.
    pub async fn run(&self, mut batches: UnboundedReceiver<LogBatch>) {
        while let Some(batch) = batches.recv().await {
            self.on_log_batch(batch).await;
        }
        info!("Transfer batch channel closed, inventory refresh stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sync::mock_provider::{MockChainProvider, transfer_log};
    use crate::logic::tests::{fixture, ids};
    use alloy_primitives::Bytes;
    use std::sync::Arc;

    #[test]
    fn test_static_balances() {
        let inventory = StaticInventory::new();
        let holder = Address::repeat_byte(0x99);
        inventory.set_balance(1, holder, ids::USDC_A, U256::from(5));
        assert_eq!(inventory.balance(1, &holder, &ids::USDC_A), Some(U256::from(5)));
        assert_eq!(inventory.balance(2, &holder, &ids::USDC_A), None);
    }

    #[tokio::test]
    async fn test_fetch_normalizes_and_zeroes_failures() {
        let registry = fixture::registry();
        let holder = Address::repeat_byte(0x99);
        let provider_a = Arc::new(MockChainProvider::new());
        let usdc: Bytes = U256::from(7_000_000u64).to_be_bytes::<32>().to_vec().into();
        provider_a.set_call_response(ids::USDC_A, BlockTag::Latest, usdc);
        provider_a.fail_calls_to(ids::WETH_A);
        let providers = ChainProviders::new()
            .with_provider(fixture::NETWORK_A, provider_a)
            .with_provider(fixture::NETWORK_B, Arc::new(MockChainProvider::new()));
        let holders: HashMap<NetworkId, Address> = [(fixture::NETWORK_A, holder)].into_iter().collect();

        let inventory = StaticInventory::fetch(&registry, &providers, &holders).await.unwrap();
        assert_eq!(inventory.balance(fixture::NETWORK_A, &holder, &ids::USDC_A), Some(U256::from(7u64) * fixture::ONE));
        assert_eq!(inventory.balance(fixture::NETWORK_A, &holder, &ids::WETH_A), Some(U256::ZERO));
        // no holder configured on network B
        assert_eq!(inventory.balance(fixture::NETWORK_B, &holder, &ids::USDC_B), None);
    }

    fn raw_balance(amount: u64) -> Bytes {
        U256::from(amount).to_be_bytes::<32>().to_vec().into()
    }

    #[tokio::test]
    async fn test_transfer_refreshes_holder_balance() {
        let registry = Arc::new(fixture::registry());
        let holder = Address::repeat_byte(0x99);
        let provider_a = Arc::new(MockChainProvider::new());
        provider_a.set_call_response(ids::USDC_A, BlockTag::Latest, raw_balance(7_000_000));
        let providers = ChainProviders::new().with_provider(fixture::NETWORK_A, provider_a.clone());
        let holders: HashMap<NetworkId, Address> = [(fixture::NETWORK_A, holder)].into_iter().collect();
        let inventory = Arc::new(StaticInventory::new());
        inventory.set_balance(fixture::NETWORK_A, holder, ids::USDC_A, U256::from(1_000u64) * fixture::ONE);
        let refresher = InventoryRefresher::new(inventory.clone(), registry, providers, holders);

        let filter = refresher.trigger_filter(fixture::NETWORK_A).unwrap();
        assert_eq!(filter.topics, vec![TRANSFER_TOPIC]);
        assert!(filter.addresses.contains(&ids::USDC_A));
        assert!(!filter.addresses.contains(&ids::USDC_B));
        assert!(refresher.trigger_filter(fixture::NETWORK_B).is_none());

        // someone else's transfer leaves the balance alone
        let other = Address::repeat_byte(0x11);
        let batch = LogBatch {
            network: fixture::NETWORK_A,
            block_number: 30,
            logs: vec![transfer_log(ids::USDC_A, 30, other, Address::repeat_byte(0x12), U256::from(5))],
        };
        assert_eq!(refresher.on_log_batch(batch).await, 0);
        assert_eq!(provider_a.calls(), 0);

        // the holder spends, the balance is re-read at the transfer's block
        provider_a.set_call_response(ids::USDC_A, BlockTag::Number(31), raw_balance(50_000_000));
        let batch = LogBatch {
            network: fixture::NETWORK_A,
            block_number: 31,
            logs: vec![transfer_log(ids::USDC_A, 31, holder, other, U256::from(950_000_000u64))],
        };
        assert_eq!(refresher.on_log_batch(batch).await, 1);
        assert_eq!(inventory.balance(fixture::NETWORK_A, &holder, &ids::USDC_A), Some(U256::from(50u64) * fixture::ONE));

        // and as recipient
        let batch = LogBatch {
            network: fixture::NETWORK_A,
            block_number: 32,
            logs: vec![transfer_log(ids::USDC_A, 32, other, holder, U256::from(1))],
        };
        assert_eq!(refresher.on_log_batch(batch).await, 1);
        assert_eq!(inventory.balance(fixture::NETWORK_A, &holder, &ids::USDC_A), Some(U256::from(7u64) * fixture::ONE));
    }
}
