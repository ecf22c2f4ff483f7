use super::config::ListenerConfig;
use super::provider::{ChainProvider, ChainProviders, LogEntry, LogFilter, ProviderError};
use super::retry::{RetryPolicy, retry_with_backoff};
use crate::logic::path::NetworkId;
use ahash::{HashMap, HashSet};
use alloy_primitives::{Address, B256};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Logs of one block on one network that matched a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    pub network: NetworkId,
    pub block_number: u64,
    pub logs: Vec<LogEntry>,
}

/// Topics are matched by the node; `addresses` is re-checked locally.
#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    pub topics: Vec<B256>,
    pub addresses: HashSet<Address>,
}

impl TriggerFilter {
    pub fn new(topics: Vec<B256>, addresses: impl IntoIterator<Item = Address>) -> Self {
        Self { topics, addresses: addresses.into_iter().collect() }
    }

    pub fn matches(&self, log: &LogEntry) -> bool {
        self.addresses.contains(&log.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ListenerState {
    Idle,
    Polling,
    Dispatching,
}

struct Trigger {
    filter: TriggerFilter,
    sink: UnboundedSender<LogBatch>,
}

/// Block polling loop of a single network.
pub struct NetworkListener {
    network: NetworkId,
    provider: Arc<dyn ChainProvider>,
    retry: RetryPolicy,
    poll_interval: Duration,
    triggers: Vec<Trigger>,
    // highest height already processed
    cursor: Option<u64>,
    state: ListenerState,
}

impl NetworkListener {
    pub fn new(network: NetworkId, provider: Arc<dyn ChainProvider>, config: &ListenerConfig) -> Self {
        Self {
            network,
            provider,
            retry: config.retry,
            poll_interval: config.poll_interval(),
            triggers: Vec::new(),
            cursor: None,
            state: ListenerState::Idle,
        }
    }

    pub fn add_trigger(&mut self, filter: TriggerFilter, sink: UnboundedSender<LogBatch>) {
        self.triggers.push(Trigger { filter, sink });
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Treat every block up to `height` as processed; the first poll then fetches from `height + 1`.
    pub fn resume_after(&mut self, height: u64) {
        self.cursor = Some(height);
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Check the provider's height once and process it.
    pub async fn poll_once(&mut self) -> usize {
        match self.provider.block_number().await {
            Ok(height) => self.process_height(height).await,
            Err(e) => {
                warn!(network = self.network, "Failed to read block height: {}", e);
                0
            }
        }
    }

    /// Fetch and dispatch the logs of every block after the cursor up to `height`.
    ///
    /// Heights at or below the cursor are ignored. The first height seen is processed on its own.
    /// When a trigger's log fetch exhausts its retries that trigger's range is skipped; the cursor
    /// still advances. Returns the number of batches dispatched.
    pub async fn process_height(&mut self, height: u64) -> usize {
        if self.cursor.is_some_and(|cursor| height <= cursor) {
            return 0;
        }
        let from_block = self.cursor.map_or(height, |cursor| cursor + 1);
        debug!(network = self.network, from_block, to_block = height, "New block range");

        self.state = ListenerState::Polling;
        let fetches = self.triggers.iter().map(|trigger| {
            let filter = LogFilter { topics: trigger.filter.topics.clone(), from_block, to_block: height };
            let provider = &self.provider;
            let retry = &self.retry;
            let network = self.network;
            async move {
                let label = format!("get_logs network={network} blocks={from_block}..={height}");
                retry_with_backoff(retry, &label, || provider.get_logs(&filter)).await
            }
        });
        let results = join_all(fetches).await;
        self.cursor = Some(height);

        self.state = ListenerState::Dispatching;
        let mut dispatched = 0;
        for (trigger, result) in self.triggers.iter().zip(results) {
            let logs = match result {
                Ok(logs) => logs,
                Err(e) => {
                    error!(network = self.network, from_block, to_block = height, "Skipping block range: {}", e);
                    continue;
                }
            };
            let mut by_block: BTreeMap<u64, Vec<LogEntry>> = BTreeMap::new();
            for log in logs.into_iter().filter(|log| trigger.filter.matches(log)) {
                by_block.entry(log.block_number).or_default().push(log);
            }
            for (block_number, logs) in by_block {
                let batch = LogBatch { network: self.network, block_number, logs };
                if trigger.sink.send(batch).is_err() {
                    warn!(network = self.network, block_number, "Trigger receiver dropped, batch discarded");
                    continue;
                }
                dispatched += 1;
            }
        }
        self.state = ListenerState::Idle;
        dispatched
    }

    async fn run(mut self) {
        info!(network = self.network, triggers = self.triggers.len(), interval = ?self.poll_interval, "Listening for blocks");
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }
}

/// One [`NetworkListener`] per configured network, each run as its own task.
pub struct Listener {
    networks: BTreeMap<NetworkId, NetworkListener>,
}

impl Listener {
    pub fn new(config: &ListenerConfig, providers: &ChainProviders) -> Result<Self, ProviderError> {
        let mut networks = BTreeMap::new();
        for network in providers.networks() {
            networks.insert(network, NetworkListener::new(network, providers.get(network)?, config));
        }
        Ok(Self { networks })
    }

    pub fn add_trigger(
        &mut self,
        network: NetworkId,
        filter: TriggerFilter,
        sink: UnboundedSender<LogBatch>,
    ) -> Result<(), ProviderError> {
        let listener = self.networks.get_mut(&network).ok_or(ProviderError::UnknownNetwork(network))?;
        listener.add_trigger(filter, sink);
        Ok(())
    }

    pub fn network_mut(&mut self, network: NetworkId) -> Option<&mut NetworkListener> {
        self.networks.get_mut(&network)
    }

    /// Start each listed network right after the height its reserves were loaded at.
    pub fn resume_after(&mut self, heights: &HashMap<NetworkId, u64>) {
        for (network, height) in heights.iter() {
            if let Some(listener) = self.network_mut(*network) {
                listener.resume_after(*height);
            }
        }
    }

    /// Spawn the poll loop of every network. The loops never return.
    pub fn run(self) -> Vec<JoinHandle<()>> {
        self.networks.into_values().map(|listener| tokio::spawn(listener.run())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sync::mock_provider::{MockChainProvider, sync_log};
    use crate::utils::constants::SYNC_TOPIC;
    use alloy_primitives::U256;
    use tokio::sync::mpsc::unbounded_channel;

    fn listener_for(provider: Arc<MockChainProvider>) -> NetworkListener {
        let config = ListenerConfig { poll_interval_ms: 10, retry: RetryPolicy::fixed(2, Duration::from_millis(1)) };
        NetworkListener::new(7, provider, &config)
    }

    #[tokio::test]
    async fn test_cursor_ignores_stale_heights() {
        let provider = Arc::new(MockChainProvider::new());
        let pool = Address::repeat_byte(0x10);
        provider.push_log(sync_log(pool, 100, U256::from(1), U256::from(1)));
        let mut listener = listener_for(provider.clone());
        let (tx, mut rx) = unbounded_channel();
        listener.add_trigger(TriggerFilter::new(vec![SYNC_TOPIC], [pool]), tx);

        assert_eq!(listener.process_height(100).await, 1);
        assert_eq!(listener.process_height(100).await, 0);
        assert_eq!(listener.process_height(99).await, 0);
        assert_eq!(provider.get_logs_calls(), 1);
        assert_eq!(listener.cursor(), Some(100));
        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(rx.recv().await.unwrap().block_number, 100);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_catches_up_over_range_one_batch_per_block() {
        let provider = Arc::new(MockChainProvider::new());
        let pool = Address::repeat_byte(0x10);
        let mut listener = listener_for(provider.clone());
        let (tx, mut rx) = unbounded_channel();
        listener.add_trigger(TriggerFilter::new(vec![SYNC_TOPIC], [pool]), tx);
        listener.process_height(10).await;

        provider.push_log(sync_log(pool, 11, U256::from(1), U256::from(1)));
        provider.push_log(sync_log(pool, 13, U256::from(2), U256::from(2)));
        provider.push_log(sync_log(pool, 13, U256::from(3), U256::from(3)));
        assert_eq!(listener.process_height(13).await, 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.block_number, first.logs.len()), (11, 1));
        assert_eq!((second.block_number, second.logs.len()), (13, 2));
        // block order preserved inside the batch
        assert_eq!(U256::from_be_slice(&second.logs[1].data[..32]), U256::from(3));
    }

    #[tokio::test]
    async fn test_poll_once_reads_provider_height() {
        let provider = Arc::new(MockChainProvider::new());
        provider.set_block_number(42);
        let mut listener = listener_for(provider);
        listener.poll_once().await;
        assert_eq!(listener.cursor(), Some(42));
    }

    #[tokio::test]
    async fn test_resumed_listener_fetches_from_next_block() {
        let provider = Arc::new(MockChainProvider::new());
        let pool = Address::repeat_byte(0x10);
        provider.push_log(sync_log(pool, 100, U256::from(1), U256::from(1)));
        provider.push_log(sync_log(pool, 101, U256::from(2), U256::from(2)));
        let providers = ChainProviders::new().with_provider(7, provider.clone());
        let mut listener = Listener::new(&ListenerConfig::default(), &providers).unwrap();
        let (tx, mut rx) = unbounded_channel();
        listener.add_trigger(7, TriggerFilter::new(vec![SYNC_TOPIC], [pool]), tx).unwrap();
        // 8 is not listened to
        listener.resume_after(&[(7, 100), (8, 5)].into_iter().collect());

        let network = listener.network_mut(7).unwrap();
        assert_eq!(network.cursor(), Some(100));
        assert_eq!(network.process_height(103).await, 1);
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.block_number, 101);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_network_trigger() {
        let providers = ChainProviders::new().with_provider(7, Arc::new(MockChainProvider::new()));
        let mut listener = Listener::new(&ListenerConfig::default(), &providers).unwrap();
        let (tx, _rx) = unbounded_channel();
        assert!(listener.add_trigger(7, TriggerFilter::default(), tx.clone()).is_ok());
        assert!(matches!(listener.add_trigger(8, TriggerFilter::default(), tx), Err(ProviderError::UnknownNetwork(8))));
        assert_eq!(ListenerState::Dispatching.to_string(), "Dispatching");
    }
}
