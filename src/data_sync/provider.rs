use crate::logic::path::NetworkId;
use ahash::HashMap;
use alloy_primitives::{Address, B256, Bytes};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockId, Filter, Log, TransactionRequest};
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no provider configured for network {0}")]
    UnknownNetwork(NetworkId),
}

/// Block a state query is evaluated at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl Display for BlockTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<BlockTag> for BlockId {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockId::latest(),
            BlockTag::Number(n) => BlockId::number(n),
        }
    }
}

/// Topic0 selection over an inclusive block range. Address filtering is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub topics: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
}

impl LogEntry {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Read-only chain access for one network.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// `eth_call` of `payload` against `target`.
    async fn call(&self, target: Address, payload: Bytes, block: BlockTag) -> Result<Bytes, ProviderError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ProviderError>;

    /// Latest block height.
    async fn block_number(&self) -> Result<u64, ProviderError>;
}

/// Explicit network id -> provider table, resolved once when components are constructed.
#[derive(Clone, Default)]
pub struct ChainProviders {
    providers: HashMap<NetworkId, Arc<dyn ChainProvider>>,
}

impl ChainProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, network: NetworkId, provider: Arc<dyn ChainProvider>) -> Self {
        self.insert(network, provider);
        self
    }

    pub fn insert(&mut self, network: NetworkId, provider: Arc<dyn ChainProvider>) {
        self.providers.insert(network, provider);
    }

    pub fn get(&self, network: NetworkId) -> Result<Arc<dyn ChainProvider>, ProviderError> {
        self.providers.get(&network).cloned().ok_or(ProviderError::UnknownNetwork(network))
    }

    pub fn networks(&self) -> Vec<NetworkId> {
        let mut networks: Vec<NetworkId> = self.providers.keys().copied().collect();
        networks.sort_unstable();
        networks
    }
}

impl std::fmt::Debug for ChainProviders {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainProviders").field("networks", &self.networks()).finish()
    }
}

/// [`ChainProvider`] backed by an alloy RPC provider.
pub struct AlloyChainProvider<P> {
    provider: P,
}

impl<P> AlloyChainProvider<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn transport_error(err: TransportError) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

fn to_log_entry(log: Log) -> LogEntry {
    LogEntry {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number.unwrap_or_default(),
        transaction_hash: log.transaction_hash,
    }
}

#[async_trait]
impl<P> ChainProvider for AlloyChainProvider<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn call(&self, target: Address, payload: Bytes, block: BlockTag) -> Result<Bytes, ProviderError> {
        let tx = TransactionRequest::default().to(target).input(payload.into());
        self.provider.call(tx).block(block.into()).await.map_err(transport_error)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ProviderError> {
        let filter = Filter::new().event_signature(filter.topics.clone()).from_block(filter.from_block).to_block(filter.to_block);
        let logs = self.provider.get_logs(&filter).await.map_err(transport_error)?;
        Ok(logs.into_iter().map(to_log_entry).collect())
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.provider.get_block_number().await.map_err(transport_error)
    }
}
