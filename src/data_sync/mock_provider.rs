use super::provider::{BlockTag, ChainProvider, LogEntry, LogFilter, ProviderError};
use crate::utils::constants::{SYNC_TOPIC, TRANSFER_TOPIC};
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Two big-endian 32-byte words, the shape of both `getReserves()` output (minus its trailing
/// timestamp word) and `Sync` log data.
pub fn encode_reserves(reserve0: U256, reserve1: U256) -> Bytes {
    let mut raw = Vec::with_capacity(64);
    raw.extend_from_slice(&reserve0.to_be_bytes::<32>());
    raw.extend_from_slice(&reserve1.to_be_bytes::<32>());
    raw.into()
}

/// A `Sync` log for `pool` carrying the given raw reserves.
pub fn sync_log(pool: Address, block_number: u64, reserve0: U256, reserve1: U256) -> LogEntry {
    LogEntry {
        address: pool,
        topics: vec![SYNC_TOPIC],
        data: encode_reserves(reserve0, reserve1),
        block_number,
        transaction_hash: Some(B256::with_last_byte((block_number & 0xff) as u8)),
    }
}

/// An ERC20 `Transfer` log of `token` moving `value` raw units from `from` to `to`.
pub fn transfer_log(token: Address, block_number: u64, from: Address, to: Address, value: U256) -> LogEntry {
    LogEntry {
        address: token,
        topics: vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
        data: value.to_be_bytes::<32>().to_vec().into(),
        block_number,
        transaction_hash: Some(B256::with_last_byte((block_number & 0xff) as u8)),
    }
}

/// In-memory [`ChainProvider`] with scripted state, logs and failures.
#[derive(Debug, Default)]
pub struct MockChainProvider {
    call_responses: DashMap<(Address, BlockTag), Bytes>,
    failing_targets: DashSet<Address>,
    logs: DashMap<u64, Vec<LogEntry>>,
    block_number: AtomicU64,
    get_logs_failures: AtomicUsize,
    get_logs_calls: AtomicUsize,
    calls: AtomicUsize,
}

impl MockChainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `call(target, ..)` with `response`. A `BlockTag::Number` query without its own
    /// response falls back to the `Latest` one.
    pub fn set_call_response(&self, target: Address, block: BlockTag, response: Bytes) {
        self.call_responses.insert((target, block), response);
    }

    pub fn set_reserves(&self, pool: Address, reserve0: U256, reserve1: U256) {
        self.set_reserves_at(pool, BlockTag::Latest, reserve0, reserve1);
    }

    pub fn set_reserves_at(&self, pool: Address, block: BlockTag, reserve0: U256, reserve1: U256) {
        // getReserves() returns a third word, blockTimestampLast
        let mut raw = encode_reserves(reserve0, reserve1).to_vec();
        raw.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
        self.set_call_response(pool, block, raw.into());
    }

    pub fn fail_calls_to(&self, target: Address) {
        self.failing_targets.insert(target);
    }

    pub fn push_log(&self, log: LogEntry) {
        self.logs.entry(log.block_number).or_default().push(log);
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.block_number.store(block_number, Ordering::SeqCst);
    }

    /// Fail the next `count` `get_logs` requests.
    pub fn fail_next_get_logs(&self, count: usize) {
        self.get_logs_failures.store(count, Ordering::SeqCst);
    }

    pub fn get_logs_calls(&self) -> usize {
        self.get_logs_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    async fn call(&self, target: Address, _payload: Bytes, block: BlockTag) -> Result<Bytes, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_targets.contains(&target) {
            return Err(ProviderError::Transport(format!("call to {target} reverted")));
        }
        self.call_responses
            .get(&(target, block))
            .or_else(|| self.call_responses.get(&(target, BlockTag::Latest)))
            .map(|response| response.value().clone())
            .ok_or_else(|| ProviderError::Transport(format!("no state for {target} at {block}")))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ProviderError> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        let scripted_failure =
            self.get_logs_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1)).is_ok();
        if scripted_failure {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }

        let mut ret = Vec::new();
        for block in filter.from_block..=filter.to_block {
            if let Some(logs) = self.logs.get(&block) {
                ret.extend(logs.iter().filter(|log| log.topic0().is_some_and(|topic| filter.topics.contains(topic))).cloned());
            }
        }
        Ok(ret)
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        Ok(self.block_number.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pinned_call_falls_back_to_latest() {
        let provider = MockChainProvider::new();
        let pool = Address::repeat_byte(0x10);
        provider.set_reserves(pool, U256::from(1), U256::from(2));
        provider.set_reserves_at(pool, BlockTag::Number(7), U256::from(3), U256::from(4));

        let latest = provider.call(pool, Bytes::new(), BlockTag::Latest).await.unwrap();
        let pinned = provider.call(pool, Bytes::new(), BlockTag::Number(7)).await.unwrap();
        let other = provider.call(pool, Bytes::new(), BlockTag::Number(8)).await.unwrap();
        assert_eq!(latest.len(), 96);
        assert_eq!(U256::from_be_slice(&pinned[..32]), U256::from(3));
        assert_eq!(other, latest);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_get_logs_filters_topic_and_range() {
        let provider = MockChainProvider::new();
        let pool = Address::repeat_byte(0x10);
        provider.push_log(sync_log(pool, 5, U256::from(1), U256::from(1)));
        provider.push_log(sync_log(pool, 6, U256::from(2), U256::from(2)));
        provider.push_log(LogEntry { topics: vec![B256::repeat_byte(0xab)], ..sync_log(pool, 6, U256::ZERO, U256::ZERO) });

        let filter = LogFilter { topics: vec![SYNC_TOPIC], from_block: 6, to_block: 9 };
        let logs = provider.get_logs(&filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 6);

        provider.fail_next_get_logs(1);
        assert!(provider.get_logs(&filter).await.is_err());
        assert!(provider.get_logs(&filter).await.is_ok());
        assert_eq!(provider.get_logs_calls(), 3);
    }
}
