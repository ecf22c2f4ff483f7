use super::provider::{BlockTag, ChainProviders, ProviderError};
use crate::logic::path::{NetworkId, Path, Pool};
use crate::logic::registry::{PathRegistry, RegistryError, pools_referenced_by};
use crate::utils::constants::get_reserves_calldata;
use crate::utils::units::{normalize_units, unnormalize_units};
use ahash::HashMap;
use alloy_primitives::{Address, Bytes, U256};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const RAW_RESERVES_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ReserveError {
    #[error("malformed reserve payload for pool {pool}: {len} bytes")]
    MalformedPayload { pool: Address, len: usize },
    #[error("no reserve snapshot for pool {0}")]
    MissingSnapshot(Address),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Reserves of one pool at 18 decimals, in the pool's `tkn0`/`tkn1` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReserveSnapshot {
    pub reserve0: U256,
    pub reserve1: U256,
}

impl ReserveSnapshot {
    pub fn new(reserve0: U256, reserve1: U256) -> Self {
        Self { reserve0, reserve1 }
    }

    /// `(reserve_in, reserve_out)` for a swap in the pool's stored direction (`forward`) or against it.
    pub fn oriented(&self, forward: bool) -> (U256, U256) {
        if forward { (self.reserve0, self.reserve1) } else { (self.reserve1, self.reserve0) }
    }

    pub fn is_empty(&self) -> bool {
        self.reserve0.is_zero() || self.reserve1.is_zero()
    }
}

/// Pool id -> current normalized reserves.
///
/// Writes go through [`ReserveStore::apply_raw_patch`] (and the initial [`ReserveStore::bulk_load`]);
/// each write replaces the whole snapshot under the pool's shard lock, so concurrent patches to one
/// pool are serialized and the last one wins.
#[derive(Debug)]
pub struct ReserveStore {
    registry: Arc<PathRegistry>,
    providers: ChainProviders,
    snapshots: DashMap<Address, ReserveSnapshot>,
}

impl ReserveStore {
    pub fn new(registry: Arc<PathRegistry>, providers: ChainProviders) -> Self {
        Self { registry, providers, snapshots: DashMap::new() }
    }

    pub fn registry(&self) -> &Arc<PathRegistry> {
        &self.registry
    }

    /// Fetch reserves of every pool the paths touch, concurrently, optionally pinned to a block
    /// height per network.
    ///
    /// A pool whose fetch or decode fails is stored as `(0, 0)` and returned in the failure list.
    /// Unknown pools and networks without a provider are configuration errors and abort the load.
    pub async fn bulk_load(
        &self,
        paths: &[Arc<Path>],
        as_of: Option<&HashMap<NetworkId, u64>>,
    ) -> Result<Vec<Address>, ReserveError> {
        let pool_ids = pools_referenced_by(paths.iter().map(|path| path.as_ref()));
        info!(pools = pool_ids.len(), pinned = as_of.is_some(), "Bulk loading reserves");

        let mut requests = Vec::with_capacity(pool_ids.len());
        for pool_id in pool_ids.iter() {
            let pool = self.registry.pool_by_id(pool_id)?;
            // resolve up front so a missing provider fails the whole load
            self.providers.get(pool.network)?;
            let block = match as_of.and_then(|heights| heights.get(&pool.network)) {
                Some(height) => BlockTag::Number(*height),
                None => BlockTag::Latest,
            };
            requests.push(self.fetch_raw(pool, block));
        }

        let mut failed = Vec::new();
        for (pool_id, result) in pool_ids.iter().zip(join_all(requests).await) {
            let snapshot = match result.and_then(|raw| self.decode_raw(pool_id, &raw)) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(pool = %pool_id, "Failed to load reserves, defaulting to zero: {}", e);
                    failed.push(*pool_id);
                    ReserveSnapshot::default()
                }
            };
            self.snapshots.insert(*pool_id, snapshot);
        }

        info!(loaded = pool_ids.len() - failed.len(), failed = failed.len(), "Reserves loaded");
        Ok(failed)
    }

    /// Current block height of every network with a provider, to pin a bulk load to.
    pub async fn current_heights(&self) -> Result<HashMap<NetworkId, u64>, ReserveError> {
        let mut heights = HashMap::default();
        for network in self.providers.networks() {
            let height = self.providers.get(network)?.block_number().await?;
            heights.insert(network, height);
        }
        debug!(?heights, "Current heights");
        Ok(heights)
    }

    /// `getReserves()` of `pool`, undecoded.
    pub async fn fetch_raw(&self, pool: &Pool, block: BlockTag) -> Result<Bytes, ReserveError> {
        let provider = self.providers.get(pool.network)?;
        Ok(provider.call(pool.id, get_reserves_calldata(), block).await?)
    }

    /// Decode the two leading big-endian words of `raw` and normalize each by its token's decimals.
    pub fn decode_raw(&self, pool_id: &Address, raw: &[u8]) -> Result<ReserveSnapshot, ReserveError> {
        if raw.len() < RAW_RESERVES_LEN {
            return Err(ReserveError::MalformedPayload { pool: *pool_id, len: raw.len() });
        }
        let pool = self.registry.pool_by_id(pool_id)?;
        let decimals0 = self.registry.token_by_id(pool.network, &pool.tkn0)?.decimals;
        let decimals1 = self.registry.token_by_id(pool.network, &pool.tkn1)?.decimals;

        let reserve0 = U256::from_be_slice(&raw[..32]);
        let reserve1 = U256::from_be_slice(&raw[32..RAW_RESERVES_LEN]);
        Ok(ReserveSnapshot::new(normalize_units(reserve0, decimals0), normalize_units(reserve1, decimals1)))
    }

    /// Replace the snapshot of `pool_id` with the decoded `raw` payload.
    ///
    /// A payload that does not decode is dropped and the previous snapshot kept.
    pub fn apply_raw_patch(&self, pool_id: &Address, raw: &[u8]) -> Result<ReserveSnapshot, ReserveError> {
        match self.decode_raw(pool_id, raw) {
            Ok(snapshot) => {
                self.snapshots.insert(*pool_id, snapshot);
                debug!(pool = %pool_id, reserve0 = %snapshot.reserve0, reserve1 = %snapshot.reserve1, "Reserves patched");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(pool = %pool_id, "Dropping reserve patch: {}", e);
                Err(e)
            }
        }
    }

    pub fn snapshot_for(&self, pool_id: &Address) -> Result<ReserveSnapshot, ReserveError> {
        match self.snapshots.get(pool_id) {
            Some(snapshot) => Ok(*snapshot),
            None => {
                error!(pool = %pool_id, "Reserve snapshot requested before it was loaded");
                Err(ReserveError::MissingSnapshot(*pool_id))
            }
        }
    }

    pub fn snapshots_for(&self, pool_ids: &[Address]) -> Result<Vec<ReserveSnapshot>, ReserveError> {
        pool_ids.iter().map(|pool_id| self.snapshot_for(pool_id)).collect()
    }

    /// A snapshot re-expressed at the native decimals of the pool's tokens.
    pub fn to_native(&self, pool_id: &Address, snapshot: &ReserveSnapshot) -> Result<(U256, U256), ReserveError> {
        let pool = self.registry.pool_by_id(pool_id)?;
        let decimals0 = self.registry.token_by_id(pool.network, &pool.tkn0)?.decimals;
        let decimals1 = self.registry.token_by_id(pool.network, &pool.tkn1)?.decimals;
        Ok((unnormalize_units(snapshot.reserve0, decimals0), unnormalize_units(snapshot.reserve1, decimals1)))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
