use super::path::{NetworkId, Path, Pool, Step, Token};
use ahash::{HashMap, HashSet, HashSetExt};
use alloy_primitives::Address;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("unknown token {token} on network {network}")]
    UnknownToken { network: NetworkId, token: Address },
    #[error("path {path} references unknown pool {pool}")]
    UnknownPool { path: String, pool: Address },
    #[error("path {path}: pool {pool} does not trade {token_in} -> {token_out}")]
    PoolTokenMismatch { path: String, pool: Address, token_in: Address, token_out: Address },
    #[error("path {path}: pool {pool} is on network {pool_network}, step is on {step_network}")]
    NetworkMismatch { path: String, pool: Address, pool_network: NetworkId, step_network: NetworkId },
    #[error("path {path}: step {index} is malformed")]
    MalformedStep { path: String, index: usize },
    #[error("duplicate {kind} {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only index over the static token, pool and path collections.
///
/// Every reference is checked on construction, so a registry that exists is internally consistent.
#[derive(Clone, Debug, Default)]
pub struct PathRegistry {
    tokens: HashMap<(NetworkId, Address), Token>,
    pools: HashMap<Address, Pool>,
    paths: Vec<Arc<Path>>,
    // lowercase path id -> position in `paths`
    path_ids: HashMap<String, usize>,
    // pool -> positions of the paths that route through it, ascending
    pool_paths: HashMap<Address, Vec<usize>>,
}

impl PathRegistry {
    pub fn new(tokens: Vec<Token>, pools: Vec<Pool>, paths: Vec<Path>) -> Result<Self, RegistryError> {
        let mut registry = PathRegistry::default();

        for token in tokens {
            let key = (token.network, token.id);
            if registry.tokens.insert(key, token).is_some() {
                return Err(RegistryError::Duplicate { kind: "token", id: key.1.to_string() });
            }
        }

        for pool in pools {
            for token in [pool.tkn0, pool.tkn1] {
                if !registry.tokens.contains_key(&(pool.network, token)) {
                    return Err(RegistryError::UnknownToken { network: pool.network, token });
                }
            }
            let id = pool.id;
            if registry.pools.insert(id, pool).is_some() {
                return Err(RegistryError::Duplicate { kind: "pool", id: id.to_string() });
            }
        }

        for path in paths {
            registry.validate_steps(&path.id, &path.steps)?;
            let key = path.id.to_lowercase();
            if registry.path_ids.contains_key(&key) {
                return Err(RegistryError::Duplicate { kind: "path", id: path.id });
            }
            let position = registry.paths.len();
            for pool in pools_referenced_by([&path]) {
                registry.pool_paths.entry(pool).or_default().push(position);
            }
            registry.path_ids.insert(key, position);
            registry.paths.push(Arc::new(path));
        }

        info!(tokens = registry.tokens.len(), pools = registry.pools.len(), paths = registry.paths.len(), "Path registry built");
        Ok(registry)
    }

    /// Build a registry from the three JSON collections produced by the offline path generator.
    pub async fn load_from_files(tokens_file: &str, pools_file: &str, paths_file: &str) -> Result<Self, RegistryError> {
        let tokens: Vec<Token> = read_json(tokens_file).await?;
        let pools: Vec<Pool> = read_json(pools_file).await?;
        let paths: Vec<Path> = read_json(paths_file).await?;
        Self::new(tokens, pools, paths)
    }

    fn validate_steps(&self, path: &str, steps: &[Step]) -> Result<(), RegistryError> {
        if steps.is_empty() {
            return Err(RegistryError::MalformedStep { path: path.to_string(), index: 0 });
        }
        for (index, step) in steps.iter().enumerate() {
            if step.pools.is_empty() || step.tkns.len() != step.pools.len() + 1 {
                return Err(RegistryError::MalformedStep { path: path.to_string(), index });
            }
            for token in step.tkns.iter() {
                if !self.tokens.contains_key(&(step.network, *token)) {
                    return Err(RegistryError::UnknownToken { network: step.network, token: *token });
                }
            }
            for hop in step.hops() {
                let pool =
                    self.pools.get(&hop.pool).ok_or_else(|| RegistryError::UnknownPool { path: path.to_string(), pool: hop.pool })?;
                if pool.network != step.network {
                    return Err(RegistryError::NetworkMismatch {
                        path: path.to_string(),
                        pool: pool.id,
                        pool_network: pool.network,
                        step_network: step.network,
                    });
                }
                if hop.token_in == hop.token_out || !pool.contains_token(&hop.token_in) || !pool.contains_token(&hop.token_out) {
                    return Err(RegistryError::PoolTokenMismatch {
                        path: path.to_string(),
                        pool: pool.id,
                        token_in: hop.token_in,
                        token_out: hop.token_out,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn token_by_id(&self, network: NetworkId, id: &Address) -> Result<&Token, RegistryError> {
        self.tokens.get(&(network, *id)).ok_or_else(|| RegistryError::NotFound { kind: "token", id: id.to_string() })
    }

    pub fn pool_by_id(&self, id: &Address) -> Result<&Pool, RegistryError> {
        self.pools.get(id).ok_or_else(|| RegistryError::NotFound { kind: "pool", id: id.to_string() })
    }

    /// Case-insensitive lookup by path id.
    pub fn path_by_id(&self, id: &str) -> Result<Arc<Path>, RegistryError> {
        self.path_ids
            .get(&id.to_lowercase())
            .map(|position| self.paths[*position].clone())
            .ok_or_else(|| RegistryError::NotFound { kind: "path", id: id.to_string() })
    }

    pub fn paths(&self) -> &[Arc<Path>] {
        &self.paths
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Registry paths routed through any of `pools`, in registry order.
    ///
    /// Selects the same paths as [`paths_touching_pools`] over [`PathRegistry::paths`], through the
    /// pool index instead of a scan.
    pub fn paths_for_pools(&self, pools: &HashSet<Address>) -> Vec<Arc<Path>> {
        let mut positions: Vec<usize> = pools.iter().filter_map(|pool| self.pool_paths.get(pool)).flatten().copied().collect();
        positions.sort_unstable();
        positions.dedup();
        positions.into_iter().map(|position| self.paths[position].clone()).collect()
    }

    /// `"<SYM0>|<SYM1>::<DEX>::<NETWORK>"`
    pub fn pool_description(&self, pool: &Pool) -> Result<String, RegistryError> {
        let tkn0 = self.token_by_id(pool.network, &pool.tkn0)?;
        let tkn1 = self.token_by_id(pool.network, &pool.tkn1)?;
        Ok(format!("{}|{}::{}::{}", tkn0.symbol, tkn1.symbol, pool.dex, pool.network))
    }

    /// Assemble a [`Path`] from steps, deriving its description and id from the registry data.
    pub fn build_path(&self, steps: Vec<Step>) -> Result<Path, RegistryError> {
        self.validate_steps("<new>", &steps)?;
        let mut parts = Vec::new();
        for pool in steps.iter().flat_map(|step| step.pools.iter()) {
            parts.push(self.pool_description(self.pool_by_id(pool)?)?);
        }
        let desc = parts.join(" => ");
        Ok(Path::new(Path::derive_id(&desc), desc, steps))
    }
}

async fn read_json<T: DeserializeOwned>(file_name: &str) -> Result<T, RegistryError> {
    let contents = tokio::fs::read_to_string(file_name).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Every pool touched by `paths`, deduplicated, in order of first appearance.
pub fn pools_referenced_by<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<Address> {
    let mut seen = HashSet::new();
    let mut ret = Vec::new();
    for path in paths {
        for pool in path.pools() {
            if seen.insert(*pool) {
                ret.push(*pool);
            }
        }
    }
    ret
}

/// Paths with at least one hop through a pool in `pools`.
pub fn paths_touching_pools(paths: &[Arc<Path>], pools: &HashSet<Address>) -> Vec<Arc<Path>> {
    paths.iter().filter(|path| pools.iter().any(|pool| path.contains_pool(pool))).cloned().collect()
}

/// Paths that visit at least one token in `tokens`.
pub fn paths_touching_tokens(paths: &[Arc<Path>], tokens: &HashSet<Address>) -> Vec<Arc<Path>> {
    paths.iter().filter(|path| path.tokens().any(|token| tokens.contains(token))).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::tests::{fixture, ids};

    #[test]
    fn test_lookups() {
        let registry = fixture::registry();
        let pool = registry.pool_by_id(&ids::POOL_A1).unwrap();
        assert_eq!(pool.dex, "UNISWAP");
        assert_eq!(registry.token_by_id(fixture::NETWORK_A, &ids::USDC_A).unwrap().decimals, 6);

        let path = &registry.paths()[0];
        let upper = path.id.to_uppercase().replacen("0X", "0x", 1);
        assert_eq!(registry.path_by_id(&upper).unwrap().id, path.id);
    }

    #[test]
    fn test_not_found() {
        let registry = fixture::registry();
        assert!(matches!(registry.pool_by_id(&Address::repeat_byte(0xee)), Err(RegistryError::NotFound { kind: "pool", .. })));
        // token exists, but not on this network
        assert!(matches!(registry.token_by_id(fixture::NETWORK_B, &ids::USDC_A), Err(RegistryError::NotFound { kind: "token", .. })));
        assert!(matches!(registry.path_by_id("0xdead"), Err(RegistryError::NotFound { kind: "path", .. })));
    }

    #[test]
    fn test_pools_referenced_by_is_order_stable() {
        let registry = fixture::registry();
        let pools = pools_referenced_by(registry.paths().iter().map(|p| p.as_ref()));
        assert_eq!(pools, vec![ids::POOL_A1, ids::POOL_A2, ids::POOL_B1, ids::POOL_B2, ids::POOL_A3, ids::POOL_B3]);
    }

    #[test]
    fn test_paths_touching_pools() {
        let registry = fixture::registry();
        let paths = registry.paths();
        for pool in pools_referenced_by(paths.iter().map(|p| p.as_ref())) {
            let selection: HashSet<Address> = [pool].into_iter().collect();
            let touching = paths_touching_pools(paths, &selection);
            let expected: Vec<_> = paths.iter().filter(|p| p.pools().any(|x| *x == pool)).cloned().collect();
            assert_eq!(touching, expected);
            assert_eq!(registry.paths_for_pools(&selection), expected);
        }

        let none: HashSet<Address> = [Address::repeat_byte(0xee)].into_iter().collect();
        assert!(paths_touching_pools(paths, &none).is_empty());
        assert!(registry.paths_for_pools(&none).is_empty());
    }

    #[test]
    fn test_paths_touching_tokens() {
        let registry = fixture::registry();
        let tokens: HashSet<Address> = [ids::DAI_A].into_iter().collect();
        let touching = paths_touching_tokens(registry.paths(), &tokens);
        assert_eq!(touching.len(), 1);
        assert_eq!(touching[0].id, fixture::CROSS_PATH_ID);
    }

    #[test]
    fn test_rejects_unknown_pool() {
        let mut paths = fixture::paths();
        paths[0].steps[0].pools[0] = Address::repeat_byte(0xee);
        let err = PathRegistry::new(fixture::tokens(), fixture::pools(), paths).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownPool { .. }));
    }

    #[test]
    fn test_rejects_malformed_step() {
        let mut paths = fixture::paths();
        paths[1].steps[0].tkns.pop();
        let err = PathRegistry::new(fixture::tokens(), fixture::pools(), paths).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedStep { index: 0, .. }));
    }

    #[test]
    fn test_rejects_hop_through_wrong_pool() {
        let registry = fixture::registry();
        // POOL_A2 trades WETH/DAI, not USDC/WETH
        let step = Step::new(fixture::NETWORK_A, vec![ids::POOL_A2], vec![ids::USDC_A, ids::WETH_A]);
        assert!(matches!(registry.build_path(vec![step]), Err(RegistryError::PoolTokenMismatch { .. })));
    }

    #[test]
    fn test_rejects_network_mismatch() {
        let registry = fixture::registry();
        let step = Step::new(fixture::NETWORK_B, vec![ids::POOL_A1], vec![ids::WETH_B, ids::USDC_B]);
        let err = registry.build_path(vec![step]).unwrap_err();
        assert!(matches!(err, RegistryError::NetworkMismatch { pool_network: fixture::NETWORK_A, step_network: fixture::NETWORK_B, .. }));
    }

    #[test]
    fn test_rejects_unknown_step_token() {
        let registry = fixture::registry();
        let step = Step::new(fixture::NETWORK_B, vec![ids::POOL_B2], vec![ids::USDC_A, ids::WETH_B]);
        assert!(matches!(registry.build_path(vec![step]), Err(RegistryError::UnknownToken { network: fixture::NETWORK_B, .. })));
    }

    #[test]
    fn test_rejects_pool_with_unknown_token() {
        let mut pools = fixture::pools();
        pools[0].tkn0 = Address::repeat_byte(0xee);
        let err = PathRegistry::new(fixture::tokens(), pools, vec![]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownToken { .. }));
    }

    #[test]
    fn test_build_path() {
        let registry = fixture::registry();
        let step = Step::new(fixture::NETWORK_A, vec![ids::POOL_A1, ids::POOL_A3], vec![ids::USDC_A, ids::WETH_A, ids::USDC_A]);
        let path = registry.build_path(vec![step]).unwrap();
        assert_eq!(path.desc, "WETH|USDC::UNISWAP::43114 => USDC|WETH::SUSHI::43114");
        assert_eq!(path.id, Path::derive_id(&path.desc));
        assert!(path.contains_pool(&ids::POOL_A3));
    }
}
