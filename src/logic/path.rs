use alloy_primitives::{Address, hex, keccak256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Chain id of a monitored network.
pub type NetworkId = u64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    pub id: Address,
    #[serde(rename = "chainID", alias = "network")]
    pub network: NetworkId,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(id: Address, network: NetworkId, symbol: impl Into<String>, decimals: u8) -> Self {
        Self { id, network, symbol: symbol.into(), decimals }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

/// A constant-product pair. `tkn0`/`tkn1` fix the orientation of the on-chain reserve pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pool {
    pub id: Address,
    pub tkn0: Address,
    pub tkn1: Address,
    #[serde(rename = "chainID", alias = "network")]
    pub network: NetworkId,
    #[serde(rename = "dexID", alias = "dex")]
    pub dex: String,
}

impl Pool {
    pub fn new(id: Address, tkn0: Address, tkn1: Address, network: NetworkId, dex: impl Into<String>) -> Self {
        Self { id, tkn0, tkn1, network, dex: dex.into() }
    }

    pub fn contains_token(&self, token: &Address) -> bool {
        self.tkn0 == *token || self.tkn1 == *token
    }

    /// True when swapping `token_in` travels tkn0 -> tkn1, i.e. the stored pair is already
    /// `(reserve_in, reserve_out)`.
    pub fn is_forward(&self, token_in: &Address) -> bool {
        self.tkn0 == *token_in
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pool {}

/// One swap: `token_in -> token_out` through `pool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hop {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
}

/// Hops confined to one network. `tkns` has exactly one more entry than `pools`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "chainID", alias = "network")]
    pub network: NetworkId,
    pub pools: Vec<Address>,
    pub tkns: Vec<Address>,
}

impl Step {
    pub fn new(network: NetworkId, pools: Vec<Address>, tkns: Vec<Address>) -> Self {
        Self { network, pools, tkns }
    }

    pub fn hops(&self) -> impl Iterator<Item = Hop> + '_ {
        self.pools
            .iter()
            .zip(self.tkns.windows(2))
            .map(|(pool, pair)| Hop { pool: *pool, token_in: pair[0], token_out: pair[1] })
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[derive(Deserialize)]
struct PathRecord {
    id: String,
    desc: String,
    steps: Vec<Step>,
}

impl From<PathRecord> for Path {
    fn from(record: PathRecord) -> Self {
        Path::new(record.id, record.desc, record.steps)
    }
}

/// A full cycle of steps, possibly spanning networks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "PathRecord")]
pub struct Path {
    pub id: String,
    pub desc: String,
    pub steps: Vec<Step>,
    // internal lookup for faster contains_pool
    #[serde(skip)]
    pools_map: HashSet<Address>,
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.desc, self.id)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
    }
}

impl Eq for Path {}

impl Path {
    pub fn new(id: impl Into<String>, desc: impl Into<String>, steps: Vec<Step>) -> Self {
        let pools_map = steps.iter().flat_map(|step| step.pools.iter().copied()).collect();
        Self { id: id.into(), desc: desc.into(), steps, pools_map }
    }

    /// `0x` followed by the first 41 hex digits of `keccak256(desc)`.
    pub fn derive_id(desc: &str) -> String {
        let digest = hex::encode(keccak256(desc.as_bytes()));
        format!("0x{}", &digest[..41])
    }

    pub fn hops(&self) -> impl Iterator<Item = Hop> + '_ {
        self.steps.iter().flat_map(Step::hops)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Address> + '_ {
        self.steps.iter().flat_map(|step| step.pools.iter())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Address> + '_ {
        self.steps.iter().flat_map(|step| step.tkns.iter())
    }

    pub fn contains_pool(&self, pool: &Address) -> bool {
        self.pools_map.contains(pool)
    }

    pub fn contains_token(&self, token: &Address) -> bool {
        self.tokens().any(|t| t == token)
    }

    /// Token the cycle starts in, on the first step's network.
    pub fn start(&self) -> Option<(NetworkId, Address)> {
        let step = self.steps.first()?;
        Some((step.network, *step.tkns.first()?))
    }

    /// Hop count across all steps.
    pub fn len(&self) -> usize {
        self.steps.iter().map(Step::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
