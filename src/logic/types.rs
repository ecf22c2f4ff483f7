use super::path::{NetworkId, Path};
use super::registry::{PathRegistry, RegistryError};
use crate::data_sync::provider::LogEntry;
use crate::execution::ExecutionOutcome;
use crate::utils::constants::{DEFAULT_MIN_AMOUNT_IN, DEFAULT_MIN_PROFIT};
use crate::utils::units::unnormalize_units;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// New raw reserves of one pool, as carried by a `Sync` log or a `getReserves()` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveChangeEvent {
    pub pool: Address,
    pub payload: Bytes,
}

impl From<LogEntry> for ReserveChangeEvent {
    fn from(log: LogEntry) -> Self {
        Self { pool: log.address, payload: log.data }
    }
}

/// A priced path with positive gross profit.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub path: Arc<Path>,
    pub amount_in: U256,
    /// Input followed by the output of every hop, at 18 decimals
    pub amounts: Vec<U256>,
    pub gross_profit: U256,
    pub discovered_at: Instant,
}

impl Opportunity {
    pub fn new(path: Arc<Path>, amounts: Vec<U256>, gross_profit: U256) -> Self {
        let amount_in = amounts.first().copied().unwrap_or_default();
        Self { path, amount_in, amounts, gross_profit, discovered_at: Instant::now() }
    }

    pub fn amount_out(&self) -> U256 {
        self.amounts.last().copied().unwrap_or_default()
    }

    /// Time since the path was priced.
    pub fn age(&self) -> Duration {
        self.discovered_at.elapsed()
    }
}

/// Per-step instruction handed to the executor.
///
/// `amounts[i]` is the amount of `tokens[i]`; the last amount of a step is the first amount of
/// the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionStep {
    pub network: NetworkId,
    pub amounts: Vec<U256>,
    pub tokens: Vec<Address>,
    pub pools: Vec<Address>,
    pub dexes: Vec<String>,
}

impl ExecutionStep {
    pub fn amount_in(&self) -> U256 {
        self.amounts.first().copied().unwrap_or_default()
    }

    pub fn amount_out(&self) -> U256 {
        self.amounts.last().copied().unwrap_or_default()
    }

    /// Amounts at each token's own decimals, as a transaction would carry them.
    pub fn native_amounts(&self, registry: &PathRegistry) -> Result<Vec<U256>, RegistryError> {
        self.amounts
            .iter()
            .zip(self.tokens.iter())
            .map(|(amount, token)| Ok(unnormalize_units(*amount, registry.token_by_id(self.network, token)?.decimals)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Trial amount of the cheap pre-filter, 18 decimals
    pub min_amount_in: U256,
    /// Profit `min_amount_in` must reach before the optimum is computed, 18 decimals
    pub min_profit: U256,
    /// Price paths on the rayon pool
    pub enable_parallel: bool,
    /// Hand the full ranked list to the executor instead of the best opportunity only
    pub submit_ranked: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { min_amount_in: DEFAULT_MIN_AMOUNT_IN, min_profit: DEFAULT_MIN_PROFIT, enable_parallel: true, submit_ranked: false }
    }
}

/// What one search produced and what the executor made of it.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Ranked by gross profit, best first
    pub opportunities: Vec<Opportunity>,
    /// One entry per submission; empty when nothing was found
    pub executions: Vec<ExecutionOutcome>,
}

impl SearchOutcome {
    pub fn best(&self) -> Option<&Opportunity> {
        self.opportunities.first()
    }

    pub fn was_busy(&self) -> bool {
        self.executions.iter().any(|outcome| *outcome == ExecutionOutcome::Busy)
    }
}
