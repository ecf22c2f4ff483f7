use super::math::{MathError, amount_out_for_path, amounts_along_path, optimal_amount_in};
use super::path::{NetworkId, Path};
use super::registry::{PathRegistry, RegistryError};
use super::types::{ExecutionStep, Opportunity, ReserveChangeEvent, SearchConfig, SearchOutcome};
use crate::data_sync::listener::LogBatch;
use crate::data_sync::reserves::{ReserveError, ReserveStore};
use crate::execution::{ExecutionOutcome, Executor, Inventory};
use ahash::{HashMap, HashSet, HashSetExt};
use alloy_primitives::{Address, U256};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Reserve(#[from] ReserveError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("path {path}: {amounts} amounts do not cover its steps")]
    AmountsMismatch { path: String, amounts: usize },
}

struct InventoryCap {
    inventory: Arc<dyn Inventory>,
    holders: HashMap<NetworkId, Address>,
}

/// Re-prices the paths affected by reserve changes and hands the best result to the executor.
///
/// Pricing reads the reserve store only; every path is priced independently and a failing path is
/// dropped from the candidates without affecting the others.
pub struct OpportunitySearch {
    config: SearchConfig,
    store: Arc<ReserveStore>,
    executor: Arc<dyn Executor>,
    inventory: Option<InventoryCap>,
}

impl OpportunitySearch {
    pub fn new(config: SearchConfig, store: Arc<ReserveStore>, executor: Arc<dyn Executor>) -> Self {
        Self { config, store, executor, inventory: None }
    }

    /// Cap each path's input to the balance `holders[network]` has of the path's start token.
    pub fn with_inventory(mut self, inventory: Arc<dyn Inventory>, holders: HashMap<NetworkId, Address>) -> Self {
        self.inventory = Some(InventoryCap { inventory, holders });
        self
    }

    pub fn registry(&self) -> &PathRegistry {
        self.store.registry()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Patch every event into the store, then search the paths running through the patched pools.
    pub async fn on_reserve_change_event(&self, events: &[ReserveChangeEvent]) -> SearchOutcome {
        let mut touched = HashSet::new();
        for event in events {
            if self.store.apply_raw_patch(&event.pool, &event.payload).is_ok() {
                touched.insert(event.pool);
            }
        }
        if touched.is_empty() {
            return SearchOutcome::default();
        }

        let paths = self.registry().paths_for_pools(&touched);
        debug!(pools = touched.len(), paths = paths.len(), "Reserves changed");
        self.search(&paths).await
    }

    pub async fn on_log_batch(&self, batch: LogBatch) -> SearchOutcome {
        debug!(network = batch.network, block_number = batch.block_number, logs = batch.logs.len(), "Reserve logs received");
        let events: Vec<ReserveChangeEvent> = batch.logs.into_iter().map(ReserveChangeEvent::from).collect();
        self.on_reserve_change_event(&events).await
    }

    /// Consume log batches until every sender is gone.
    pub async fn run(&self, mut batches: UnboundedReceiver<LogBatch>) {
        while let Some(batch) = batches.recv().await {
            self.on_log_batch(batch).await;
        }
        info!("Log batch channel closed, search stopped");
    }

    /// Price `paths`, rank the survivors and submit the best one (or all of them, ranked).
    pub async fn search(&self, paths: &[Arc<Path>]) -> SearchOutcome {
        let mut outcome = SearchOutcome { opportunities: self.rank(paths), executions: Vec::new() };
        let Some(best) = outcome.opportunities.first() else {
            debug!(paths = paths.len(), "No opportunity");
            return outcome;
        };
        info!(
            path = %best.path.id,
            desc = %best.path.desc,
            amount_in = %best.amount_in,
            gross_profit = %best.gross_profit,
            candidates = outcome.opportunities.len(),
            "Best opportunity"
        );

        let submit_count = if self.config.submit_ranked { outcome.opportunities.len() } else { 1 };
        for opportunity in outcome.opportunities.iter().take(submit_count) {
            let steps = match self.steps_from_opportunity(opportunity) {
                Ok(steps) => steps,
                Err(e) => {
                    warn!(path = %opportunity.path.id, "Failed to build execution steps: {}", e);
                    continue;
                }
            };
            let result = self.executor.submit(opportunity, steps).await;
            outcome.executions.push(result);
            if result == ExecutionOutcome::Busy {
                break;
            }
        }
        outcome
    }

    /// Opportunities among `paths`, best first. Paths that fail to price are left out.
    pub fn rank(&self, paths: &[Arc<Path>]) -> Vec<Opportunity> {
        let priced = |path: &Arc<Path>| match self.check_path(path) {
            Ok(opportunity) => opportunity,
            Err(e) => {
                debug!(path = %path.id, "Path skipped: {}", e);
                None
            }
        };
        let mut opportunities: Vec<Opportunity> = if self.config.enable_parallel {
            paths.par_iter().filter_map(priced).collect()
        } else {
            paths.iter().filter_map(priced).collect()
        };
        opportunities.sort_by(|a, b| b.gross_profit.cmp(&a.gross_profit));
        opportunities
    }

    /// Price one path: try `min_amount_in`, then size the trade at the optimum.
    ///
    /// `Ok(None)` when the trial amount misses `min_profit` or the sized trade is not profitable.
    pub fn check_path(&self, path: &Arc<Path>) -> Result<Option<Opportunity>, SearchError> {
        let reserve_path = self.reserve_path_for(path)?;

        let trial_in = self.config.min_amount_in;
        let trial_out = amount_out_for_path(trial_in, &reserve_path)?;
        if trial_out < trial_in || trial_out - trial_in < self.config.min_profit {
            return Ok(None);
        }

        let mut amount_in = optimal_amount_in(&reserve_path)?;
        if let Some(cap) = self.input_cap(path)? {
            amount_in = amount_in.min(cap);
        }
        if amount_in.is_zero() {
            return Ok(None);
        }

        let amounts = amounts_along_path(amount_in, &reserve_path)?;
        let amount_out = amounts.last().copied().unwrap_or_default();
        if amount_out <= amount_in {
            return Ok(None);
        }
        Ok(Some(Opportunity::new(path.clone(), amounts, amount_out - amount_in)))
    }

    fn input_cap(&self, path: &Path) -> Result<Option<U256>, SearchError> {
        let Some(cap) = &self.inventory else {
            return Ok(None);
        };
        let Some((network, token)) = path.start() else {
            return Ok(None);
        };
        let Some(holder) = cap.holders.get(&network) else {
            return Ok(None);
        };
        Ok(Some(cap.inventory.balance(network, holder, &token).unwrap_or_default()))
    }

    /// `[reserve_in, reserve_out]` of every hop, oriented by the hop's input token against the
    /// pool's `tkn0`.
    pub fn reserve_path_for(&self, path: &Path) -> Result<Vec<U256>, SearchError> {
        let registry = self.registry();
        let mut reserve_path = Vec::with_capacity(path.len() * 2);
        for hop in path.hops() {
            let pool = registry.pool_by_id(&hop.pool)?;
            let snapshot = self.store.snapshot_for(&hop.pool)?;
            let (reserve_in, reserve_out) = snapshot.oriented(pool.is_forward(&hop.token_in));
            reserve_path.push(reserve_in);
            reserve_path.push(reserve_out);
        }
        Ok(reserve_path)
    }

    /// Split the flat amount sequence by step. Neighbouring steps share their boundary amount.
    pub fn steps_from_opportunity(&self, opportunity: &Opportunity) -> Result<Vec<ExecutionStep>, SearchError> {
        let registry = self.registry();
        let path = &opportunity.path;
        let mut offset = 0;
        let mut steps = Vec::with_capacity(path.steps.len());
        for step in path.steps.iter() {
            let amounts = opportunity.amounts.get(offset..offset + step.tkns.len()).ok_or_else(|| {
                SearchError::AmountsMismatch { path: path.id.clone(), amounts: opportunity.amounts.len() }
            })?;
            offset += step.len();

            let dexes = step
                .pools
                .iter()
                .map(|pool| registry.pool_by_id(pool).map(|pool| pool.dex.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            steps.push(ExecutionStep {
                network: step.network,
                amounts: amounts.to_vec(),
                tokens: step.tkns.clone(),
                pools: step.pools.clone(),
                dexes,
            });
        }
        if offset + 1 != opportunity.amounts.len() {
            return Err(SearchError::AmountsMismatch { path: path.id.clone(), amounts: opportunity.amounts.len() });
        }
        Ok(steps)
    }
}
