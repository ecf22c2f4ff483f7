use crate::logic::types::{ExecutionStep, Opportunity};
use alloy_primitives::U256;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ExecutionOutcome {
    /// Taken over by the executor; the result is not reported back.
    Accepted,
    /// An earlier submission is still in flight.
    Busy,
}

/// Consumer of per-step instructions. Submission returns as soon as the executor has decided
/// whether to take the work.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn submit(&self, opportunity: &Opportunity, steps: Vec<ExecutionStep>) -> ExecutionOutcome;
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub path_id: String,
    pub gross_profit: U256,
    /// Opportunity age when it reached the executor
    pub age: Duration,
    pub steps: Vec<ExecutionStep>,
}

/// Logs and records submissions without sending anything.
///
/// Keeps a single-flight lock for `settle_time` after each accepted submission, standing in for
/// the time a real transaction takes to confirm.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    settle_time: Duration,
    in_flight: Arc<AtomicBool>,
    submissions: Mutex<Vec<Submission>>,
}

impl DryRunExecutor {
    pub fn new(settle_time: Duration) -> Self {
        Self { settle_time, ..Default::default() }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl Executor for DryRunExecutor {
    async fn submit(&self, opportunity: &Opportunity, steps: Vec<ExecutionStep>) -> ExecutionOutcome {
        if self.in_flight.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            info!(path = %opportunity.path.id, "Executor busy, opportunity skipped");
            return ExecutionOutcome::Busy;
        }

        for step in steps.iter() {
            debug!(
                network = step.network,
                amount_in = %step.amount_in(),
                amount_out = %step.amount_out(),
                pools = ?step.pools,
                dexes = ?step.dexes,
                "Dry-run step"
            );
        }
        let age = opportunity.age();
        info!(
            path = %opportunity.path.id,
            gross_profit = %opportunity.gross_profit,
            steps = steps.len(),
            age_ms = age.as_millis() as u64,
            "Dry-run submission"
        );
        self.submissions.lock().await.push(Submission {
            path_id: opportunity.path.id.clone(),
            gross_profit: opportunity.gross_profit,
            age,
            steps,
        });

        if self.settle_time.is_zero() {
            self.in_flight.store(false, Ordering::SeqCst);
        } else {
            let in_flight = self.in_flight.clone();
            let settle_time = self.settle_time;
            tokio::spawn(async move {
                tokio::time::sleep(settle_time).await;
                in_flight.store(false, Ordering::SeqCst);
            });
        }
        ExecutionOutcome::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::path::Path;

    fn opportunity() -> Opportunity {
        let path = Arc::new(Path::new("0x01", "A|B::DEX::1", vec![]));
        Opportunity::new(path, vec![U256::from(100), U256::from(110)], U256::from(10))
    }

    #[tokio::test]
    async fn test_single_flight() {
        let executor = DryRunExecutor::new(Duration::from_secs(3600));
        assert_eq!(executor.submit(&opportunity(), vec![]).await, ExecutionOutcome::Accepted);
        assert!(executor.is_busy());
        assert_eq!(executor.submit(&opportunity(), vec![]).await, ExecutionOutcome::Busy);
        assert_eq!(executor.submissions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_released_after_settle_time() {
        let executor = DryRunExecutor::new(Duration::ZERO);
        assert_eq!(executor.submit(&opportunity(), vec![]).await, ExecutionOutcome::Accepted);
        assert!(!executor.is_busy());
        assert_eq!(executor.submit(&opportunity(), vec![]).await, ExecutionOutcome::Accepted);

        let executor = DryRunExecutor::new(Duration::from_millis(5));
        executor.submit(&opportunity(), vec![]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!executor.is_busy());
        assert_eq!(executor.submissions().await[0].gross_profit, U256::from(10));
    }

    #[tokio::test]
    async fn test_submission_records_opportunity_age() {
        let executor = DryRunExecutor::new(Duration::ZERO);
        let stale = opportunity();
        tokio::time::sleep(Duration::from_millis(20)).await;
        executor.submit(&stale, vec![]).await;
        executor.submit(&opportunity(), vec![]).await;

        let submissions = executor.submissions().await;
        assert!(submissions[0].age >= Duration::from_millis(20));
        assert!(submissions[1].age < submissions[0].age);
    }
}
