/// Execution Layer
///
/// Collaborators the search engine hands opportunities to:
/// - an [`Executor`] consuming per-step instructions
/// - an optional [`Inventory`] capping trade sizes to on-hand balances
pub mod executor;
pub mod inventory;

pub use executor::{DryRunExecutor, ExecutionOutcome, Executor, Submission};
pub use inventory::{Inventory, InventoryRefresher, StaticInventory};
