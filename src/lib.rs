// Three-Layer Architecture
pub mod data_sync; // Data Layer: providers, block polling, reserve store
pub mod execution; // Execution Layer: executor and inventory collaborators
pub mod logic; // Logic Layer: swap math, path registry, opportunity search

// Configuration and common utilities
pub mod config;
pub mod utils;

// Re-export key components from each layer
pub use config::{AppConfig, RegistryFiles};
pub use data_sync::{
    AlloyChainProvider, ChainProvider, ChainProviders, Listener, ListenerConfig, LogBatch, MockChainProvider, NetworkConfig,
    ReserveSnapshot, ReserveStore, RetryPolicy, TriggerFilter,
};
pub use execution::{DryRunExecutor, ExecutionOutcome, Executor, Inventory, InventoryRefresher, StaticInventory};
pub use logic::{
    ExecutionStep, NetworkId, Opportunity, OpportunitySearch, Path, PathRegistry, Pool, ReserveChangeEvent, SearchConfig,
    SearchOutcome, Step, Token,
};
