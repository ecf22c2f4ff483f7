/// Data Synchronization Layer
///
/// This layer keeps the local view of the chains current. It provides:
///
/// - A read-only chain provider abstraction with an alloy adapter and an in-memory mock
/// - Per-network block polling with topic/address triggers
/// - The reserve store, bulk loaded once and patched from `Sync` logs
/// - Bounded retry with backoff for remote calls
pub mod config;
pub mod listener;
pub mod mock_provider;
pub mod provider;
pub mod reserves;
pub mod retry;


pub use config::{ListenerConfig, NetworkConfig};
pub use listener::{Listener, ListenerState, LogBatch, NetworkListener, TriggerFilter};
pub use mock_provider::MockChainProvider;
pub use provider::{AlloyChainProvider, BlockTag, ChainProvider, ChainProviders, LogEntry, LogFilter, ProviderError};
pub use reserves::{ReserveError, ReserveSnapshot, ReserveStore};
pub use retry::{Backoff, RetryError, RetryPolicy, retry_with_backoff};
