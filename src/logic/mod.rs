/// Logic Layer
///
/// This layer is responsible for:
/// - Constant-product swap math and optimal trade sizing
/// - The static token / pool / path registry
/// - Re-pricing paths when reserves change and ranking the results
pub mod math;
pub mod path;
pub mod registry;
pub mod search_engine;
pub mod types;


pub use math::{MathError, amount_out, amount_out_for_path, amounts_along_path, optimal_amount_in};
pub use path::{Hop, NetworkId, Path, Pool, Step, Token};
pub use registry::{PathRegistry, RegistryError, paths_touching_pools, paths_touching_tokens, pools_referenced_by};
pub use search_engine::{OpportunitySearch, SearchError};
pub use types::{ExecutionStep, Opportunity, ReserveChangeEvent, SearchConfig, SearchOutcome};
