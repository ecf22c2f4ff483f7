pub mod config_loader;
pub mod constants;
pub mod units;

pub use config_loader::{ConfigSection, ConfigSectionSync, LoadConfigError, load_from_file, load_from_file_sync, load_from_str};
pub use constants::*;
pub use units::{normalize_units, unnormalize_units};
