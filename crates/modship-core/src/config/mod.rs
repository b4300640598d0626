//! Configuration for modship.toml
//!
//! Two layers are read and merged:
//! - User: `<config dir>/modship/modship.toml`
//! - Repository: `<repo root>/modship.toml` (wins on conflict)

pub mod merge;
pub mod parser;
pub mod schema;
pub mod store;

pub use merge::merge_layers;
pub use parser::{parse_modship_toml, parse_modship_toml_str, to_toml};
pub use schema::{ContractSection, FactsSection, ModshipConfig, ModulesSection, UpdateSection};
pub use store::ConfigStore;

/// File name of the configuration in both layers.
pub const CONFIG_FILE_NAME: &str = "modship.toml";
