//! Configuration parsing, validation and the relay policy.

pub mod env;
pub mod parser;
pub mod policy;
pub mod types;
pub mod validate;

pub use parser::{ensure_config_file, load_config};
pub use policy::{Policy, PolicySnapshot};
pub use types::*;
