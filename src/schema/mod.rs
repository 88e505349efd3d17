//! Schema module - Configuration and structure types for intercalation searches.

mod config;
pub mod elements;
mod structure;

pub use config::*;
pub use structure::*;
