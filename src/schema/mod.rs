//! Schema module - Configuration, progress and result types for predecessor search.

mod config;
mod consensus;
mod search;

pub use config::*;
pub use consensus::*;
pub use search::*;
