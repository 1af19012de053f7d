//! Compute module - Boards, patches, transition statistics and search.

mod batch;
mod board;
mod consensus;
mod encoding;
mod patch;
mod persist;
mod propagator;
mod synthetic;
mod transitions;

pub mod evolution;

pub use batch::*;
pub use board::*;
pub use consensus::*;
pub use patch::*;
pub use propagator::*;
pub use synthetic::*;
pub use transitions::*;
