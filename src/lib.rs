//! Reverse Life - genetic search for Game of Life predecessor states.
//!
//! Given a board observed after `k` generations of Conway's Game of Life on a
//! bounded grid, find a start board that evolves into it. The search is a
//! genetic algorithm whose mutations are directed by a transition dictionary:
//! corpus statistics of which 5x5 neighborhoods precede which.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, progress and result types
//! - `compute`: Packed boards, patches, dictionaries, search and batch solving
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reverse_life::{
//!     compute::{Board, TransitionDictionary, simulate, evolution::search},
//!     schema::SearchConfig,
//! };
//!
//! // Build a dictionary from one known pair
//! let start = Board::from_dense_text(20, 20, "\n\n..X\n...X\n.XXX").unwrap();
//! let end = simulate(&start, 1);
//! let dictionary = TransitionDictionary::build([(&start, &end)], 1);
//!
//! // Search for a predecessor of the end board
//! let result = search(&end, 1, 42, Arc::new(dictionary), &SearchConfig::default()).unwrap();
//! println!("Mismatch after search: {}", result.mismatch());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{Board, LifePropagator, Patch, TransitionDictionary, simulate};
pub use schema::{BatchConfig, RunConfig, SearchConfig};
