//! Genetic search for Game of Life predecessors.
//!
//! # Overview
//!
//! - **Operators** (`operators`): seeded randomness, crossover and scatter mutation
//! - **Population** (`population`): fitness ordering, tournament selection and
//!   the generation step with elitism
//! - **Fitness** (`fitness`): forward simulation scored against the target
//! - **Search** (`search`): the driver loop with stall and convergence checks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reverse_life::compute::{Board, TransitionDictionary};
//! use reverse_life::compute::evolution::search;
//! use reverse_life::schema::SearchConfig;
//!
//! let target = Board::from_dense_text(20, 20, "..X\nX.X\n.XX").unwrap();
//! let dictionary = Arc::new(TransitionDictionary::empty(1));
//! let result = search(&target, 1, 42, dictionary, &SearchConfig::default()).unwrap();
//! println!("mismatch {} after {} generations",
//!     result.mismatch(), result.diagnostics.generations);
//! ```

mod fitness;
mod operators;
mod population;
mod search;

pub use fitness::FitnessEvaluator;
pub use operators::BoardRng;
pub use population::{Individual, Population, compare_fitness, order_by_fitness};
pub use search::{SearchEngine, SearchResult, search};
