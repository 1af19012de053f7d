//! Configuration types for boards, batches and complete runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ConsensusTable, SearchConfig, SearchConfigError};
use crate::compute::MAX_WIDTH;

/// Board dimensions shared by every puzzle in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Columns (at most 62).
    pub width: usize,
    /// Rows.
    pub height: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
        }
    }
}

impl BoardConfig {
    /// Number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Validate dimensions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.width > MAX_WIDTH {
            return Err(ConfigError::TooWide {
                width: self.width,
                max: MAX_WIDTH,
            });
        }
        Ok(())
    }
}

/// Settings for solving many puzzles on a worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Board dimensions.
    #[serde(default)]
    pub board: BoardConfig,
    /// Per-search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Worker threads; available parallelism when unset.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Independent searches per puzzle, combined by consensus vote.
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    /// Directory holding `transition-{k}.csv` files.
    #[serde(default)]
    pub dictionary_dir: Option<PathBuf>,
    /// JSON file persisting the per-puzzle seed ledger.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// Per-step-count consensus thresholds.
    #[serde(default)]
    pub consensus: ConsensusTable,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            board: BoardConfig::default(),
            search: SearchConfig::default(),
            workers: None,
            attempts: default_attempts(),
            dictionary_dir: None,
            ledger_path: None,
            consensus: ConsensusTable::default(),
        }
    }
}

fn default_attempts() -> usize {
    1
}

impl BatchConfig {
    /// Validate batch configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.board.validate()?;
        self.search.validate()?;
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.attempts == 0 {
            return Err(ConfigError::InvalidAttempts);
        }
        self.consensus.validate()?;
        Ok(())
    }
}

/// Synthetic corpus generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Step counts to build dictionaries for and solve.
    #[serde(default = "default_steps")]
    pub steps: Vec<usize>,
    /// Training pairs per step count.
    #[serde(default = "default_training_pairs")]
    pub training_pairs: usize,
    /// Puzzles per step count.
    #[serde(default = "default_puzzles")]
    pub puzzles: usize,
    /// Generations run on the random fill before it becomes a start board.
    #[serde(default = "default_warmup_steps")]
    pub warmup_steps: usize,
    /// Draws allowed before giving up on a non-empty end board.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// RNG seed for the corpus.
    #[serde(default)]
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            training_pairs: default_training_pairs(),
            puzzles: default_puzzles(),
            warmup_steps: default_warmup_steps(),
            max_attempts: default_max_attempts(),
            seed: 0,
        }
    }
}

fn default_steps() -> Vec<usize> {
    (1..=5).collect()
}
fn default_training_pairs() -> usize {
    1000
}
fn default_puzzles() -> usize {
    20
}
fn default_warmup_steps() -> usize {
    5
}
fn default_max_attempts() -> usize {
    100
}

impl SyntheticConfig {
    /// Validate synthetic corpus settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() || self.steps.contains(&0) {
            return Err(ConfigError::InvalidSteps);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidAttempts);
        }
        Ok(())
    }
}

/// Everything the binary needs for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Batch solving settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Synthetic training and puzzle corpus.
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    /// CSV puzzle file to solve instead of synthetic puzzles.
    #[serde(default)]
    pub puzzles: Option<PathBuf>,
    /// JSON-lines file receiving solution records; memory only when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl RunConfig {
    /// Validate the whole run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;
        self.synthetic.validate()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Board dimensions must be non-zero")]
    InvalidDimensions,
    #[error("Board width {width} exceeds the maximum of {max}")]
    TooWide { width: usize, max: usize },
    #[error("Worker count must be positive")]
    InvalidWorkers,
    #[error("Attempt count must be positive")]
    InvalidAttempts,
    #[error("Step counts must be non-empty and positive")]
    InvalidSteps,
    #[error("Consensus threshold {0} must be in 0..=100")]
    InvalidThreshold(u32),
    #[error("Search config: {0}")]
    Search(#[from] SearchConfigError),
}
