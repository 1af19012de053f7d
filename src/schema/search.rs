//! Search configuration and result types for the predecessor search.

use serde::{Deserialize, Serialize};

/// Top-level configuration for one predecessor search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Selection and variation operator tunables.
    #[serde(default)]
    pub operators: OperatorConfig,
    /// Fitness shaping.
    #[serde(default)]
    pub fitness: FitnessConfig,
}

/// Population size and termination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals per generation.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Hard cap on generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Generations between stall checks.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    /// Stop as soon as the best start reproduces the target exactly.
    #[serde(default = "default_true")]
    pub stop_when_converged: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            max_generations: default_max_generations(),
            checkpoint_interval: default_checkpoint_interval(),
            stop_when_converged: true,
        }
    }
}

fn default_population_size() -> usize {
    1000
}
fn default_max_generations() -> usize {
    2000
}
fn default_checkpoint_interval() -> usize {
    100
}
fn default_true() -> bool {
    true
}

/// Selection pressure and strategy weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Probability that a two-way tournament returns the fitter individual.
    #[serde(default = "default_pressure")]
    pub pressure: f64,
    /// Relative weight of rectangular crossover.
    #[serde(default = "default_crossover_weight")]
    pub crossover_weight: u32,
    /// Relative weight of dictionary-directed mutation.
    #[serde(default = "default_mutation_weight")]
    pub mutation_weight: u32,
    /// Relative weight of copying a parent unchanged.
    #[serde(default = "default_copy_weight")]
    pub copy_weight: u32,
    /// Probability of repeating a fallback scatter flip.
    #[serde(default = "default_mutation_loop")]
    pub mutation_loop: f64,
    /// Scatter radius; the step count when unset.
    #[serde(default)]
    pub mutation_radius: Option<usize>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            pressure: default_pressure(),
            crossover_weight: default_crossover_weight(),
            mutation_weight: default_mutation_weight(),
            copy_weight: default_copy_weight(),
            mutation_loop: default_mutation_loop(),
            mutation_radius: None,
        }
    }
}

impl OperatorConfig {
    /// Scatter radius used for a search of `steps` generations.
    pub fn radius_for(&self, steps: usize) -> usize {
        self.mutation_radius.unwrap_or(steps)
    }

    /// Sum of all strategy weights, widened so any `u32` weights fit.
    pub fn total_weight(&self) -> u64 {
        u64::from(self.crossover_weight)
            + u64::from(self.mutation_weight)
            + u64::from(self.copy_weight)
    }
}

fn default_pressure() -> f64 {
    0.9
}
fn default_crossover_weight() -> u32 {
    30
}
fn default_mutation_weight() -> u32 {
    50
}
fn default_copy_weight() -> u32 {
    20
}
fn default_mutation_loop() -> f64 {
    0.7
}

/// Fitness shaping. Fitness is always "higher is better".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessConfig {
    /// Multiply the mismatch by the step count.
    #[serde(default)]
    pub scale_by_steps: bool,
    /// Penalty per live cell in the start board.
    #[serde(default)]
    pub live_cell_penalty: i64,
}

impl FitnessConfig {
    /// Fitness of a start with `mismatch` wrong end cells and `live` live cells.
    pub fn score(&self, mismatch: usize, live: usize, steps: usize) -> i64 {
        let scale = if self.scale_by_steps { steps as i64 } else { 1 };
        -(mismatch as i64 * scale) - live as i64 * self.live_cell_penalty
    }
}

// ============================================================================
// Progress and results
// ============================================================================

/// Current phase of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    /// Population seeded from the target, not yet scored.
    #[default]
    Initializing,
    /// Scoring the current population.
    Evaluating,
    /// Scored; the best start reproduces the target.
    Converged,
    /// Scored; the best start matches the previous checkpoint.
    Stalled,
    /// Scored; neither converged nor stalled.
    Continuing,
    /// Producing the next generation.
    Evolving,
    /// Search finished.
    Terminated,
}

/// Reason a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Best start reproduces the target exactly.
    Converged,
    /// Best start unchanged across a checkpoint window.
    Stalled,
    /// Reached the generation cap.
    MaxGenerations,
}

/// Snapshot passed to progress callbacks after each evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Generation just evaluated (0 = the seeded population).
    pub generation: usize,
    /// Generation cap.
    pub max_generations: usize,
    /// Fitness of the best individual.
    pub best_fitness: i64,
    /// End mismatch of the best individual.
    pub best_mismatch: usize,
    /// Live cells in the best start.
    pub best_live_cells: usize,
    /// Current phase.
    pub phase: SearchPhase,
}

/// What happened during a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDiagnostics {
    /// End mismatch of the seeded best start.
    pub mismatch_end_initial: usize,
    /// End mismatch of the final best start.
    pub mismatch_end_final: usize,
    /// Mismatch of the seeded best start against the known start, if any.
    pub mismatch_start_initial: Option<usize>,
    /// Mismatch of the final best start against the known start, if any.
    pub mismatch_start_final: Option<usize>,
    /// Generations evolved after seeding.
    pub generations: usize,
    /// Why the search stopped.
    pub stop_reason: StopReason,
    /// Fitness of the final best individual.
    pub best_fitness: i64,
    /// Best end mismatch after each evaluation, starting with the seeded population.
    pub history: Vec<usize>,
}

/// One solved puzzle, as written to result sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub id: u64,
    pub steps: usize,
    pub seed: u64,
    pub generations: usize,
    pub mismatch_end_initial: usize,
    pub mismatch_end_final: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch_start_initial: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch_start_final: Option<usize>,
    pub stop_reason: StopReason,
    /// Best start board as a compact `0`/`1` string.
    pub start: String,
}

// ============================================================================
// Validation
// ============================================================================

/// Search configuration validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchConfigError {
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Checkpoint interval must be positive")]
    InvalidCheckpoint,
    #[error("Selection pressure {0} must be in (0.5, 1.0]")]
    InvalidPressure(f64),
    #[error("Mutation loop probability {0} must be in [0.0, 1.0)")]
    InvalidMutationLoop(f64),
    #[error("At least one strategy weight must be positive")]
    NoStrategies,
    #[error("Steps must be positive")]
    InvalidSteps,
    #[error("Dictionary covers {found} steps but the search needs {expected}")]
    DictionaryMismatch { expected: usize, found: usize },
    #[error("Known start is {found:?} but the target is {expected:?}")]
    KnownStartShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl SearchConfig {
    /// Validate search configuration.
    pub fn validate(&self) -> Result<(), SearchConfigError> {
        if self.population.size < 2 {
            return Err(SearchConfigError::PopulationTooSmall);
        }
        if self.population.checkpoint_interval == 0 {
            return Err(SearchConfigError::InvalidCheckpoint);
        }

        let ops = &self.operators;
        if !(ops.pressure > 0.5 && ops.pressure <= 1.0) {
            return Err(SearchConfigError::InvalidPressure(ops.pressure));
        }
        // A loop probability of 1 would never terminate.
        if !(0.0..1.0).contains(&ops.mutation_loop) {
            return Err(SearchConfigError::InvalidMutationLoop(ops.mutation_loop));
        }
        if ops.total_weight() == 0 {
            return Err(SearchConfigError::NoStrategies);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.population.size, 1000);
        assert_eq!(config.population.max_generations, 2000);
        assert_eq!(config.population.checkpoint_interval, 100);
        assert!(config.population.stop_when_converged);
        assert_eq!(config.operators.total_weight(), 100);
        assert_eq!(config.operators.radius_for(3), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"population": {"size": 50}, "operators": {"mutation_radius": 2}}"#)
                .unwrap();
        assert_eq!(config.population.size, 50);
        assert_eq!(config.population.max_generations, 2000);
        assert_eq!(config.operators.radius_for(5), 2);
        assert_eq!(config.operators.pressure, 0.9);
    }

    #[test]
    fn test_validation() {
        let mut config = SearchConfig::default();
        config.operators.pressure = 0.5;
        assert_eq!(
            config.validate(),
            Err(SearchConfigError::InvalidPressure(0.5))
        );

        let mut config = SearchConfig::default();
        config.operators.crossover_weight = 0;
        config.operators.mutation_weight = 0;
        config.operators.copy_weight = 0;
        assert_eq!(config.validate(), Err(SearchConfigError::NoStrategies));

        let mut config = SearchConfig::default();
        config.operators.mutation_loop = 1.0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.population.size = 1;
        assert_eq!(config.validate(), Err(SearchConfigError::PopulationTooSmall));
    }

    #[test]
    fn test_extreme_weights_do_not_overflow() {
        let mut config = SearchConfig::default();
        config.operators.crossover_weight = u32::MAX;
        config.operators.mutation_weight = u32::MAX;
        config.operators.copy_weight = 1;
        assert_eq!(config.operators.total_weight(), 2 * u64::from(u32::MAX) + 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fitness_score() {
        let plain = FitnessConfig::default();
        assert_eq!(plain.score(7, 40, 3), -7);

        let shaped = FitnessConfig {
            scale_by_steps: true,
            live_cell_penalty: 1,
        };
        assert_eq!(shaped.score(7, 40, 3), -61);
        assert_eq!(shaped.score(0, 0, 3), 0);
    }
}
