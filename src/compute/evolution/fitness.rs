//! Fitness evaluation for candidate start boards.

use crate::compute::{Board, BoardError, LifePropagator};
use crate::schema::FitnessConfig;

use super::population::{Individual, Population};

/// Simulates candidates forward and scores them against the target.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    propagator: LifePropagator,
    steps: usize,
    config: FitnessConfig,
}

impl FitnessEvaluator {
    /// Create an evaluator for boards shaped like `target`.
    pub fn new(target: &Board, steps: usize, config: FitnessConfig) -> Self {
        Self {
            propagator: LifePropagator::for_board(target),
            steps,
            config,
        }
    }

    /// Score one individual, filling its diff board. Returns the end mismatch.
    ///
    /// The start board must have the target's dimensions.
    pub fn evaluate(
        &mut self,
        individual: &mut Individual,
        target: &Board,
    ) -> Result<usize, BoardError> {
        target.ensure_same_shape(&individual.start)?;
        Ok(self.score(individual, target))
    }

    /// Score every unscored individual in the population.
    pub fn evaluate_population(&mut self, population: &mut Population) {
        let (individuals, target) = population.split_for_scoring();
        for individual in individuals {
            if individual.fitness.is_none() {
                self.score(individual, target);
            }
        }
    }

    fn score(&mut self, individual: &mut Individual, target: &Board) -> usize {
        let end = self.propagator.simulate(&individual.start, self.steps);
        let mismatch = end.xor_count(target, Some(&mut individual.diff));
        individual.fitness = Some(self.config.score(
            mismatch,
            individual.start.live_cells(),
            self.steps,
        ));
        mismatch
    }
}
