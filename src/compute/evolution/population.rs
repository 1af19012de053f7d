//! Population of candidate start boards and the generation step.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::compute::{Board, Patch, TransitionDictionary};
use crate::schema::OperatorConfig;

use super::operators::BoardRng;

/// A candidate start board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Individual {
    /// Candidate start board.
    pub start: Board,
    /// Cells where the simulated end differs from the target.
    pub diff: Board,
    /// Fitness; `None` until evaluated.
    pub fitness: Option<i64>,
}

impl Individual {
    /// Unscored individual whose start is a copy of `board`.
    pub fn from_start(board: &Board) -> Self {
        Self {
            start: board.clone(),
            diff: board.blank_like(),
            fitness: None,
        }
    }

    /// Number of mismatched end cells recorded by the last evaluation.
    pub fn mismatch(&self) -> usize {
        self.diff.live_cells()
    }

    fn copy_from(&mut self, other: &Individual) {
        self.start.copy_from(&other.start);
        self.diff.copy_from(&other.diff);
        self.fitness = other.fitness;
    }
}

/// Ordering where `Less` means `a` is fitter than `b`.
///
/// Unscored individuals rank below every scored one; ties prefer fewer live
/// cells in the start board.
pub fn compare_fitness(a: &Individual, b: &Individual) -> Ordering {
    b.fitness
        .cmp(&a.fitness)
        .then_with(|| a.start.live_cells().cmp(&b.start.live_cells()))
}

/// Sort fittest first.
pub fn order_by_fitness(individuals: &mut [Individual]) {
    individuals.sort_by(compare_fitness);
}

/// Which operator produced an offspring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Crossover,
    Mutation,
    Copy,
}

/// Fixed-size set of individuals sharing one target and dictionary.
#[derive(Debug, Clone)]
pub struct Population {
    individuals: Vec<Individual>,
    operators: OperatorConfig,
    radius: usize,
    target: Arc<Board>,
    dictionary: Arc<TransitionDictionary>,
}

impl Population {
    /// Population of `size` individuals whose starts all copy the target.
    pub fn seeded(
        size: usize,
        target: Arc<Board>,
        dictionary: Arc<TransitionDictionary>,
        operators: OperatorConfig,
    ) -> Self {
        let radius = operators.radius_for(dictionary.steps());
        let individuals = (0..size).map(|_| Individual::from_start(&target)).collect();
        Self {
            individuals,
            operators,
            radius,
            target,
            dictionary,
        }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    /// Mutable access for scoring. Starts keep the target's dimensions.
    pub(crate) fn individuals_mut(&mut self) -> &mut [Individual] {
        &mut self.individuals
    }

    /// Individuals alongside the target they are scored against.
    pub(crate) fn split_for_scoring(&mut self) -> (&mut [Individual], &Board) {
        (&mut self.individuals, &self.target)
    }

    /// Target end board.
    pub fn target(&self) -> &Board {
        &self.target
    }

    /// Index of the fittest individual (first wins ties).
    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for i in 1..self.individuals.len() {
            if compare_fitness(&self.individuals[i], &self.individuals[best]) == Ordering::Less {
                best = i;
            }
        }
        best
    }

    /// Fittest individual.
    pub fn best(&self) -> &Individual {
        &self.individuals[self.best_index()]
    }

    /// Two-way tournament: the fitter of two uniform draws with probability
    /// `pressure`, else the other.
    pub fn pick_with_pressure(&self, rng: &mut BoardRng) -> &Individual {
        let a = &self.individuals[rng.below(self.individuals.len())];
        let b = &self.individuals[rng.below(self.individuals.len())];
        let (fitter, other) = if compare_fitness(b, a) == Ordering::Less {
            (b, a)
        } else {
            (a, b)
        };
        if rng.chance(self.operators.pressure) {
            fitter
        } else {
            other
        }
    }

    /// Refill this population from `prev`.
    ///
    /// Slot 0 receives `prev`'s best unchanged; every other slot is produced
    /// by crossover, directed mutation or plain copy. All fitness values are
    /// reset.
    pub fn generation_after(&mut self, prev: &Population, rng: &mut BoardRng) {
        self.individuals
            .resize_with(prev.len(), || Individual::from_start(&prev.target));

        if let Some((elite, rest)) = self.individuals.split_first_mut() {
            elite.copy_from(prev.best());
            elite.fitness = None;

            for child in rest {
                match prev.choose_strategy(rng) {
                    Strategy::Crossover => {
                        let base = prev.pick_with_pressure(rng);
                        let donor = prev.pick_with_pressure(rng);
                        rng.crossover(&mut child.start, &base.start, &donor.start);
                    }
                    Strategy::Mutation => {
                        let parent = prev.pick_with_pressure(rng);
                        child.start.copy_from(&parent.start);
                        prev.mutate(&mut child.start, &parent.diff, rng);
                    }
                    Strategy::Copy => {
                        let parent = prev.pick_with_pressure(rng);
                        child.start.copy_from(&parent.start);
                    }
                }
                child.diff.clear();
                child.fitness = None;
            }
        }
    }

    fn choose_strategy(&self, rng: &mut BoardRng) -> Strategy {
        let ops = &self.operators;
        let mut draw = rng.below_u64(ops.total_weight());
        if draw < u64::from(ops.crossover_weight) {
            return Strategy::Crossover;
        }
        draw -= u64::from(ops.crossover_weight);
        if draw < u64::from(ops.mutation_weight) {
            Strategy::Mutation
        } else {
            Strategy::Copy
        }
    }

    /// Dictionary-directed mutation of `start`, guided by the parent's `diff`.
    fn mutate(&self, start: &mut Board, diff: &Board, rng: &mut BoardRng) {
        let Some((x, y)) = diff.random_live_cell(rng.inner()) else {
            // Already reproduces the target; try a sparser start.
            rng.scatter(start, self.operators.mutation_loop, 0);
            return;
        };

        let jitter = self.radius / 2 + 1;
        let x = rng.coord_within_radius(x, start.width(), jitter);
        let y = rng.coord_within_radius(y, start.height(), jitter);

        let end_patch = Patch::extract(&self.target, x, y);
        match self.dictionary.sample(end_patch, rng.inner()) {
            Some(predecessor) => predecessor.overlay(start, x, y),
            None => rng.scatter(start, self.operators.mutation_loop, self.radius),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::simulate;

    fn scored(start: &Board, fitness: Option<i64>) -> Individual {
        Individual {
            start: start.clone(),
            diff: start.blank_like(),
            fitness,
        }
    }

    fn fixture(size: usize) -> Population {
        let mut rng = BoardRng::new(4);
        let mut start = Board::new(16, 16).unwrap();
        start.randomize(rng.inner(), 0.4);
        let target = simulate(&start, 1);
        let dictionary = TransitionDictionary::build([(&start, &target)], 1);
        Population::seeded(
            size,
            Arc::new(target),
            Arc::new(dictionary),
            OperatorConfig::default(),
        )
    }

    #[test]
    fn test_compare_fitness_order() {
        let sparse = Board::from_dense_text(4, 4, "X").unwrap();
        let dense = Board::from_dense_text(4, 4, "XX").unwrap();

        assert_eq!(
            compare_fitness(&scored(&dense, Some(-1)), &scored(&sparse, Some(-2))),
            Ordering::Less
        );
        assert_eq!(
            compare_fitness(&scored(&dense, Some(-3)), &scored(&sparse, Some(-3))),
            Ordering::Greater
        );
        assert_eq!(
            compare_fitness(&scored(&sparse, Some(-100)), &scored(&sparse, None)),
            Ordering::Less
        );

        let mut all = vec![
            scored(&sparse, None),
            scored(&dense, Some(-3)),
            scored(&sparse, Some(-3)),
            scored(&dense, Some(0)),
        ];
        order_by_fitness(&mut all);
        let fitness: Vec<_> = all.iter().map(|i| i.fitness).collect();
        assert_eq!(fitness, vec![Some(0), Some(-3), Some(-3), None]);
        assert_eq!(all[1].start, sparse);
    }

    #[test]
    fn test_seeded_population_copies_target() {
        let population = fixture(10);
        assert_eq!(population.len(), 10);
        for individual in population.individuals() {
            assert_eq!(&individual.start, population.target());
            assert_eq!(individual.fitness, None);
        }
    }

    #[test]
    fn test_best_prefers_first_on_ties() {
        let mut population = fixture(4);
        for (i, individual) in population.individuals_mut().iter_mut().enumerate() {
            individual.fitness = Some(if i == 1 || i == 3 { -1 } else { -5 });
        }
        assert_eq!(population.best_index(), 1);
    }

    #[test]
    fn test_pressure_one_always_returns_fitter() {
        let mut population = fixture(2);
        population.operators.pressure = 1.0;
        population.individuals_mut()[0].fitness = Some(-10);
        population.individuals_mut()[1].fitness = Some(-1);

        let mut rng = BoardRng::new(8);
        for _ in 0..100 {
            let picked = population.pick_with_pressure(&mut rng);
            // A draw of the same individual twice can only return that one.
            assert!(picked.fitness == Some(-1) || picked.fitness == Some(-10));
        }
        let fitter_count = (0..400)
            .filter(|_| population.pick_with_pressure(&mut rng).fitness == Some(-1))
            .count();
        // Three of four draw pairs contain the fitter individual.
        assert!(fitter_count > 250, "fitter picked {} times", fitter_count);
    }

    #[test]
    fn test_elitism_never_regresses() {
        let mut rng = BoardRng::new(12);
        let mut current = fixture(30);
        let mut next = current.clone();
        let target = Arc::clone(&current.target);

        let evaluate = |population: &mut Population| {
            for individual in population.individuals_mut() {
                let end = simulate(&individual.start, 1);
                let mismatch = end.compare(&target, Some(&mut individual.diff)).unwrap();
                individual.fitness = Some(-(mismatch as i64));
            }
        };

        evaluate(&mut current);
        let mut best = current.best().fitness;
        for _ in 0..25 {
            next.generation_after(&current, &mut rng);
            assert_eq!(next.individuals()[0].start, current.best().start);
            std::mem::swap(&mut current, &mut next);
            evaluate(&mut current);
            let now = current.best().fitness;
            assert!(now >= best, "best fitness regressed from {:?} to {:?}", best, now);
            best = now;
        }
    }

    #[test]
    fn test_generation_resets_fitness() {
        let mut rng = BoardRng::new(1);
        let mut prev = fixture(12);
        for individual in prev.individuals_mut() {
            individual.fitness = Some(-4);
        }
        let mut next = fixture(3);
        next.generation_after(&prev, &mut rng);
        assert_eq!(next.len(), 12);
        assert!(next.individuals().iter().all(|i| i.fitness.is_none()));
    }

    #[test]
    fn test_mutation_without_mismatch_only_removes_cells() {
        let population = fixture(2);
        let mut rng = BoardRng::new(6);
        let start = population.target().clone();
        let mut mutated = start.clone();
        population.mutate(&mut mutated, &start.blank_like(), &mut rng);

        assert!(mutated.live_cells() < start.live_cells());
        for (x, y) in mutated.iter_live() {
            assert!(start.get(x as isize, y as isize));
        }
    }

    #[test]
    fn test_choose_strategy_with_extreme_weights() {
        let mut population = fixture(2);
        population.operators.crossover_weight = u32::MAX;
        population.operators.mutation_weight = u32::MAX;
        population.operators.copy_weight = 0;
        let mut rng = BoardRng::new(10);
        let picks: Vec<Strategy> = (0..200).map(|_| population.choose_strategy(&mut rng)).collect();
        assert!(picks.contains(&Strategy::Crossover));
        assert!(picks.contains(&Strategy::Mutation));
        assert!(!picks.contains(&Strategy::Copy));

        population.operators.crossover_weight = 0;
        population.operators.mutation_weight = 0;
        population.operators.copy_weight = u32::MAX;
        assert_eq!(population.choose_strategy(&mut rng), Strategy::Copy);
    }
}
