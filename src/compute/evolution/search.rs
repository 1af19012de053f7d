//! Genetic search for a start board that evolves into a target end board.

use std::sync::Arc;

use crate::compute::{Board, TransitionDictionary};
use crate::schema::{
    SearchConfig, SearchConfigError, SearchDiagnostics, SearchPhase, SearchProgress,
    SolutionRecord, StopReason,
};

use super::fitness::FitnessEvaluator;
use super::operators::BoardRng;
use super::population::{Individual, Population};

/// Outcome of one search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best individual of the final population.
    pub best: Individual,
    /// Step count searched.
    pub steps: usize,
    /// Seed the search ran with.
    pub seed: u64,
    pub diagnostics: SearchDiagnostics,
}

impl SearchResult {
    /// Mismatch of the best start's end state against the target.
    pub fn mismatch(&self) -> usize {
        self.diagnostics.mismatch_end_final
    }

    /// Convert to a record for result sinks.
    pub fn to_record(&self, id: u64) -> SolutionRecord {
        let d = &self.diagnostics;
        SolutionRecord {
            id,
            steps: self.steps,
            seed: self.seed,
            generations: d.generations,
            mismatch_end_initial: d.mismatch_end_initial,
            mismatch_end_final: d.mismatch_end_final,
            mismatch_start_initial: d.mismatch_start_initial,
            mismatch_start_final: d.mismatch_start_final,
            stop_reason: d.stop_reason,
            start: self.best.start.to_compact(),
        }
    }
}

/// Search engine holding the two alternating populations.
///
/// The engine is a state machine driven by [`SearchEngine::advance`]: each
/// call performs the work of the current phase and moves to the next one.
///
/// ```text
/// Initializing -> Evaluating -> Converged  -> Terminated
///                            -> Stalled    -> Terminated
///                            -> Continuing -> Evolving -> Evaluating ...
///                                          -> Terminated (generation cap)
/// ```
pub struct SearchEngine {
    config: SearchConfig,
    steps: usize,
    seed: u64,
    rng: BoardRng,
    target: Arc<Board>,
    known_start: Option<Board>,
    evaluator: FitnessEvaluator,
    current: Population,
    next: Population,
    phase: SearchPhase,
    generation: usize,
    history: Vec<usize>,
    initial: Option<(usize, Option<usize>)>,
    checkpoint: Option<Board>,
    stop_reason: Option<StopReason>,
}

impl SearchEngine {
    /// Create an engine searching `steps` generations back from `target`.
    pub fn new(
        target: Arc<Board>,
        steps: usize,
        seed: u64,
        dictionary: Arc<TransitionDictionary>,
        config: SearchConfig,
    ) -> Result<Self, SearchConfigError> {
        config.validate()?;
        if steps == 0 {
            return Err(SearchConfigError::InvalidSteps);
        }
        if dictionary.steps() != steps {
            return Err(SearchConfigError::DictionaryMismatch {
                expected: steps,
                found: dictionary.steps(),
            });
        }

        let current = Population::seeded(
            config.population.size,
            Arc::clone(&target),
            dictionary,
            config.operators.clone(),
        );
        let next = current.clone();
        let evaluator = FitnessEvaluator::new(&target, steps, config.fitness.clone());

        Ok(Self {
            config,
            steps,
            seed,
            rng: BoardRng::new(seed),
            target,
            known_start: None,
            evaluator,
            current,
            next,
            phase: SearchPhase::Initializing,
            generation: 0,
            history: Vec::new(),
            initial: None,
            checkpoint: None,
            stop_reason: None,
        })
    }

    /// Also track the error against a known true start of the target's size.
    pub fn with_known_start(mut self, start: Board) -> Result<Self, SearchConfigError> {
        if !start.same_shape(&self.target) {
            return Err(SearchConfigError::KnownStartShape {
                expected: (self.target.width(), self.target.height()),
                found: (start.width(), start.height()),
            });
        }
        self.known_start = Some(start);
        Ok(self)
    }

    /// Current phase.
    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Generations evolved so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Snapshot of the current best individual.
    pub fn progress(&self) -> SearchProgress {
        let best = self.current.best();
        SearchProgress {
            generation: self.generation,
            max_generations: self.config.population.max_generations,
            best_fitness: best.fitness.unwrap_or(i64::MIN),
            best_mismatch: best.mismatch(),
            best_live_cells: best.start.live_cells(),
            phase: self.phase,
        }
    }

    /// Perform the current phase's work and move to the next phase.
    ///
    /// Returns the new phase. `Terminated` is absorbing.
    pub fn advance(&mut self) -> SearchPhase {
        self.phase = match self.phase {
            SearchPhase::Initializing => SearchPhase::Evaluating,
            SearchPhase::Evaluating => self.evaluate(),
            SearchPhase::Converged => self.terminate(StopReason::Converged),
            SearchPhase::Stalled => self.terminate(StopReason::Stalled),
            SearchPhase::Continuing => {
                if self.generation >= self.config.population.max_generations {
                    self.terminate(StopReason::MaxGenerations)
                } else {
                    SearchPhase::Evolving
                }
            }
            SearchPhase::Evolving => {
                self.next.generation_after(&self.current, &mut self.rng);
                std::mem::swap(&mut self.current, &mut self.next);
                self.generation += 1;
                SearchPhase::Evaluating
            }
            SearchPhase::Terminated => SearchPhase::Terminated,
        };
        self.phase
    }

    /// Run to completion.
    pub fn run(self) -> SearchResult {
        self.run_with_callback(|_| {})
    }

    /// Run to completion, reporting progress after every evaluation.
    ///
    /// The reported phase is the evaluation's outcome: `Continuing`,
    /// `Stalled` or `Converged`.
    pub fn run_with_callback<F>(mut self, mut callback: F) -> SearchResult
    where
        F: FnMut(&SearchProgress),
    {
        while self.phase != SearchPhase::Terminated {
            let evaluated = self.phase == SearchPhase::Evaluating;
            self.advance();
            if evaluated {
                callback(&self.progress());
            }
        }

        let best = self.current.best().clone();
        let (mismatch_end_initial, mismatch_start_initial) = self.initial.unwrap_or_default();

        SearchResult {
            diagnostics: SearchDiagnostics {
                mismatch_end_initial,
                mismatch_end_final: best.mismatch(),
                mismatch_start_initial,
                mismatch_start_final: self.start_error(&best),
                generations: self.generation,
                stop_reason: self.stop_reason.unwrap_or(StopReason::MaxGenerations),
                best_fitness: best.fitness.unwrap_or(i64::MIN),
                history: self.history,
            },
            steps: self.steps,
            seed: self.seed,
            best,
        }
    }

    /// Score the current population and classify the result.
    fn evaluate(&mut self) -> SearchPhase {
        self.evaluator.evaluate_population(&mut self.current);

        let best = self.current.best();
        let mismatch = best.mismatch();
        self.history.push(mismatch);
        if self.initial.is_none() {
            self.initial = Some((mismatch, self.start_error(best)));
        }

        if mismatch == 0 && self.config.population.stop_when_converged {
            return SearchPhase::Converged;
        }

        if self.generation % self.config.population.checkpoint_interval == 0 {
            if self.checkpoint.as_ref() == Some(&best.start) {
                log::debug!(
                    "Search stalled at generation {} (mismatch {})",
                    self.generation,
                    mismatch
                );
                return SearchPhase::Stalled;
            }
            log::debug!(
                "Checkpoint at generation {}: mismatch {}, {} live cells",
                self.generation,
                mismatch,
                best.start.live_cells()
            );
            self.checkpoint = Some(best.start.clone());
        }
        SearchPhase::Continuing
    }

    fn terminate(&mut self, reason: StopReason) -> SearchPhase {
        self.stop_reason = Some(reason);
        SearchPhase::Terminated
    }

    fn start_error(&self, individual: &Individual) -> Option<usize> {
        self.known_start
            .as_ref()
            .map(|start| individual.start.xor_count(start, None))
    }
}

/// Search for a start board that reaches `target` after `steps` generations.
pub fn search(
    target: &Board,
    steps: usize,
    seed: u64,
    dictionary: Arc<TransitionDictionary>,
    config: &SearchConfig,
) -> Result<SearchResult, SearchConfigError> {
    let engine = SearchEngine::new(
        Arc::new(target.clone()),
        steps,
        seed,
        dictionary,
        config.clone(),
    )?;
    Ok(engine.run())
}
