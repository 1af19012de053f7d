//! Batch solving - many puzzles on a fixed worker pool.
//!
//! Each puzzle is solved independently: its own boards, populations and RNG.
//! Workers share only the transition library, the seed ledger and the result
//! sink, each of which synchronizes internally.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::consensus::{assemble, mean_mismatch};
use super::persist::write_atomically;
use super::evolution::SearchEngine;
use super::synthetic::SyntheticError;
use super::{Board, BoardError, DictionaryError, TransitionLibrary, simulate};
use crate::schema::{BatchConfig, BoardConfig, ConfigError, SearchConfigError, SolutionRecord};

/// Errors raised while solving a batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid search: {0}")]
    Search(#[from] SearchConfigError),
    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("Synthetic corpus: {0}")]
    Synthetic(#[from] SyntheticError),
    #[error("Board error: {0}")]
    Board(#[from] BoardError),
    #[error("Puzzle {id} is {found:?} but the batch expects {expected:?}")]
    ShapeMismatch {
        id: u64,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Why a puzzle record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PuzzleError {
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("expected {cells} cells per board, found {found} board fields")]
    FieldCount { cells: usize, found: usize },
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// One puzzle: find a start that reaches `end` after `steps` generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    pub id: u64,
    pub steps: usize,
    /// Known true start, when the puzzle comes from training data.
    pub start: Option<Board>,
    pub end: Board,
}

impl Puzzle {
    /// Parse `id,steps,[start cells...,]end cells...` with row-major `0`/`1` cells.
    pub fn from_flat_record(line: &str, board: &BoardConfig) -> Result<Self, PuzzleError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let number = |field: Option<&&str>| -> Result<u64, PuzzleError> {
            let field = field.copied().unwrap_or_default();
            field
                .parse()
                .map_err(|_| PuzzleError::InvalidNumber(field.to_string()))
        };
        let id = number(fields.first())?;
        let steps = number(fields.get(1))? as usize;

        let cells = board.cell_count();
        let rest = fields.get(2..).unwrap_or_default();
        let (start, end) = if rest.len() == cells {
            (None, rest)
        } else if rest.len() == 2 * cells {
            let (start, end) = rest.split_at(cells);
            (Some(start), end)
        } else {
            return Err(PuzzleError::FieldCount {
                cells,
                found: rest.len(),
            });
        };

        let start = start
            .map(|tokens| Board::from_flat_tokens(board.width, board.height, tokens.iter().copied()))
            .transpose()?;
        let end = Board::from_flat_tokens(board.width, board.height, end.iter().copied())?;
        Ok(Self {
            id,
            steps,
            start,
            end,
        })
    }
}

/// A puzzle line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPuzzle {
    /// 1-based line number.
    pub line: usize,
    pub error: PuzzleError,
}

/// Read puzzle records, skipping a header line and malformed records.
pub fn read_puzzles<R: BufRead>(
    reader: R,
    board: &BoardConfig,
) -> io::Result<(Vec<Puzzle>, Vec<SkippedPuzzle>)> {
    let mut puzzles = Vec::new();
    let mut skipped = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with("id") {
            continue;
        }
        match Puzzle::from_flat_record(&line, board) {
            Ok(puzzle) => puzzles.push(puzzle),
            Err(error) => {
                log::warn!("Skipping puzzle record on line {}: {}", index + 1, error);
                skipped.push(SkippedPuzzle {
                    line: index + 1,
                    error,
                });
            }
        }
    }
    Ok((puzzles, skipped))
}

// ============================================================================
// Result sinks
// ============================================================================

/// Destination for solution records, shared by all workers.
pub trait ResultSink: Send + Sync {
    fn record(&self, record: &SolutionRecord) -> Result<(), BatchError>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SolutionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far, in arrival order.
    pub fn records(&self) -> Vec<SolutionRecord> {
        lock(&self.records).clone()
    }
}

impl ResultSink for MemorySink {
    fn record(&self, record: &SolutionRecord) -> Result<(), BatchError> {
        lock(&self.records).push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create (or truncate) the output file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: Mutex::new(BufWriter::new(File::create(path)?)),
        })
    }
}

impl ResultSink for JsonLinesSink {
    fn record(&self, record: &SolutionRecord) -> Result<(), BatchError> {
        let mut writer = lock(&self.writer);
        serde_json::to_writer(&mut *writer, record)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// Seed ledger
// ============================================================================

/// Issues a fresh seed for every search of a puzzle, starting at 1.
///
/// With a path, the ledger is loaded on open and rewritten after every claim,
/// so reruns never repeat a seed.
#[derive(Debug, Default)]
pub struct SeedLedger {
    path: Option<PathBuf>,
    last: Mutex<BTreeMap<u64, u64>>,
}

impl SeedLedger {
    /// Ledger that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Ledger persisted as JSON at `path`, loading it if present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref().to_path_buf();
        let last = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            last: Mutex::new(last),
        })
    }

    /// Next unused seed for puzzle `id`.
    pub fn claim(&self, id: u64) -> Result<u64, BatchError> {
        let mut last = lock(&self.last);
        let seed = last.get(&id).map_or(1, |&seed| seed + 1);
        last.insert(id, seed);
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&*last)?;
            write_atomically(path, |writer| writer.write_all(json.as_bytes()))?;
        }
        Ok(seed)
    }

    /// Seeds issued so far for `id`.
    pub fn issued(&self, id: u64) -> u64 {
        lock(&self.last).get(&id).copied().unwrap_or(0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Runner
// ============================================================================

/// Result of one solved puzzle.
#[derive(Debug, Clone)]
pub struct PuzzleOutcome {
    pub id: u64,
    pub steps: usize,
    /// Consensus start over all attempts.
    pub start: Board,
    /// Consensus start advanced `steps` generations.
    pub predicted_end: Board,
    /// Record of the best attempt.
    pub best: SolutionRecord,
}

/// A puzzle that could not be solved.
#[derive(Debug)]
pub struct PuzzleFailure {
    pub id: u64,
    pub error: BatchError,
}

/// Mean errors over the puzzles of one step count.
#[derive(Debug, Clone, PartialEq)]
pub struct StepScore {
    pub steps: usize,
    pub puzzles: usize,
    /// Mean cells where the predicted end differs from the target end.
    pub mean_end_mismatch: f64,
    /// Mean cells where the predicted start differs from the known start.
    pub mean_start_mismatch: Option<f64>,
}

/// Everything a batch produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PuzzleOutcome>,
    pub failures: Vec<PuzzleFailure>,
}

impl BatchReport {
    /// Per-step-count scores against the puzzles that were solved.
    pub fn scores(&self, puzzles: &[Puzzle]) -> Vec<StepScore> {
        let by_id: BTreeMap<u64, &Puzzle> = puzzles.iter().map(|p| (p.id, p)).collect();
        let mut by_steps: BTreeMap<usize, Vec<(&Puzzle, &PuzzleOutcome)>> = BTreeMap::new();
        for outcome in &self.outcomes {
            if let Some(&puzzle) = by_id.get(&outcome.id) {
                by_steps.entry(outcome.steps).or_default().push((puzzle, outcome));
            }
        }

        by_steps
            .into_iter()
            .filter_map(|(steps, pairs)| {
                let mean_end_mismatch = mean_mismatch(
                    pairs.iter().map(|(p, _)| &p.end),
                    pairs.iter().map(|(_, o)| &o.predicted_end),
                )?;
                let known: Vec<_> = pairs
                    .iter()
                    .filter_map(|(p, o)| p.start.as_ref().map(|start| (start, &o.start)))
                    .collect();
                let mean_start_mismatch = mean_mismatch(
                    known.iter().map(|&(truth, _)| truth),
                    known.iter().map(|&(_, predicted)| predicted),
                );
                Some(StepScore {
                    steps,
                    puzzles: pairs.len(),
                    mean_end_mismatch,
                    mean_start_mismatch,
                })
            })
            .collect()
    }
}

/// Solves puzzles in parallel against a shared transition library.
pub struct BatchRunner {
    config: BatchConfig,
    library: Arc<TransitionLibrary>,
    ledger: SeedLedger,
    pool: ThreadPool,
}

impl BatchRunner {
    /// Create a runner; the ledger is opened from `config.ledger_path` when set.
    pub fn new(config: BatchConfig, library: Arc<TransitionLibrary>) -> Result<Self, BatchError> {
        config.validate()?;
        let ledger = match &config.ledger_path {
            Some(path) => SeedLedger::open(path)?,
            None => SeedLedger::in_memory(),
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .build()?;
        Ok(Self {
            config,
            library,
            ledger,
            pool,
        })
    }

    /// Seed ledger in use.
    pub fn ledger(&self) -> &SeedLedger {
        &self.ledger
    }

    /// Solve every puzzle, isolating per-puzzle failures.
    pub fn run(&self, puzzles: &[Puzzle], sink: &dyn ResultSink) -> BatchReport {
        log::info!(
            "Solving {} puzzles on {} workers",
            puzzles.len(),
            self.pool.current_num_threads()
        );

        let results: Vec<(u64, Result<PuzzleOutcome, BatchError>)> = self.pool.install(|| {
            puzzles
                .par_iter()
                .map(|puzzle| (puzzle.id, self.solve(puzzle, sink)))
                .collect()
        });

        let mut report = BatchReport::default();
        for (id, result) in results {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    log::warn!("Puzzle {} failed: {}", id, error);
                    report.failures.push(PuzzleFailure { id, error });
                }
            }
        }
        log::info!(
            "Batch done: {} solved, {} failed",
            report.outcomes.len(),
            report.failures.len()
        );
        report
    }

    /// Solve one puzzle with `attempts` independent searches.
    pub fn solve(&self, puzzle: &Puzzle, sink: &dyn ResultSink) -> Result<PuzzleOutcome, BatchError> {
        let board = &self.config.board;
        let shapes = std::iter::once(&puzzle.end).chain(puzzle.start.as_ref());
        for shape in shapes {
            if shape.width() != board.width || shape.height() != board.height {
                return Err(BatchError::ShapeMismatch {
                    id: puzzle.id,
                    expected: (board.width, board.height),
                    found: (shape.width(), shape.height()),
                });
            }
        }

        let dictionary = self.library.get_or_load(puzzle.steps)?;
        let target = Arc::new(puzzle.end.clone());

        let mut results = Vec::with_capacity(self.config.attempts);
        let mut records = Vec::with_capacity(self.config.attempts);
        for _ in 0..self.config.attempts {
            let seed = self.ledger.claim(puzzle.id)?;
            let mut engine = SearchEngine::new(
                Arc::clone(&target),
                puzzle.steps,
                seed,
                Arc::clone(&dictionary),
                self.config.search.clone(),
            )?;
            if let Some(start) = &puzzle.start {
                engine = engine.with_known_start(start.clone())?;
            }

            let result = engine.run();
            let record = result.to_record(puzzle.id);
            log::debug!(
                "Puzzle {} seed {}: mismatch {} -> {} in {} generations ({:?})",
                puzzle.id,
                seed,
                record.mismatch_end_initial,
                record.mismatch_end_final,
                record.generations,
                record.stop_reason
            );
            sink.record(&record)?;
            results.push(result);
            records.push(record);
        }

        let profile = self.config.consensus.profile_for(puzzle.steps);
        let start = assemble(&results, &profile).unwrap_or_else(|| puzzle.end.blank_like());
        let predicted_end = simulate(&start, puzzle.steps);

        let best = records
            .into_iter()
            .min_by_key(|r| (r.mismatch_end_final, r.generations))
            .ok_or(ConfigError::InvalidAttempts)?;
        let consensus_mismatch = predicted_end.compare(&puzzle.end, None)?;
        log::info!(
            "Puzzle {} ({} steps): best mismatch {}, consensus mismatch {}",
            puzzle.id,
            puzzle.steps,
            best.mismatch_end_final,
            consensus_mismatch
        );

        Ok(PuzzleOutcome {
            id: puzzle.id,
            steps: puzzle.steps,
            start,
            predicted_end,
            best,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{TransitionDictionary, synthesize_puzzles, training_pairs};
    use crate::schema::{StopReason, SyntheticConfig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_batch() -> BatchConfig {
        let mut config = BatchConfig::default();
        config.board = BoardConfig {
            width: 12,
            height: 12,
        };
        config.search.population.size = 20;
        config.search.population.max_generations = 10;
        config.search.population.checkpoint_interval = 5;
        config.workers = Some(2);
        config
    }

    fn library_for(board: &BoardConfig, steps: usize) -> Arc<TransitionLibrary> {
        let mut rng = StdRng::seed_from_u64(17);
        let synthetic = SyntheticConfig {
            training_pairs: 10,
            ..SyntheticConfig::default()
        };
        let pairs = training_pairs(board, steps, &synthetic, &mut rng).unwrap();
        let library = TransitionLibrary::in_memory();
        library.insert(TransitionDictionary::build(
            pairs.iter().map(|(s, e)| (s, e)),
            steps,
        ));
        Arc::new(library)
    }

    fn record(id: u64) -> SolutionRecord {
        SolutionRecord {
            id,
            steps: 1,
            seed: 1,
            generations: 0,
            mismatch_end_initial: 3,
            mismatch_end_final: 0,
            mismatch_start_initial: None,
            mismatch_start_final: Some(2),
            stop_reason: StopReason::Converged,
            start: "0110".to_string(),
        }
    }

    #[test]
    fn test_flat_record_with_and_without_start() {
        let board = BoardConfig {
            width: 2,
            height: 2,
        };
        let solved = Puzzle::from_flat_record("7,3,1,0,0,1,0,0,1,1", &board).unwrap();
        assert_eq!(solved.id, 7);
        assert_eq!(solved.steps, 3);
        assert_eq!(solved.start.unwrap().to_compact(), "1001");
        assert_eq!(solved.end.to_compact(), "0011");

        let open = Puzzle::from_flat_record("8, 1, 0, 1, 1, 0", &board).unwrap();
        assert!(open.start.is_none());
        assert_eq!(open.end.to_compact(), "0110");

        assert_eq!(
            Puzzle::from_flat_record("9,1,1,1,1", &board),
            Err(PuzzleError::FieldCount { cells: 4, found: 3 })
        );
        assert!(matches!(
            Puzzle::from_flat_record("x,1,1,1,1,1", &board),
            Err(PuzzleError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_read_puzzles_skips_bad_lines() {
        let board = BoardConfig {
            width: 2,
            height: 1,
        };
        let text = "id,delta,stop_0,stop_1\n1,1,1,0\n2,1,1\n\n3,2,0,1\n";
        let (puzzles, skipped) = read_puzzles(io::Cursor::new(text), &board).unwrap();
        assert_eq!(puzzles.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 3);
    }

    #[test]
    fn test_seed_ledger_issues_fresh_seeds() {
        let ledger = SeedLedger::in_memory();
        assert_eq!(ledger.claim(5).unwrap(), 1);
        assert_eq!(ledger.claim(5).unwrap(), 2);
        assert_eq!(ledger.claim(6).unwrap(), 1);
        assert_eq!(ledger.issued(5), 2);
        assert_eq!(ledger.issued(9), 0);
    }

    #[test]
    fn test_seed_ledger_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.json");
        {
            let ledger = SeedLedger::open(&path).unwrap();
            ledger.claim(1).unwrap();
            ledger.claim(1).unwrap();
            ledger.claim(42).unwrap();
        }
        let reopened = SeedLedger::open(&path).unwrap();
        assert_eq!(reopened.claim(1).unwrap(), 3);
        assert_eq!(reopened.claim(42).unwrap(), 2);
        assert_eq!(reopened.claim(7).unwrap(), 1);
    }

    #[test]
    fn test_seed_ledger_file_is_always_complete_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.json");
        let ledger = SeedLedger::open(&path).unwrap();
        for id in 0..20 {
            ledger.claim(id % 3).unwrap();
            let saved: BTreeMap<u64, u64> =
                serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(saved.get(&(id % 3)), Some(&(id / 3 + 1)));
        }
        // Temporary siblings are renamed away, never left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("solutions.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();
        sink.record(&record(1)).unwrap();
        sink.record(&record(2)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let parsed: Vec<SolutionRecord> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, vec![record(1), record(2)]);
    }

    #[test]
    fn test_batch_solves_and_isolates_failures() {
        let config = small_batch();
        let library = library_for(&config.board, 1);
        let mut rng = StdRng::seed_from_u64(2);
        let synthetic = SyntheticConfig {
            puzzles: 4,
            ..SyntheticConfig::default()
        };
        let mut puzzles = synthesize_puzzles(&config.board, 1, &synthetic, 0, &mut rng).unwrap();

        // No dictionary for 2 steps, and a board of the wrong shape.
        puzzles[1].steps = 2;
        puzzles[2].end = Board::new(8, 8).unwrap();

        let runner = BatchRunner::new(config, library).unwrap();
        let sink = MemorySink::new();
        let report = runner.run(&puzzles, &sink);

        let mut solved: Vec<u64> = report.outcomes.iter().map(|o| o.id).collect();
        solved.sort_unstable();
        assert_eq!(solved, vec![0, 3]);

        let mut failed: Vec<u64> = report.failures.iter().map(|f| f.id).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec![1, 2]);
        assert!(report.failures.iter().any(|f| matches!(
            f.error,
            BatchError::Dictionary(DictionaryError::Missing { steps: 2 })
        )));
        assert!(
            report
                .failures
                .iter()
                .any(|f| matches!(f.error, BatchError::ShapeMismatch { id: 2, .. }))
        );

        assert_eq!(sink.records().len(), 2);
        for outcome in &report.outcomes {
            assert!(outcome.best.mismatch_start_final.is_some());
            assert!(outcome.best.mismatch_end_final <= outcome.best.mismatch_end_initial);
        }

        let scores = report.scores(&puzzles);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].steps, 1);
        assert_eq!(scores[0].puzzles, 2);
        assert!(scores[0].mean_start_mismatch.is_some());
    }

    #[test]
    fn test_attempts_claim_distinct_seeds() {
        let mut config = small_batch();
        config.attempts = 3;
        let library = library_for(&config.board, 1);
        let mut rng = StdRng::seed_from_u64(4);
        let synthetic = SyntheticConfig {
            puzzles: 1,
            ..SyntheticConfig::default()
        };
        let puzzles = synthesize_puzzles(&config.board, 1, &synthetic, 50, &mut rng).unwrap();

        let runner = BatchRunner::new(config, library).unwrap();
        let sink = MemorySink::new();
        let report = runner.run(&puzzles, &sink);

        assert_eq!(report.outcomes.len(), 1);
        let mut seeds: Vec<u64> = sink.records().iter().map(|r| r.seed).collect();
        seeds.sort_unstable();
        assert_eq!(seeds, vec![1, 2, 3]);
        assert_eq!(runner.ledger().issued(50), 3);
    }
}
