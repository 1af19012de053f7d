//! Consensus assembly - combine several searched start boards by cell vote.

use super::evolution::SearchResult;
use super::{Board, BoardError};
use crate::schema::StepProfile;

/// Errors raised while voting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Ballot is {found:?} but the grid is {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Per-cell vote counts over boards of one shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteGrid {
    blank: Board,
    votes: Vec<u32>,
    samples: u32,
}

impl VoteGrid {
    pub fn new(width: usize, height: usize) -> Result<Self, BoardError> {
        let blank = Board::new(width, height)?;
        Ok(Self {
            votes: vec![0; blank.cell_count()],
            blank,
            samples: 0,
        })
    }

    /// Total ballots cast, counting weights.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Votes for the cell at `(x, y)`.
    pub fn votes_at(&self, x: usize, y: usize) -> u32 {
        self.votes[y * self.blank.width() + x]
    }

    /// Cast `weight` ballots for every live cell of `board`.
    pub fn add(&mut self, board: &Board, weight: u32) -> Result<(), ConsensusError> {
        if !board.same_shape(&self.blank) {
            return Err(ConsensusError::ShapeMismatch {
                expected: (self.blank.width(), self.blank.height()),
                found: (board.width(), board.height()),
            });
        }
        let width = self.blank.width();
        for (x, y) in board.iter_live() {
            self.votes[y * width + x] += weight;
        }
        self.samples += weight;
        Ok(())
    }

    /// Cells whose vote share exceeds `threshold` percent.
    pub fn assemble(&self, threshold: u32) -> Board {
        let mut board = self.blank.clone();
        let width = board.width();
        let bar = u64::from(threshold) * u64::from(self.samples);
        for (i, &votes) in self.votes.iter().enumerate() {
            if u64::from(votes) * 100 > bar {
                board.set((i % width) as isize, (i / width) as isize, true);
            }
        }
        board
    }
}

/// Combine the best starts of several searches of one puzzle.
///
/// Every result votes twice; the best (lowest final mismatch, then fewest
/// generations) votes once more. Returns an empty board when the best result
/// misses the profile's rejection bars, and `None` without results.
pub fn assemble(results: &[SearchResult], profile: &StepProfile) -> Option<Board> {
    let best = results.iter().min_by_key(|r| {
        (r.diagnostics.mismatch_end_final, r.diagnostics.generations)
    })?;
    let shape = &best.best.start;

    let rejected = profile
        .max_final_mismatch
        .is_some_and(|max| best.diagnostics.mismatch_end_final > max)
        || profile
            .max_generations
            .is_some_and(|max| best.diagnostics.generations > max);
    if rejected {
        log::debug!(
            "Consensus rejected: best mismatch {} after {} generations",
            best.diagnostics.mismatch_end_final,
            best.diagnostics.generations
        );
        return Some(shape.blank_like());
    }

    let mut grid = VoteGrid::new(shape.width(), shape.height()).ok()?;
    for result in results {
        if let Err(err) = grid.add(&result.best.start, 2) {
            log::warn!("Skipping ballot: {}", err);
        }
    }
    grid.add(shape, 1).ok()?;
    Some(grid.assemble(profile.threshold))
}

/// Mean Hamming distance over paired boards.
///
/// Pairs of different dimensions are skipped; `None` when no pair is comparable.
pub fn mean_mismatch<'a, T, P>(truth: T, predicted: P) -> Option<f64>
where
    T: IntoIterator<Item = &'a Board>,
    P: IntoIterator<Item = &'a Board>,
{
    let (count, total) = truth
        .into_iter()
        .zip(predicted)
        .filter_map(|(t, p)| match t.compare(p, None) {
            Ok(mismatch) => Some(mismatch),
            Err(err) => {
                log::warn!("Skipping scored pair: {}", err);
                None
            }
        })
        .fold((0usize, 0usize), |(count, total), mismatch| {
            (count + 1, total + mismatch)
        });
    (count > 0).then(|| total as f64 / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::Individual;
    use crate::schema::{SearchDiagnostics, StopReason};

    fn result(start: &Board, mismatch: usize, generations: usize) -> SearchResult {
        SearchResult {
            best: Individual::from_start(start),
            steps: 1,
            seed: 0,
            diagnostics: SearchDiagnostics {
                mismatch_end_initial: mismatch,
                mismatch_end_final: mismatch,
                mismatch_start_initial: None,
                mismatch_start_final: None,
                generations,
                stop_reason: StopReason::MaxGenerations,
                best_fitness: -(mismatch as i64),
                history: vec![mismatch],
            },
        }
    }

    #[test]
    fn test_vote_threshold() {
        let a = Board::from_dense_text(3, 1, "XX.").unwrap();
        let b = Board::from_dense_text(3, 1, "X.X").unwrap();
        let mut grid = VoteGrid::new(3, 1).unwrap();
        grid.add(&a, 1).unwrap();
        grid.add(&b, 1).unwrap();

        assert_eq!(grid.samples(), 2);
        assert_eq!(grid.votes_at(0, 0), 2);
        // Exactly half is not a majority.
        assert_eq!(grid.assemble(50).to_dense_text(), "X..\n");
        assert_eq!(grid.assemble(49).to_dense_text(), "XXX\n");
    }

    #[test]
    fn test_shape_mismatch() {
        let mut grid = VoteGrid::new(3, 3).unwrap();
        let board = Board::new(4, 3).unwrap();
        assert!(grid.add(&board, 1).is_err());
        assert_eq!(grid.samples(), 0);
    }

    #[test]
    fn test_best_result_breaks_ties() {
        let good = Board::from_dense_text(2, 1, "X.").unwrap();
        let other = Board::from_dense_text(2, 1, ".X").unwrap();
        // Two results split 2:2; the extra vote of the better one decides.
        let results = [result(&other, 5, 10), result(&good, 1, 10)];
        let board = assemble(&results, &StepProfile::new(1, 50)).unwrap();
        assert_eq!(board, good);
    }

    #[test]
    fn test_fewer_generations_break_mismatch_ties() {
        let a = Board::from_dense_text(2, 1, "X.").unwrap();
        let b = Board::from_dense_text(2, 1, ".X").unwrap();
        let results = [result(&a, 2, 40), result(&b, 2, 12)];
        let board = assemble(&results, &StepProfile::new(1, 50)).unwrap();
        assert_eq!(board, b);
    }

    #[test]
    fn test_rejection_bars_yield_empty_board() {
        let start = Board::from_dense_text(3, 3, "XXX").unwrap();
        let results = [result(&start, 4, 10)];

        let mut profile = StepProfile::new(3, 65);
        assert_eq!(assemble(&results, &profile), Some(start.clone()));

        profile.max_final_mismatch = Some(3);
        assert!(assemble(&results, &profile).unwrap().is_empty());

        profile.max_final_mismatch = None;
        profile.max_generations = Some(5);
        assert!(assemble(&results, &profile).unwrap().is_empty());

        assert_eq!(assemble(&[], &profile), None);
    }

    #[test]
    fn test_mean_mismatch() {
        let a = Board::from_dense_text(3, 3, "X").unwrap();
        let b = Board::from_dense_text(3, 3, "XX\nX").unwrap();
        let c = Board::new(3, 3).unwrap();

        let truth = [a.clone(), b.clone()];
        let predicted = [b.clone(), c.clone()];
        // |a ^ b| = 2, |b ^ empty| = 3.
        assert_eq!(mean_mismatch(&truth, &predicted), Some(2.5));
        assert_eq!(mean_mismatch(&[] as &[Board], &[] as &[Board]), None);
        assert_eq!(mean_mismatch([&a], [&a]), Some(0.0));

        let tall = Board::new(3, 9).unwrap();
        assert_eq!(mean_mismatch([&a, &b], [&tall, &c]), Some(3.0));
        assert_eq!(mean_mismatch([&a], [&tall]), None);
    }
}
