//! Synthetic corpus generation: random start boards and their futures.

use rand::Rng;

use super::batch::Puzzle;
use super::{Board, BoardError, LifePropagator};
use crate::schema::{BoardConfig, SyntheticConfig};

/// Errors raised while synthesizing boards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntheticError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("No non-empty end board after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Draw one (start, end) pair `steps` generations apart.
///
/// A random fill of uniformly random density is warmed up first so the start
/// looks like a settled Life state; draws repeat until the end is non-empty.
pub fn synthesize_pair<R: Rng + ?Sized>(
    board: &BoardConfig,
    steps: usize,
    config: &SyntheticConfig,
    rng: &mut R,
) -> Result<(Board, Board), SyntheticError> {
    let mut propagator = LifePropagator::new(board.width, board.height)?;
    let mut fill = Board::new(board.width, board.height)?;

    for _ in 0..config.max_attempts {
        let density: f64 = rng.r#gen();
        fill.randomize(rng, density);

        propagator.load(&fill);
        propagator.run(config.warmup_steps);
        let start = propagator.state().clone();
        propagator.run(steps);

        if !propagator.state().is_empty() {
            return Ok((start, propagator.state().clone()));
        }
    }
    Err(SyntheticError::Exhausted {
        attempts: config.max_attempts,
    })
}

/// `config.training_pairs` pairs for one step count.
pub fn training_pairs<R: Rng + ?Sized>(
    board: &BoardConfig,
    steps: usize,
    config: &SyntheticConfig,
    rng: &mut R,
) -> Result<Vec<(Board, Board)>, SyntheticError> {
    (0..config.training_pairs)
        .map(|_| synthesize_pair(board, steps, config, rng))
        .collect()
}

/// `config.puzzles` puzzles with known starts, numbered from `first_id`.
pub fn synthesize_puzzles<R: Rng + ?Sized>(
    board: &BoardConfig,
    steps: usize,
    config: &SyntheticConfig,
    first_id: u64,
    rng: &mut R,
) -> Result<Vec<Puzzle>, SyntheticError> {
    (0..config.puzzles as u64)
        .map(|offset| {
            let (start, end) = synthesize_pair(board, steps, config, rng)?;
            Ok(Puzzle {
                id: first_id + offset,
                steps,
                start: Some(start),
                end,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::simulate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_pair_is_steps_apart() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SyntheticConfig::default();
        let board = BoardConfig::default();
        for steps in 1..=3 {
            let (start, end) = synthesize_pair(&board, steps, &config, &mut rng).unwrap();
            assert_eq!(simulate(&start, steps), end);
            assert!(!end.is_empty());
            assert_eq!((end.width(), end.height()), (20, 20));
        }
    }

    #[test]
    fn test_puzzles_are_numbered_and_known() {
        let mut rng = StdRng::seed_from_u64(8);
        let config = SyntheticConfig {
            puzzles: 4,
            ..SyntheticConfig::default()
        };
        let puzzles =
            synthesize_puzzles(&BoardConfig::default(), 2, &config, 100, &mut rng).unwrap();
        let ids: Vec<u64> = puzzles.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![100, 101, 102, 103]);
        for puzzle in &puzzles {
            let start = puzzle.start.as_ref().unwrap();
            assert_eq!(simulate(start, 2), puzzle.end);
        }
    }

    #[test]
    fn test_tiny_board_can_exhaust() {
        // Nothing survives on a 1x1 board.
        let mut rng = StdRng::seed_from_u64(0);
        let config = SyntheticConfig {
            max_attempts: 3,
            ..SyntheticConfig::default()
        };
        let board = BoardConfig {
            width: 1,
            height: 1,
        };
        assert_eq!(
            synthesize_pair(&board, 1, &config, &mut rng),
            Err(SyntheticError::Exhausted { attempts: 3 })
        );
    }

    #[test]
    fn test_rejects_oversized_board() {
        let mut rng = StdRng::seed_from_u64(0);
        let board = BoardConfig {
            width: 80,
            height: 4,
        };
        assert!(matches!(
            training_pairs(&board, 1, &SyntheticConfig::default(), &mut rng),
            Err(SyntheticError::Board(BoardError::TooWide { .. }))
        ));
    }
}
