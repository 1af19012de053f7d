//! Life propagator - advances a board a fixed number of generations.
//!
//! Two named board slots alternate: each step reads `current`, writes
//! `next`, then swaps them, so no board is ever read while being written.

use super::{Board, BoardError};

/// Reusable two-slot stepper.
#[derive(Debug, Clone)]
pub struct LifePropagator {
    current: Board,
    next: Board,
}

impl LifePropagator {
    /// Create a propagator holding an empty board.
    pub fn new(width: usize, height: usize) -> Result<Self, BoardError> {
        let current = Board::new(width, height)?;
        Ok(Self {
            next: current.clone(),
            current,
        })
    }

    /// Create a propagator starting from `board`.
    pub fn for_board(board: &Board) -> Self {
        Self {
            current: board.clone(),
            next: board.blank_like(),
        }
    }

    /// Replace the current state with a copy of `board`.
    pub fn load(&mut self, board: &Board) {
        self.current.copy_from(board);
    }

    /// Advance one generation.
    pub fn step(&mut self) {
        self.current.step_into(&mut self.next);
        std::mem::swap(&mut self.current, &mut self.next);
    }

    /// Advance `steps` generations.
    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Load `start`, advance `steps` generations and return the result.
    pub fn simulate(&mut self, start: &Board, steps: usize) -> &Board {
        self.load(start);
        self.run(steps);
        &self.current
    }

    /// Current state.
    pub fn state(&self) -> &Board {
        &self.current
    }

    /// Consume the propagator, keeping the current state.
    pub fn into_state(self) -> Board {
        self.current
    }
}

/// Advance a copy of `board` by `steps` generations.
pub fn simulate(board: &Board, steps: usize) -> Board {
    let mut propagator = LifePropagator::for_board(board);
    propagator.run(steps);
    propagator.into_state()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLIDER: &str = "..X\nX.X\n.XX";

    fn place(width: usize, height: usize, text: &str, dx: isize, dy: isize) -> Board {
        let shape = Board::from_dense_text(width, height, text).unwrap();
        let mut board = Board::new(width, height).unwrap();
        for (x, y) in shape.iter_live() {
            board.set(x as isize + dx, y as isize + dy, true);
        }
        board
    }

    #[test]
    fn test_glider_moves_one_diagonal_in_four_steps() {
        let board = place(20, 20, GLIDER, 1, 1);
        let after = simulate(&board, 4);
        assert_eq!(after, place(20, 20, GLIDER, 2, 2));
    }

    #[test]
    fn test_glider_does_not_wrap() {
        let board = place(20, 20, GLIDER, 1, 1);
        let mut propagator = LifePropagator::for_board(&board);
        for _ in 0..80 {
            propagator.step();
            let state = propagator.state();
            // Nothing may ever reappear near the top-left corner once the
            // glider has moved away.
            for (x, y) in state.iter_live() {
                assert!(x >= 1 && y >= 1, "cell at ({}, {}) after wrap", x, y);
            }
        }
        assert!(propagator.state().iter_live().all(|(x, y)| x >= 10 && y >= 10));
    }

    #[test]
    fn test_still_life_is_fixed_point() {
        let block = place(20, 20, "XX\nXX", 9, 9);
        assert_eq!(simulate(&block, 1), block);
        assert_eq!(simulate(&block, 25), block);
    }

    #[test]
    fn test_zero_steps_is_identity() {
        let board = place(8, 8, GLIDER, 2, 2);
        let mut propagator = LifePropagator::new(8, 8).unwrap();
        assert_eq!(propagator.simulate(&board, 0), &board);
    }
}
