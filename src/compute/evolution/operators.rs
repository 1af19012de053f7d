//! Board variation utilities for the predecessor search.
//!
//! Provides seeded randomness, rectangular crossover, and local bit-flip
//! scatter used as the mutation fallback.

use rand::prelude::*;

use crate::compute::Board;

/// Random number generator wrapper for board operations.
#[derive(Debug, Clone)]
pub struct BoardRng {
    rng: StdRng,
}

impl BoardRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Underlying generator, for dictionary sampling.
    pub fn inner(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Uniform index in `0..n`. `n` must be positive.
    pub fn below(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Uniform `u64` in `0..n`. `n` must be positive.
    pub fn below_u64(&mut self, n: u64) -> u64 {
        self.rng.gen_range(0..n)
    }

    /// Move `coord` by up to `radius` in either direction, clamped to `0..limit`.
    pub fn coord_within_radius(&mut self, coord: usize, limit: usize, radius: usize) -> usize {
        let offset = self.rng.gen_range(-(radius as isize)..=radius as isize);
        (coord as isize + offset).clamp(0, limit as isize - 1) as usize
    }

    /// Overwrite `child` with `base`, then copy a random rectangle of `donor` over it.
    pub fn crossover(&mut self, child: &mut Board, base: &Board, donor: &Board) {
        child.copy_from(base);
        let (width, height) = (base.width(), base.height());
        let x = self.below(width);
        let y = self.below(height);
        let w = self.rng.gen_range(1..=width - x);
        let h = self.rng.gen_range(1..=height - y);
        child.fill_rect_from(donor, x, y, w, h);
    }

    /// Randomized local bit flips around live cells.
    ///
    /// With `radius == 0` a live cell is cleared; otherwise a cell within
    /// `radius` of a live cell is toggled (any cell when the board is empty).
    /// The flip repeats with probability `continue_prob`.
    pub fn scatter(&mut self, board: &mut Board, continue_prob: f64, radius: usize) {
        loop {
            let anchor = board.random_live_cell(&mut self.rng);
            match anchor {
                Some((x, y)) if radius == 0 => board.set(x as isize, y as isize, false),
                Some((x, y)) => {
                    let nx = self.coord_within_radius(x, board.width(), radius);
                    let ny = self.coord_within_radius(y, board.height(), radius);
                    board.toggle(nx, ny);
                }
                None if radius == 0 => {}
                None => {
                    let x = self.below(board.width());
                    let y = self.below(board.height());
                    board.toggle(x, y);
                }
            }
            if !self.chance(continue_prob) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let mut a = BoardRng::new(7);
        let mut b = BoardRng::new(7);
        for _ in 0..20 {
            assert_eq!(a.below_u64(1 << 40), b.below_u64(1 << 40));
        }
    }

    #[test]
    fn test_coord_within_radius_clamps() {
        let mut rng = BoardRng::new(1);
        for _ in 0..200 {
            let c = rng.coord_within_radius(0, 5, 3);
            assert!(c <= 3);
            let c = rng.coord_within_radius(4, 5, 10);
            assert!(c < 5);
        }
        assert_eq!(rng.coord_within_radius(2, 5, 0), 2);
    }

    #[test]
    fn test_crossover_takes_cells_from_parents_only() {
        let mut rng = BoardRng::new(3);
        let base = Board::new(12, 9).unwrap();
        let mut donor = Board::new(12, 9).unwrap();
        for y in 0..9 {
            for x in 0..12 {
                donor.set(x, y, true);
            }
        }

        let mut child = Board::new(12, 9).unwrap();
        for _ in 0..50 {
            rng.crossover(&mut child, &base, &donor);
            // The donor rectangle is never empty and lies inside the board.
            assert!(child.live_cells() >= 1);
            let (min_x, min_y) = child.iter_live().fold((12, 9), |(mx, my), (x, y)| {
                (mx.min(x), my.min(y))
            });
            let (max_x, max_y) = child
                .iter_live()
                .fold((0, 0), |(mx, my), (x, y)| (mx.max(x), my.max(y)));
            let area = (max_x - min_x + 1) * (max_y - min_y + 1);
            assert_eq!(child.live_cells(), area);
        }
    }

    #[test]
    fn test_scatter_zeroing_only_clears() {
        let mut rng = BoardRng::new(5);
        let mut board = Board::from_dense_text(6, 6, "XX\nXX\n...XX").unwrap();
        let before = board.clone();
        rng.scatter(&mut board, 0.5, 0);
        assert!(board.live_cells() < before.live_cells());
        for (x, y) in board.iter_live() {
            assert!(before.get(x as isize, y as isize));
        }

        let mut empty = Board::new(6, 6).unwrap();
        rng.scatter(&mut empty, 0.5, 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_scatter_stays_near_live_cells() {
        let mut rng = BoardRng::new(9);
        for _ in 0..50 {
            let mut board = Board::new(20, 20).unwrap();
            board.set(10, 10, true);
            rng.scatter(&mut board, 0.0, 2);
            let mut diff = Board::new(20, 20).unwrap();
            let reference = {
                let mut b = Board::new(20, 20).unwrap();
                b.set(10, 10, true);
                b
            };
            assert_eq!(board.compare(&reference, Some(&mut diff)), Ok(1));
            let (x, y) = diff.iter_live().next().unwrap();
            assert!((8..=12).contains(&x) && (8..=12).contains(&y));
        }
    }

    #[test]
    fn test_scatter_on_empty_board_flips_somewhere() {
        let mut rng = BoardRng::new(2);
        let mut board = Board::new(7, 7).unwrap();
        rng.scatter(&mut board, 0.0, 3);
        assert_eq!(board.live_cells(), 1);
    }
}
