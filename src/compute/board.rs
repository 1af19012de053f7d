//! Packed Game of Life board and the bit-parallel step function.
//!
//! Each row is stored in one `u64`. Column `x` lives in bit `x + 1`, so bit 0
//! and bit `width + 1` act as permanently dead guard columns. Rows 0 and
//! `height + 1` are guard rows. Guards are never written, which means every
//! read outside the grid sees a dead cell and the step function never wraps.

use std::fmt;

use rand::Rng;

/// Widest board a `u64` row can hold with one guard bit on each side.
pub const MAX_WIDTH: usize = 62;

/// Live-cell count for every 9-bit neighborhood window.
static NEIGHBOR_COUNT: [u8; 512] = build_neighbor_count();

const fn build_neighbor_count() -> [u8; 512] {
    let mut table = [0u8; 512];
    let mut window = 0;
    while window < 512 {
        table[window] = (window as u32).count_ones() as u8;
        window += 1;
    }
    table
}

/// Board construction and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("Board dimensions must be non-zero (got {width}x{height})")]
    Empty { width: usize, height: usize },
    #[error("Board width {width} exceeds the packed row limit of {max}")]
    TooWide { width: usize, max: usize },
    #[error("Expected {expected} cell tokens, found {found}")]
    TokenCount { expected: usize, found: usize },
    #[error("Compact board string must have {expected} characters, found {found}")]
    CompactLength { expected: usize, found: usize },
    #[error("Board is {found:?} but {expected:?} was expected")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Fixed-size Life grid with dead borders.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Board {
    width: usize,
    height: usize,
    /// `height + 2` packed rows, guard rows included.
    rows: Vec<u64>,
}

impl Board {
    /// Create an empty board.
    ///
    /// Fails if either dimension is zero or the width does not fit a packed row.
    pub fn new(width: usize, height: usize) -> Result<Self, BoardError> {
        if width == 0 || height == 0 {
            return Err(BoardError::Empty { width, height });
        }
        if width > MAX_WIDTH {
            return Err(BoardError::TooWide {
                width,
                max: MAX_WIDTH,
            });
        }
        Ok(Self {
            width,
            height,
            rows: vec![0; height + 2],
        })
    }

    /// Empty board with the same dimensions as this one.
    pub(crate) fn blank_like(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            rows: vec![0; self.height + 2],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells (width * height).
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether two boards share dimensions.
    #[inline]
    pub fn same_shape(&self, other: &Board) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Fail unless `other` has this board's dimensions.
    pub fn ensure_same_shape(&self, other: &Board) -> Result<(), BoardError> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(BoardError::ShapeMismatch {
                expected: (self.width, self.height),
                found: (other.width, other.height),
            })
        }
    }

    /// Read a cell. Anything outside the grid is dead.
    #[inline]
    pub fn get(&self, x: isize, y: isize) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        (self.rows[y as usize + 1] >> (x as usize + 1)) & 1 != 0
    }

    /// Write a cell. Writes outside the grid are ignored so guards stay dead.
    #[inline]
    pub fn set(&mut self, x: isize, y: isize, alive: bool) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let bit = 1u64 << (x as usize + 1);
        let row = &mut self.rows[y as usize + 1];
        if alive {
            *row |= bit;
        } else {
            *row &= !bit;
        }
    }

    /// Flip a cell inside the grid.
    #[inline]
    pub fn toggle(&mut self, x: usize, y: usize) {
        if x < self.width && y < self.height {
            self.rows[y + 1] ^= 1u64 << (x + 1);
        }
    }

    /// Packed row `y` (guard bits included). Rows outside the grid are zero.
    #[inline]
    pub(crate) fn row_word(&self, y: isize) -> u64 {
        if y < 0 || y as usize >= self.height {
            0
        } else {
            self.rows[y as usize + 1]
        }
    }

    /// Kill every cell.
    pub fn clear(&mut self) {
        self.rows.iter_mut().for_each(|row| *row = 0);
    }

    /// Deep copy `other` into this board, reusing the allocation.
    pub fn copy_from(&mut self, other: &Board) {
        self.width = other.width;
        self.height = other.height;
        self.rows.clone_from(&other.rows);
    }

    /// Number of live cells.
    pub fn live_cells(&self) -> usize {
        self.rows.iter().map(|row| row.count_ones() as usize).sum()
    }

    /// True when no cell is alive.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|&row| row == 0)
    }

    /// Fraction of live cells.
    pub fn density(&self) -> f32 {
        self.live_cells() as f32 / self.cell_count() as f32
    }

    /// Iterate over live cell positions in row-major order.
    pub fn iter_live(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows[1..=self.height]
            .iter()
            .enumerate()
            .flat_map(|(y, &row)| {
                let mut bits = row >> 1;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let x = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((x, y))
                })
            })
    }

    /// Uniformly chosen live cell, or `None` if the board is empty.
    pub fn random_live_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(usize, usize)> {
        let count = self.live_cells();
        if count == 0 {
            return None;
        }
        self.iter_live().nth(rng.gen_range(0..count))
    }

    /// Fill every cell independently with probability `density`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, density: f64) {
        let density = density.clamp(0.0, 1.0);
        for y in 0..self.height {
            for x in 0..self.width {
                self.set(x as isize, y as isize, rng.gen_bool(density));
            }
        }
    }

    /// Overwrite a rectangle of this board with the same cells of `source`.
    ///
    /// The rectangle is clipped to the grid.
    pub fn fill_rect_from(&mut self, source: &Board, x: usize, y: usize, w: usize, h: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let w = w.min(self.width - x);
        let h = h.min(self.height - y);
        if w == 0 {
            return;
        }
        let mask = ((1u64 << w) - 1) << (x + 1);
        for row in y..y + h {
            let src = source.row_word(row as isize);
            let dst = &mut self.rows[row + 1];
            *dst = (*dst & !mask) | (src & mask);
        }
    }

    /// Hamming distance to `other`.
    ///
    /// When `diff` is supplied it receives the per-cell XOR of the two boards.
    /// Boards of different dimensions are rejected.
    pub fn compare(&self, other: &Board, diff: Option<&mut Board>) -> Result<usize, BoardError> {
        self.ensure_same_shape(other)?;
        Ok(self.xor_count(other, diff))
    }

    /// `compare` for boards already known to share dimensions.
    pub(crate) fn xor_count(&self, other: &Board, diff: Option<&mut Board>) -> usize {
        debug_assert!(self.same_shape(other));
        match diff {
            Some(diff) => {
                if !diff.same_shape(self) {
                    *diff = self.blank_like();
                }
                let mut count = 0;
                for ((d, a), b) in diff.rows.iter_mut().zip(&self.rows).zip(&other.rows) {
                    *d = a ^ b;
                    count += d.count_ones() as usize;
                }
                count
            }
            None => self
                .rows
                .iter()
                .zip(&other.rows)
                .map(|(a, b)| (a ^ b).count_ones() as usize)
                .sum(),
        }
    }

    /// Advance one generation, writing the result into `next`.
    ///
    /// Three vertically adjacent rows are shifted right in lock-step. At each
    /// column the low three bits of the upper and lower rows, and the two
    /// outer bits of the middle row, form a 9-bit window whose live count is
    /// looked up in a 512-entry table.
    pub fn step_into(&self, next: &mut Board) {
        if !next.same_shape(self) {
            *next = self.blank_like();
        }

        next.rows[0] = 0;
        for r in 1..=self.height {
            let mut top = self.rows[r - 1];
            let mut mid = self.rows[r];
            let mut bot = self.rows[r + 1];

            let mut acc = 0u64;
            let mut bit = 1u64 << 1;

            for _ in 0..self.width {
                let window = ((top & 0b111) << 6) | ((mid & 0b101) << 3) | (bot & 0b111);
                let count = NEIGHBOR_COUNT[window as usize];

                if count == 3 || (count == 2 && mid & 0b010 != 0) {
                    acc |= bit;
                }

                bit <<= 1;
                top >>= 1;
                mid >>= 1;
                bot >>= 1;
            }
            next.rows[r] = acc;
        }
        next.rows[self.height + 1] = 0;
    }

    /// Next generation as a fresh board.
    pub fn step(&self) -> Board {
        let mut next = self.blank_like();
        self.step_into(&mut next);
        next
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Board {}x{} ({} live)",
            self.width,
            self.height,
            self.live_cells()
        )?;
        write!(f, "{}", self)
    }
}
