//! Text encodings for boards.
//!
//! - Dense text: one line per row, `X` live, anything else dead.
//! - Flat array: exactly `width * height` tokens in row-major order, `"1"` live.
//! - Compact string: `width * height` characters of `0`/`1` in row-major order.

use std::fmt;

use super::{Board, BoardError};

impl Board {
    /// Load a board from dense text.
    ///
    /// Cells past the board edge are ignored.
    pub fn from_dense_text(width: usize, height: usize, text: &str) -> Result<Self, BoardError> {
        let mut board = Board::new(width, height)?;
        let (mut x, mut y) = (0isize, 0isize);
        for ch in text.chars() {
            if ch == '\n' {
                x = 0;
                y += 1;
                continue;
            }
            if ch == 'X' {
                board.set(x, y, true);
            }
            x += 1;
        }
        Ok(board)
    }

    /// Render as dense text using `X` for live and `.` for dead cells.
    pub fn to_dense_text(&self) -> String {
        let mut out = String::with_capacity((self.width() + 1) * self.height());
        for y in 0..self.height() as isize {
            for x in 0..self.width() as isize {
                out.push(if self.get(x, y) { 'X' } else { '.' });
            }
            out.push('\n');
        }
        out
    }

    /// Load a board from a flat row-major token array.
    pub fn from_flat_tokens<'a, I>(width: usize, height: usize, tokens: I) -> Result<Self, BoardError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut board = Board::new(width, height)?;
        let mut found = 0;
        for token in tokens {
            if found < board.cell_count() && token.trim() == "1" {
                board.set((found % width) as isize, (found / width) as isize, true);
            }
            found += 1;
        }
        if found != board.cell_count() {
            return Err(BoardError::TokenCount {
                expected: board.cell_count(),
                found,
            });
        }
        Ok(board)
    }

    /// Row-major `"0"`/`"1"` tokens.
    pub fn flat_tokens(&self) -> impl Iterator<Item = &'static str> + '_ {
        (0..self.height() as isize).flat_map(move |y| {
            (0..self.width() as isize).map(move |x| if self.get(x, y) { "1" } else { "0" })
        })
    }

    /// Flat tokens joined with commas.
    pub fn to_flat_string(&self) -> String {
        self.flat_tokens().collect::<Vec<_>>().join(",")
    }

    /// Load a board from its compact `0`/`1` string.
    pub fn from_compact(width: usize, height: usize, compact: &str) -> Result<Self, BoardError> {
        let mut board = Board::new(width, height)?;
        if compact.len() != board.cell_count() {
            return Err(BoardError::CompactLength {
                expected: board.cell_count(),
                found: compact.len(),
            });
        }
        for (i, byte) in compact.bytes().enumerate() {
            if byte == b'1' {
                board.set((i % width) as isize, (i / width) as isize, true);
            }
        }
        Ok(board)
    }

    /// Compact `0`/`1` string.
    pub fn to_compact(&self) -> String {
        self.flat_tokens().collect()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dense_text())
    }
}
