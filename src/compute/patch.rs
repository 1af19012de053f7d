//! 5x5 neighborhood patches and their reflection symmetry.
//!
//! Bit `row * 5 + col` of a patch holds the cell at offset
//! `(col - 2, row - 2)` from the patch center. Extraction, the two
//! reflections, and write-back all use this one mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Board;

/// Side length of a patch.
pub const PATCH_SIZE: usize = 5;
/// Number of bits in a patch.
pub const PATCH_BITS: u32 = 25;

const PATCH_MASK: u32 = (1 << PATCH_BITS) - 1;
const ROW_MASK: u32 = 0b11111;
/// Bits 0, 5, 10, 15 and 20: the left column of every row.
const COLUMN_MASK: u32 = 0x0108421;

/// Patch value that does not fit in 25 bits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Patch value {0} does not fit in 25 bits")]
pub struct PatchError(pub u64);

/// A 5x5 neighborhood packed into the low 25 bits of a `u32`.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Debug, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Patch(u32);

/// Which reflections were applied to reach a patch image.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct Orientation {
    pub flip_ud: bool,
    pub flip_lr: bool,
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        flip_ud: false,
        flip_lr: false,
    };

    /// The four reflection images, in tie-break order.
    pub const ALL: [Orientation; 4] = [
        Orientation::IDENTITY,
        Orientation {
            flip_ud: true,
            flip_lr: false,
        },
        Orientation {
            flip_ud: false,
            flip_lr: true,
        },
        Orientation {
            flip_ud: true,
            flip_lr: true,
        },
    ];

    /// Apply this orientation to a patch.
    #[inline]
    pub fn apply(self, patch: Patch) -> Patch {
        let mut patch = patch;
        if self.flip_ud {
            patch = patch.flip_ud();
        }
        if self.flip_lr {
            patch = patch.flip_lr();
        }
        patch
    }

    /// Orientation that undoes this one.
    ///
    /// Both reflections are involutions and commute, so every orientation is
    /// its own inverse.
    #[inline]
    pub fn inverse(self) -> Orientation {
        self
    }
}

impl Patch {
    pub const EMPTY: Patch = Patch(0);

    /// Wrap raw bits, rejecting values wider than 25 bits.
    pub fn from_bits(bits: u32) -> Option<Self> {
        (bits & !PATCH_MASK == 0).then_some(Patch(bits))
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Number of live cells in the patch.
    pub fn live_cells(self) -> u32 {
        self.0.count_ones()
    }

    /// Read the 5x5 window centered on `(x, y)`. Off-board cells are dead.
    pub fn extract(board: &Board, x: usize, y: usize) -> Self {
        let mut bits = 0u32;
        for row in 0..PATCH_SIZE {
            let word = board.row_word(y as isize + row as isize - 2);
            // Column `x - 2` sits at bit `x - 1` of the packed row.
            let window = if x >= 1 { word >> (x - 1) } else { word << 1 };
            bits |= ((window as u32) & ROW_MASK) << (row * PATCH_SIZE);
        }
        Patch(bits)
    }

    /// Write the 25 cells back centered on `(x, y)`; off-board cells are skipped.
    pub fn overlay(self, board: &mut Board, x: usize, y: usize) {
        for row in 0..PATCH_SIZE {
            for col in 0..PATCH_SIZE {
                let alive = (self.0 >> (row * PATCH_SIZE + col)) & 1 != 0;
                board.set(
                    x as isize + col as isize - 2,
                    y as isize + row as isize - 2,
                    alive,
                );
            }
        }
    }

    /// Reverse the order of the five row blocks.
    pub fn flip_ud(self) -> Self {
        let mut out = 0;
        for row in 0..PATCH_SIZE {
            let block = (self.0 >> (row * PATCH_SIZE)) & ROW_MASK;
            out |= block << ((PATCH_SIZE - 1 - row) * PATCH_SIZE);
        }
        Patch(out)
    }

    /// Reverse the column order by combing out every fifth bit.
    pub fn flip_lr(self) -> Self {
        let mut out = 0;
        for col in 0..PATCH_SIZE {
            let comb = (self.0 >> col) & COLUMN_MASK;
            out |= comb << (PATCH_SIZE - 1 - col);
        }
        Patch(out)
    }

    /// Smallest of the four reflection images, and the orientation producing it.
    pub fn canonical(self) -> (Patch, Orientation) {
        Orientation::ALL
            .iter()
            .map(|&orientation| (orientation.apply(self), orientation))
            .min_by_key(|&(image, _)| image)
            .unwrap_or((self, Orientation::IDENTITY))
    }

    /// Canonical image only.
    pub fn canonical_key(self) -> Patch {
        self.canonical().0
    }

    /// Whether this patch is its own canonical image.
    pub fn is_canonical(self) -> bool {
        self.canonical_key() == self
    }
}

impl TryFrom<u32> for Patch {
    type Error = PatchError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Patch::from_bits(bits).ok_or(PatchError(bits as u64))
    }
}

impl TryFrom<u64> for Patch {
    type Error = PatchError;

    fn try_from(bits: u64) -> Result<Self, Self::Error> {
        u32::try_from(bits)
            .ok()
            .and_then(Patch::from_bits)
            .ok_or(PatchError(bits))
    }
}

impl From<Patch> for u32 {
    fn from(patch: Patch) -> u32 {
        patch.0
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..PATCH_SIZE {
            for col in 0..PATCH_SIZE {
                let alive = (self.0 >> (row * PATCH_SIZE + col)) & 1 != 0;
                f.write_str(if alive { "X" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
