//! Neighborhoods decide which of the eight surrounding cells a grid cell connects to,
//! and which heuristic estimates the remaining distance.
use bevy::math::{IVec2, UVec2, Vec2};

use std::fmt::Debug;

/// Offsets of the eight surrounding cells. Bit `i` of a neighbor mask refers to
/// `ORDINAL_2D_OFFSETS[i]`. The four cardinals come first.
pub const ORDINAL_2D_OFFSETS: [IVec2; 8] = [
    IVec2::new(-1, 0),
    IVec2::new(1, 0),
    IVec2::new(0, -1),
    IVec2::new(0, 1),
    IVec2::new(-1, -1),
    IVec2::new(-1, 1),
    IVec2::new(1, -1),
    IVec2::new(1, 1),
];

/// Mask with the four cardinal directions set.
pub const CARDINAL_MASK: u8 = 0b0000_1111;
/// Mask with all eight directions set.
pub const ORDINAL_MASK: u8 = 0b1111_1111;

/// Distance estimate between two cells, scaled by the world size of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Heuristic {
    /// `|dx| + |dy|`. Exact for cardinal movement, overestimates with diagonals.
    Manhattan,
    /// Straight line distance. Admissible for both neighborhoods.
    Euclidean,
    /// Exact distance on an open 8-connected grid.
    #[default]
    Octile,
}

impl Heuristic {
    /// Estimated cost of moving from `from` to `to` on cells of `cell_size`.
    #[inline(always)]
    pub fn distance(self, from: UVec2, to: UVec2, cell_size: Vec2) -> f32 {
        let dx = from.x.abs_diff(to.x) as f32;
        let dy = from.y.abs_diff(to.y) as f32;

        match self {
            Heuristic::Manhattan => dx * cell_size.x + dy * cell_size.y,
            Heuristic::Euclidean => (dx * cell_size.x).hypot(dy * cell_size.y),
            Heuristic::Octile => {
                let diagonal = dx.min(dy);
                diagonal * cell_size.x.hypot(cell_size.y)
                    + (dx - diagonal) * cell_size.x
                    + (dy - diagonal) * cell_size.y
            }
        }
    }
}

/// Movement rules of a [`crate::grid::PathGrid`].
pub trait Neighborhood: Clone + Debug + Default + Send + Sync + 'static {
    /// Bits of [`ORDINAL_2D_OFFSETS`] this neighborhood may move along.
    fn mask(&self) -> u8;

    /// Heuristic used unless the grid settings override it.
    fn heuristic(&self) -> Heuristic;

    fn is_ordinal(&self) -> bool {
        false
    }

    /// The offsets this neighborhood may move along.
    fn directions(&self) -> impl Iterator<Item = IVec2> {
        let mask = self.mask();
        ORDINAL_2D_OFFSETS
            .iter()
            .enumerate()
            .filter(move |(i, _)| (mask >> i) & 1 != 0)
            .map(|(_, offset)| *offset)
    }
}

/// Four-way movement.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CardinalNeighborhood;

impl Neighborhood for CardinalNeighborhood {
    #[inline(always)]
    fn mask(&self) -> u8 {
        CARDINAL_MASK
    }

    #[inline(always)]
    fn heuristic(&self) -> Heuristic {
        Heuristic::Manhattan
    }
}

/// Eight-way movement. Diagonal steps cost `hypot(cell_size.x, cell_size.y)`.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrdinalNeighborhood;

impl Neighborhood for OrdinalNeighborhood {
    #[inline(always)]
    fn mask(&self) -> u8 {
        ORDINAL_MASK
    }

    #[inline(always)]
    fn heuristic(&self) -> Heuristic {
        Heuristic::Octile
    }

    #[inline(always)]
    fn is_ordinal(&self) -> bool {
        true
    }
}

/// Cost of one step along `offset` on cells of `cell_size`.
#[inline(always)]
pub(crate) fn step_cost(offset: IVec2, cell_size: Vec2) -> f32 {
    match (offset.x != 0, offset.y != 0) {
        (true, true) => cell_size.x.hypot(cell_size.y),
        (true, false) => cell_size.x,
        _ => cell_size.y,
    }
}
