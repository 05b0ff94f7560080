//! This module defines preset `NeighborFilter`s for filtering neighbors based on specific movement rules.
use bevy::math::{IVec2, UVec2};
use ndarray::ArrayView2;
use std::fmt::Debug;

use crate::neighbor::ORDINAL_2D_OFFSETS;

/// [`NeighborFilter`] trait to add custom filtering logic to the neighbors of a grid cell.
/// Add a filter to the grid settings with [`crate::grid::GridSettingsBuilder::add_neighbor_filter()`].
///
/// `blocked` is indexed `[[y, x]]`, `mask` bits refer to [`ORDINAL_2D_OFFSETS`].
pub trait NeighborFilter {
    /// Returns `mask` with disallowed directions cleared.
    fn filter(&self, pos: UVec2, mask: u8, blocked: &ArrayView2<bool>) -> u8;
}

#[inline(always)]
fn is_solid(blocked: &ArrayView2<bool>, cell: IVec2) -> bool {
    let shape = blocked.shape();
    cell.x < 0
        || cell.y < 0
        || cell.x as usize >= shape[1]
        || cell.y as usize >= shape[0]
        || blocked[[cell.y as usize, cell.x as usize]]
}

/// Disallow diagonal movement if both adjacent cardinals in the direction of movement are solid.
/// Prevents agents from clipping through wall corners like this where is x is a wall:
/// |x|/|
/// |/|x|
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoCornerClipping;

impl NeighborFilter for NoCornerClipping {
    fn filter(&self, pos: UVec2, mut mask: u8, blocked: &ArrayView2<bool>) -> u8 {
        let origin = pos.as_ivec2();

        for (i, &offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            if (mask >> i) & 1 == 0 || offset.x == 0 || offset.y == 0 {
                continue;
            }

            let solid_x = is_solid(blocked, origin + IVec2::new(offset.x, 0));
            let solid_y = is_solid(blocked, origin + IVec2::new(0, offset.y));

            if solid_x && solid_y {
                mask &= !(1 << i);
            }
        }

        mask
    }
}

/// Disallow diagonal movement if *any* adjacent cardinal in the direction of movement is solid.
/// Prevents cutting around corners like this where x is the wall:
/// |x|/|
/// |/| |
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoCornerCutting;

impl NeighborFilter for NoCornerCutting {
    fn filter(&self, pos: UVec2, mut mask: u8, blocked: &ArrayView2<bool>) -> u8 {
        let origin = pos.as_ivec2();

        for (i, &offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            if (mask >> i) & 1 == 0 || offset.x == 0 || offset.y == 0 {
                continue;
            }

            if is_solid(blocked, origin + IVec2::new(offset.x, 0))
                || is_solid(blocked, origin + IVec2::new(0, offset.y))
            {
                mask &= !(1 << i);
            }
        }

        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_no_corner_clipping() {
        let mut blocked = Array2::from_elem((3, 3), false);
        blocked[[2, 1]] = true;
        blocked[[1, 2]] = true;

        let filtered = NoCornerClipping.filter(UVec2::new(1, 1), u8::MAX, &blocked.view());

        for (i, offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            let allowed = (filtered >> i) & 1 == 1;
            if *offset == IVec2::new(1, 1) {
                assert!(!allowed, "Diagonal (1, 1) should be filtered");
            } else {
                assert!(allowed, "Direction {offset:?} should remain allowed");
            }
        }
    }

    #[test]
    fn test_no_corner_clipping_single_wall_allows_diagonal() {
        let mut blocked = Array2::from_elem((3, 3), false);
        blocked[[1, 2]] = true;

        let filtered = NoCornerClipping.filter(UVec2::new(1, 1), u8::MAX, &blocked.view());
        assert_eq!(filtered, u8::MAX);
    }

    #[test]
    fn test_no_corner_cutting() {
        let mut blocked = Array2::from_elem((3, 3), false);
        // |o|o|o|
        // |o|*|x|
        // |o|o|o|
        blocked[[1, 2]] = true;

        let filtered = NoCornerCutting.filter(UVec2::new(1, 1), u8::MAX, &blocked.view());

        for (i, offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            let allowed = (filtered >> i) & 1 == 1;
            let diagonal_east = offset.x > 0 && offset.y != 0;
            assert_eq!(allowed, !diagonal_east, "Direction {offset:?}");
        }
    }

    #[test]
    fn test_grid_edges_count_as_solid() {
        let blocked = Array2::from_elem((3, 3), false);

        // At the corner every diagonal but one leaves the grid through both cardinals.
        let filtered = NoCornerClipping.filter(UVec2::new(0, 0), u8::MAX, &blocked.view());
        for (i, offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            if *offset == IVec2::new(-1, -1) {
                assert_eq!((filtered >> i) & 1, 0);
            }
        }
    }
}
