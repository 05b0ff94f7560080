//! Connected region labeling of the walkable cells of a [`PathGrid`].
use ndarray::Array2;

use crate::{grid::PathGrid, neighbor::Neighborhood};

/// Component label of blocked cells.
pub const UNREACHABLE_COMPONENT: u32 = u32::MAX;

impl<N: Neighborhood> PathGrid<N> {
    /// Labels every walkable cell with the id of its connected region, indexed `[[y, x]]`.
    ///
    /// Connectivity follows the grid's neighborhood and neighbor filters but ignores
    /// the search bounds. Ids are assigned `0..` in row-major order of each region's
    /// first cell. Blocked cells get [`UNREACHABLE_COMPONENT`].
    pub fn connected_components(&self) -> Array2<u32> {
        let dimensions = self.dimensions();
        let mut labels = Array2::from_elem(
            (dimensions.y as usize, dimensions.x as usize),
            UNREACHABLE_COMPONENT,
        );
        let width = dimensions.x as usize;
        let mut next = 0;
        let mut stack = Vec::new();

        for index in 0..width * dimensions.y as usize {
            let (x, y) = ((index % width) as u32, (index / width) as u32);
            if labels[[y as usize, x as usize]] != UNREACHABLE_COMPONENT
                || self.is_marked(x, y)
            {
                continue;
            }

            labels[[index / width, index % width]] = next;
            stack.push(index);

            while let Some(current) = stack.pop() {
                for neighbor in self.neighbor_iter_unbounded(current) {
                    let label = &mut labels[[neighbor / width, neighbor % width]];
                    if *label == UNREACHABLE_COMPONENT {
                        *label = next;
                        stack.push(neighbor);
                    }
                }
            }

            next += 1;
        }

        labels
    }

    /// Component id of the cell at `index`, computed with [`PathGrid::connected_components`].
    pub fn component_of(&self, components: &Array2<u32>, index: usize) -> u32 {
        let cell = self.to_cell(index);
        components[[cell.y as usize, cell.x as usize]]
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::URect;

    use super::*;
    use crate::grid::GridSettingsBuilder;
    use crate::neighbor::CardinalNeighborhood;

    #[test]
    fn test_open_grid_is_one_component() {
        let grid = PathGrid::new(0.0, 0.0, 6.0, 4.0, 6, 4).unwrap();
        let components = grid.connected_components();
        assert!(components.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_wall_splits_components() {
        let mut grid = PathGrid::new(0.0, 0.0, 5.0, 5.0, 5, 5).unwrap();
        for y in 0..5 {
            grid.mark(2, y);
        }

        let components = grid.connected_components();
        let left = grid.component_of(&components, grid.to_index(0, 0));
        let right = grid.component_of(&components, grid.to_index(4, 4));

        assert_eq!(left, 0);
        assert_eq!(right, 1);
        assert_eq!(
            grid.component_of(&components, grid.to_index(2, 2)),
            UNREACHABLE_COMPONENT
        );
    }

    #[test]
    fn test_corner_clipping_does_not_connect() {
        // |o|x|
        // |x|o|
        let mut grid = PathGrid::new(0.0, 0.0, 2.0, 2.0, 2, 2).unwrap();
        grid.mark(1, 0);
        grid.mark(0, 1);

        let components = grid.connected_components();
        assert_ne!(
            grid.component_of(&components, grid.to_index(0, 0)),
            grid.component_of(&components, grid.to_index(1, 1))
        );
    }

    #[test]
    fn test_cardinal_diagonal_is_separate() {
        let settings = GridSettingsBuilder::new(0.0, 0.0, 3.0, 3.0, 3, 3)
            .build()
            .unwrap();
        let mut grid: PathGrid<CardinalNeighborhood> = PathGrid::from_settings(&settings);
        grid.mark(1, 0);
        grid.mark(0, 1);

        let components = grid.connected_components();
        assert_eq!(grid.component_of(&components, grid.to_index(0, 0)), 0);
        assert_eq!(grid.component_of(&components, grid.to_index(2, 2)), 1);
    }

    #[test]
    fn test_components_ignore_search_bounds() {
        let mut grid = PathGrid::new(0.0, 0.0, 4.0, 4.0, 4, 4).unwrap();
        grid.set_bounds(URect::new(0, 0, 2, 2)).unwrap();
        let components = grid.connected_components();
        assert!(components.iter().all(|&c| c == 0));
    }
}
