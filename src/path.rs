//! This module defines the `Path` component.
use std::collections::VecDeque;

use bevy::math::{UVec2, Vec2};
use bevy::prelude::Component;

use crate::{grid::PathGrid, neighbor::Neighborhood};

/// The result of a pathfinding request: the cells to walk through and the world position
/// of their centres.
///
/// If using [`crate::plugin::PathGridPlugin`] this is inserted as a component on an entity after
/// its [`crate::plugin::Pathfind`] request was answered.
#[derive(Debug, Clone, Component, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path {
    cells: VecDeque<UVec2>,
    waypoints: VecDeque<Vec2>,
    cost: f32,
}

impl Path {
    /// Create a new path from cells and their matching world waypoints.
    ///
    /// # Panics
    /// If `cells` and `waypoints` differ in length.
    pub fn new(cells: Vec<UVec2>, waypoints: Vec<Vec2>, cost: f32) -> Self {
        assert_eq!(
            cells.len(),
            waypoints.len(),
            "every cell of a path needs a waypoint"
        );
        Path {
            cells: cells.into(),
            waypoints: waypoints.into(),
            cost,
        }
    }

    /// Create a path from the cell indices returned by [`crate::search::GraphSearch::search`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use bevy::math::{UVec2, Vec2};
    /// use bevy_pathgrid::prelude::*;
    ///
    /// let grid = PathGrid::new(0.0, 0.0, 4.0, 4.0, 2, 2).unwrap();
    /// let path = Path::from_indices(&grid, &[0, 1], 2.0);
    /// assert_eq!(path.cells(), &[UVec2::new(0, 0), UVec2::new(1, 0)]);
    /// assert_eq!(path.next_waypoint(), Some(Vec2::new(1.0, 1.0)));
    /// ```
    pub fn from_indices<N: Neighborhood>(grid: &PathGrid<N>, indices: &[usize], cost: f32) -> Self {
        Path {
            cells: indices.iter().map(|&i| grid.to_cell(i)).collect(),
            waypoints: indices.iter().map(|&i| grid.index_to_position(i)).collect(),
            cost,
        }
    }

    pub fn contains(&self, cell: UVec2) -> bool {
        self.cells.contains(&cell)
    }

    /// Returns the cells of the path, from start to goal.
    pub fn cells(&self) -> &[UVec2] {
        self.cells.as_slices().0
    }

    /// Returns the world (X, Z) positions of the path's cell centres.
    pub fn waypoints(&self) -> &[Vec2] {
        self.waypoints.as_slices().0
    }

    /// Returns the movement cost of the path
    pub fn cost(&self) -> f32 {
        self.cost
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Reverse the path in place.
    pub fn reverse(&mut self) {
        self.cells.make_contiguous().reverse();
        self.waypoints.make_contiguous().reverse();
    }

    /// Removes the first step of the path.
    pub fn pop(&mut self) -> Option<(UVec2, Vec2)> {
        Some((self.cells.pop_front()?, self.waypoints.pop_front()?))
    }

    /// Returns the next cell in the path without removing it.
    pub fn next(&self) -> Option<UVec2> {
        self.cells.front().copied()
    }

    pub fn next_waypoint(&self) -> Option<Vec2> {
        self.waypoints.front().copied()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl IntoIterator for Path {
    type Item = UVec2;
    type IntoIter = std::collections::vec_deque::IntoIter<UVec2>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}
