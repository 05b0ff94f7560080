//! This module contains [`PathGrid`], the walkability grid searched by [`crate::search::GraphSearch`].
use std::{fmt, sync::Arc};

use bevy::{
    math::{IVec2, Rect, URect, UVec2, Vec2},
    prelude::Resource,
};
use ndarray::{Array2, ArrayView2};

use crate::{
    error::GridError,
    filter::{NeighborFilter, NoCornerClipping},
    graph::{Edge, Graph},
    neighbor::{step_cost, Heuristic, Neighborhood, OrdinalNeighborhood, ORDINAL_2D_OFFSETS},
};

/// Shared neighbor filter as stored by the grid settings.
pub type SharedFilter = Arc<dyn NeighborFilter + Send + Sync + 'static>;

/// Walkable rectangles are never more than this many times longer than wide.
const MAX_RECTANGLE_ASPECT: u32 = 4;

/// Holder for internal crate settings.
#[derive(Clone)]
pub struct GridSettings(pub(crate) GridInternalSettings);

#[derive(Clone)]
pub(crate) struct GridInternalSettings {
    pub(crate) origin: Vec2,
    pub(crate) size: Vec2,
    pub(crate) segment_count: UVec2,
    pub(crate) bounds: URect,
    pub(crate) heuristic: Option<Heuristic>,
    pub(crate) default_impassable: bool,
    pub(crate) filters: Option<Vec<SharedFilter>>,
}

/// Builder for [`GridSettings`].
///
/// Example usage:
/// ```
/// use bevy_pathgrid::prelude::*;
///
/// let settings = GridSettingsBuilder::new(0.0, 0.0, 64.0, 64.0, 128, 128)
///     .heuristic(Heuristic::Euclidean)
///     .add_neighbor_filter(NoCornerCutting)
///     .build()
///     .unwrap();
///
/// let grid: PathGrid<OrdinalNeighborhood> = PathGrid::from_settings(&settings);
/// assert_eq!(grid.node_count(), 128 * 128);
/// ```
#[derive(Clone)]
pub struct GridSettingsBuilder {
    origin: Vec2,
    size: Vec2,
    segment_count: UVec2,
    bounds: Option<URect>,
    heuristic: Option<Heuristic>,
    default_impassable: bool,
    filters: Option<Vec<SharedFilter>>,
}

impl GridSettingsBuilder {
    /// A grid covering `width` x `height` world units starting at (`origin_x`, `origin_z`),
    /// divided into `count_x` x `count_y` cells.
    pub fn new(
        origin_x: f32,
        origin_z: f32,
        width: f32,
        height: f32,
        count_x: u32,
        count_y: u32,
    ) -> Self {
        GridSettingsBuilder {
            origin: Vec2::new(origin_x, origin_z),
            size: Vec2::new(width, height),
            segment_count: UVec2::new(count_x, count_y),
            bounds: None,
            heuristic: None,
            default_impassable: false,
            filters: None,
        }
    }

    /// A grid of square cells with edge length `step`.
    pub fn with_step(origin_x: f32, origin_z: f32, step: f32, count_x: u32, count_y: u32) -> Self {
        Self::new(
            origin_x,
            origin_z,
            step * count_x as f32,
            step * count_y as f32,
            count_x,
            count_y,
        )
    }

    /// Restricts searches to the cells inside `bounds` (max exclusive).
    pub fn bounds(mut self, bounds: URect) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Overrides the heuristic of the neighborhood.
    pub fn heuristic(mut self, heuristic: Heuristic) -> Self {
        self.heuristic = Some(heuristic);
        self
    }

    /// Sets every cell of the new grid to be blocked.
    pub fn default_impassable(mut self) -> Self {
        self.default_impassable = true;
        self
    }

    /// Adds a [`NeighborFilter`] applied when computing neighbors.
    /// Filters run in the order they are added and replace the default corner clipping filter.
    pub fn add_neighbor_filter<F>(mut self, filter: F) -> Self
    where
        F: NeighborFilter + Send + Sync + 'static,
    {
        self.filters
            .get_or_insert_with(Vec::new)
            .push(Arc::new(filter));
        self
    }

    /// Removes the default [`NoCornerClipping`] filter of ordinal grids.
    pub fn allow_corner_clipping(mut self) -> Self {
        self.filters.get_or_insert_with(Vec::new);
        self
    }

    /// Validates the settings.
    pub fn build(self) -> Result<GridSettings, GridError> {
        let invalid = || GridError::InvalidDimensions {
            width: self.size.x,
            height: self.size.y,
            count_x: self.segment_count.x,
            count_y: self.segment_count.y,
        };

        if !self.size.is_finite() || self.size.cmple(Vec2::ZERO).any() || !self.origin.is_finite() {
            return Err(invalid());
        }
        if self.segment_count.cmpeq(UVec2::ZERO).any() {
            return Err(invalid());
        }
        // Node indices have to fit the search's u32 bookkeeping.
        let cells = self.segment_count.x as u64 * self.segment_count.y as u64;
        if cells >= u32::MAX as u64 {
            return Err(invalid());
        }

        let full = URect::from_corners(UVec2::ZERO, self.segment_count);
        let bounds = self.bounds.unwrap_or(full);
        if bounds.is_empty() || full.union(bounds) != full {
            return Err(GridError::InvalidBounds {
                bounds,
                dimensions: self.segment_count,
            });
        }

        Ok(GridSettings(GridInternalSettings {
            origin: self.origin,
            size: self.size,
            segment_count: self.segment_count,
            bounds,
            heuristic: self.heuristic,
            default_impassable: self.default_impassable,
            filters: self.filters,
        }))
    }
}

/// A uniform grid over a rectangle of the world's XZ plane storing which cells are blocked.
///
/// Cells are addressed by `(x, y)` coordinates or by the flat index `x + y * segment_count_x`.
/// World positions are [`Vec2`]s holding the world X and Z coordinates.
///
/// # Example
/// ```
/// use bevy_pathgrid::prelude::*;
///
/// let mut grid = PathGrid::new(0.0, 0.0, 5.0, 5.0, 5, 5).unwrap();
/// for y in 0..4 {
///     grid.mark(2, y);
/// }
///
/// let mut search = GraphSearch::new();
/// let mut path = Vec::new();
/// assert!(search.search(&grid, grid.to_index(0, 0), grid.to_index(4, 0), &mut path));
/// assert!(path.contains(&grid.to_index(2, 4)));
/// ```
#[derive(Resource, Clone)]
pub struct PathGrid<N: Neighborhood = OrdinalNeighborhood> {
    neighborhood: N,
    heuristic: Heuristic,
    filters: Vec<SharedFilter>,

    origin: Vec2,
    size: Vec2,
    cell_size: Vec2,
    segment_count: UVec2,
    bounds: URect,

    // Indexed [[y, x]], so the standard layout matches the flat cell index.
    blocked: Array2<bool>,
}

impl PathGrid<OrdinalNeighborhood> {
    /// Creates an eight-way grid where every cell is walkable.
    ///
    /// Fails if the world size isn't positive or a segment count is zero.
    pub fn new(
        origin_x: f32,
        origin_z: f32,
        width: f32,
        height: f32,
        count_x: u32,
        count_y: u32,
    ) -> Result<Self, GridError> {
        let settings =
            GridSettingsBuilder::new(origin_x, origin_z, width, height, count_x, count_y).build()?;
        Ok(Self::from_settings(&settings))
    }
}

impl<N: Neighborhood> PathGrid<N> {
    /// Creates a new [`PathGrid`] with the given [`GridSettings`].
    pub fn from_settings(settings: &GridSettings) -> Self {
        let GridInternalSettings {
            origin,
            size,
            segment_count,
            bounds,
            heuristic,
            default_impassable,
            ref filters,
        } = settings.0;

        let neighborhood = N::default();
        let filters = filters
            .clone()
            .unwrap_or_else(|| default_filters(&neighborhood));

        PathGrid {
            heuristic: heuristic.unwrap_or_else(|| neighborhood.heuristic()),
            neighborhood,
            filters,
            origin,
            size,
            cell_size: size / segment_count.as_vec2(),
            segment_count,
            bounds,
            blocked: Array2::from_elem(
                (segment_count.y as usize, segment_count.x as usize),
                default_impassable,
            ),
        }
    }

    /// Returns the neighborhood used by this grid.
    pub fn neighborhood(&self) -> &N {
        &self.neighborhood
    }

    pub fn heuristic_kind(&self) -> Heuristic {
        self.heuristic
    }

    /// World position (X, Z) of the grid's minimum corner.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// World extent of the grid.
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// World extent of a single cell.
    pub fn cell_size(&self) -> Vec2 {
        self.cell_size
    }

    pub fn segment_count_x(&self) -> u32 {
        self.segment_count.x
    }

    pub fn segment_count_y(&self) -> u32 {
        self.segment_count.y
    }

    /// Segment counts along both axes.
    pub fn dimensions(&self) -> UVec2 {
        self.segment_count
    }

    /// Cells searches are restricted to, max exclusive.
    pub fn bounds(&self) -> URect {
        self.bounds
    }

    /// Restricts searches to `bounds`, which has to be non-empty and inside the grid.
    pub fn set_bounds(&mut self, bounds: URect) -> Result<(), GridError> {
        let full = URect::from_corners(UVec2::ZERO, self.segment_count);
        if bounds.is_empty() || full.union(bounds) != full {
            return Err(GridError::InvalidBounds {
                bounds,
                dimensions: self.segment_count,
            });
        }
        self.bounds = bounds;
        Ok(())
    }

    /// Returns an [`ndarray::ArrayView2<bool>`] of the blocked flags, indexed `[[y, x]]`.
    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.blocked.view()
    }

    /// Checks if a cell coordinate is inside the grid.
    #[inline]
    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.segment_count.x && y < self.segment_count.y
    }

    #[inline]
    fn in_search_bounds(&self, cell: IVec2) -> bool {
        in_rect(self.bounds, cell)
    }

    fn check_cell(&self, x: u32, y: u32) -> Result<(), GridError> {
        if self.in_bounds(x, y) {
            Ok(())
        } else {
            Err(GridError::OutOfBounds {
                cell: UVec2::new(x, y),
                dimensions: self.segment_count,
            })
        }
    }

    /// Marks the cell at (`x`, `y`) as blocked. Marking twice has no further effect.
    ///
    /// # Panics
    /// If the cell is outside the grid. Use [`PathGrid::try_mark`] to get an error instead.
    pub fn mark(&mut self, x: u32, y: u32) {
        if let Err(err) = self.try_mark(x, y) {
            panic!("{err}");
        }
    }

    pub fn try_mark(&mut self, x: u32, y: u32) -> Result<(), GridError> {
        self.check_cell(x, y)?;
        self.blocked[[y as usize, x as usize]] = true;
        Ok(())
    }

    /// Clears the mark of the cell at (`x`, `y`).
    ///
    /// # Panics
    /// If the cell is outside the grid.
    pub fn unmark(&mut self, x: u32, y: u32) {
        if let Err(err) = self.try_unmark(x, y) {
            panic!("{err}");
        }
    }

    pub fn try_unmark(&mut self, x: u32, y: u32) -> Result<(), GridError> {
        self.check_cell(x, y)?;
        self.blocked[[y as usize, x as usize]] = false;
        Ok(())
    }

    /// Checks if the cell at (`x`, `y`) is blocked. Panics if the cell is outside the grid.
    pub fn is_marked(&self, x: u32, y: u32) -> bool {
        assert!(self.in_bounds(x, y), "cell ({x}, {y}) is outside the grid");
        self.blocked[[y as usize, x as usize]]
    }

    /// Marks the cell under a world position, positions outside the grid are clamped.
    pub fn mark_position(&mut self, position: Vec2) {
        let cell = self.position_to_cell(position);
        self.blocked[[cell.y as usize, cell.x as usize]] = true;
    }

    /// Clears the cell under a world position, positions outside the grid are clamped.
    pub fn unmark_position(&mut self, position: Vec2) {
        let cell = self.position_to_cell(position);
        self.blocked[[cell.y as usize, cell.x as usize]] = false;
    }

    /// Checks the cell under a world position, positions outside the grid are clamped.
    pub fn is_marked_position(&self, position: Vec2) -> bool {
        let cell = self.position_to_cell(position);
        self.blocked[[cell.y as usize, cell.x as usize]]
    }

    /// Test if the cell at `index` is unmarked and inside the search bounds.
    #[inline]
    pub fn is_walkable(&self, index: usize) -> bool {
        let cell = self.to_cell(index);
        self.is_walkable_cell(cell.x, cell.y)
    }

    #[inline]
    pub fn is_walkable_cell(&self, x: u32, y: u32) -> bool {
        self.in_search_bounds(UVec2::new(x, y).as_ivec2()) && !self.is_marked(x, y)
    }

    /// Number of walkable cells in the grid.
    pub fn walkable_count(&self) -> usize {
        self.blocked.iter().filter(|blocked| !**blocked).count()
    }

    /// Flat index of the cell at (`x`, `y`). Panics if the cell is outside the grid.
    #[inline]
    pub fn to_index(&self, x: u32, y: u32) -> usize {
        assert!(self.in_bounds(x, y), "cell ({x}, {y}) is outside the grid");
        x as usize + y as usize * self.segment_count.x as usize
    }

    /// Cell coordinate of a flat index. Panics if the index is outside the grid.
    #[inline]
    pub fn to_cell(&self, index: usize) -> UVec2 {
        assert!(
            index < self.node_count(),
            "index {index} is outside a grid of {} cells",
            self.node_count()
        );
        let width = self.segment_count.x as usize;
        UVec2::new((index % width) as u32, (index / width) as u32)
    }

    /// Clamps a world position into the grid rectangle.
    pub fn clamp_position(&self, position: Vec2) -> Vec2 {
        position.clamp(self.origin, self.origin + self.size)
    }

    /// Checks if a world position lies inside the grid rectangle.
    pub fn contains_position(&self, position: Vec2) -> bool {
        position.cmpge(self.origin).all() && position.cmple(self.origin + self.size).all()
    }

    /// The cell under a world position. Positions outside the grid are clamped to the nearest cell.
    pub fn position_to_cell(&self, position: Vec2) -> UVec2 {
        let local = (self.clamp_position(position) - self.origin) / self.cell_size;
        let max = self.segment_count - UVec2::ONE;
        UVec2::new(
            (local.x.max(0.0) as u32).min(max.x),
            (local.y.max(0.0) as u32).min(max.y),
        )
    }

    /// Flat index of the cell under a world position, clamped into the grid.
    pub fn position_to_index(&self, position: Vec2) -> usize {
        let cell = self.position_to_cell(position);
        self.to_index(cell.x, cell.y)
    }

    /// World position of a cell's centre. Panics if the cell is outside the grid.
    pub fn cell_to_position(&self, cell: UVec2) -> Vec2 {
        assert!(self.in_bounds(cell.x, cell.y), "cell {cell} is outside the grid");
        self.origin + (cell.as_vec2() + Vec2::splat(0.5)) * self.cell_size
    }

    /// World position of the centre of the cell at `index`.
    pub fn index_to_position(&self, index: usize) -> Vec2 {
        self.cell_to_position(self.to_cell(index))
    }

    /// World rectangle covered by a cell.
    pub fn cell_bounds(&self, cell: UVec2) -> Rect {
        assert!(self.in_bounds(cell.x, cell.y), "cell {cell} is outside the grid");
        let min = self.origin + cell.as_vec2() * self.cell_size;
        Rect::from_corners(min, min + self.cell_size)
    }

    /// Bits of [`ORDINAL_2D_OFFSETS`] leading to walkable cells inside the search bounds,
    /// after the neighbor filters ran.
    pub fn neighbor_mask(&self, index: usize) -> u8 {
        self.neighbor_mask_within(index, self.bounds)
    }

    fn neighbor_mask_within(&self, index: usize, bounds: URect) -> u8 {
        let cell = self.to_cell(index);
        let origin = cell.as_ivec2();
        let allowed = self.neighborhood.mask();
        let mut mask = 0u8;

        for (i, offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            if (allowed >> i) & 1 == 0 {
                continue;
            }

            let neighbor = origin + *offset;
            if in_rect(bounds, neighbor) && !self.blocked[[neighbor.y as usize, neighbor.x as usize]]
            {
                mask |= 1 << i;
            }
        }

        if mask != 0 {
            let view = self.blocked.view();
            for filter in &self.filters {
                mask = filter.filter(cell, mask, &view);
            }
        }

        mask
    }

    fn mask_to_indices(&self, index: usize, mask: u8) -> impl Iterator<Item = usize> {
        let width = self.segment_count.x as isize;
        ORDINAL_2D_OFFSETS
            .iter()
            .enumerate()
            .filter(move |(i, _)| (mask >> i) & 1 != 0)
            .map(move |(_, offset)| {
                (index as isize + offset.x as isize + offset.y as isize * width) as usize
            })
    }

    /// Returns an iterator over the indices of the cells reachable in one step from `index`.
    pub fn neighbor_iter(&self, index: usize) -> impl Iterator<Item = usize> {
        self.mask_to_indices(index, self.neighbor_mask(index))
    }

    /// Like [`PathGrid::neighbor_iter`], ignoring the search bounds.
    pub(crate) fn neighbor_iter_unbounded(&self, index: usize) -> impl Iterator<Item = usize> {
        let full = URect::from_corners(UVec2::ZERO, self.segment_count);
        self.mask_to_indices(index, self.neighbor_mask_within(index, full))
    }

    /// Appends the edges leaving `index` to walkable neighbors.
    pub fn neighbors(&self, index: usize, edges: &mut Vec<Edge>) {
        let mask = self.neighbor_mask(index);
        let width = self.segment_count.x as isize;

        for (i, offset) in ORDINAL_2D_OFFSETS.iter().enumerate() {
            if (mask >> i) & 1 == 0 {
                continue;
            }
            let to = (index as isize + offset.x as isize + offset.y as isize * width) as usize;
            edges.push(Edge::new(index, to, step_cost(*offset, self.cell_size)));
        }
    }

    /// Cost of a sequence of cell indices, stepping between consecutive cells.
    /// Returns `None` if two consecutive cells aren't neighbors.
    pub fn path_cost(&self, path: &[usize]) -> Option<f32> {
        let mut cost = 0.0;
        for pair in path.windows(2) {
            let from = self.to_cell(pair[0]).as_ivec2();
            let to = self.to_cell(pair[1]).as_ivec2();
            let offset = to - from;
            let bit = ORDINAL_2D_OFFSETS.iter().position(|o| *o == offset)?;
            if (self.neighbor_mask(pair[0]) >> bit) & 1 == 0 {
                return None;
            }
            cost += step_cost(offset, self.cell_size);
        }
        Some(cost)
    }

    /// Merges the walkable cells into disjoint rectangles (max exclusive, in cell space).
    ///
    /// Each rectangle grows from its first free cell alternately along Y and X until it
    /// hits a blocked or covered cell. It never grows more than four times longer than wide.
    pub fn walkable_rectangles(&self) -> Vec<URect> {
        let mut covered = self.blocked.clone();
        let (width, height) = (self.segment_count.x as usize, self.segment_count.y as usize);
        let mut rectangles = Vec::new();

        for y in 0..height {
            for x in 0..width {
                if covered[[y, x]] {
                    continue;
                }

                let (mut max_x, mut max_y) = (x, y);
                let (mut grow_x, mut grow_y) = (true, true);
                let mut turn = false;

                while grow_x || grow_y {
                    if turn && grow_x {
                        let next = max_x + 1;
                        let w = (next - x + 1) as u32;
                        let h = (max_y - y + 1) as u32;
                        if next >= width
                            || (y..=max_y).any(|i| covered[[i, next]])
                            || (!grow_y && w > h * MAX_RECTANGLE_ASPECT)
                        {
                            grow_x = false;
                        } else {
                            max_x = next;
                        }
                    } else if !turn && grow_y {
                        let next = max_y + 1;
                        let w = (max_x - x + 1) as u32;
                        let h = (next - y + 1) as u32;
                        if next >= height
                            || (x..=max_x).any(|i| covered[[next, i]])
                            || (!grow_x && h > w * MAX_RECTANGLE_ASPECT)
                        {
                            grow_y = false;
                        } else {
                            max_y = next;
                        }
                    }
                    turn = !turn;
                }

                covered
                    .slice_mut(ndarray::s![y..=max_y, x..=max_x])
                    .fill(true);
                rectangles.push(URect::new(
                    x as u32,
                    y as u32,
                    max_x as u32 + 1,
                    max_y as u32 + 1,
                ));
            }
        }

        rectangles
    }
}

#[inline(always)]
fn in_rect(rect: URect, cell: IVec2) -> bool {
    cell.x >= rect.min.x as i32
        && cell.y >= rect.min.y as i32
        && cell.x < rect.max.x as i32
        && cell.y < rect.max.y as i32
}

fn default_filters<N: Neighborhood>(neighborhood: &N) -> Vec<SharedFilter> {
    if neighborhood.is_ordinal() {
        vec![Arc::new(NoCornerClipping)]
    } else {
        Vec::new()
    }
}

impl<N: Neighborhood> Graph for PathGrid<N> {
    #[inline]
    fn node_count(&self) -> usize {
        self.segment_count.x as usize * self.segment_count.y as usize
    }

    #[inline]
    fn max_edge_count(&self) -> usize {
        self.neighborhood.mask().count_ones() as usize
    }

    #[inline]
    fn edges(&self, node: usize, edges: &mut Vec<Edge>) {
        self.neighbors(node, edges);
    }

    #[inline]
    fn heuristic(&self, current: usize, end: usize) -> f32 {
        self.heuristic
            .distance(self.to_cell(current), self.to_cell(end), self.cell_size)
    }

    /// Walkable cells outside of the search bounds are treated as blocked.
    #[inline]
    fn is_walkable(&self, node: usize) -> bool {
        PathGrid::is_walkable(self, node)
    }
}

impl<N: Neighborhood> fmt::Debug for PathGrid<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathGrid")
            .field("neighborhood", &self.neighborhood)
            .field("heuristic", &self.heuristic)
            .field("filters", &self.filters.len())
            .field("origin", &self.origin)
            .field("size", &self.size)
            .field("segment_count", &self.segment_count)
            .field("bounds", &self.bounds)
            .finish()
    }
}

/// Minimal persisted form of a [`PathGrid`]: header plus blocked bits packed
/// LSB first in row-major cell order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathGridData {
    pub origin: [f32; 2],
    pub size: [f32; 2],
    pub segment_count: [u32; 2],
    /// `[min_x, min_y, max_x, max_y]`, max exclusive.
    pub bounds: [u32; 4],
    pub blocked: Vec<u8>,
}

impl<N: Neighborhood> PathGrid<N> {
    /// Snapshot of the grid's persisted fields.
    pub fn to_data(&self) -> PathGridData {
        let mut blocked = vec![0u8; self.node_count().div_ceil(8)];
        for (i, _) in self.blocked.iter().enumerate().filter(|(_, b)| **b) {
            blocked[i / 8] |= 1 << (i % 8);
        }

        PathGridData {
            origin: self.origin.to_array(),
            size: self.size.to_array(),
            segment_count: self.segment_count.to_array(),
            bounds: [
                self.bounds.min.x,
                self.bounds.min.y,
                self.bounds.max.x,
                self.bounds.max.y,
            ],
            blocked,
        }
    }

    /// Restores a grid from [`PathGridData`] with the neighborhood's default filters.
    pub fn from_data(data: &PathGridData) -> Result<Self, GridError> {
        let settings = GridSettingsBuilder::new(
            data.origin[0],
            data.origin[1],
            data.size[0],
            data.size[1],
            data.segment_count[0],
            data.segment_count[1],
        )
        .bounds(URect::new(
            data.bounds[0],
            data.bounds[1],
            data.bounds[2],
            data.bounds[3],
        ))
        .build()?;

        let mut grid = Self::from_settings(&settings);
        let expected = grid.node_count().div_ceil(8);
        if data.blocked.len() != expected {
            return Err(GridError::DataLength {
                expected,
                found: data.blocked.len(),
            });
        }

        for (i, blocked) in grid.blocked.iter_mut().enumerate() {
            *blocked = (data.blocked[i / 8] >> (i % 8)) & 1 != 0;
        }

        Ok(grid)
    }
}
