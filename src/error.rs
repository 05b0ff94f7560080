//! Error types returned by grid construction and the grid builder.
use bevy::math::{URect, UVec2};
use thiserror::Error;

/// Errors raised while constructing or restoring a [`crate::grid::PathGrid`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// World size must be finite and positive, segment counts must be at least 1.
    #[error("invalid grid dimensions: size {width}x{height}, segments {count_x}x{count_y}")]
    InvalidDimensions {
        width: f32,
        height: f32,
        count_x: u32,
        count_y: u32,
    },
    /// A cell coordinate outside `[0, count_x) x [0, count_y)`.
    #[error("cell {cell} is outside of a {dimensions} grid")]
    OutOfBounds { cell: UVec2, dimensions: UVec2 },
    /// Search bounds have to be non-empty and contained by the grid.
    #[error("search bounds {bounds:?} are not contained by a {dimensions} grid")]
    InvalidBounds { bounds: URect, dimensions: UVec2 },
    /// Persisted cell data does not match the persisted dimensions.
    #[error("expected {expected} bytes of cell data, found {found}")]
    DataLength { expected: usize, found: usize },
}

/// Errors raised by [`crate::builder::PathGridBuilder`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("invalid builder settings: {0}")]
    InvalidSettings(&'static str),
    /// The scene bounds are too small to hold a single cell at the sampling step.
    #[error("scene bounds cover less than one cell at step {step}")]
    EmptyScene { step: f32 },
    /// A scene query panicked while another row held the scene lock.
    #[error("scene query lock was poisoned")]
    ScenePoisoned,
    #[error(transparent)]
    Grid(#[from] GridError),
}
