//! Uniform grid pathfinding: walkability grids over the world's XZ plane, a reusable A*
//! search and a builder rasterizing grids from 3D scenes.
pub mod builder;
pub mod error;
pub mod filter;
pub mod flood_fill;
pub mod graph;
pub mod grid;
mod macros;
pub mod neighbor;
pub mod path;
pub mod plugin;
pub mod queue;
pub mod search;

pub mod prelude {
    pub use crate::builder::{BuilderSettings, Heightmap, PathGridBuilder, SceneQuery};
    pub use crate::error::{BuildError, GridError};
    pub use crate::filter::{NeighborFilter, NoCornerClipping, NoCornerCutting};
    pub use crate::flood_fill::UNREACHABLE_COMPONENT;
    pub use crate::graph::{Edge, Graph, NodeGraph};
    pub use crate::grid::{GridSettings, GridSettingsBuilder, PathGrid, PathGridData};
    pub use crate::neighbor::*;
    pub use crate::path::Path;
    pub use crate::plugin::{PathGridPlugin, Pathfind, PathfindingFailed, PathingSet};
    pub use crate::queue::PriorityQueue;
    pub use crate::search::{GraphSearch, SearchBudget, SearchOutcome};
}
