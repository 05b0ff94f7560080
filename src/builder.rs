//! Rasterizes walkability from a 3D scene into a [`PathGrid`].
//!
//! The scene is sampled with downward rays on a regular XZ lattice to get a heightmap.
//! Cells whose corners differ too much in height are too steep to walk, and cells with
//! scene geometry inside the space an actor occupies above the ground are obstructed.
use std::sync::Mutex;

use bevy::{
    log::info,
    math::{bounding::Aabb3d, Dir3, UVec2, Vec2, Vec3, Vec3A},
};
use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    error::BuildError,
    grid::{GridSettingsBuilder, PathGrid},
    neighbor::{Neighborhood, OrdinalNeighborhood},
};

/// The scene a [`PathGridBuilder`] samples.
///
/// Queries take `&mut self` so scenes can build their acceleration structures lazily.
/// The builder never calls into the scene from two threads at once.
pub trait SceneQuery {
    /// Obstacle geometry reported by [`SceneQuery::query_box`].
    type Geometry;

    /// World space bounds of everything walkable or obstructing.
    fn bounds(&self) -> Aabb3d;

    /// Distance along `direction` from `origin` to the nearest walkable surface.
    fn cast_ray(&mut self, origin: Vec3, direction: Dir3) -> Option<f32>;

    /// Appends the obstacle geometry overlapping `aabb` to `geometry`.
    fn query_box(&mut self, aabb: &Aabb3d, geometry: &mut Vec<Self::Geometry>);
}

/// Sampling and walkability limits of a [`PathGridBuilder`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuilderSettings {
    /// Distance between height samples, which is also the cell size of the built grid.
    pub step: f32,
    /// Steepest walkable slope in radians.
    pub max_slope: f32,
    /// Clearance an actor needs above the ground.
    pub max_actor_height: f32,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        BuilderSettings {
            step: 1.0,
            max_slope: std::f32::consts::FRAC_PI_4,
            max_actor_height: 2.0,
        }
    }
}

impl BuilderSettings {
    pub fn validate(&self) -> Result<(), BuildError> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(BuildError::InvalidSettings("step must be positive"));
        }
        if !(0.0..std::f32::consts::FRAC_PI_2).contains(&self.max_slope) {
            return Err(BuildError::InvalidSettings(
                "max_slope must be in [0, pi/2) radians",
            ));
        }
        if !self.max_actor_height.is_finite() || self.max_actor_height < 0.0 {
            return Err(BuildError::InvalidSettings(
                "max_actor_height must not be negative",
            ));
        }
        Ok(())
    }

    /// Largest height difference allowed between two samples one step apart.
    pub fn max_height_difference(&self) -> f32 {
        self.step * self.max_slope.tan()
    }
}

/// Ground heights sampled on a regular lattice, indexed `[[z, x]]`.
/// Samples without ground are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightmap {
    heights: Array2<f32>,
    origin: Vec2,
    step: f32,
}

impl Heightmap {
    /// Creates a heightmap from samples `step` apart, the first at `origin` (world X, Z).
    pub fn new(heights: Array2<f32>, origin: Vec2, step: f32) -> Self {
        Heightmap {
            heights,
            origin,
            step,
        }
    }

    pub fn heights(&self) -> ArrayView2<'_, f32> {
        self.heights.view()
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Number of cells between the samples.
    pub fn cell_count(&self) -> UVec2 {
        let (rows, columns) = self.heights.dim();
        UVec2::new(columns.saturating_sub(1) as u32, rows.saturating_sub(1) as u32)
    }

    /// World extent covered by the cells.
    pub fn size(&self) -> Vec2 {
        self.cell_count().as_vec2() * self.step
    }

    /// Height at sample (`x`, `z`).
    pub fn height(&self, x: usize, z: usize) -> f32 {
        self.heights[[z, x]]
    }

    /// Heights at the corners of cell (`x`, `z`):
    /// `[min corner, +x, +z, opposite corner]`.
    #[inline]
    pub fn corners(&self, x: usize, z: usize) -> [f32; 4] {
        [
            self.heights[[z, x]],
            self.heights[[z, x + 1]],
            self.heights[[z + 1, x]],
            self.heights[[z + 1, x + 1]],
        ]
    }
}

/// Builds [`PathGrid`]s from a [`SceneQuery`].
///
/// # Example
/// ```
/// use bevy::math::{bounding::Aabb3d, Dir3, Vec3};
/// use bevy_pathgrid::prelude::*;
///
/// // A flat floor at y = 0.
/// struct Floor;
///
/// impl SceneQuery for Floor {
///     type Geometry = ();
///
///     fn bounds(&self) -> Aabb3d {
///         Aabb3d::new(Vec3::new(8.0, 0.5, 8.0), Vec3::new(8.0, 0.5, 8.0))
///     }
///
///     fn cast_ray(&mut self, origin: Vec3, _direction: Dir3) -> Option<f32> {
///         Some(origin.y)
///     }
///
///     fn query_box(&mut self, _aabb: &Aabb3d, _geometry: &mut Vec<()>) {}
/// }
///
/// let builder = PathGridBuilder::new(BuilderSettings::default()).unwrap();
/// let grid = builder.build(&mut Floor).unwrap();
/// assert_eq!(grid.dimensions().x, 16);
/// assert_eq!(grid.walkable_count(), 16 * 16);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathGridBuilder {
    settings: BuilderSettings,
}

impl PathGridBuilder {
    pub fn new(settings: BuilderSettings) -> Result<Self, BuildError> {
        settings.validate()?;
        Ok(PathGridBuilder { settings })
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// Builds an eight-way [`PathGrid`] with the default grid settings.
    pub fn build<S>(&self, scene: &mut S) -> Result<PathGrid<OrdinalNeighborhood>, BuildError>
    where
        S: SceneQuery + Send,
    {
        self.build_with(scene, |settings| settings)
    }

    /// Builds a [`PathGrid`], letting `configure` adjust the grid settings derived from the scene.
    pub fn build_with<N, S, F>(&self, scene: &mut S, configure: F) -> Result<PathGrid<N>, BuildError>
    where
        N: Neighborhood,
        S: SceneQuery + Send,
        F: FnOnce(GridSettingsBuilder) -> GridSettingsBuilder,
    {
        let bounds = scene.bounds();
        let scene = Mutex::new(scene);

        let start = std::time::Instant::now();
        let heightmap = self.sample_heightmap(&scene, bounds)?;
        let cells = heightmap.cell_count();
        info!(
            "Sampled {}x{} heights in {:?}",
            cells.x + 1,
            cells.y + 1,
            start.elapsed()
        );

        let start = std::time::Instant::now();
        let mut blocked = self.slope_map(&heightmap)?;
        info!("Built slope map in {:?}", start.elapsed());

        let start = std::time::Instant::now();
        self.obstacle_test(&scene, &heightmap, &mut blocked)?;
        info!("Tested obstacles in {:?}", start.elapsed());

        let size = heightmap.size();
        let settings = configure(GridSettingsBuilder::new(
            heightmap.origin().x,
            heightmap.origin().y,
            size.x,
            size.y,
            cells.x,
            cells.y,
        ))
        .build()?;

        let mut grid = PathGrid::from_settings(&settings);
        for ((y, x), &is_blocked) in blocked.indexed_iter() {
            if is_blocked {
                grid.try_mark(x as u32, y as u32)?;
            } else {
                grid.try_unmark(x as u32, y as u32)?;
            }
        }

        info!(
            "Built path grid with {} of {} cells walkable",
            grid.walkable_count(),
            cells.x * cells.y
        );
        Ok(grid)
    }

    /// Casts a ray straight down from the top of the scene at every sample point.
    fn sample_heightmap<S>(
        &self,
        scene: &Mutex<&mut S>,
        bounds: Aabb3d,
    ) -> Result<Heightmap, BuildError>
    where
        S: SceneQuery + Send,
    {
        let step = self.settings.step;
        let min = Vec3::from(bounds.min);
        let max = Vec3::from(bounds.max);
        let extent = max - min;

        if !extent.is_finite() {
            return Err(BuildError::InvalidSettings("scene bounds must be finite"));
        }
        let samples_x = (extent.x / step).round() as usize + 1;
        let samples_z = (extent.z / step).round() as usize + 1;
        if samples_x < 2 || samples_z < 2 {
            return Err(BuildError::EmptyScene { step });
        }

        let mut heights = Array2::from_elem((samples_z, samples_x), f32::NAN);
        for_each_row(&mut heights, |z, mut row| {
            for (x, height) in row.iter_mut().enumerate() {
                let origin = Vec3::new(min.x + x as f32 * step, max.y, min.z + z as f32 * step);
                let hit = scene
                    .lock()
                    .map_err(|_| BuildError::ScenePoisoned)?
                    .cast_ray(origin, Dir3::NEG_Y);
                if let Some(distance) = hit {
                    *height = max.y - distance;
                }
            }
            Ok(())
        })?;

        Ok(Heightmap::new(heights, Vec2::new(min.x, min.z), step))
    }

    /// Blocks cells that are too steep along any side or diagonal, or lack ground at a corner.
    pub fn slope_map(&self, heightmap: &Heightmap) -> Result<Array2<bool>, BuildError> {
        let max_difference = self.settings.max_height_difference();
        let max_diagonal = max_difference * std::f32::consts::SQRT_2;
        let cells = heightmap.cell_count();

        let mut blocked = Array2::from_elem((cells.y as usize, cells.x as usize), false);
        for_each_row(&mut blocked, |z, mut row| {
            for (x, blocked) in row.iter_mut().enumerate() {
                let [p1, p2, p3, p4] = heightmap.corners(x, z);
                *blocked = [p1, p2, p3, p4].iter().any(|h| h.is_nan())
                    || (p1 - p2).abs() > max_difference
                    || (p1 - p3).abs() > max_difference
                    || (p2 - p4).abs() > max_difference
                    || (p3 - p4).abs() > max_difference
                    || (p1 - p4).abs() > max_diagonal
                    || (p2 - p3).abs() > max_diagonal;
            }
            Ok(())
        })?;

        Ok(blocked)
    }

    /// Blocks walkable cells with scene geometry in the actor's space above them.
    fn obstacle_test<S>(
        &self,
        scene: &Mutex<&mut S>,
        heightmap: &Heightmap,
        blocked: &mut Array2<bool>,
    ) -> Result<(), BuildError>
    where
        S: SceneQuery + Send,
    {
        let step = self.settings.step;
        let origin = heightmap.origin();

        for_each_row(blocked, |z, mut row| {
            let mut geometry = Vec::new();
            for (x, blocked) in row.iter_mut().enumerate().filter(|(_, b)| !**b) {
                let ground = heightmap.corners(x, z).iter().sum::<f32>() * 0.25;
                let min = Vec3::new(origin.x + x as f32 * step, ground, origin.y + z as f32 * step);
                let max = min + Vec3::new(step, self.settings.max_actor_height, step);
                let aabb = Aabb3d {
                    min: Vec3A::from(min),
                    max: Vec3A::from(max),
                };

                geometry.clear();
                scene
                    .lock()
                    .map_err(|_| BuildError::ScenePoisoned)?
                    .query_box(&aabb, &mut geometry);
                *blocked = !geometry.is_empty();
            }
            Ok(())
        })
    }
}

/// Runs `f` on every row of `array`, in parallel with the `parallel` feature.
fn for_each_row<T, F>(array: &mut Array2<T>, f: F) -> Result<(), BuildError>
where
    T: Send + Sync,
    F: Fn(usize, ArrayViewMut1<T>) -> Result<(), BuildError> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        array
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(y, row)| f(y, row))
    }

    #[cfg(not(feature = "parallel"))]
    {
        array
            .axis_iter_mut(Axis(0))
            .enumerate()
            .try_for_each(|(y, row)| f(y, row))
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::bounding::IntersectsVolume;

    use super::*;
    use crate::{graph::Graph, neighbor::CardinalNeighborhood};

    struct TestScene {
        bounds: Aabb3d,
        ground: fn(f32, f32) -> Option<f32>,
        obstacles: Vec<Aabb3d>,
        rays: usize,
    }

    impl TestScene {
        fn new(size: f32, top: f32, ground: fn(f32, f32) -> Option<f32>) -> Self {
            TestScene {
                bounds: Aabb3d {
                    min: Vec3A::ZERO,
                    max: Vec3A::new(size, top, size),
                },
                ground,
                obstacles: Vec::new(),
                rays: 0,
            }
        }
    }

    impl SceneQuery for TestScene {
        type Geometry = Aabb3d;

        fn bounds(&self) -> Aabb3d {
            self.bounds
        }

        fn cast_ray(&mut self, origin: Vec3, direction: Dir3) -> Option<f32> {
            assert_eq!(direction, Dir3::NEG_Y);
            self.rays += 1;
            (self.ground)(origin.x, origin.z).map(|height| origin.y - height)
        }

        fn query_box(&mut self, aabb: &Aabb3d, geometry: &mut Vec<Aabb3d>) {
            geometry.extend(self.obstacles.iter().filter(|o| o.intersects(aabb)));
        }
    }

    fn builder(settings: BuilderSettings) -> PathGridBuilder {
        PathGridBuilder::new(settings).unwrap()
    }

    #[test]
    fn test_flat_scene_is_walkable() {
        let mut scene = TestScene::new(10.0, 1.0, |_, _| Some(0.5));
        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();

        assert_eq!(grid.dimensions(), UVec2::new(10, 10));
        assert_eq!(grid.origin(), Vec2::ZERO);
        assert_eq!(grid.size(), Vec2::new(10.0, 10.0));
        assert_eq!(grid.walkable_count(), 100);
        assert_eq!(scene.rays, 11 * 11);
    }

    #[test]
    fn test_heightmap_samples() {
        let mut scene = TestScene::new(4.0, 10.0, |x, z| Some(x + z * 0.5));
        let builder = builder(BuilderSettings {
            step: 2.0,
            ..Default::default()
        });
        let bounds = scene.bounds();
        let heightmap = builder.sample_heightmap(&Mutex::new(&mut scene), bounds).unwrap();

        assert_eq!(heightmap.cell_count(), UVec2::new(2, 2));
        assert_eq!(heightmap.height(0, 0), 0.0);
        assert_eq!(heightmap.height(2, 0), 4.0);
        assert_eq!(heightmap.height(1, 2), 4.0);
        assert_eq!(heightmap.corners(1, 1), [3.0, 5.0, 4.0, 6.0]);
    }

    #[test]
    fn test_steep_slope_is_blocked() {
        let mut scene = TestScene::new(10.0, 20.0, |x, _| Some((x - 5.0).max(0.0) * 3.0));
        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();

        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(grid.is_marked(x, y), x >= 5, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_gentle_slope_is_walkable() {
        let mut scene = TestScene::new(10.0, 20.0, |x, z| Some(x * 0.5 + z * 0.5));
        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();
        assert_eq!(grid.walkable_count(), 100);
    }

    #[test]
    fn test_diagonal_slope_limit() {
        // Height changes by 0.9 per step along both axes: fine on the sides, too much across
        // the diagonal with a 45 degree limit (1.8 > sqrt(2)).
        let mut scene = TestScene::new(4.0, 20.0, |x, z| Some((x + z) * 0.9));
        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();
        assert_eq!(grid.walkable_count(), 0);

        let mut scene = TestScene::new(4.0, 20.0, |x, z| Some((x - z) * 0.9 + 10.0));
        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();
        assert_eq!(grid.walkable_count(), 0);
    }

    #[test]
    fn test_missing_ground_is_blocked() {
        let mut scene = TestScene::new(6.0, 1.0, |x, z| {
            let hole = (x - 3.0).abs() < 0.1 && (z - 3.0).abs() < 0.1;
            (!hole).then_some(0.0)
        });
        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();

        assert_eq!(grid.walkable_count(), 36 - 4);
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            assert!(grid.is_marked(x, y));
        }
    }

    #[test]
    fn test_obstacles_within_actor_height() {
        let mut scene = TestScene::new(8.0, 10.0, |_, _| Some(0.0));
        // Low crate inside cell (3, 3).
        scene.obstacles.push(Aabb3d {
            min: Vec3A::new(3.2, 0.5, 3.2),
            max: Vec3A::new(3.8, 1.0, 3.8),
        });
        // Overhang above cell (5, 1), out of the actor's reach.
        scene.obstacles.push(Aabb3d {
            min: Vec3A::new(5.2, 5.0, 1.2),
            max: Vec3A::new(5.8, 6.0, 1.8),
        });

        let grid = builder(BuilderSettings::default()).build(&mut scene).unwrap();
        assert!(grid.is_marked(3, 3));
        assert!(!grid.is_marked(5, 1));
        assert_eq!(grid.walkable_count(), 63);

        // A taller actor hits the overhang.
        let grid = builder(BuilderSettings {
            max_actor_height: 5.5,
            ..Default::default()
        })
        .build(&mut scene)
        .unwrap();
        assert!(grid.is_marked(5, 1));
    }

    #[test]
    fn test_build_with_grid_settings() {
        let mut scene = TestScene::new(4.0, 1.0, |_, _| Some(0.0));
        let grid: PathGrid<CardinalNeighborhood> = builder(BuilderSettings::default())
            .build_with(&mut scene, |settings| settings.default_impassable())
            .unwrap();

        assert_eq!(grid.max_edge_count(), 4);
        assert_eq!(grid.walkable_count(), 16);
    }

    #[test]
    fn test_build_with_impassable_default_keeps_obstacles() {
        let mut scene = TestScene::new(4.0, 1.0, |_, _| Some(0.0));
        scene.obstacles.push(Aabb3d {
            min: Vec3A::new(1.25, 0.75, 2.25),
            max: Vec3A::new(1.75, 1.25, 2.75),
        });
        let grid: PathGrid = builder(BuilderSettings::default())
            .build_with(&mut scene, |settings| settings.default_impassable())
            .unwrap();

        assert!(grid.is_marked(1, 2));
        assert_eq!(grid.walkable_count(), 15);
    }

    #[test]
    fn test_invalid_settings() {
        let invalid = [
            BuilderSettings {
                step: 0.0,
                ..Default::default()
            },
            BuilderSettings {
                step: f32::NAN,
                ..Default::default()
            },
            BuilderSettings {
                max_slope: std::f32::consts::FRAC_PI_2,
                ..Default::default()
            },
            BuilderSettings {
                max_slope: -0.1,
                ..Default::default()
            },
            BuilderSettings {
                max_actor_height: -1.0,
                ..Default::default()
            },
        ];

        for settings in invalid {
            assert!(matches!(
                PathGridBuilder::new(settings),
                Err(BuildError::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn test_scene_smaller_than_a_cell() {
        let mut scene = TestScene::new(0.4, 1.0, |_, _| Some(0.0));
        assert_eq!(
            builder(BuilderSettings::default()).build(&mut scene).unwrap_err(),
            BuildError::EmptyScene { step: 1.0 }
        );
    }
}
