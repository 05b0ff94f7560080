use std::marker::PhantomData;

use bevy::{log, prelude::*};

use crate::{
    grid::PathGrid, macros::timed, neighbor::Neighborhood, path::Path, search::GraphSearch,
};

/// Answers [`Pathfind`] requests against the [`PathGrid<N>`] resource.
#[derive(Default)]
pub struct PathGridPlugin<N: Neighborhood> {
    _neighborhood: PhantomData<N>,
}

impl<N: Neighborhood> Plugin for PathGridPlugin<N> {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, pathfind::<N>.in_set(PathingSet));
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathingSet;

/// Request a path between two cells. Replaced by a [`Path`] or [`PathfindingFailed`]
/// the next time [`PathingSet`] runs.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pathfind {
    pub start: UVec2,
    pub goal: UVec2,
}

impl Pathfind {
    pub fn new(start: UVec2, goal: UVec2) -> Self {
        Pathfind { start, goal }
    }
}

/// Marker inserted when a [`Pathfind`] request had no answer.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct PathfindingFailed;

fn pathfind<N: Neighborhood>(
    grid: Option<Res<PathGrid<N>>>,
    mut commands: Commands,
    query: Query<(Entity, &Pathfind)>,
    mut search: Local<GraphSearch>,
    mut cells: Local<Vec<usize>>,
) {
    let Some(grid) = grid else {
        return;
    };

    for (entity, request) in &query {
        let Pathfind { start, goal } = *request;

        if !grid.in_bounds(start.x, start.y) || !grid.in_bounds(goal.x, goal.y) {
            log::warn!(
                "Pathfind request {:?} -> {:?} for {:?} is outside the {} grid",
                start,
                goal,
                entity,
                grid.dimensions()
            );
            fail(&mut commands, entity);
            continue;
        }

        let start = grid.to_index(start.x, start.y);
        let goal = grid.to_index(goal.x, goal.y);
        if !grid.is_walkable(start) || !grid.is_walkable(goal) {
            log::warn!(
                "Pathfind request {:?} for {:?} starts or ends on a blocked cell",
                request,
                entity
            );
            fail(&mut commands, entity);
            continue;
        }

        log::debug!("Pathfinding for entity: {:?}", entity);

        let found = timed!("Pathfind", { search.search(&*grid, start, goal, &mut *cells) });

        if found {
            let cost = search.last_cost().unwrap_or_default();
            commands
                .entity(entity)
                .insert(Path::from_indices(&*grid, &cells[..], cost))
                .remove::<(Pathfind, PathfindingFailed)>();
        } else {
            log::debug!(
                "No path for {:?} after expanding {} cells",
                entity,
                search.last_expanded()
            );
            fail(&mut commands, entity);
        }
    }
}

fn fail(commands: &mut Commands, entity: Entity) {
    commands
        .entity(entity)
        .insert(PathfindingFailed)
        .remove::<(Pathfind, Path)>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::OrdinalNeighborhood;

    fn app() -> App {
        let mut grid = PathGrid::new(0.0, 0.0, 5.0, 5.0, 5, 5).unwrap();
        for y in 0..4 {
            grid.mark(2, y);
        }

        let mut app = App::new();
        app.add_plugins(PathGridPlugin::<OrdinalNeighborhood>::default())
            .insert_resource(grid);
        app
    }

    #[test]
    fn test_pathfind_inserts_path() {
        let mut app = app();
        let entity = app
            .world_mut()
            .spawn(Pathfind::new(UVec2::new(0, 0), UVec2::new(4, 0)))
            .id();

        app.update();

        let world = app.world();
        let path = world.get::<Path>(entity).unwrap();
        assert_eq!(path.cells().first(), Some(&UVec2::new(0, 0)));
        assert_eq!(path.cells().last(), Some(&UVec2::new(4, 0)));
        assert!(path.contains(UVec2::new(2, 4)));
        assert_eq!(path.next_waypoint(), Some(Vec2::new(0.5, 0.5)));
        assert!(path.cost() > 4.0);
        assert!(world.get::<Pathfind>(entity).is_none());
        assert!(world.get::<PathfindingFailed>(entity).is_none());
    }

    #[test]
    fn test_unreachable_requests_fail() {
        let mut app = app();
        let blocked = app
            .world_mut()
            .spawn(Pathfind::new(UVec2::new(0, 0), UVec2::new(2, 0)))
            .id();
        let outside = app
            .world_mut()
            .spawn(Pathfind::new(UVec2::new(0, 0), UVec2::new(9, 0)))
            .id();

        app.update();

        for entity in [blocked, outside] {
            let world = app.world();
            assert!(world.get::<PathfindingFailed>(entity).is_some());
            assert!(world.get::<Pathfind>(entity).is_none());
            assert!(world.get::<Path>(entity).is_none());
        }
    }

    #[test]
    fn test_new_request_replaces_failure() {
        let mut app = app();
        let entity = app
            .world_mut()
            .spawn(Pathfind::new(UVec2::new(0, 0), UVec2::new(2, 0)))
            .id();
        app.update();
        assert!(app.world().get::<PathfindingFailed>(entity).is_some());

        app.world_mut()
            .entity_mut(entity)
            .insert(Pathfind::new(UVec2::new(0, 0), UVec2::new(1, 1)));
        app.update();

        let world = app.world();
        assert!(world.get::<PathfindingFailed>(entity).is_none());
        assert_eq!(world.get::<Path>(entity).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_grid_is_ignored() {
        let mut app = App::new();
        app.add_plugins(PathGridPlugin::<OrdinalNeighborhood>::default());
        let entity = app
            .world_mut()
            .spawn(Pathfind::new(UVec2::ZERO, UVec2::ONE))
            .id();

        app.update();
        assert!(app.world().get::<Pathfind>(entity).is_some());
    }
}
