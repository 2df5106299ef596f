//! Reference [SteppedWorld]: vehicles on a 4-connected grid with blocked cells.
//!
//! Vehicles are ECS entities carrying a [GridPosition] and an [Itinerary] of
//! legs. Each leg is the BFS shortest path from the previous target to the next
//! one, computed when the target is appended. [movement_system] moves every
//! vehicle one cell per step; a zero-length leg still takes one step.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;

use bevy_ecs::prelude::{Component, Entity, Query, ResMut, Resource, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;
use lru::LruCache;
use pathfinding::prelude::bfs;
use tracing::{debug, info};

use crate::error::{PoolError, WorldError};
use crate::model::Coord;
use crate::world::SteppedWorld;

const PATH_CACHE_SIZE: usize = 4_096;

#[derive(Debug, Clone, Copy, Component)]
pub struct FleetVehicle {
    pub id: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct GridPosition(pub Coord);

/// Remaining legs; each holds the cells still to enter, excluding the start.
#[derive(Debug, Clone, Default, Component)]
pub struct Itinerary {
    legs: VecDeque<VecDeque<Coord>>,
    /// Position after the last queued leg.
    end: Coord,
}

impl Itinerary {
    fn starting_at(position: Coord) -> Self {
        Self {
            legs: VecDeque::new(),
            end: position,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.legs.is_empty()
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn remaining_legs(&self) -> usize {
        self.legs.len()
    }
}

/// Steps executed since the world was created.
#[derive(Debug, Default, Resource)]
pub struct StepCount(pub u64);

pub fn movement_system(mut vehicles: Query<(&mut GridPosition, &mut Itinerary)>) {
    for (mut position, mut itinerary) in vehicles.iter_mut() {
        let Some(leg) = itinerary.legs.front_mut() else {
            continue;
        };
        if let Some(next) = leg.pop_front() {
            position.0 = next;
        }
        if leg.is_empty() {
            itinerary.legs.pop_front();
        }
    }
}

pub fn step_count_system(mut steps: ResMut<StepCount>) {
    steps.0 += 1;
}

#[derive(Debug, Clone)]
struct GridBounds {
    width: i64,
    height: i64,
    blocked: HashSet<Coord>,
}

impl GridBounds {
    fn is_open(&self, cell: Coord) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && cell.x < self.width
            && cell.y < self.height
            && !self.blocked.contains(&cell)
    }

    fn neighbours(&self, cell: Coord) -> Vec<Coord> {
        [(1, 0), (-1, 0), (0, 1), (0, -1)]
            .into_iter()
            .map(|(dx, dy)| Coord::new(cell.x + dx, cell.y + dy))
            .filter(|&c| self.is_open(c))
            .collect()
    }
}

pub struct GridWorld {
    world: World,
    schedule: Schedule,
    bounds: GridBounds,
    vehicles: HashMap<u32, Entity>,
    paths: LruCache<(Coord, Coord), VecDeque<Coord>>,
    closed: bool,
}

impl GridWorld {
    pub fn new(width: i64, height: i64) -> Result<Self, PoolError> {
        if width <= 0 || height <= 0 {
            return Err(PoolError::config(format!(
                "grid must have positive dimensions, got {width}x{height}"
            )));
        }
        let mut world = World::new();
        world.insert_resource(StepCount::default());

        let mut schedule = Schedule::default();
        schedule.add_systems((movement_system, step_count_system).chain());

        let cache_size = NonZeroUsize::new(PATH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            world,
            schedule,
            bounds: GridBounds {
                width,
                height,
                blocked: HashSet::new(),
            },
            vehicles: HashMap::new(),
            paths: LruCache::new(cache_size),
            closed: false,
        })
    }

    /// Square grid covering `0..size` on both axes.
    pub fn square(size: i64) -> Result<Self, PoolError> {
        Self::new(size, size)
    }

    /// Marks cells as impassable. Call before vehicles receive targets.
    pub fn with_blocked<I>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = Coord>,
    {
        self.bounds.blocked.extend(cells);
        self.paths.clear();
        self
    }

    pub fn width(&self) -> i64 {
        self.bounds.width
    }

    pub fn height(&self) -> i64 {
        self.bounds.height
    }

    pub fn steps(&self) -> u64 {
        self.world
            .get_resource::<StepCount>()
            .map(|s| s.0)
            .unwrap_or(0)
    }

    /// Number of legs the vehicle still has to drive.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn remaining_legs(&self, vehicle_id: u32) -> Result<usize, WorldError> {
        let entity = self.entity(vehicle_id)?;
        Ok(self
            .world
            .get::<Itinerary>(entity)
            .map(Itinerary::remaining_legs)
            .unwrap_or(0))
    }

    fn ensure_open(&self) -> Result<(), WorldError> {
        if self.closed {
            Err(WorldError::Closed)
        } else {
            Ok(())
        }
    }

    fn entity(&self, vehicle_id: u32) -> Result<Entity, WorldError> {
        self.ensure_open()?;
        self.vehicles
            .get(&vehicle_id)
            .copied()
            .ok_or(WorldError::UnknownVehicle(vehicle_id))
    }

    /// Cells to enter when driving `from -> to`, excluding `from`.
    fn leg(&mut self, from: Coord, to: Coord) -> Option<VecDeque<Coord>> {
        if !self.bounds.is_open(to) {
            return None;
        }
        if from == to {
            return Some(VecDeque::new());
        }
        if let Some(cached) = self.paths.get(&(from, to)) {
            return Some(cached.clone());
        }
        let bounds = &self.bounds;
        let path = bfs(&from, |&c| bounds.neighbours(c), |&c| c == to)?;
        let cells: VecDeque<Coord> = path.into_iter().skip(1).collect();
        self.paths.put((from, to), cells.clone());
        Some(cells)
    }
}

impl SteppedWorld for GridWorld {
    fn add_vehicle(&mut self, vehicle_id: u32, start: Coord, capacity: u32) -> Result<(), WorldError> {
        self.ensure_open()?;
        if self.vehicles.contains_key(&vehicle_id) {
            return Err(WorldError::DuplicateVehicle(vehicle_id));
        }
        if !self.bounds.is_open(start) {
            return Err(WorldError::Unreachable {
                vehicle_id,
                target: start,
            });
        }
        let entity = self
            .world
            .spawn((
                FleetVehicle {
                    id: vehicle_id,
                    capacity,
                },
                GridPosition(start),
                Itinerary::starting_at(start),
            ))
            .id();
        self.vehicles.insert(vehicle_id, entity);
        debug!(vehicle_id, %start, capacity, "vehicle placed");
        Ok(())
    }

    fn append_targets(&mut self, vehicle_id: u32, targets: &[Coord]) -> Result<(), WorldError> {
        let entity = self.entity(vehicle_id)?;
        let mut cursor = self
            .world
            .get::<Itinerary>(entity)
            .map(|it| it.end)
            .ok_or(WorldError::UnknownVehicle(vehicle_id))?;

        let mut legs = Vec::with_capacity(targets.len());
        for &target in targets {
            let leg = self
                .leg(cursor, target)
                .ok_or(WorldError::Unreachable { vehicle_id, target })?;
            legs.push(leg);
            cursor = target;
        }

        let mut itinerary = self
            .world
            .get_mut::<Itinerary>(entity)
            .ok_or(WorldError::UnknownVehicle(vehicle_id))?;
        itinerary.legs.extend(legs);
        itinerary.end = cursor;
        Ok(())
    }

    fn position(&self, vehicle_id: u32) -> Result<Coord, WorldError> {
        let entity = self.entity(vehicle_id)?;
        self.world
            .get::<GridPosition>(entity)
            .map(|p| p.0)
            .ok_or(WorldError::UnknownVehicle(vehicle_id))
    }

    fn step(&mut self) -> Result<(), WorldError> {
        self.ensure_open()?;
        self.schedule.run(&mut self.world);
        Ok(())
    }

    fn pending_count(&self) -> usize {
        if self.closed {
            return 0;
        }
        self.vehicles
            .values()
            .filter(|&&entity| {
                self.world
                    .get::<Itinerary>(entity)
                    .is_some_and(|it| !it.is_finished())
            })
            .count()
    }

    fn close(&mut self) -> Result<(), WorldError> {
        self.ensure_open()?;
        self.closed = true;
        for entity in self.vehicles.drain().map(|(_, e)| e) {
            self.world.despawn(entity);
        }
        self.paths.clear();
        info!(steps = self.steps(), "grid world closed");
        Ok(())
    }
}
