//! Test helpers for common fixtures and an in-memory world.
//!
//! Shared by unit tests, the integration tests under `tests/` and the benches.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::WorldError;
use crate::model::{Coord, RiderRequest};
use crate::params::PoolParams;
use crate::world::SteppedWorld;

pub fn rider(id: u32, pickup: (i64, i64), dropoff: (i64, i64), request_time: f64) -> RiderRequest {
    RiderRequest::new(id, pickup.into(), dropoff.into(), request_time)
}

/// Rider A (0,2)->(0,5) and rider B (1,0)->(1,1), both requested at t=0.
pub fn worked_example_riders() -> Vec<RiderRequest> {
    vec![rider(0, (0, 2), (0, 5), 0.0), rider(1, (1, 0), (1, 1), 0.0)]
}

/// Defaults with a solver budget small enough for unit tests.
pub fn fast_params() -> PoolParams {
    PoolParams::default()
        .with_num_reads(32)
        .with_num_sweeps(200)
        .with_seed(7)
}

#[derive(Debug)]
struct MockVehicle {
    position: Coord,
    targets: VecDeque<Coord>,
}

/// Obstacle-free world: vehicles move one unit per step, x first, then y.
///
/// A target equal to the current position takes one step to be consumed, so
/// every queued target is observable at least once after a step.
#[derive(Debug, Default)]
pub struct MockWorld {
    vehicles: BTreeMap<u32, MockVehicle>,
    unreachable: HashSet<Coord>,
    closes: Arc<AtomicUsize>,
    steps: usize,
    closed: bool,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any append containing `coord` is rejected.
    pub fn with_unreachable(mut self, coord: Coord) -> Self {
        self.unreachable.insert(coord);
        self
    }

    /// Counts calls to [SteppedWorld::close], including rejected repeats.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    pub fn targets(&self, vehicle_id: u32) -> Vec<Coord> {
        self.vehicles
            .get(&vehicle_id)
            .map(|v| v.targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn ensure_open(&self) -> Result<(), WorldError> {
        if self.closed {
            Err(WorldError::Closed)
        } else {
            Ok(())
        }
    }
}

impl SteppedWorld for MockWorld {
    fn add_vehicle(&mut self, vehicle_id: u32, start: Coord, _capacity: u32) -> Result<(), WorldError> {
        self.ensure_open()?;
        if self.vehicles.contains_key(&vehicle_id) {
            return Err(WorldError::DuplicateVehicle(vehicle_id));
        }
        self.vehicles.insert(
            vehicle_id,
            MockVehicle {
                position: start,
                targets: VecDeque::new(),
            },
        );
        Ok(())
    }

    fn append_targets(&mut self, vehicle_id: u32, targets: &[Coord]) -> Result<(), WorldError> {
        self.ensure_open()?;
        if let Some(&target) = targets.iter().find(|t| self.unreachable.contains(t)) {
            return Err(WorldError::Unreachable { vehicle_id, target });
        }
        let vehicle = self
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or(WorldError::UnknownVehicle(vehicle_id))?;
        vehicle.targets.extend(targets.iter().copied());
        Ok(())
    }

    fn position(&self, vehicle_id: u32) -> Result<Coord, WorldError> {
        self.ensure_open()?;
        self.vehicles
            .get(&vehicle_id)
            .map(|v| v.position)
            .ok_or(WorldError::UnknownVehicle(vehicle_id))
    }

    fn step(&mut self) -> Result<(), WorldError> {
        self.ensure_open()?;
        self.steps += 1;
        for vehicle in self.vehicles.values_mut() {
            let Some(&target) = vehicle.targets.front() else {
                continue;
            };
            let position = &mut vehicle.position;
            if position.x != target.x {
                position.x += (target.x - position.x).signum();
            } else if position.y != target.y {
                position.y += (target.y - position.y).signum();
            }
            if *position == target {
                vehicle.targets.pop_front();
            }
        }
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.vehicles.values().filter(|v| !v.targets.is_empty()).count()
    }

    fn close(&mut self) -> Result<(), WorldError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}
