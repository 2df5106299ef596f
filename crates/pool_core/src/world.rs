//! Command interface to the stepped traffic world.
//!
//! The dispatch side never moves vehicles itself: it appends targets, steps the
//! world, and reads positions back. A handle is single-owner and must be
//! released with [SteppedWorld::close] exactly once.

use crate::error::WorldError;
use crate::model::Coord;

pub trait SteppedWorld {
    /// Places a vehicle at `start`. Ids must be unique.
    fn add_vehicle(&mut self, vehicle_id: u32, start: Coord, capacity: u32) -> Result<(), WorldError>;

    /// Queues `targets` after the vehicle's current itinerary, all or nothing:
    /// if any target is unreachable nothing is queued.
    fn append_targets(&mut self, vehicle_id: u32, targets: &[Coord]) -> Result<(), WorldError>;

    fn position(&self, vehicle_id: u32) -> Result<Coord, WorldError>;

    /// Advances the world by one tick.
    fn step(&mut self) -> Result<(), WorldError>;

    /// Vehicles that still have targets to reach.
    fn pending_count(&self) -> usize;

    /// Releases the handle. Every later call fails with [WorldError::Closed].
    fn close(&mut self) -> Result<(), WorldError>;
}

impl<W: SteppedWorld + ?Sized> SteppedWorld for Box<W> {
    fn add_vehicle(&mut self, vehicle_id: u32, start: Coord, capacity: u32) -> Result<(), WorldError> {
        (**self).add_vehicle(vehicle_id, start, capacity)
    }

    fn append_targets(&mut self, vehicle_id: u32, targets: &[Coord]) -> Result<(), WorldError> {
        (**self).append_targets(vehicle_id, targets)
    }

    fn position(&self, vehicle_id: u32) -> Result<Coord, WorldError> {
        (**self).position(vehicle_id)
    }

    fn step(&mut self) -> Result<(), WorldError> {
        (**self).step()
    }

    fn pending_count(&self) -> usize {
        (**self).pending_count()
    }

    fn close(&mut self) -> Result<(), WorldError> {
        (**self).close()
    }
}
