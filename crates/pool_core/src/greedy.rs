//! Online greedy dispatch: nearest vehicle with a free seat, one request at a time.
//!
//! Requests are taken in release order. For each one, every vehicle with
//! `capacity_remaining > 0` is ranked by Manhattan distance from its current
//! world position to the pickup; the first vehicle in id order wins ties. The
//! pickup and dropoff are appended to the world together, so a rejected request
//! never leaves half a trip queued.

use tracing::{debug, warn};

use crate::error::{PoolError, WorldError};
use crate::model::{Coord, RiderRequest, StopKind, Vehicle};
use crate::world::SteppedWorld;

/// One rider placed on one vehicle during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyAssignment {
    pub rider_id: u32,
    pub vehicle_id: u32,
    /// Grid distance from the vehicle's position to the pickup at assignment time.
    pub pickup_distance: u64,
}

#[derive(Debug)]
pub struct AbandonedRider {
    pub rider_id: u32,
    pub error: PoolError,
}

/// Outcome of one greedy pass.
#[derive(Debug, Default)]
pub struct TickDispatch {
    pub assigned: Vec<GreedyAssignment>,
    /// Riders dropped because the world rejected their targets.
    pub abandoned: Vec<AbandonedRider>,
    /// One [PoolError::ResourceExhaustion] per rider left pending because no
    /// vehicle had a free seat.
    pub exhausted: Vec<PoolError>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OnlineGreedyAssigner;

impl OnlineGreedyAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Runs one pass over `pending`.
    ///
    /// `fleet` must be ordered by vehicle id. Assigned and abandoned requests are
    /// removed from `pending`; exhausted ones stay, in their original order.
    /// Errors other than an unreachable target are structural and abort the pass.
    pub fn assign_tick<W>(
        &self,
        world: &mut W,
        fleet: &mut [Vehicle],
        pending: &mut Vec<RiderRequest>,
    ) -> Result<TickDispatch, PoolError>
    where
        W: SteppedWorld + ?Sized,
    {
        let mut dispatch = TickDispatch::default();
        let mut still_pending = Vec::new();
        let mut requests = std::mem::take(pending).into_iter();

        while let Some(request) = requests.next() {
            let step = self.place(world, fleet, &request, &mut dispatch);
            match step {
                Ok(true) => {}
                Ok(false) => still_pending.push(request),
                Err(err) => {
                    // Leave the unprocessed tail pending so the caller's view stays consistent.
                    still_pending.push(request);
                    still_pending.extend(requests);
                    *pending = still_pending;
                    return Err(err);
                }
            }
        }

        *pending = still_pending;
        Ok(dispatch)
    }

    /// Handles one request. `Ok(false)` means it stays pending.
    fn place<W>(
        &self,
        world: &mut W,
        fleet: &mut [Vehicle],
        request: &RiderRequest,
        dispatch: &mut TickDispatch,
    ) -> Result<bool, PoolError>
    where
        W: SteppedWorld + ?Sized,
    {
        let Some((slot, pickup_distance)) = nearest_free_vehicle(&*world, fleet, request.pickup)?
        else {
            let err = PoolError::ResourceExhaustion { rider_id: request.id };
            debug!(rider_id = request.id, error = %err, "request stays pending");
            dispatch.exhausted.push(err);
            return Ok(false);
        };

        let vehicle = &mut fleet[slot];
        match world.append_targets(vehicle.id, &[request.pickup, request.dropoff]) {
            Ok(()) => {
                vehicle.reserve_seat();
                vehicle.push_stop(StopKind::Pickup, request.id, request.pickup);
                vehicle.push_stop(StopKind::Dropoff, request.id, request.dropoff);
                debug!(
                    rider_id = request.id,
                    vehicle_id = vehicle.id,
                    pickup_distance,
                    "rider assigned"
                );
                dispatch.assigned.push(GreedyAssignment {
                    rider_id: request.id,
                    vehicle_id: vehicle.id,
                    pickup_distance,
                });
                Ok(true)
            }
            Err(WorldError::Unreachable { vehicle_id, target }) => {
                warn!(rider_id = request.id, vehicle_id, %target, "rider abandoned");
                dispatch.abandoned.push(AbandonedRider {
                    rider_id: request.id,
                    error: PoolError::UnreachableTarget {
                        rider_id: request.id,
                        vehicle_id,
                        target,
                    },
                });
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Slot in `fleet` and pickup distance of the closest vehicle with a free seat.
fn nearest_free_vehicle<W>(
    world: &W,
    fleet: &[Vehicle],
    pickup: Coord,
) -> Result<Option<(usize, u64)>, PoolError>
where
    W: SteppedWorld + ?Sized,
{
    let mut best: Option<(usize, u64)> = None;
    for (slot, vehicle) in fleet.iter().enumerate() {
        if !vehicle.has_free_seat() {
            continue;
        }
        let distance = world.position(vehicle.id)?.manhattan(pickup);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((slot, distance));
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{rider, MockWorld};

    fn world_with(vehicles: &[(u32, Coord)]) -> MockWorld {
        let mut world = MockWorld::new();
        for &(id, start) in vehicles {
            world.add_vehicle(id, start, 4).expect("add vehicle");
        }
        world
    }

    #[test]
    fn full_vehicle_is_skipped_even_when_closer() {
        let mut world = world_with(&[(1, Coord::new(0, 0)), (2, Coord::new(10, 10))]);
        let mut fleet = vec![
            Vehicle::with_free_seats(1, Coord::new(0, 0), 4, 2),
            Vehicle::with_free_seats(2, Coord::new(10, 10), 4, 0),
        ];
        let mut pending = vec![rider(0, (1, 1), (3, 3), 0.0)];

        let dispatch = OnlineGreedyAssigner
            .assign_tick(&mut world, &mut fleet, &mut pending)
            .expect("tick");
        assert_eq!(dispatch.assigned.len(), 1);
        assert_eq!(dispatch.assigned[0].vehicle_id, 1);
        assert_eq!(fleet[0].capacity_remaining(), 1);
        assert_eq!(fleet[1].capacity_remaining(), 0);
        assert!(pending.is_empty());
    }

    #[test]
    fn assigns_nearest_and_appends_both_stops() {
        let mut world = world_with(&[(0, Coord::new(0, 0)), (1, Coord::new(5, 5))]);
        let mut fleet = vec![
            Vehicle::at_depot(0, Coord::new(0, 0), 2),
            Vehicle::at_depot(1, Coord::new(5, 5), 2),
        ];
        let mut pending = vec![rider(3, (4, 5), (4, 8), 0.0)];

        let dispatch = OnlineGreedyAssigner
            .assign_tick(&mut world, &mut fleet, &mut pending)
            .expect("tick");
        assert_eq!(dispatch.assigned[0].vehicle_id, 1);
        assert_eq!(dispatch.assigned[0].pickup_distance, 1);
        assert_eq!(world.targets(1), vec![Coord::new(4, 5), Coord::new(4, 8)]);
        let kinds: Vec<StopKind> = fleet[1].route().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StopKind::Pickup, StopKind::Dropoff]);
        assert_eq!(fleet[1].route()[0].distance_from_previous, 1.0);
        assert_eq!(fleet[1].route()[1].distance_from_previous, 3.0);
    }

    #[test]
    fn ties_go_to_lowest_vehicle_id() {
        let mut world = world_with(&[(0, Coord::new(0, 2)), (1, Coord::new(2, 0))]);
        let mut fleet = vec![
            Vehicle::at_depot(0, Coord::new(0, 2), 1),
            Vehicle::at_depot(1, Coord::new(2, 0), 1),
        ];
        let mut pending = vec![rider(0, (0, 0), (1, 1), 0.0)];
        let dispatch = OnlineGreedyAssigner
            .assign_tick(&mut world, &mut fleet, &mut pending)
            .expect("tick");
        assert_eq!(dispatch.assigned[0].vehicle_id, 0);
    }

    #[test]
    fn exhausted_requests_stay_pending() {
        let mut world = world_with(&[(0, Coord::new(0, 0))]);
        let mut fleet = vec![Vehicle::at_depot(0, Coord::new(0, 0), 1)];
        let mut pending = vec![
            rider(0, (1, 0), (2, 0), 0.0),
            rider(1, (0, 1), (0, 2), 0.0),
            rider(2, (3, 3), (0, 2), 0.0),
        ];

        let dispatch = OnlineGreedyAssigner
            .assign_tick(&mut world, &mut fleet, &mut pending)
            .expect("tick");
        assert_eq!(dispatch.assigned.len(), 1);
        assert!(dispatch
            .exhausted
            .iter()
            .all(|err| matches!(err, PoolError::ResourceExhaustion { .. })));
        let exhausted: Vec<u32> = dispatch.exhausted.iter().filter_map(PoolError::rider_id).collect();
        assert_eq!(exhausted, vec![1, 2]);
        let ids: Vec<u32> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn unreachable_rider_does_not_block_siblings() {
        let mut world = world_with(&[(0, Coord::new(0, 0))]).with_unreachable(Coord::new(9, 9));
        let mut fleet = vec![Vehicle::at_depot(0, Coord::new(0, 0), 4)];
        let mut pending = vec![
            rider(0, (1, 0), (9, 9), 0.0),
            rider(1, (0, 1), (0, 2), 0.0),
        ];

        let dispatch = OnlineGreedyAssigner
            .assign_tick(&mut world, &mut fleet, &mut pending)
            .expect("tick");
        assert_eq!(dispatch.abandoned.len(), 1);
        assert_eq!(dispatch.abandoned[0].rider_id, 0);
        assert!(matches!(
            dispatch.abandoned[0].error,
            PoolError::UnreachableTarget { rider_id: 0, vehicle_id: 0, .. }
        ));
        assert_eq!(dispatch.assigned.len(), 1);
        assert_eq!(dispatch.assigned[0].rider_id, 1);
        // The rejected pickup was not queued either.
        assert_eq!(world.targets(0), vec![Coord::new(0, 1), Coord::new(0, 2)]);
        assert_eq!(fleet[0].capacity_remaining(), 3);
        assert!(pending.is_empty());
    }

    #[test]
    fn structural_world_error_aborts_the_pass() {
        let mut world = world_with(&[]);
        let mut fleet = vec![Vehicle::at_depot(7, Coord::new(0, 0), 1)];
        let mut pending = vec![rider(0, (1, 0), (2, 0), 0.0)];
        let err = OnlineGreedyAssigner
            .assign_tick(&mut world, &mut fleet, &mut pending)
            .expect_err("unknown vehicle");
        assert!(matches!(err, PoolError::World(WorldError::UnknownVehicle(7))));
    }
}
