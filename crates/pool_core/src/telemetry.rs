//! Telemetry / KPIs: completed rides and periodic vehicle snapshots.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Coord, Vehicle};

/// One completed ride, recorded when its vehicle reaches the dropoff.
/// Timestamps are simulation ticks; use the helper methods for derived KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletedRideRecord {
    pub rider_id: u32,
    pub vehicle_id: u32,
    pub assigned_tick: u64,
    pub pickup_tick: u64,
    pub dropoff_tick: u64,
}

impl CompletedRideRecord {
    /// Ticks from assignment to pickup.
    pub fn time_to_pickup(&self) -> u64 {
        self.pickup_tick.saturating_sub(self.assigned_tick)
    }

    /// Ticks from pickup to dropoff (rider on board).
    pub fn ride_duration(&self) -> u64 {
        self.dropoff_tick.saturating_sub(self.pickup_tick)
    }
}

/// One vehicle at a snapshot tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VehicleSnapshot {
    pub tick: u64,
    pub vehicle_id: u32,
    pub position: Coord,
    pub capacity_remaining: u32,
    pub remaining_stops: usize,
}

impl VehicleSnapshot {
    pub fn of(tick: u64, vehicle: &Vehicle) -> Self {
        Self {
            tick,
            vehicle_id: vehicle.id,
            position: vehicle.position,
            capacity_remaining: vehicle.capacity_remaining(),
            remaining_stops: vehicle.remaining_stops().len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RideProgress {
    vehicle_id: u32,
    assigned_tick: u64,
    pickup_tick: Option<u64>,
}

/// Collects simulation telemetry.
#[derive(Debug, Default, Clone)]
pub struct SimTelemetry {
    pub completed_rides: Vec<CompletedRideRecord>,
    pub snapshots: Vec<VehicleSnapshot>,
    pub last_snapshot_tick: Option<u64>,
    in_flight: HashMap<u32, RideProgress>,
}

impl SimTelemetry {
    pub fn mark_assigned(&mut self, rider_id: u32, vehicle_id: u32, tick: u64) {
        self.in_flight.insert(
            rider_id,
            RideProgress {
                vehicle_id,
                assigned_tick: tick,
                pickup_tick: None,
            },
        );
    }

    /// Stops tracking a rider that will not be served.
    pub fn forget(&mut self, rider_id: u32) {
        self.in_flight.remove(&rider_id);
    }

    /// Pickups of riders that were never assigned (or were forgotten) are ignored.
    pub fn mark_pickup(&mut self, rider_id: u32, tick: u64) {
        if let Some(progress) = self.in_flight.get_mut(&rider_id) {
            progress.pickup_tick.get_or_insert(tick);
        }
    }

    /// Closes the ride and returns its record, if the rider was being tracked.
    pub fn mark_dropoff(&mut self, rider_id: u32, tick: u64) -> Option<CompletedRideRecord> {
        let progress = self.in_flight.remove(&rider_id)?;
        let record = CompletedRideRecord {
            rider_id,
            vehicle_id: progress.vehicle_id,
            assigned_tick: progress.assigned_tick,
            pickup_tick: progress.pickup_tick.unwrap_or(tick),
            dropoff_tick: tick,
        };
        self.completed_rides.push(record);
        Some(record)
    }

    pub fn in_flight_riders(&self) -> impl Iterator<Item = u32> + '_ {
        self.in_flight.keys().copied()
    }

    /// True when `interval` ticks have passed since the last snapshot (0 disables).
    pub fn snapshot_due(&self, tick: u64, interval: u64) -> bool {
        if interval == 0 {
            return false;
        }
        match self.last_snapshot_tick {
            None => true,
            Some(last) => tick.saturating_sub(last) >= interval,
        }
    }

    pub fn capture<'a, I>(&mut self, tick: u64, vehicles: I)
    where
        I: IntoIterator<Item = &'a Vehicle>,
    {
        self.snapshots
            .extend(vehicles.into_iter().map(|v| VehicleSnapshot::of(tick, v)));
        self.last_snapshot_tick = Some(tick);
    }

    pub fn mean_time_to_pickup(&self) -> Option<f64> {
        mean(self.completed_rides.iter().map(CompletedRideRecord::time_to_pickup))
    }

    pub fn mean_ride_duration(&self) -> Option<f64> {
        mean(self.completed_rides.iter().map(CompletedRideRecord::ride_duration))
    }
}

fn mean(values: impl Iterator<Item = u64>) -> Option<f64> {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}
