use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i64,
    pub y: i64,
}

impl Coord {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Coord) -> u64 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i64, i64)> for Coord {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

/// Manhattan distance `|dx| + |dy|` between two grid coordinates.
pub fn manhattan(a: Coord, b: Coord) -> u64 {
    a.manhattan(b)
}

/// A ride request produced by the upstream batch generator. Read-only once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiderRequest {
    pub id: u32,
    pub pickup: Coord,
    pub dropoff: Coord,
    /// Seconds since the start of the batch.
    pub request_time: f64,
}

impl RiderRequest {
    pub fn new(id: u32, pickup: Coord, dropoff: Coord, request_time: f64) -> Self {
        Self {
            id,
            pickup,
            dropoff,
            request_time,
        }
    }

    /// Grid length of the direct pickup-to-dropoff trip.
    pub fn trip_length(&self) -> u64 {
        self.pickup.manhattan(self.dropoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopKind {
    Pickup,
    Dropoff,
}

/// One visit on a vehicle route. Immutable once appended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(rename = "type")]
    pub kind: StopKind,
    pub rider_id: u32,
    #[serde(flatten)]
    pub coord: Coord,
    pub distance_from_previous: f64,
}

/// Dispatch-side view of a fleet vehicle.
///
/// The route is append-only; `next_stop` points at the first stop the vehicle
/// has not reached yet. `capacity_remaining` counts seats not committed to a
/// rider that is still to be dropped off, and stays within `0..=max_capacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: u32,
    pub position: Coord,
    pub max_capacity: u32,
    capacity_remaining: u32,
    route: Vec<Stop>,
    next_stop: usize,
    origin: Coord,
}

impl Vehicle {
    /// A fresh, empty vehicle parked at `depot`.
    pub fn at_depot(id: u32, depot: Coord, max_capacity: u32) -> Self {
        Self {
            id,
            position: depot,
            max_capacity,
            capacity_remaining: max_capacity,
            route: Vec::new(),
            next_stop: 0,
            origin: depot,
        }
    }

    /// Test/fixture constructor with an arbitrary number of free seats.
    pub fn with_free_seats(id: u32, position: Coord, max_capacity: u32, free: u32) -> Self {
        let mut vehicle = Self::at_depot(id, position, max_capacity);
        vehicle.capacity_remaining = free.min(max_capacity);
        vehicle
    }

    pub fn capacity_remaining(&self) -> u32 {
        self.capacity_remaining
    }

    pub fn has_free_seat(&self) -> bool {
        self.capacity_remaining > 0
    }

    pub fn route(&self) -> &[Stop] {
        &self.route
    }

    pub fn remaining_stops(&self) -> &[Stop] {
        &self.route[self.next_stop..]
    }

    pub fn is_idle(&self) -> bool {
        self.next_stop >= self.route.len()
    }

    /// Where the route currently ends: the last appended stop, or the start position.
    pub fn route_end(&self) -> Coord {
        self.route.last().map(|s| s.coord).unwrap_or(self.origin)
    }

    pub fn total_distance(&self) -> f64 {
        self.route.iter().map(|s| s.distance_from_previous).sum()
    }

    /// Commits one seat. Returns `false` (and changes nothing) when the vehicle is full.
    pub fn reserve_seat(&mut self) -> bool {
        if self.capacity_remaining == 0 {
            return false;
        }
        self.capacity_remaining -= 1;
        true
    }

    pub fn release_seat(&mut self) {
        self.capacity_remaining = (self.capacity_remaining + 1).min(self.max_capacity);
    }

    /// Appends a stop after the current route end and returns it.
    pub fn push_stop(&mut self, kind: StopKind, rider_id: u32, coord: Coord) -> Stop {
        let stop = Stop {
            kind,
            rider_id,
            coord,
            distance_from_previous: self.route_end().manhattan(coord) as f64,
        };
        self.route.push(stop);
        stop
    }

    /// Moves the vehicle to `position` and returns every stop reached there, in route order.
    pub fn advance_to(&mut self, position: Coord) -> Vec<Stop> {
        self.position = position;
        let mut reached = Vec::new();
        while let Some(stop) = self.route.get(self.next_stop) {
            if stop.coord != position {
                break;
            }
            reached.push(*stop);
            self.next_stop += 1;
        }
        reached
    }
}
