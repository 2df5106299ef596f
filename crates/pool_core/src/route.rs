//! Nearest-neighbor route construction with pickup-before-dropoff precedence.
//!
//! The candidate set starts with every pickup. Each step visits the candidate
//! closest (Manhattan) to the current position, ties going to the rider supplied
//! first. Visiting a pickup makes that rider's dropoff a candidate, so a dropoff
//! can never precede its pickup. The result is feasible, not optimal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PoolError;
use crate::interpret::Assignment;
use crate::model::{Coord, RiderRequest, Stop, StopKind};
use crate::params::PoolParams;

/// Rider details carried alongside a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiderSummary {
    pub rider_id: u32,
    pub pickup: Coord,
    pub dropoff: Coord,
    pub request_time: f64,
}

impl From<&RiderRequest> for RiderSummary {
    fn from(rider: &RiderRequest) -> Self {
        Self {
            rider_id: rider.id,
            pickup: rider.pickup,
            dropoff: rider.dropoff,
            request_time: rider.request_time,
        }
    }
}

/// One vehicle's ordered stops with distance (grid units) and ETA (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteArtifact {
    pub vehicle_id: u32,
    pub route: Vec<Stop>,
    pub total_distance: f64,
    pub estimated_time: f64,
    pub riders: Vec<RiderSummary>,
}

impl RouteArtifact {
    pub fn empty(vehicle_id: u32) -> Self {
        Self {
            vehicle_id,
            route: Vec::new(),
            total_distance: 0.0,
            estimated_time: 0.0,
            riders: Vec::new(),
        }
    }

    /// Index of the rider's stop of the given kind, if present.
    pub fn stop_index(&self, rider_id: u32, kind: StopKind) -> Option<usize> {
        self.route
            .iter()
            .position(|s| s.rider_id == rider_id && s.kind == kind)
    }

    pub fn rider_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.riders.iter().map(|r| r.rider_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteBuilder {
    depot: Coord,
    avg_speed_m_per_s: f64,
    grid_to_km: f64,
}

impl RouteBuilder {
    pub fn new(depot: Coord, avg_speed_m_per_s: f64, grid_to_km: f64) -> Result<Self, PoolError> {
        if !avg_speed_m_per_s.is_finite() || avg_speed_m_per_s <= 0.0 {
            return Err(PoolError::config(format!(
                "average speed must be positive, got {avg_speed_m_per_s}"
            )));
        }
        if !grid_to_km.is_finite() || grid_to_km <= 0.0 {
            return Err(PoolError::config(format!(
                "grid_to_km must be positive, got {grid_to_km}"
            )));
        }
        Ok(Self {
            depot,
            avg_speed_m_per_s,
            grid_to_km,
        })
    }

    pub fn from_params(params: &PoolParams) -> Result<Self, PoolError> {
        Self::new(params.depot, params.avg_speed_m_per_s, params.grid_to_km)
    }

    pub fn depot(&self) -> Coord {
        self.depot
    }

    /// Seconds needed to cover `total_distance` grid units at the average speed.
    pub fn estimated_time(&self, total_distance: f64) -> f64 {
        total_distance * self.grid_to_km * 1000.0 / self.avg_speed_m_per_s
    }

    /// Route starting at the depot.
    pub fn build(&self, vehicle_id: u32, riders: &[RiderRequest]) -> RouteArtifact {
        self.build_from(vehicle_id, riders, self.depot)
    }

    pub fn build_from(&self, vehicle_id: u32, riders: &[RiderRequest], start: Coord) -> RouteArtifact {
        if riders.is_empty() {
            return RouteArtifact::empty(vehicle_id);
        }

        // (supply index, kind); order inside the vec does not matter.
        let mut candidates: Vec<(usize, StopKind)> =
            (0..riders.len()).map(|i| (i, StopKind::Pickup)).collect();
        let mut route = Vec::with_capacity(riders.len() * 2);
        let mut current = start;

        while !candidates.is_empty() {
            let mut chosen = 0;
            let mut best: Option<(u64, usize)> = None;
            for (slot, &(rider_index, kind)) in candidates.iter().enumerate() {
                let point = stop_coord(&riders[rider_index], kind);
                let rank = (current.manhattan(point), rider_index);
                if best.map_or(true, |b| rank < b) {
                    best = Some(rank);
                    chosen = slot;
                }
            }

            let (rider_index, kind) = candidates.swap_remove(chosen);
            let rider = &riders[rider_index];
            let coord = stop_coord(rider, kind);
            route.push(Stop {
                kind,
                rider_id: rider.id,
                coord,
                distance_from_previous: current.manhattan(coord) as f64,
            });
            current = coord;

            if kind == StopKind::Pickup {
                candidates.push((rider_index, StopKind::Dropoff));
            }
        }

        let total_distance: f64 = route.iter().map(|s| s.distance_from_previous).sum();
        let estimated_time = self.estimated_time(total_distance);
        debug!(
            vehicle_id,
            riders = riders.len(),
            total_distance,
            estimated_time,
            "route built"
        );

        RouteArtifact {
            vehicle_id,
            route,
            total_distance,
            estimated_time,
            riders: riders.iter().map(RiderSummary::from).collect(),
        }
    }
}

fn stop_coord(rider: &RiderRequest, kind: StopKind) -> Coord {
    match kind {
        StopKind::Pickup => rider.pickup,
        StopKind::Dropoff => rider.dropoff,
    }
}

/// Builds one route per vehicle of `assignment`, looking riders up by id.
pub fn build_routes(
    builder: &RouteBuilder,
    assignment: &Assignment,
    riders: &[RiderRequest],
) -> Result<Vec<RouteArtifact>, PoolError> {
    let by_id: HashMap<u32, &RiderRequest> = riders.iter().map(|r| (r.id, r)).collect();
    let mut routes = Vec::with_capacity(assignment.len());
    for (&vehicle_id, rider_ids) in assignment {
        let mut assigned = Vec::with_capacity(rider_ids.len());
        for &rider_id in rider_ids {
            let rider = by_id.get(&rider_id).ok_or_else(|| PoolError::Configuration {
                message: "assigned rider is not in the batch".to_string(),
                rider_id: Some(rider_id),
                vehicle_id: Some(vehicle_id),
            })?;
            assigned.push(**rider);
        }
        routes.push(builder.build(vehicle_id, &assigned));
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rider(id: u32, pickup: (i64, i64), dropoff: (i64, i64)) -> RiderRequest {
        RiderRequest::new(id, pickup.into(), dropoff.into(), 0.0)
    }

    fn builder() -> RouteBuilder {
        RouteBuilder::new(Coord::new(0, 0), 10.0, 0.5).expect("builder")
    }

    #[test]
    fn worked_example_order_and_distance() {
        let a = rider(0, (0, 2), (0, 5));
        let b = rider(1, (1, 0), (1, 1));
        let artifact = builder().build(3, &[a, b]);

        let order: Vec<(u32, StopKind)> = artifact.route.iter().map(|s| (s.rider_id, s.kind)).collect();
        assert_eq!(
            order,
            vec![
                (1, StopKind::Pickup),
                (1, StopKind::Dropoff),
                (0, StopKind::Pickup),
                (0, StopKind::Dropoff),
            ]
        );
        let legs: Vec<f64> = artifact.route.iter().map(|s| s.distance_from_previous).collect();
        assert_eq!(legs, vec![1.0, 1.0, 3.0, 3.0]);
        assert_eq!(artifact.total_distance, 8.0);
        // 8 units * 0.5 km * 1000 / 10 m/s
        assert_eq!(artifact.estimated_time, 400.0);
    }

    #[test]
    fn empty_rider_list_gives_empty_route() {
        let artifact = builder().build(0, &[]);
        assert!(artifact.route.is_empty());
        assert_eq!(artifact.total_distance, 0.0);
        assert_eq!(artifact.estimated_time, 0.0);
    }

    #[test]
    fn ties_go_to_rider_supplied_first() {
        let first = rider(8, (2, 0), (2, 1));
        let second = rider(4, (0, 2), (1, 2));
        let artifact = builder().build(0, &[first, second]);
        assert_eq!(artifact.route[0].rider_id, 8);

        let artifact = builder().build(0, &[second, first]);
        assert_eq!(artifact.route[0].rider_id, 4);
    }

    #[test]
    fn dropoff_never_precedes_pickup() {
        // The dropoff sits on the depot, but its pickup is far away.
        let far = rider(0, (9, 9), (0, 0));
        let near = rider(1, (1, 1), (2, 2));
        let artifact = builder().build(0, &[far, near]);
        for rider_id in [0, 1] {
            let pickup = artifact.stop_index(rider_id, StopKind::Pickup).expect("pickup");
            let dropoff = artifact.stop_index(rider_id, StopKind::Dropoff).expect("dropoff");
            assert!(pickup < dropoff);
        }
    }

    #[test]
    fn custom_start_position() {
        let a = rider(0, (5, 5), (6, 5));
        let artifact = builder().build_from(0, &[a], Coord::new(5, 4));
        assert_eq!(artifact.route[0].distance_from_previous, 1.0);
        assert_eq!(artifact.total_distance, 2.0);
    }

    #[test]
    fn rejects_non_positive_speed() {
        assert!(matches!(
            RouteBuilder::new(Coord::default(), 0.0, 0.5),
            Err(PoolError::Configuration { .. })
        ));
        assert!(matches!(
            RouteBuilder::new(Coord::default(), 10.0, -1.0),
            Err(PoolError::Configuration { .. })
        ));
    }

    #[test]
    fn build_routes_reports_unknown_rider() {
        let riders = vec![rider(0, (0, 1), (0, 2))];
        let assignment: Assignment = [(0, vec![0]), (1, vec![5])].into_iter().collect();
        let err = build_routes(&builder(), &assignment, &riders).expect_err("unknown rider");
        assert_eq!(err.rider_id(), Some(5));
        assert_eq!(err.vehicle_id(), Some(1));
    }

    #[test]
    fn build_routes_covers_every_vehicle() {
        let riders = vec![rider(0, (0, 1), (0, 2)), rider(1, (3, 3), (1, 1))];
        let assignment: Assignment = [(0, vec![1, 0]), (1, vec![])].into_iter().collect();
        let routes = build_routes(&builder(), &assignment, &riders).expect("routes");
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].route.len(), 4);
        assert_eq!(routes[0].riders[0].rider_id, 1);
        assert!(routes[1].route.is_empty());
    }
}
