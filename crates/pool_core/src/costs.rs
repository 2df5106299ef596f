//! Rider-by-vehicle cost matrices and the providers that produce them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::PoolError;
use crate::model::RiderRequest;

/// Dense `riders x vehicles` distance and wait-time matrices (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrices {
    riders: usize,
    vehicles: usize,
    distance: Vec<f64>,
    wait_time: Vec<f64>,
}

impl CostMatrices {
    /// Builds matrices from nested rows, checking shape and that every entry is finite and non-negative.
    pub fn new(
        riders: usize,
        vehicles: usize,
        distance: Vec<Vec<f64>>,
        wait_time: Vec<Vec<f64>>,
    ) -> Result<Self, PoolError> {
        let distance = flatten_checked("distance", riders, vehicles, distance)?;
        let wait_time = flatten_checked("wait_time", riders, vehicles, wait_time)?;
        Ok(Self {
            riders,
            vehicles,
            distance,
            wait_time,
        })
    }

    pub fn riders(&self) -> usize {
        self.riders
    }

    pub fn vehicles(&self) -> usize {
        self.vehicles
    }

    pub fn distance(&self, rider: usize, vehicle: usize) -> f64 {
        self.distance[rider * self.vehicles + vehicle]
    }

    pub fn wait_time(&self, rider: usize, vehicle: usize) -> f64 {
        self.wait_time[rider * self.vehicles + vehicle]
    }

    pub fn max_distance(&self) -> f64 {
        self.distance.iter().copied().fold(0.0, f64::max)
    }

    /// Uniform synthetic costs: distance in `[1, 10)`, wait time in `[0, 600)`, both integral.
    pub fn synthetic<R: Rng + ?Sized>(riders: usize, vehicles: usize, rng: &mut R) -> Self {
        let mut distance = Vec::with_capacity(riders * vehicles);
        for _ in 0..riders * vehicles {
            distance.push(rng.gen_range(1..10) as f64);
        }
        let mut wait_time = Vec::with_capacity(riders * vehicles);
        for _ in 0..riders * vehicles {
            wait_time.push(rng.gen_range(0..600) as f64);
        }
        Self {
            riders,
            vehicles,
            distance,
            wait_time,
        }
    }
}

fn flatten_checked(
    name: &str,
    riders: usize,
    vehicles: usize,
    rows: Vec<Vec<f64>>,
) -> Result<Vec<f64>, PoolError> {
    if rows.len() != riders {
        return Err(PoolError::config(format!(
            "{name} matrix has {} rows, expected {riders}",
            rows.len()
        )));
    }
    let mut flat = Vec::with_capacity(riders * vehicles);
    for (rider, row) in rows.into_iter().enumerate() {
        if row.len() != vehicles {
            return Err(PoolError::config_for_rider(
                format!("{name} row has {} columns, expected {vehicles}", row.len()),
                rider as u32,
            ));
        }
        for (vehicle, value) in row.into_iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(PoolError::Configuration {
                    message: format!("{name} entry must be finite and non-negative, got {value}"),
                    rider_id: Some(rider as u32),
                    vehicle_id: Some(vehicle as u32),
                });
            }
            flat.push(value);
        }
    }
    Ok(flat)
}

/// Source of cost matrices for a rider batch and fleet size.
pub trait CostMatrixProvider {
    fn cost_matrices(
        &self,
        riders: &[RiderRequest],
        vehicles: usize,
    ) -> Result<CostMatrices, PoolError>;
}

/// Seeded synthetic costs, independent of rider geometry.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCosts {
    pub seed: u64,
}

impl SyntheticCosts {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl CostMatrixProvider for SyntheticCosts {
    fn cost_matrices(
        &self,
        riders: &[RiderRequest],
        vehicles: usize,
    ) -> Result<CostMatrices, PoolError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(CostMatrices::synthetic(riders.len(), vehicles, &mut rng))
    }
}

/// Costs derived from the trips themselves.
///
/// Distance is the rider's own pickup-to-dropoff Manhattan length in km; wait time
/// is the distance of the request time from the batch median. Both are the same
/// for every vehicle.
#[derive(Debug, Clone, Copy)]
pub struct TripCosts {
    pub grid_to_km: f64,
}

impl TripCosts {
    pub fn new(grid_to_km: f64) -> Self {
        Self { grid_to_km }
    }
}

impl CostMatrixProvider for TripCosts {
    fn cost_matrices(
        &self,
        riders: &[RiderRequest],
        vehicles: usize,
    ) -> Result<CostMatrices, PoolError> {
        if !self.grid_to_km.is_finite() || self.grid_to_km <= 0.0 {
            return Err(PoolError::config("grid_to_km must be positive"));
        }
        let median = median_request_time(riders);
        let distance = riders
            .iter()
            .map(|r| vec![r.trip_length() as f64 * self.grid_to_km; vehicles])
            .collect();
        let wait_time = riders
            .iter()
            .map(|r| vec![(r.request_time - median).abs(); vehicles])
            .collect();
        CostMatrices::new(riders.len(), vehicles, distance, wait_time)
    }
}

fn median_request_time(riders: &[RiderRequest]) -> f64 {
    if riders.is_empty() {
        return 0.0;
    }
    let mut times: Vec<f64> = riders.iter().map(|r| r.request_time).collect();
    times.sort_by(f64::total_cmp);
    let mid = times.len() / 2;
    if times.len() % 2 == 0 {
        (times[mid - 1] + times[mid]) / 2.0
    } else {
        times[mid]
    }
}
