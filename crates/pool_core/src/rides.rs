//! Ride batches: synthetic generation and CSV persistence.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PoolError;
use crate::model::{Coord, RiderRequest};

/// CSV row layout. Older batches name the request time `pickup_sec`.
#[derive(Debug, Serialize, Deserialize)]
struct RideRow {
    id: u32,
    pickup_x: i64,
    pickup_y: i64,
    dropoff_x: i64,
    dropoff_y: i64,
    #[serde(alias = "pickup_sec")]
    request_time: f64,
}

impl From<&RiderRequest> for RideRow {
    fn from(rider: &RiderRequest) -> Self {
        Self {
            id: rider.id,
            pickup_x: rider.pickup.x,
            pickup_y: rider.pickup.y,
            dropoff_x: rider.dropoff.x,
            dropoff_y: rider.dropoff.y,
            request_time: rider.request_time,
        }
    }
}

impl From<RideRow> for RiderRequest {
    fn from(row: RideRow) -> Self {
        RiderRequest::new(
            row.id,
            Coord::new(row.pickup_x, row.pickup_y),
            Coord::new(row.dropoff_x, row.dropoff_y),
            row.request_time,
        )
    }
}

/// Uniform synthetic requests: ids `0..count`, coordinates in `0..grid_size`,
/// whole-second request times in `0..=request_window_secs`.
pub fn generate_rides<R: Rng + ?Sized>(
    count: usize,
    grid_size: i64,
    request_window_secs: u64,
    rng: &mut R,
) -> Result<Vec<RiderRequest>, PoolError> {
    if grid_size <= 0 {
        return Err(PoolError::config(format!(
            "grid_size must be positive, got {grid_size}"
        )));
    }
    let coord = |rng: &mut R| Coord::new(rng.gen_range(0..grid_size), rng.gen_range(0..grid_size));
    let rides = (0..count as u32)
        .map(|id| {
            let pickup = coord(rng);
            let dropoff = coord(rng);
            let request_time = rng.gen_range(0..=request_window_secs) as f64;
            RiderRequest::new(id, pickup, dropoff, request_time)
        })
        .collect();
    Ok(rides)
}

/// Rejects duplicate ids and negative or non-finite request times.
pub fn validate_batch(riders: &[RiderRequest]) -> Result<(), PoolError> {
    let mut seen = HashSet::with_capacity(riders.len());
    for rider in riders {
        if !seen.insert(rider.id) {
            return Err(PoolError::config_for_rider("duplicate rider id", rider.id));
        }
        if !rider.request_time.is_finite() || rider.request_time < 0.0 {
            return Err(PoolError::config_for_rider(
                format!("invalid request_time {}", rider.request_time),
                rider.id,
            ));
        }
    }
    Ok(())
}

pub fn read_rides<R: Read>(reader: R) -> Result<Vec<RiderRequest>, PoolError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut riders = Vec::new();
    for row in csv_reader.deserialize::<RideRow>() {
        riders.push(RiderRequest::from(row?));
    }
    validate_batch(&riders)?;
    Ok(riders)
}

pub fn write_rides<W: Write>(writer: W, riders: &[RiderRequest]) -> Result<(), PoolError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for rider in riders {
        csv_writer.serialize(RideRow::from(rider))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn read_rides_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RiderRequest>, PoolError> {
    let path = path.as_ref();
    let riders = read_rides(std::fs::File::open(path)?)?;
    info!(path = %path.display(), riders = riders.len(), "ride batch loaded");
    Ok(riders)
}

pub fn write_rides_csv<P: AsRef<Path>>(path: P, riders: &[RiderRequest]) -> Result<(), PoolError> {
    write_rides(std::fs::File::create(path)?, riders)
}
