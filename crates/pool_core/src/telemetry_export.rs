use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, UInt32Array, UInt64Array};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::error::PoolError;
use crate::telemetry::{CompletedRideRecord, SimTelemetry};

pub const VEHICLE_POSITIONS_FILE: &str = "vehicle_positions.parquet";
pub const COMPLETED_RIDES_FILE: &str = "completed_rides.parquet";

pub fn write_vehicle_positions_parquet<P: AsRef<Path>>(
    path: P,
    telemetry: &SimTelemetry,
) -> Result<(), PoolError> {
    let snapshots = &telemetry.snapshots;
    let batch = table([
        ("tick", u64_column(snapshots.iter().map(|s| s.tick))),
        ("vehicle_id", u32_column(snapshots.iter().map(|s| s.vehicle_id))),
        ("x", i64_column(snapshots.iter().map(|s| s.position.x))),
        ("y", i64_column(snapshots.iter().map(|s| s.position.y))),
        (
            "capacity_remaining",
            u32_column(snapshots.iter().map(|s| s.capacity_remaining)),
        ),
        (
            "remaining_stops",
            u64_column(snapshots.iter().map(|s| s.remaining_stops as u64)),
        ),
    ])?;
    write_parquet(path, &batch)
}

pub fn write_completed_rides_parquet<P: AsRef<Path>>(
    path: P,
    telemetry: &SimTelemetry,
) -> Result<(), PoolError> {
    let rides = &telemetry.completed_rides;
    if let Some(problem) = rides.iter().find_map(validate_ride_ordering) {
        return Err(PoolError::Serialization(problem));
    }
    let batch = table([
        ("rider_id", u32_column(rides.iter().map(|r| r.rider_id))),
        ("vehicle_id", u32_column(rides.iter().map(|r| r.vehicle_id))),
        ("assigned_tick", u64_column(rides.iter().map(|r| r.assigned_tick))),
        ("pickup_tick", u64_column(rides.iter().map(|r| r.pickup_tick))),
        ("dropoff_tick", u64_column(rides.iter().map(|r| r.dropoff_tick))),
    ])?;
    write_parquet(path, &batch)
}

/// Describes the first out-of-order timestamp, if any.
pub fn validate_ride_ordering(record: &CompletedRideRecord) -> Option<String> {
    if record.pickup_tick < record.assigned_tick {
        return Some(format!(
            "rider {}: pickup tick {} before assignment tick {}",
            record.rider_id, record.pickup_tick, record.assigned_tick
        ));
    }
    if record.dropoff_tick < record.pickup_tick {
        return Some(format!(
            "rider {}: dropoff tick {} before pickup tick {}",
            record.rider_id, record.dropoff_tick, record.pickup_tick
        ));
    }
    None
}

/// Writes both telemetry tables into `dir`.
pub fn write_telemetry_parquet<P: AsRef<Path>>(
    dir: P,
    telemetry: &SimTelemetry,
) -> Result<(), PoolError> {
    let dir = dir.as_ref();
    write_vehicle_positions_parquet(dir.join(VEHICLE_POSITIONS_FILE), telemetry)?;
    write_completed_rides_parquet(dir.join(COMPLETED_RIDES_FILE), telemetry)
}

fn u64_column(values: impl Iterator<Item = u64>) -> ArrayRef {
    Arc::new(UInt64Array::from_iter_values(values))
}

fn u32_column(values: impl Iterator<Item = u32>) -> ArrayRef {
    Arc::new(UInt32Array::from_iter_values(values))
}

fn i64_column(values: impl Iterator<Item = i64>) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values))
}

/// Telemetry columns never hold nulls, so every field is non-nullable.
fn table<const N: usize>(columns: [(&str, ArrayRef); N]) -> Result<RecordBatch, PoolError> {
    let batch = RecordBatch::try_from_iter_with_nullable(
        columns
            .into_iter()
            .map(|(name, column)| (name, column, false)),
    )?;
    Ok(batch)
}

fn write_parquet<P: AsRef<Path>>(path: P, batch: &RecordBatch) -> Result<(), PoolError> {
    let mut writer = ArrowWriter::try_new(File::create(path)?, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}
