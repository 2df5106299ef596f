//! Error taxonomy for the assignment pipeline and the dispatch loop.
//!
//! Structural errors ([PoolError::Configuration], [PoolError::IncompleteAssignment],
//! [PoolError::SolverFailure]) abort the current stage. Per-rider dispatch errors
//! ([PoolError::UnreachableTarget], [PoolError::ResourceExhaustion]) are reported
//! alongside the tick result and never abort sibling assignments.

use std::fmt;

use crate::model::Coord;

/// Errors raised by a [crate::world::SteppedWorld] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    UnknownVehicle(u32),
    DuplicateVehicle(u32),
    Unreachable { vehicle_id: u32, target: Coord },
    Closed,
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::UnknownVehicle(id) => write!(f, "unknown vehicle {id}"),
            WorldError::DuplicateVehicle(id) => write!(f, "vehicle {id} already exists"),
            WorldError::Unreachable { vehicle_id, target } => {
                write!(f, "vehicle {vehicle_id} cannot reach {target}")
            }
            WorldError::Closed => f.write_str("world handle already released"),
        }
    }
}

impl std::error::Error for WorldError {}

/// A single post-solve feasibility violation.
#[derive(Debug, Clone, PartialEq)]
pub enum FeasibilityViolation {
    OverCapacity {
        vehicle_id: u32,
        assigned: usize,
        max_capacity: u32,
    },
    WaitTooLong {
        rider_id: u32,
        vehicle_id: u32,
        wait_time: f64,
        max_wait_time: f64,
    },
}

impl fmt::Display for FeasibilityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeasibilityViolation::OverCapacity {
                vehicle_id,
                assigned,
                max_capacity,
            } => write!(
                f,
                "vehicle {vehicle_id} carries {assigned} riders (capacity {max_capacity})"
            ),
            FeasibilityViolation::WaitTooLong {
                rider_id,
                vehicle_id,
                wait_time,
                max_wait_time,
            } => write!(
                f,
                "rider {rider_id} on vehicle {vehicle_id} waits {wait_time}s (max {max_wait_time}s)"
            ),
        }
    }
}

#[derive(Debug)]
pub enum PoolError {
    Configuration {
        message: String,
        rider_id: Option<u32>,
        vehicle_id: Option<u32>,
    },
    IncompleteAssignment {
        missing: Vec<u32>,
        duplicated: Vec<u32>,
    },
    SolverFailure {
        message: String,
    },
    UnreachableTarget {
        rider_id: u32,
        vehicle_id: u32,
        target: Coord,
    },
    ResourceExhaustion {
        rider_id: u32,
    },
    InfeasibleAssignment {
        violations: Vec<FeasibilityViolation>,
    },
    World(WorldError),
    Io(std::io::Error),
    Serialization(String),
}

impl PoolError {
    pub fn config(message: impl Into<String>) -> Self {
        PoolError::Configuration {
            message: message.into(),
            rider_id: None,
            vehicle_id: None,
        }
    }

    pub fn config_for_rider(message: impl Into<String>, rider_id: u32) -> Self {
        PoolError::Configuration {
            message: message.into(),
            rider_id: Some(rider_id),
            vehicle_id: None,
        }
    }

    pub fn config_for_vehicle(message: impl Into<String>, vehicle_id: u32) -> Self {
        PoolError::Configuration {
            message: message.into(),
            rider_id: None,
            vehicle_id: Some(vehicle_id),
        }
    }

    pub fn solver(message: impl Into<String>) -> Self {
        PoolError::SolverFailure {
            message: message.into(),
        }
    }

    /// Rider the error refers to, if any.
    pub fn rider_id(&self) -> Option<u32> {
        match self {
            PoolError::Configuration { rider_id, .. } => *rider_id,
            PoolError::UnreachableTarget { rider_id, .. } => Some(*rider_id),
            PoolError::ResourceExhaustion { rider_id } => Some(*rider_id),
            _ => None,
        }
    }

    /// Vehicle the error refers to, if any.
    pub fn vehicle_id(&self) -> Option<u32> {
        match self {
            PoolError::Configuration { vehicle_id, .. } => *vehicle_id,
            PoolError::UnreachableTarget { vehicle_id, .. } => Some(*vehicle_id),
            PoolError::World(WorldError::UnknownVehicle(id))
            | PoolError::World(WorldError::DuplicateVehicle(id)) => Some(*id),
            PoolError::World(WorldError::Unreachable { vehicle_id, .. }) => Some(*vehicle_id),
            _ => None,
        }
    }

    /// Per-rider runtime errors are recovered locally by the dispatch loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PoolError::UnreachableTarget { .. } | PoolError::ResourceExhaustion { .. }
        )
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Configuration {
                message,
                rider_id,
                vehicle_id,
            } => {
                write!(f, "configuration error: {message}")?;
                if let Some(rider_id) = rider_id {
                    write!(f, " (rider {rider_id})")?;
                }
                if let Some(vehicle_id) = vehicle_id {
                    write!(f, " (vehicle {vehicle_id})")?;
                }
                Ok(())
            }
            PoolError::IncompleteAssignment {
                missing,
                duplicated,
            } => write!(
                f,
                "incomplete assignment: missing riders {missing:?}, duplicated riders {duplicated:?}"
            ),
            PoolError::SolverFailure { message } => write!(f, "solver failure: {message}"),
            PoolError::UnreachableTarget {
                rider_id,
                vehicle_id,
                target,
            } => write!(
                f,
                "rider {rider_id}: vehicle {vehicle_id} cannot reach {target}"
            ),
            PoolError::ResourceExhaustion { rider_id } => {
                write!(f, "rider {rider_id}: no vehicle has free capacity")
            }
            PoolError::InfeasibleAssignment { violations } => {
                write!(f, "infeasible assignment ({} violations)", violations.len())?;
                for violation in violations {
                    write!(f, "; {violation}")?;
                }
                Ok(())
            }
            PoolError::World(err) => write!(f, "world error: {err}"),
            PoolError::Io(err) => write!(f, "io error: {err}"),
            PoolError::Serialization(message) => write!(f, "serialization error: {message}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::World(err) => Some(err),
            PoolError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WorldError> for PoolError {
    fn from(err: WorldError) -> Self {
        PoolError::World(err)
    }
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io(err)
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for PoolError {
    fn from(err: csv::Error) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for PoolError {
    fn from(err: arrow::error::ArrowError) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for PoolError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        PoolError::Serialization(err.to_string())
    }
}
