//! Pipeline and simulation parameters.
//!
//! Every field has a default so a partial JSON config file is enough; call
//! [PoolParams::validate] before any assignment work begins.

use serde::{Deserialize, Serialize};

use crate::error::PoolError;
use crate::model::Coord;

pub const DEFAULT_NUM_VEHICLES: usize = 10;
pub const DEFAULT_MAX_CAPACITY: u32 = 4;
/// Seconds (10 minutes).
pub const DEFAULT_MAX_WAIT_TIME: f64 = 600.0;
pub const DEFAULT_PENALTY: f64 = 5000.0;
/// Metres per second.
pub const DEFAULT_AVG_SPEED: f64 = 10.0;
/// Kilometres per grid unit.
pub const DEFAULT_GRID_TO_KM: f64 = 0.5;

/// Which assignment strategy drives the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Greedy assignment every tick.
    #[default]
    Online,
    /// Precomputed routes applied on the first tick only.
    Offline,
}

/// Parameters for the annealing solver adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Independent annealing restarts.
    pub num_reads: usize,
    /// Full variable sweeps per read.
    pub num_sweeps: usize,
    pub seed: u64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            num_reads: 1000,
            num_sweeps: 1000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub strategy: StrategyKind,
    /// Simulated seconds per tick; requests are released once `request_time <= tick * tick_seconds`.
    pub tick_seconds: f64,
    /// Hard stop for runaway simulations.
    pub max_ticks: u64,
    /// Capture vehicle snapshots every N ticks (0 disables snapshots).
    pub snapshot_interval_ticks: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Online,
            tick_seconds: 1.0,
            max_ticks: 100_000,
            snapshot_interval_ticks: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    pub num_vehicles: usize,
    pub max_capacity: u32,
    /// Seconds a rider may wait before the wait-time penalty applies.
    pub max_wait_time: f64,
    /// Soft-constraint weight; keep it large relative to the largest distance entry.
    pub penalty: f64,
    pub avg_speed_m_per_s: f64,
    pub grid_to_km: f64,
    pub depot: Coord,
    /// Reject solutions that break capacity or wait-time limits after solving.
    pub strict_feasibility: bool,
    pub solver: SolverParams,
    pub simulation: SimulationParams,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            num_vehicles: DEFAULT_NUM_VEHICLES,
            max_capacity: DEFAULT_MAX_CAPACITY,
            max_wait_time: DEFAULT_MAX_WAIT_TIME,
            penalty: DEFAULT_PENALTY,
            avg_speed_m_per_s: DEFAULT_AVG_SPEED,
            grid_to_km: DEFAULT_GRID_TO_KM,
            depot: Coord::new(0, 0),
            strict_feasibility: false,
            solver: SolverParams::default(),
            simulation: SimulationParams::default(),
        }
    }
}

impl PoolParams {
    pub fn with_num_vehicles(mut self, num_vehicles: usize) -> Self {
        self.num_vehicles = num_vehicles;
        self
    }

    pub fn with_max_capacity(mut self, max_capacity: u32) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_max_wait_time(mut self, max_wait_time: f64) -> Self {
        self.max_wait_time = max_wait_time;
        self
    }

    pub fn with_depot(mut self, depot: Coord) -> Self {
        self.depot = depot;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.solver.seed = seed;
        self
    }

    pub fn with_num_reads(mut self, num_reads: usize) -> Self {
        self.solver.num_reads = num_reads;
        self
    }

    pub fn with_num_sweeps(mut self, num_sweeps: usize) -> Self {
        self.solver.num_sweeps = num_sweeps;
        self
    }

    pub fn with_strict_feasibility(mut self, strict: bool) -> Self {
        self.strict_feasibility = strict;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.simulation.strategy = strategy;
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.simulation.max_ticks = max_ticks;
        self
    }

    /// Checks every parameter the pipeline relies on. Fails before any work begins.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.num_vehicles == 0 {
            return Err(PoolError::config("num_vehicles must be positive"));
        }
        if self.max_capacity == 0 {
            return Err(PoolError::config("max_capacity must be positive"));
        }
        if !self.avg_speed_m_per_s.is_finite() || self.avg_speed_m_per_s <= 0.0 {
            return Err(PoolError::config(format!(
                "avg_speed_m_per_s must be positive, got {}",
                self.avg_speed_m_per_s
            )));
        }
        if !self.grid_to_km.is_finite() || self.grid_to_km <= 0.0 {
            return Err(PoolError::config(format!(
                "grid_to_km must be positive, got {}",
                self.grid_to_km
            )));
        }
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(PoolError::config(format!(
                "penalty must be a non-negative number, got {}",
                self.penalty
            )));
        }
        if !self.max_wait_time.is_finite() || self.max_wait_time < 0.0 {
            return Err(PoolError::config(format!(
                "max_wait_time must be a non-negative number, got {}",
                self.max_wait_time
            )));
        }
        if self.solver.num_sweeps == 0 {
            return Err(PoolError::config("num_sweeps must be positive"));
        }
        if !self.simulation.tick_seconds.is_finite() || self.simulation.tick_seconds <= 0.0 {
            return Err(PoolError::config("tick_seconds must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PoolParams::default().validate().expect("defaults validate");
    }

    #[test]
    fn rejects_non_positive_capacity_and_speed() {
        let params = PoolParams::default().with_max_capacity(0);
        assert!(matches!(
            params.validate(),
            Err(PoolError::Configuration { .. })
        ));

        let mut params = PoolParams::default();
        params.avg_speed_m_per_s = 0.0;
        assert!(matches!(
            params.validate(),
            Err(PoolError::Configuration { .. })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: PoolParams =
            serde_json::from_str(r#"{"max_capacity": 2, "solver": {"num_reads": 5}}"#)
                .expect("parse params");
        assert_eq!(params.max_capacity, 2);
        assert_eq!(params.solver.num_reads, 5);
        assert_eq!(params.solver.num_sweeps, 1000);
        assert_eq!(params.num_vehicles, DEFAULT_NUM_VEHICLES);
        assert_eq!(params.simulation.strategy, StrategyKind::Online);
    }
}
