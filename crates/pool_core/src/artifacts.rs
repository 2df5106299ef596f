//! JSON artifacts passed between pipeline stages.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PoolError;
use crate::interpret::Assignment;
use crate::qubo::Qubo;
use crate::route::RouteArtifact;

pub const RIDES_FILE: &str = "rides.csv";
pub const QUBO_FILE: &str = "qubo.json";
pub const ASSIGNMENTS_FILE: &str = "assignments.json";
pub const ROUTES_FILE: &str = "routes.json";
pub const SIMULATION_SUMMARY_FILE: &str = "simulation_summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSetInfo {
    pub num_occurrences: usize,
    pub chain_break_fraction: Option<f64>,
}

/// Result of the solve stage as written to `assignments.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub solver: String,
    pub solve_time_sec: f64,
    pub energy: f64,
    /// Whether the assignment passed the capacity and wait-time check.
    pub is_valid: bool,
    /// Vehicle id to rider ids.
    pub assignments: Assignment,
    pub num_reads: usize,
    pub sampleset_info: SampleSetInfo,
}

impl SolveReport {
    pub fn assigned_riders(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }
}

pub fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<(), PoolError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, PoolError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_qubo<P: AsRef<Path>>(path: P, qubo: &Qubo) -> Result<(), PoolError> {
    write_json(path, qubo)
}

pub fn read_qubo<P: AsRef<Path>>(path: P) -> Result<Qubo, PoolError> {
    read_json(path)
}

pub fn write_solve_report<P: AsRef<Path>>(path: P, report: &SolveReport) -> Result<(), PoolError> {
    write_json(path, report)
}

pub fn read_solve_report<P: AsRef<Path>>(path: P) -> Result<SolveReport, PoolError> {
    read_json(path)
}

pub fn write_routes<P: AsRef<Path>>(path: P, routes: &[RouteArtifact]) -> Result<(), PoolError> {
    write_json(path, &routes)
}

pub fn read_routes<P: AsRef<Path>>(path: P) -> Result<Vec<RouteArtifact>, PoolError> {
    read_json(path)
}
