pub mod artifacts;
pub mod costs;
pub mod error;
pub mod greedy;
pub mod grid_world;
pub mod interpret;
pub mod model;
pub mod params;
pub mod pipeline;
pub mod qubo;
pub mod rides;
pub mod route;
pub mod simulation;
pub mod telemetry;
pub mod telemetry_export;
pub mod world;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
