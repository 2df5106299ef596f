//! Offline planning: costs, model, solve, interpret, routes.
//!
//! The model indexes riders by their position in the batch; [solve_model] maps
//! those positions back to rider ids before anything leaves this module.

use std::time::Instant;

use tracing::{info, warn};

use crate::artifacts::{SampleSetInfo, SolveReport};
use crate::costs::{CostMatrices, CostMatrixProvider};
use crate::error::{FeasibilityViolation, PoolError};
use crate::interpret::{check_feasibility, interpret, Assignment};
use crate::model::RiderRequest;
use crate::params::PoolParams;
use crate::qubo::{AssignmentModelBuilder, Qubo, QuboSolver};
use crate::rides::validate_batch;
use crate::route::{build_routes, RouteArtifact, RouteBuilder};

/// Everything the offline strategy produces for one batch.
#[derive(Debug, Clone)]
pub struct OfflinePlan {
    pub qubo: Qubo,
    pub report: SolveReport,
    pub routes: Vec<RouteArtifact>,
}

/// Validates inputs and builds the cost matrices and objective for `riders`.
pub fn build_model(
    riders: &[RiderRequest],
    params: &PoolParams,
    costs: &dyn CostMatrixProvider,
) -> Result<(CostMatrices, Qubo), PoolError> {
    params.validate()?;
    validate_batch(riders)?;
    let matrices = costs.cost_matrices(riders, params.num_vehicles)?;
    let qubo = AssignmentModelBuilder::from_params(params).build(&matrices)?;
    Ok((matrices, qubo))
}

/// Solves `qubo`, decodes the best sample and checks it against `costs`.
///
/// With `strict_feasibility` a violated capacity or wait limit is an error;
/// otherwise the report is marked invalid and returned.
pub fn solve_model(
    qubo: &Qubo,
    costs: &CostMatrices,
    riders: &[RiderRequest],
    params: &PoolParams,
    solver: &dyn QuboSolver,
) -> Result<SolveReport, PoolError> {
    if qubo.riders() != riders.len() || qubo.vehicles() != params.num_vehicles {
        return Err(PoolError::config(format!(
            "model is {}x{} but the batch has {} riders and {} vehicles",
            qubo.riders(),
            qubo.vehicles(),
            riders.len(),
            params.num_vehicles
        )));
    }

    let started = Instant::now();
    let outcome = solver.solve(qubo, &params.solver)?;
    let solve_time_sec = started.elapsed().as_secs_f64();

    let by_index = interpret(&outcome.sample, qubo.riders(), qubo.vehicles())
        .map_err(|err| with_rider_ids(err, riders))?;
    let is_valid = match check_feasibility(&by_index, costs, params.max_capacity, params.max_wait_time)
        .map_err(|err| with_rider_ids(err, riders))
    {
        Ok(()) => true,
        Err(err) if params.strict_feasibility => return Err(err),
        Err(err) => {
            warn!(error = %err, "assignment breaks soft constraints");
            false
        }
    };

    let report = SolveReport {
        solver: solver.name().to_string(),
        solve_time_sec,
        energy: outcome.energy,
        is_valid,
        assignments: to_rider_ids(&by_index, riders)?,
        num_reads: outcome.num_reads,
        sampleset_info: SampleSetInfo {
            num_occurrences: outcome.num_occurrences,
            chain_break_fraction: outcome.chain_break_fraction,
        },
    };
    info!(
        solver = %report.solver,
        energy = report.energy,
        is_valid,
        solve_time_sec,
        "solve stage finished"
    );
    Ok(report)
}

/// Builds one route per vehicle from a solved assignment.
pub fn plan_routes(
    assignment: &Assignment,
    riders: &[RiderRequest],
    params: &PoolParams,
) -> Result<Vec<RouteArtifact>, PoolError> {
    let builder = RouteBuilder::from_params(params)?;
    let routes = build_routes(&builder, assignment, riders)?;
    let total: f64 = routes.iter().map(|r| r.total_distance).sum();
    info!(routes = routes.len(), total_distance = total, "routes built");
    Ok(routes)
}

/// Runs every offline stage in order.
pub fn plan_offline(
    riders: &[RiderRequest],
    params: &PoolParams,
    costs: &dyn CostMatrixProvider,
    solver: &dyn QuboSolver,
) -> Result<OfflinePlan, PoolError> {
    let (matrices, qubo) = build_model(riders, params, costs)?;
    let report = solve_model(&qubo, &matrices, riders, params, solver)?;
    let routes = plan_routes(&report.assignments, riders, params)?;
    Ok(OfflinePlan {
        qubo,
        report,
        routes,
    })
}

/// Maps batch positions to rider ids, keeping ids ascending per vehicle.
fn to_rider_ids(by_index: &Assignment, riders: &[RiderRequest]) -> Result<Assignment, PoolError> {
    by_index
        .iter()
        .map(|(&vehicle_id, indices)| {
            let mut ids = indices
                .iter()
                .map(|&index| {
                    riders.get(index as usize).map(|r| r.id).ok_or_else(|| PoolError::Configuration {
                        message: "sample refers outside the batch".to_string(),
                        rider_id: Some(index),
                        vehicle_id: Some(vehicle_id),
                    })
                })
                .collect::<Result<Vec<u32>, PoolError>>()?;
            ids.sort_unstable();
            Ok((vehicle_id, ids))
        })
        .collect()
}

/// Rewrites the batch positions carried by a decode or feasibility error as rider ids.
fn with_rider_ids(err: PoolError, riders: &[RiderRequest]) -> PoolError {
    let id_of = |index: u32| riders.get(index as usize).map_or(index, |r| r.id);
    let ids_of = |indices: Vec<u32>| {
        let mut ids: Vec<u32> = indices.into_iter().map(id_of).collect();
        ids.sort_unstable();
        ids
    };
    match err {
        PoolError::IncompleteAssignment {
            missing,
            duplicated,
        } => PoolError::IncompleteAssignment {
            missing: ids_of(missing),
            duplicated: ids_of(duplicated),
        },
        PoolError::InfeasibleAssignment { violations } => PoolError::InfeasibleAssignment {
            violations: violations
                .into_iter()
                .map(|violation| match violation {
                    FeasibilityViolation::WaitTooLong {
                        rider_id,
                        vehicle_id,
                        wait_time,
                        max_wait_time,
                    } => FeasibilityViolation::WaitTooLong {
                        rider_id: id_of(rider_id),
                        vehicle_id,
                        wait_time,
                        max_wait_time,
                    },
                    other => other,
                })
                .collect(),
        },
        PoolError::Configuration {
            message,
            rider_id,
            vehicle_id,
        } => PoolError::Configuration {
            message,
            rider_id: rider_id.map(id_of),
            vehicle_id,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::TripCosts;
    use crate::model::Coord;
    use crate::qubo::{SimulatedAnnealingSolver, SolveOutcome, Sample, VarKey};
    use crate::params::SolverParams;
    use crate::test_helpers::{fast_params, rider, worked_example_riders};

    /// Returns a fixed sample regardless of the model.
    struct FixedSolver(Vec<(u32, u32)>);

    impl QuboSolver for FixedSolver {
        fn name(&self) -> &str {
            "fixed"
        }

        fn solve(&self, qubo: &Qubo, params: &SolverParams) -> Result<SolveOutcome, PoolError> {
            let sample = Sample::from_keyed(
                qubo.riders(),
                qubo.vehicles(),
                self.0.iter().map(|&(r, v)| (VarKey::new(r, v), 1)),
            )?;
            Ok(SolveOutcome {
                energy: qubo.energy(&sample)?,
                sample,
                num_occurrences: 1,
                chain_break_fraction: None,
                num_reads: params.num_reads,
            })
        }
    }

    #[test]
    fn plan_offline_covers_every_rider() {
        let params = fast_params().with_num_vehicles(2).with_max_capacity(1);
        let riders = worked_example_riders();
        let plan = plan_offline(
            &riders,
            &params,
            &TripCosts::new(params.grid_to_km),
            &SimulatedAnnealingSolver,
        )
        .expect("plan");

        assert_eq!(plan.report.assigned_riders(), 2);
        assert_eq!(plan.routes.len(), 2);
        let stops: usize = plan.routes.iter().map(|r| r.route.len()).sum();
        assert_eq!(stops, 4);
        for route in &plan.routes {
            let legs: f64 = route.route.iter().map(|s| s.distance_from_previous).sum();
            assert_eq!(legs, route.total_distance);
        }
    }

    #[test]
    fn positions_are_mapped_to_rider_ids() {
        let riders = vec![rider(10, (0, 1), (0, 2), 0.0), rider(20, (3, 3), (1, 1), 0.0)];
        let params = fast_params().with_num_vehicles(2);
        let (costs, qubo) = build_model(&riders, &params, &TripCosts::new(0.5)).expect("model");
        let report = solve_model(&qubo, &costs, &riders, &params, &FixedSolver(vec![(0, 1), (1, 1)]))
            .expect("report");
        assert_eq!(report.assignments[&1], vec![10, 20]);
        assert!(report.assignments[&0].is_empty());
        assert_eq!(report.solver, "fixed");

        let routes = plan_routes(&report.assignments, &riders, &params).expect("routes");
        assert_eq!(routes[1].route[0].coord, Coord::new(0, 1));
    }

    #[test]
    fn incomplete_sample_is_fatal() {
        let riders = worked_example_riders();
        let params = fast_params().with_num_vehicles(2);
        let (costs, qubo) = build_model(&riders, &params, &TripCosts::new(0.5)).expect("model");
        let err = solve_model(&qubo, &costs, &riders, &params, &FixedSolver(vec![(0, 0)]))
            .expect_err("rider 1 missing");
        assert!(matches!(err, PoolError::IncompleteAssignment { ref missing, .. } if missing == &vec![1]));
    }

    #[test]
    fn strict_feasibility_rejects_overloaded_vehicle() {
        let riders = worked_example_riders();
        let lenient = fast_params().with_num_vehicles(2).with_max_capacity(1);
        let (costs, qubo) = build_model(&riders, &lenient, &TripCosts::new(0.5)).expect("model");
        let overload = FixedSolver(vec![(0, 0), (1, 0)]);

        let report = solve_model(&qubo, &costs, &riders, &lenient, &overload).expect("lenient");
        assert!(!report.is_valid);

        let strict = lenient.clone().with_strict_feasibility(true);
        let err = solve_model(&qubo, &costs, &riders, &strict, &overload).expect_err("strict");
        assert!(matches!(err, PoolError::InfeasibleAssignment { .. }));
    }

    #[test]
    fn invalid_params_fail_before_work() {
        let riders = worked_example_riders();
        let params = fast_params().with_max_capacity(0);
        let err = build_model(&riders, &params, &TripCosts::new(0.5)).expect_err("invalid");
        assert!(matches!(err, PoolError::Configuration { .. }));
    }
}
