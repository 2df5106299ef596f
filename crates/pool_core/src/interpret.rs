//! Decodes solver samples into per-vehicle rider lists.

use std::collections::BTreeMap;

use tracing::debug;

use crate::costs::CostMatrices;
use crate::error::{FeasibilityViolation, PoolError};
use crate::qubo::Sample;

/// Vehicle id to the riders it serves. Every vehicle of the model is present.
pub type Assignment = BTreeMap<u32, Vec<u32>>;

/// Places rider `i` under vehicle `j` iff `x[i][j] == 1`.
///
/// Fails with [PoolError::IncompleteAssignment] unless every rider `0..riders`
/// appears under exactly one vehicle. Nothing is dropped or deduplicated.
pub fn interpret(sample: &Sample, riders: usize, vehicles: usize) -> Result<Assignment, PoolError> {
    if sample.riders() != riders || sample.vehicles() != vehicles {
        return Err(PoolError::config(format!(
            "sample shape {}x{} does not match {riders} riders x {vehicles} vehicles",
            sample.riders(),
            sample.vehicles()
        )));
    }

    let mut assignment: Assignment = (0..vehicles as u32).map(|v| (v, Vec::new())).collect();
    let mut seen = vec![0usize; riders];
    for key in sample.ones() {
        assignment.entry(key.vehicle).or_default().push(key.rider);
        seen[key.rider as usize] += 1;
    }

    let missing: Vec<u32> = seen
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == 0)
        .map(|(rider, _)| rider as u32)
        .collect();
    let duplicated: Vec<u32> = seen
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 1)
        .map(|(rider, _)| rider as u32)
        .collect();

    if !missing.is_empty() || !duplicated.is_empty() {
        debug!(?missing, ?duplicated, "sample does not cover every rider once");
        return Err(PoolError::IncompleteAssignment {
            missing,
            duplicated,
        });
    }
    Ok(assignment)
}

/// Opt-in post-solve check of the soft constraints the objective only penalizes.
pub fn check_feasibility(
    assignment: &Assignment,
    costs: &CostMatrices,
    max_capacity: u32,
    max_wait_time: f64,
) -> Result<(), PoolError> {
    let mut violations = Vec::new();
    for (&vehicle_id, riders) in assignment {
        if riders.len() > max_capacity as usize {
            violations.push(FeasibilityViolation::OverCapacity {
                vehicle_id,
                assigned: riders.len(),
                max_capacity,
            });
        }
        for &rider_id in riders {
            let (i, j) = (rider_id as usize, vehicle_id as usize);
            if i >= costs.riders() || j >= costs.vehicles() {
                return Err(PoolError::Configuration {
                    message: "assignment refers outside the cost matrices".to_string(),
                    rider_id: Some(rider_id),
                    vehicle_id: Some(vehicle_id),
                });
            }
            let wait_time = costs.wait_time(i, j);
            if wait_time > max_wait_time {
                violations.push(FeasibilityViolation::WaitTooLong {
                    rider_id,
                    vehicle_id,
                    wait_time,
                    max_wait_time,
                });
            }
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(PoolError::InfeasibleAssignment { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qubo::VarKey;

    fn sample_of(riders: usize, vehicles: usize, ones: &[(u32, u32)]) -> Sample {
        Sample::from_keyed(
            riders,
            vehicles,
            ones.iter().map(|&(r, v)| (VarKey::new(r, v), 1)),
        )
        .expect("sample")
    }

    #[test]
    fn decodes_complete_sample() {
        let sample = sample_of(3, 2, &[(0, 1), (1, 0), (2, 1)]);
        let assignment = interpret(&sample, 3, 2).expect("assignment");
        assert_eq!(assignment[&0], vec![1]);
        assert_eq!(assignment[&1], vec![0, 2]);
    }

    #[test]
    fn empty_vehicles_are_listed() {
        let sample = sample_of(1, 3, &[(0, 2)]);
        let assignment = interpret(&sample, 1, 3).expect("assignment");
        assert_eq!(assignment.len(), 3);
        assert!(assignment[&0].is_empty());
        assert!(assignment[&1].is_empty());
    }

    #[test]
    fn reports_missing_and_duplicated_riders() {
        let sample = sample_of(3, 2, &[(0, 0), (0, 1), (2, 1)]);
        match interpret(&sample, 3, 2) {
            Err(PoolError::IncompleteAssignment {
                missing,
                duplicated,
            }) => {
                assert_eq!(missing, vec![1]);
                assert_eq!(duplicated, vec![0]);
            }
            other => panic!("expected incomplete assignment, got {other:?}"),
        }
    }

    #[test]
    fn shape_mismatch_is_a_configuration_error() {
        let sample = sample_of(2, 2, &[(0, 0), (1, 1)]);
        assert!(matches!(
            interpret(&sample, 2, 3),
            Err(PoolError::Configuration { .. })
        ));
    }

    #[test]
    fn feasibility_check_lists_every_violation() {
        let costs = CostMatrices::new(
            3,
            1,
            vec![vec![1.0]; 3],
            vec![vec![10.0], vec![700.0], vec![0.0]],
        )
        .expect("costs");
        let assignment: Assignment = [(0, vec![0, 1, 2])].into_iter().collect();

        match check_feasibility(&assignment, &costs, 2, 600.0) {
            Err(PoolError::InfeasibleAssignment { violations }) => {
                assert_eq!(violations.len(), 2);
                assert!(matches!(
                    violations[0],
                    FeasibilityViolation::OverCapacity { assigned: 3, .. }
                ));
                assert!(matches!(
                    violations[1],
                    FeasibilityViolation::WaitTooLong { rider_id: 1, .. }
                ));
            }
            other => panic!("expected infeasible assignment, got {other:?}"),
        }

        assert!(check_feasibility(&assignment, &costs, 3, 800.0).is_ok());
    }
}
