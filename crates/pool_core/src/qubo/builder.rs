//! Builds the rider-to-vehicle assignment objective.
//!
//! ```text
//! sum d[i][j] x[i][j]
//!   + P * ( sum_i (sum_j x[i][j] - 1)^2
//!         + sum_j (sum_i x[i][j] - C)^2
//!         + sum_{w[i][j] > W} (w[i][j] - W)^2 x[i][j] )
//! ```
//!
//! The squares are expanded with `x^2 = x`, so each penalty contributes a linear
//! bias, pairwise couplings and a constant offset. Penalties are soft: a large
//! `P` biases the solver toward feasible assignments but does not guarantee them.

use tracing::{debug, info, warn};

use crate::costs::CostMatrices;
use crate::error::PoolError;
use crate::params::PoolParams;

use super::{Qubo, VarKey};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentModelBuilder {
    pub max_capacity: u32,
    pub max_wait_time: f64,
    pub penalty: f64,
}

impl AssignmentModelBuilder {
    pub fn new(max_capacity: u32, max_wait_time: f64, penalty: f64) -> Self {
        Self {
            max_capacity,
            max_wait_time,
            penalty,
        }
    }

    pub fn from_params(params: &PoolParams) -> Self {
        Self::new(params.max_capacity, params.max_wait_time, params.penalty)
    }

    pub fn build(&self, costs: &CostMatrices) -> Result<Qubo, PoolError> {
        if self.max_capacity == 0 {
            return Err(PoolError::config("max_capacity must be positive"));
        }
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(PoolError::config("penalty must be a non-negative number"));
        }
        if !self.max_wait_time.is_finite() || self.max_wait_time < 0.0 {
            return Err(PoolError::config("max_wait_time must be a non-negative number"));
        }

        let riders = costs.riders();
        let vehicles = costs.vehicles();
        let p = self.penalty;
        let capacity = f64::from(self.max_capacity);

        let max_distance = costs.max_distance();
        if riders > 0 && vehicles > 0 && p <= max_distance {
            warn!(
                penalty = p,
                max_distance, "penalty does not dominate distance; solutions may be infeasible"
            );
        }

        let mut qubo = Qubo::new(riders, vehicles);

        for i in 0..riders {
            for j in 0..vehicles {
                let key = VarKey::new(i as u32, j as u32);
                let mut bias = costs.distance(i, j);
                // (sum_j x - 1)^2 contributes -x per variable.
                bias -= p;
                // (sum_i x - C)^2 contributes (1 - 2C) x per variable.
                bias += p * (1.0 - 2.0 * capacity);
                let wait = costs.wait_time(i, j);
                if wait > self.max_wait_time {
                    let excess = wait - self.max_wait_time;
                    bias += p * excess * excess;
                }
                qubo.add_linear(key, bias);
            }
        }

        // One vehicle per rider.
        for i in 0..riders {
            for j in 0..vehicles {
                for k in (j + 1)..vehicles {
                    qubo.add_quadratic(
                        VarKey::new(i as u32, j as u32),
                        VarKey::new(i as u32, k as u32),
                        2.0 * p,
                    );
                }
            }
        }

        // Vehicle load pulled toward capacity.
        for j in 0..vehicles {
            for i in 0..riders {
                for k in (i + 1)..riders {
                    qubo.add_quadratic(
                        VarKey::new(i as u32, j as u32),
                        VarKey::new(k as u32, j as u32),
                        2.0 * p,
                    );
                }
            }
        }

        qubo.add_offset(p * riders as f64);
        qubo.add_offset(p * capacity * capacity * vehicles as f64);

        info!(
            riders,
            vehicles,
            terms = qubo.num_terms(),
            offset = qubo.offset(),
            "assignment model built"
        );
        debug!(penalty = p, max_capacity = self.max_capacity, max_wait_time = self.max_wait_time);
        Ok(qubo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qubo::Sample;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Evaluates the objective formula directly, without the QUBO expansion.
    fn direct_objective(builder: &AssignmentModelBuilder, costs: &CostMatrices, sample: &Sample) -> f64 {
        let (r, v) = (costs.riders(), costs.vehicles());
        let p = builder.penalty;
        let c = f64::from(builder.max_capacity);
        let x = |i: usize, j: usize| f64::from(sample.get(VarKey::new(i as u32, j as u32)));

        let mut distance = 0.0;
        let mut wait_penalty = 0.0;
        for i in 0..r {
            for j in 0..v {
                distance += costs.distance(i, j) * x(i, j);
                let w = costs.wait_time(i, j);
                if w > builder.max_wait_time {
                    wait_penalty += (w - builder.max_wait_time).powi(2) * x(i, j);
                }
            }
        }
        let rider_penalty: f64 = (0..r)
            .map(|i| ((0..v).map(|j| x(i, j)).sum::<f64>() - 1.0).powi(2))
            .sum();
        let vehicle_penalty: f64 = (0..v)
            .map(|j| ((0..r).map(|i| x(i, j)).sum::<f64>() - c).powi(2))
            .sum();
        distance + p * (rider_penalty + vehicle_penalty + wait_penalty)
    }

    #[test]
    fn energy_matches_formula_for_every_sample() {
        let mut rng = StdRng::seed_from_u64(3);
        let costs = CostMatrices::synthetic(3, 2, &mut rng);
        let builder = AssignmentModelBuilder::new(2, 300.0, 50.0);
        let qubo = builder.build(&costs).expect("model");

        for bits in 0u32..(1 << 6) {
            let values = (0..6).map(|b| ((bits >> b) & 1) as u8).collect();
            let sample = Sample::from_values(3, 2, values).expect("sample");
            let energy = qubo.energy(&sample).expect("energy");
            let expected = direct_objective(&builder, &costs, &sample);
            assert!(
                (energy - expected).abs() < 1e-6,
                "bits {bits:06b}: energy {energy} != objective {expected}"
            );
        }
    }

    #[test]
    fn every_variable_is_represented() {
        let costs = CostMatrices::new(2, 2, vec![vec![0.0; 2]; 2], vec![vec![0.0; 2]; 2])
            .expect("costs");
        let qubo = AssignmentModelBuilder::new(1, 600.0, 0.0)
            .build(&costs)
            .expect("model");
        let linear_terms = qubo.terms().filter(|(u, v, _)| u == v).count();
        assert_eq!(linear_terms, 4);
    }

    #[test]
    fn build_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(9);
        let costs = CostMatrices::synthetic(4, 3, &mut rng);
        let builder = AssignmentModelBuilder::new(2, 600.0, 5000.0);
        assert_eq!(builder.build(&costs).expect("a"), builder.build(&costs).expect("b"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let costs = CostMatrices::new(1, 1, vec![vec![1.0]], vec![vec![0.0]]).expect("costs");
        let err = AssignmentModelBuilder::new(0, 600.0, 10.0)
            .build(&costs)
            .expect_err("zero capacity");
        assert!(matches!(err, PoolError::Configuration { .. }));
    }
}
