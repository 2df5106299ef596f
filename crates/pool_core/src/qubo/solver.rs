//! Solver adapter seam and a reference simulated-annealing sampler.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::PoolError;
use crate::params::SolverParams;

use super::{Qubo, Sample, VarKey};

/// Best sample returned by a solver, with its energy and sampling metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub sample: Sample,
    pub energy: f64,
    /// Reads that ended in exactly the returned sample.
    pub num_occurrences: usize,
    /// Fraction of broken chains for embedded hardware samplers; `None` otherwise.
    pub chain_break_fraction: Option<f64>,
    pub num_reads: usize,
}

/// Minimizes a [Qubo]. The search method is up to the implementation; the call
/// blocks until a complete sample is available or fails.
pub trait QuboSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, qubo: &Qubo, params: &SolverParams) -> Result<SolveOutcome, PoolError>;
}

/// Single-flip Metropolis annealing with a geometric inverse-temperature schedule.
///
/// Read `k` is seeded with `seed + k` and reads run in parallel; the lowest-energy
/// read wins, earliest read on ties, so results do not depend on thread scheduling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedAnnealingSolver;

struct Couplings {
    linear: Vec<f64>,
    neighbors: Vec<Vec<(usize, f64)>>,
}

impl Couplings {
    fn from_qubo(qubo: &Qubo) -> Self {
        let n = qubo.num_variables();
        let vehicles = qubo.vehicles();
        let mut linear = vec![0.0; n];
        let mut neighbors = vec![Vec::new(); n];
        for (u, v, bias) in qubo.terms() {
            let (a, b) = (u.index(vehicles), v.index(vehicles));
            if a == b {
                linear[a] += bias;
            } else {
                neighbors[a].push((b, bias));
                neighbors[b].push((a, bias));
            }
        }
        Self { linear, neighbors }
    }

    /// `(beta_min, beta_max)` so the hottest sweep accepts the largest uphill move
    /// with probability 1/2 and the coldest accepts the smallest with 1/100.
    fn beta_range(&self) -> (f64, f64) {
        let mut max_delta: f64 = 0.0;
        let mut min_delta = f64::INFINITY;
        for (i, h) in self.linear.iter().enumerate() {
            let mut total = h.abs();
            if h.abs() > 0.0 {
                min_delta = min_delta.min(h.abs());
            }
            for (_, j) in &self.neighbors[i] {
                total += j.abs();
                if j.abs() > 0.0 {
                    min_delta = min_delta.min(j.abs());
                }
            }
            max_delta = max_delta.max(total);
        }
        if max_delta <= 0.0 || !min_delta.is_finite() {
            return (0.1, 1.0);
        }
        let beta_min = std::f64::consts::LN_2 / max_delta;
        let beta_max = (100.0f64).ln() / min_delta;
        (beta_min, beta_max.max(beta_min))
    }

    fn local_fields(&self, state: &[u8]) -> Vec<f64> {
        self.linear
            .iter()
            .enumerate()
            .map(|(i, h)| {
                h + self.neighbors[i]
                    .iter()
                    .filter(|(n, _)| state[*n] == 1)
                    .map(|(_, j)| j)
                    .sum::<f64>()
            })
            .collect()
    }

    fn flip(&self, state: &mut [u8], fields: &mut [f64], i: usize) {
        let step = if state[i] == 1 { -1.0 } else { 1.0 };
        state[i] ^= 1;
        for &(n, j) in &self.neighbors[i] {
            fields[n] += j * step;
        }
    }

    fn anneal(&self, seed: u64, betas: &[f64]) -> Vec<u8> {
        let n = self.linear.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state: Vec<u8> = (0..n).map(|_| u8::from(rng.gen::<bool>())).collect();
        let mut fields = self.local_fields(&state);

        for &beta in betas {
            for i in 0..n {
                let delta = if state[i] == 1 { -fields[i] } else { fields[i] };
                if delta <= 0.0 || rng.gen::<f64>() < (-beta * delta).exp() {
                    self.flip(&mut state, &mut fields, i);
                }
            }
        }

        // Zero-temperature polish: take strictly improving flips until none remain.
        loop {
            let mut improved = false;
            for i in 0..n {
                let delta = if state[i] == 1 { -fields[i] } else { fields[i] };
                if delta < 0.0 {
                    self.flip(&mut state, &mut fields, i);
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
        state
    }
}

fn geometric_schedule(beta_min: f64, beta_max: f64, sweeps: usize) -> Vec<f64> {
    if sweeps <= 1 {
        return vec![beta_max];
    }
    let ratio = beta_max / beta_min;
    (0..sweeps)
        .map(|k| beta_min * ratio.powf(k as f64 / (sweeps - 1) as f64))
        .collect()
}

impl QuboSolver for SimulatedAnnealingSolver {
    fn name(&self) -> &str {
        "simulated_annealing"
    }

    fn solve(&self, qubo: &Qubo, params: &SolverParams) -> Result<SolveOutcome, PoolError> {
        if params.num_reads == 0 {
            return Err(PoolError::solver("num_reads must be positive"));
        }
        let started = Instant::now();
        let riders = qubo.riders();
        let vehicles = qubo.vehicles();

        if qubo.num_variables() == 0 {
            return Ok(SolveOutcome {
                sample: Sample::zeros(riders, vehicles),
                energy: qubo.offset(),
                num_occurrences: params.num_reads,
                chain_break_fraction: None,
                num_reads: params.num_reads,
            });
        }

        let couplings = Couplings::from_qubo(qubo);
        let (beta_min, beta_max) = couplings.beta_range();
        let betas = geometric_schedule(beta_min, beta_max, params.num_sweeps.max(1));
        debug!(beta_min, beta_max, sweeps = betas.len(), "annealing schedule");

        let reads: Vec<Vec<u8>> = (0..params.num_reads)
            .into_par_iter()
            .map(|read| couplings.anneal(params.seed.wrapping_add(read as u64), &betas))
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (read, state) in reads.iter().enumerate() {
            let sample = Sample::from_values(riders, vehicles, state.clone())?;
            let energy = qubo.energy(&sample)?;
            if energy.is_nan() {
                return Err(PoolError::solver(format!("read {read} produced a NaN energy")));
            }
            match best {
                Some((_, best_energy)) if energy >= best_energy => {}
                _ => best = Some((read, energy)),
            }
        }

        let (best_read, energy) =
            best.ok_or_else(|| PoolError::solver("annealer returned no samples"))?;
        let best_state = &reads[best_read];
        let num_occurrences = reads.iter().filter(|state| *state == best_state).count();
        let sample = Sample::from_values(riders, vehicles, best_state.clone())?;

        info!(
            solver = self.name(),
            reads = params.num_reads,
            energy,
            num_occurrences,
            assigned = sample.ones().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "annealing finished"
        );

        Ok(SolveOutcome {
            sample,
            energy,
            num_occurrences,
            chain_break_fraction: None,
            num_reads: params.num_reads,
        })
    }
}

/// Brute-force minimum for tiny models; used to check the annealer.
#[cfg(any(test, feature = "test-helpers"))]
pub fn exhaustive_minimum(qubo: &Qubo) -> Result<(Sample, f64), PoolError> {
    let n = qubo.num_variables();
    if n > 20 {
        return Err(PoolError::solver("exhaustive search limited to 20 variables"));
    }
    let mut best: Option<(Sample, f64)> = None;
    for bits in 0u32..(1u32 << n) {
        let mut sample = Sample::zeros(qubo.riders(), qubo.vehicles());
        for index in 0..n {
            sample.set(VarKey::from_index(index, qubo.vehicles()), (bits >> index) & 1 == 1);
        }
        let energy = qubo.energy(&sample)?;
        if best.as_ref().map_or(true, |(_, e)| energy < *e) {
            best = Some((sample, energy));
        }
    }
    best.ok_or_else(|| PoolError::solver("empty model"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::CostMatrices;
    use crate::qubo::AssignmentModelBuilder;

    fn small_params() -> SolverParams {
        SolverParams {
            num_reads: 16,
            num_sweeps: 200,
            seed: 42,
        }
    }

    #[test]
    fn finds_exhaustive_optimum_on_small_model() {
        let costs = CostMatrices::new(
            4,
            2,
            vec![
                vec![1.0, 8.0],
                vec![7.0, 2.0],
                vec![1.0, 9.0],
                vec![6.0, 1.0],
            ],
            vec![vec![0.0; 2]; 4],
        )
        .expect("costs");
        let qubo = AssignmentModelBuilder::new(2, 600.0, 100.0)
            .build(&costs)
            .expect("model");

        let (_, optimum) = exhaustive_minimum(&qubo).expect("optimum");
        let params = SolverParams {
            num_reads: 64,
            ..small_params()
        };
        let outcome = SimulatedAnnealingSolver.solve(&qubo, &params).expect("solve");
        assert!((outcome.energy - optimum).abs() < 1e-9);
        assert!(outcome.num_occurrences >= 1);
        assert_eq!(outcome.chain_break_fraction, None);
        assert_eq!(outcome.num_reads, 64);
    }

    #[test]
    fn same_seed_gives_same_outcome() {
        let mut rng = <StdRng as SeedableRng>::seed_from_u64(5);
        let costs = CostMatrices::synthetic(5, 3, &mut rng);
        let qubo = AssignmentModelBuilder::new(2, 600.0, 50.0)
            .build(&costs)
            .expect("model");
        let a = SimulatedAnnealingSolver.solve(&qubo, &small_params()).expect("a");
        let b = SimulatedAnnealingSolver.solve(&qubo, &small_params()).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn zero_reads_is_a_solver_failure() {
        let qubo = Qubo::new(1, 1);
        let params = SolverParams {
            num_reads: 0,
            ..small_params()
        };
        let err = SimulatedAnnealingSolver
            .solve(&qubo, &params)
            .expect_err("no reads");
        assert!(matches!(err, PoolError::SolverFailure { .. }));
    }

    #[test]
    fn empty_model_returns_empty_sample() {
        let qubo = Qubo::new(0, 3);
        let outcome = SimulatedAnnealingSolver
            .solve(&qubo, &small_params())
            .expect("solve");
        assert!(outcome.sample.values().is_empty());
        assert_eq!(outcome.energy, 0.0);
    }

    #[test]
    fn schedule_is_monotone() {
        let betas = geometric_schedule(0.01, 10.0, 50);
        assert_eq!(betas.len(), 50);
        assert!((betas[0] - 0.01).abs() < 1e-12);
        assert!((betas[49] - 10.0).abs() < 1e-9);
        assert!(betas.windows(2).all(|w| w[0] <= w[1]));
    }
}
