//! Quadratic unconstrained binary objective over rider-to-vehicle indicators.
//!
//! Variables are identified by [VarKey] from model construction through
//! interpretation; the serialized form keeps both indices as integers.

pub mod builder;
pub mod solver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

pub use builder::AssignmentModelBuilder;
pub use solver::{QuboSolver, SimulatedAnnealingSolver, SolveOutcome};

/// Indicator `x[rider][vehicle]`: rider rides in vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarKey {
    pub rider: u32,
    pub vehicle: u32,
}

impl VarKey {
    pub const fn new(rider: u32, vehicle: u32) -> Self {
        Self { rider, vehicle }
    }

    /// Position in a row-major `riders x vehicles` vector.
    pub fn index(self, vehicles: usize) -> usize {
        self.rider as usize * vehicles + self.vehicle as usize
    }

    pub fn from_index(index: usize, vehicles: usize) -> Self {
        Self {
            rider: (index / vehicles) as u32,
            vehicle: (index % vehicles) as u32,
        }
    }
}

/// Upper-triangular QUBO: `(u, v)` with `u <= v`; `(u, u)` holds the linear bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "QuboDocument", try_from = "QuboDocument")]
pub struct Qubo {
    riders: usize,
    vehicles: usize,
    offset: f64,
    terms: BTreeMap<(VarKey, VarKey), f64>,
}

impl Qubo {
    pub fn new(riders: usize, vehicles: usize) -> Self {
        Self {
            riders,
            vehicles,
            offset: 0.0,
            terms: BTreeMap::new(),
        }
    }

    pub fn riders(&self) -> usize {
        self.riders
    }

    pub fn vehicles(&self) -> usize {
        self.vehicles
    }

    pub fn num_variables(&self) -> usize {
        self.riders * self.vehicles
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn add_offset(&mut self, value: f64) {
        self.offset += value;
    }

    pub fn add_linear(&mut self, key: VarKey, bias: f64) {
        *self.terms.entry((key, key)).or_insert(0.0) += bias;
    }

    pub fn add_quadratic(&mut self, a: VarKey, b: VarKey, bias: f64) {
        let pair = if a <= b { (a, b) } else { (b, a) };
        *self.terms.entry(pair).or_insert(0.0) += bias;
    }

    pub fn linear(&self, key: VarKey) -> f64 {
        self.terms.get(&(key, key)).copied().unwrap_or(0.0)
    }

    pub fn quadratic(&self, a: VarKey, b: VarKey) -> f64 {
        let pair = if a <= b { (a, b) } else { (b, a) };
        self.terms.get(&pair).copied().unwrap_or(0.0)
    }

    /// All stored coefficients in key order.
    pub fn terms(&self) -> impl Iterator<Item = (VarKey, VarKey, f64)> + '_ {
        self.terms.iter().map(|(&(u, v), &bias)| (u, v, bias))
    }

    /// Objective value of `sample`, offset included.
    pub fn energy(&self, sample: &Sample) -> Result<f64, PoolError> {
        if sample.riders() != self.riders || sample.vehicles() != self.vehicles {
            return Err(PoolError::config(format!(
                "sample shape {}x{} does not match model shape {}x{}",
                sample.riders(),
                sample.vehicles(),
                self.riders,
                self.vehicles
            )));
        }
        let mut energy = self.offset;
        for (&(u, v), &bias) in &self.terms {
            if sample.get(u) == 1 && sample.get(v) == 1 {
                energy += bias;
            }
        }
        Ok(energy)
    }

    fn contains(&self, key: VarKey) -> bool {
        (key.rider as usize) < self.riders && (key.vehicle as usize) < self.vehicles
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuboTerm {
    u: VarKey,
    v: VarKey,
    bias: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuboDocument {
    riders: usize,
    vehicles: usize,
    offset: f64,
    terms: Vec<QuboTerm>,
}

impl From<Qubo> for QuboDocument {
    fn from(qubo: Qubo) -> Self {
        let terms = qubo
            .terms()
            .map(|(u, v, bias)| QuboTerm { u, v, bias })
            .collect();
        Self {
            riders: qubo.riders,
            vehicles: qubo.vehicles,
            offset: qubo.offset,
            terms,
        }
    }
}

impl TryFrom<QuboDocument> for Qubo {
    type Error = String;

    fn try_from(doc: QuboDocument) -> Result<Self, Self::Error> {
        let mut qubo = Qubo::new(doc.riders, doc.vehicles);
        qubo.add_offset(doc.offset);
        for term in doc.terms {
            if !qubo.contains(term.u) || !qubo.contains(term.v) {
                return Err(format!(
                    "term ({:?}, {:?}) outside a {}x{} model",
                    term.u, term.v, doc.riders, doc.vehicles
                ));
            }
            qubo.add_quadratic(term.u, term.v, term.bias);
        }
        Ok(qubo)
    }
}

/// A binary assignment over all `riders x vehicles` indicators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sample {
    riders: usize,
    vehicles: usize,
    values: Vec<u8>,
}

impl Sample {
    pub fn zeros(riders: usize, vehicles: usize) -> Self {
        Self {
            riders,
            vehicles,
            values: vec![0; riders * vehicles],
        }
    }

    /// Row-major vector; every entry must be 0 or 1.
    pub fn from_values(riders: usize, vehicles: usize, values: Vec<u8>) -> Result<Self, PoolError> {
        if values.len() != riders * vehicles {
            return Err(PoolError::config(format!(
                "sample has {} values, expected {}",
                values.len(),
                riders * vehicles
            )));
        }
        if let Some(index) = values.iter().position(|&v| v > 1) {
            let key = VarKey::from_index(index, vehicles);
            return Err(PoolError::Configuration {
                message: format!("sample value {} is not binary", values[index]),
                rider_id: Some(key.rider),
                vehicle_id: Some(key.vehicle),
            });
        }
        Ok(Self {
            riders,
            vehicles,
            values,
        })
    }

    /// Keyed form; keys not mentioned are 0.
    pub fn from_keyed<I>(riders: usize, vehicles: usize, entries: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = (VarKey, u8)>,
    {
        let mut values = vec![0; riders * vehicles];
        for (key, value) in entries {
            if key.rider as usize >= riders || key.vehicle as usize >= vehicles {
                return Err(PoolError::Configuration {
                    message: format!("sample key outside a {riders}x{vehicles} model"),
                    rider_id: Some(key.rider),
                    vehicle_id: Some(key.vehicle),
                });
            }
            values[key.index(vehicles)] = value;
        }
        Self::from_values(riders, vehicles, values)
    }

    pub fn riders(&self) -> usize {
        self.riders
    }

    pub fn vehicles(&self) -> usize {
        self.vehicles
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn get(&self, key: VarKey) -> u8 {
        self.values[key.index(self.vehicles)]
    }

    pub fn set(&mut self, key: VarKey, value: bool) {
        let index = key.index(self.vehicles);
        self.values[index] = u8::from(value);
    }

    /// Keys whose indicator is set.
    pub fn ones(&self) -> impl Iterator<Item = VarKey> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v == 1)
            .map(|(index, _)| VarKey::from_index(index, self.vehicles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_key_index_round_trip() {
        let key = VarKey::new(3, 2);
        assert_eq!(key.index(4), 14);
        assert_eq!(VarKey::from_index(14, 4), key);
    }

    #[test]
    fn quadratic_terms_are_normalized() {
        let mut qubo = Qubo::new(2, 2);
        let a = VarKey::new(0, 1);
        let b = VarKey::new(1, 0);
        qubo.add_quadratic(b, a, 2.0);
        qubo.add_quadratic(a, b, 1.0);
        qubo.add_quadratic(a, a, 4.0);
        assert_eq!(qubo.quadratic(a, b), 3.0);
        assert_eq!(qubo.linear(a), 4.0);
        assert_eq!(qubo.num_terms(), 2);
    }

    #[test]
    fn energy_counts_active_pairs_and_offset() {
        let mut qubo = Qubo::new(1, 2);
        let a = VarKey::new(0, 0);
        let b = VarKey::new(0, 1);
        qubo.add_linear(a, -1.0);
        qubo.add_linear(b, -1.0);
        qubo.add_quadratic(a, b, 2.0);
        qubo.add_offset(1.0);

        let both = Sample::from_values(1, 2, vec![1, 1]).expect("sample");
        let one = Sample::from_values(1, 2, vec![0, 1]).expect("sample");
        let none = Sample::zeros(1, 2);
        assert_eq!(qubo.energy(&both).expect("energy"), 1.0);
        assert_eq!(qubo.energy(&one).expect("energy"), 0.0);
        assert_eq!(qubo.energy(&none).expect("energy"), 1.0);
    }

    #[test]
    fn json_form_keeps_structured_keys() {
        let mut qubo = Qubo::new(2, 1);
        qubo.add_linear(VarKey::new(1, 0), 5.0);
        let json = serde_json::to_value(&qubo).expect("serialize");
        assert_eq!(json["terms"][0]["u"]["rider"], 1);
        assert_eq!(json["terms"][0]["v"]["vehicle"], 0);

        let back: Qubo = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, qubo);
    }

    #[test]
    fn json_rejects_out_of_range_keys() {
        let json = r#"{"riders":1,"vehicles":1,"offset":0.0,
            "terms":[{"u":{"rider":0,"vehicle":0},"v":{"rider":4,"vehicle":0},"bias":1.0}]}"#;
        assert!(serde_json::from_str::<Qubo>(json).is_err());
    }

    #[test]
    fn keyed_sample_rejects_foreign_keys() {
        let err = Sample::from_keyed(2, 2, [(VarKey::new(2, 0), 1)]).expect_err("out of range");
        assert_eq!(err.rider_id(), Some(2));
        let sample = Sample::from_keyed(2, 2, [(VarKey::new(1, 1), 1)]).expect("sample");
        assert_eq!(sample.ones().collect::<Vec<_>>(), vec![VarKey::new(1, 1)]);
    }
}
