//! A deterministic in-memory host model.
//!
//! Stands in for a real network in tests and demos: parameters, importance
//! signals, and evaluation scores are all derived from a single seed, so
//! two models built with the same arguments behave identically. Evaluation
//! is a parameter-mass proxy, not an accuracy measurement: each task holds
//! a fixed per-unit affinity profile, and its score is the surviving
//! affinity-weighted weight mass relative to the unpruned baseline.

use std::collections::BTreeMap;

use forgetnet_common::{types::scope_names, ForgetError, LayerKind, Result, UnitType};
use forgetnet_importance::{BatchSignal, ImportanceCriteria};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::{ImportanceSource, ParamTensor, ParameterSnapshot, ParameterStore, TaskEvaluator};

const BATCHES_PER_TASK: usize = 2;
const SAMPLES_PER_BATCH: usize = 4;
const CONV_KERNEL: usize = 3;
const CONV_SPATIAL: usize = 2;

/// Seeded stand-in for a trained multi-task network.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    seed: u64,
    n_tasks: usize,
    scopes: Vec<String>,
    layer_kinds: Vec<LayerKind>,
    parameters: ParameterSnapshot,
    /// Per scored layer, per task: one affinity weight per unit.
    affinity: Vec<Vec<Vec<f32>>>,
    /// Per task: affinity-weighted mass of the unpruned parameters.
    baseline: Vec<f64>,
}

impl ReferenceModel {
    /// Build a model with the given layer stack and unit counts (output
    /// layer last, exactly one unit count per layer).
    pub fn new(layer_kinds: &[LayerKind], layer_units: &[usize], n_tasks: usize, seed: u64) -> Self {
        assert_eq!(layer_kinds.len(), layer_units.len(), "one unit count per layer");
        assert!(layer_kinds.len() >= 2, "need at least one scored layer plus the output layer");
        let scopes = scope_names(layer_kinds);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut parameters = ParameterSnapshot::new();
        let mut fan_in = layer_units.first().copied().unwrap_or(1).max(1);
        for ((scope, &kind), &units) in scopes.iter().zip(layer_kinds).zip(layer_units) {
            let weight_shape = match kind {
                LayerKind::Conv => vec![CONV_KERNEL, CONV_KERNEL, fan_in, units],
                _ => vec![fan_in, units],
            };
            let len: usize = weight_shape.iter().product();
            let weight: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
            parameters.insert(format!("{scope}/weight"), ParamTensor::new(weight_shape, weight));
            let bias: Vec<f32> = (0..units).map(|_| rng.gen_range(-0.5..0.5)).collect();
            parameters.insert(format!("{scope}/bias"), ParamTensor::new(vec![units], bias));
            fan_in = units;
        }

        // Scored layers exclude the output layer.
        let scored = layer_units.len() - 1;
        let affinity: Vec<Vec<Vec<f32>>> = (0..scored)
            .map(|layer| {
                (0..n_tasks)
                    .map(|task| {
                        let mut rng =
                            ChaCha8Rng::seed_from_u64(seed ^ mix(layer as u64, task as u64));
                        (0..layer_units[layer]).map(|_| rng.gen_range(0.0..1.0)).collect()
                    })
                    .collect()
            })
            .collect();

        let mut model = Self {
            seed,
            n_tasks,
            scopes,
            layer_kinds: layer_kinds.to_vec(),
            parameters,
            affinity,
            baseline: vec![1.0; n_tasks],
        };
        model.baseline = (0..n_tasks).map(|t| model.weighted_mass(t).max(f64::MIN_POSITIVE)).collect();
        model
    }

    pub fn n_tasks(&self) -> usize {
        self.n_tasks
    }

    /// Affinity-weighted absolute weight mass seen by one task (0-based).
    fn weighted_mass(&self, task: usize) -> f64 {
        let mut total = 0.0;
        for (layer, scope) in self.scopes.iter().enumerate().take(self.affinity.len()) {
            let weight = &self.parameters[&format!("{scope}/weight")];
            let bias = &self.parameters[&format!("{scope}/bias")];
            let units = weight.units();
            let mut mass = vec![0.0f64; units];
            for chunk in weight.data.chunks(units) {
                for (m, &v) in mass.iter_mut().zip(chunk) {
                    *m += f64::from(v.abs());
                }
            }
            for (m, &b) in mass.iter_mut().zip(&bias.data) {
                *m += f64::from(b.abs());
            }
            for (m, &a) in mass.iter().zip(&self.affinity[layer][task]) {
                total += m * f64::from(a);
            }
        }
        total
    }
}

/// Cheap integer mix for deriving independent stream seeds.
fn mix(a: u64, b: u64) -> u64 {
    (a.wrapping_mul(0x9e37_79b9_7f4a_7c15)).rotate_left(17) ^ b.wrapping_mul(0xc2b2_ae3d_27d4_eb4f)
}

impl ParameterStore for ReferenceModel {
    fn parameters(&self) -> ParameterSnapshot {
        self.parameters.clone()
    }

    fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.parameters = snapshot.clone();
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<ParamTensor> {
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| ForgetError::MissingParameter(name.to_owned()))
    }

    fn set_parameter(&mut self, name: &str, value: ParamTensor) -> Result<()> {
        if !self.parameters.contains_key(name) {
            return Err(ForgetError::MissingParameter(name.to_owned()));
        }
        self.parameters.insert(name.to_owned(), value);
        Ok(())
    }
}

impl ImportanceSource for ReferenceModel {
    /// Emit seeded per-batch signals whose per-unit magnitude tracks the
    /// task's affinity profile, so importance ranks line up with what
    /// evaluation rewards. The criteria only perturbs the stream seed; the
    /// reference model has no real activations or gradients to expose.
    fn for_each_importance_batch(
        &mut self,
        task_id: usize,
        criteria: ImportanceCriteria,
        visit: &mut dyn FnMut(&[BatchSignal]) -> Result<()>,
    ) -> Result<()> {
        let stream = mix(self.seed ^ criteria as u64, task_id as u64);
        for batch in 0..BATCHES_PER_TASK {
            let mut rng = ChaCha8Rng::seed_from_u64(mix(stream, batch as u64));
            let mut signals = Vec::with_capacity(self.affinity.len());
            for (layer, &kind) in self.layer_kinds.iter().enumerate().take(self.affinity.len()) {
                let affinity = &self.affinity[layer][task_id - 1];
                let units = affinity.len();
                match kind.unit_type() {
                    UnitType::Filter => {
                        let spatial = CONV_SPATIAL * CONV_SPATIAL;
                        let data = (0..SAMPLES_PER_BATCH * spatial)
                            .flat_map(|_| {
                                affinity
                                    .iter()
                                    .map(|&a| a * rng.gen_range(0.5..1.5))
                                    .collect::<Vec<_>>()
                            })
                            .collect();
                        signals.push(BatchSignal::Spatial {
                            height: CONV_SPATIAL,
                            width: CONV_SPATIAL,
                            units,
                            data,
                        });
                    }
                    _ => {
                        let data = (0..SAMPLES_PER_BATCH)
                            .flat_map(|_| {
                                affinity
                                    .iter()
                                    .map(|&a| a * rng.gen_range(0.5..1.5))
                                    .collect::<Vec<_>>()
                            })
                            .collect();
                        signals.push(BatchSignal::Dense { units, data });
                    }
                }
            }
            visit(&signals)?;
        }
        Ok(())
    }
}

impl TaskEvaluator for ReferenceModel {
    fn predict_all_tasks(&mut self) -> Result<Vec<f32>> {
        Ok((0..self.n_tasks)
            .map(|t| (self.weighted_mass(t) / self.baseline[t]) as f32)
            .collect())
    }
}
