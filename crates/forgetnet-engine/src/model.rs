//! Host-model boundary.
//!
//! The engine never owns the network: it reads and writes named parameter
//! arrays, asks for raw importance signals, and asks for per-task scores.
//! Everything else — graph construction, training, gradients, devices —
//! stays on the far side of these traits.

use std::collections::BTreeMap;

use forgetnet_common::{ForgetError, Result};
use forgetnet_importance::{BatchSignal, ImportanceCriteria};
use serde::{Deserialize, Serialize};

/// A named parameter's value: shape plus row-major data, unit dim last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self { shape, data: vec![0.0; len] }
    }

    /// Size of the unit (last) dimension.
    pub fn units(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Zero every weight belonging to one unit.
    ///
    /// The unit dimension is last, so for a `(in, out)` weight this clears
    /// column `unit`, for a `(kh, kw, in, out)` weight the whole filter,
    /// and for a `(out,)` bias the single entry.
    pub fn zero_unit(&mut self, unit: usize) {
        let out = self.units();
        if out == 0 || unit >= out {
            return;
        }
        for chunk in self.data.chunks_mut(out) {
            chunk[unit] = 0.0;
        }
    }

    /// Sum of absolute values, used by mass-based evaluation proxies.
    pub fn abs_sum(&self) -> f64 {
        self.data.iter().map(|v| f64::from(v.abs())).sum()
    }
}

/// Full by-value capture of a model's parameters at a point in time.
///
/// A `BTreeMap` keeps iteration deterministic across captures.
pub type ParameterSnapshot = BTreeMap<String, ParamTensor>;

/// Value-semantics access to the model's trainable parameters.
pub trait ParameterStore {
    /// Copy out all parameters.
    fn parameters(&self) -> ParameterSnapshot;

    /// Replace all parameters from a snapshot, resetting whatever live
    /// session state the model keeps.
    fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()>;

    /// Read one parameter by name (e.g. `conv1/weight`).
    fn parameter(&self, name: &str) -> Result<ParamTensor>;

    /// Write one parameter back by name.
    fn set_parameter(&mut self, name: &str, value: ParamTensor) -> Result<()>;
}

/// Supplier of raw per-batch importance signals. The engine treats these
/// numerics as opaque; it never computes activations or gradients itself.
pub trait ImportanceSource {
    /// Stream every batch of one task's importance signals through `visit`,
    /// one `BatchSignal` per scored layer per call.
    fn for_each_importance_batch(
        &mut self,
        task_id: usize,
        criteria: ImportanceCriteria,
        visit: &mut dyn FnMut(&[BatchSignal]) -> Result<()>,
    ) -> Result<()>;
}

/// Evaluation collaborator: one score per task, task 1 first.
pub trait TaskEvaluator {
    fn predict_all_tasks(&mut self) -> Result<Vec<f32>>;
}

/// Everything the sequential controller needs from a host model.
pub trait HostModel: ParameterStore + ImportanceSource + TaskEvaluator {}

impl<T: ParameterStore + ImportanceSource + TaskEvaluator> HostModel for T {}

/// Fetch a parameter from a snapshot or fail with the missing name.
pub fn snapshot_get<'a>(snapshot: &'a ParameterSnapshot, name: &str) -> Result<&'a ParamTensor> {
    snapshot.get(name).ok_or_else(|| ForgetError::MissingParameter(name.to_owned()))
}
