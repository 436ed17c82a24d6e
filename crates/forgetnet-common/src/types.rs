//! Unit/layer vocabulary and experiment records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ForgetError, Result};

/// A prunable structural element class.
///
/// Fully-connected layers expose neurons, convolutional layers expose
/// filters, and normalization/mask layers expose nothing prunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnitType {
    Neuron,
    Filter,
    /// Excluded from importance-based selection (e.g. batch-norm, masks).
    None,
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neuron => write!(f, "NEURON"),
            Self::Filter => write!(f, "FILTER"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Declared kind of a model layer, as named in parameter scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    Conv,
    Fc,
    /// Legacy alias for fully-connected layers.
    Layer,
    BatchNorm,
    Mask,
}

impl LayerKind {
    /// Map a layer kind to the unit type it exposes for pruning.
    pub fn unit_type(self) -> UnitType {
        match self {
            Self::Conv => UnitType::Filter,
            Self::Fc | Self::Layer => UnitType::Neuron,
            Self::BatchNorm | Self::Mask => UnitType::None,
        }
    }

    /// The scope prefix used in parameter names (e.g. `conv` in `conv1/weight`).
    pub fn scope_prefix(self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::Fc => "fc",
            Self::Layer => "layer",
            Self::BatchNorm => "bn",
            Self::Mask => "mask",
        }
    }
}

impl FromStr for LayerKind {
    type Err = ForgetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conv" => Ok(Self::Conv),
            "fc" => Ok(Self::Fc),
            "layer" => Ok(Self::Layer),
            "bn" => Ok(Self::BatchNorm),
            "mask" => Ok(Self::Mask),
            other => Err(ForgetError::UnknownLayerKind(other.to_owned())),
        }
    }
}

/// Build scope names from a kind sequence by numbering each kind from 1.
///
/// ```
/// use forgetnet_common::types::{scope_names, LayerKind};
///
/// let kinds = [LayerKind::Conv, LayerKind::Conv, LayerKind::Fc, LayerKind::Fc];
/// assert_eq!(scope_names(&kinds), vec!["conv1", "conv2", "fc1", "fc2"]);
/// ```
pub fn scope_names(kinds: &[LayerKind]) -> Vec<String> {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    kinds
        .iter()
        .map(|k| {
            let n = counts.entry(k.scope_prefix()).or_insert(0);
            *n += 1;
            format!("{}{}", k.scope_prefix(), n)
        })
        .collect()
}

/// One step of a forgetting sweep: how much was pruned and how the model
/// performed on every task afterwards. Immutable once appended to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningRecord {
    /// Name of the selection policy that produced this step.
    pub policy: String,
    /// Step index within the sweep (0 = nothing pruned yet).
    pub step: usize,
    /// Exact parameter-level pruning ratio in `[0, 1]`.
    pub pruning_rate: f64,
    /// Ordered per-task performance scores (task 1 first).
    pub performance: Vec<f32>,
}

impl PruningRecord {
    /// Mean performance over tasks not in `exclude` (1-based task ids).
    pub fn mean_excluding(&self, exclude: &[usize]) -> f32 {
        mean_without_tasks(&self.performance, exclude)
    }

    /// Minimum performance over tasks not in `exclude` (1-based task ids).
    pub fn min_excluding(&self, exclude: &[usize]) -> f32 {
        self.performance
            .iter()
            .enumerate()
            .filter(|(i, _)| !exclude.contains(&(i + 1)))
            .map(|(_, &p)| p)
            .fold(f32::INFINITY, f32::min)
    }
}

fn mean_without_tasks(perf: &[f32], exclude: &[usize]) -> f32 {
    let kept: Vec<f32> = perf
        .iter()
        .enumerate()
        .filter(|(i, _)| !exclude.contains(&(i + 1)))
        .map(|(_, &p)| p)
        .collect();
    if kept.is_empty() {
        return f32::NAN;
    }
    kept.iter().sum::<f32>() / kept.len() as f32
}
