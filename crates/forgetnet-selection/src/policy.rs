//! Interchangeable unit-ranking policies.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use forgetnet_common::{argsort_ascending, ForgetError, Result, UnitType};
use forgetnet_importance::{task_related_deviation, ImportanceMatrixStore, RelatednessKernel};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bands::UnitIndexMapper;

/// Ranking strategies over the flattened, type-filtered unit space.
///
/// Every policy produces an ascending-importance ordering; pruning takes
/// the bottom of that ordering (least important first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Per-unit mean importance over the tasks being kept.
    Mean,
    /// Per-unit maximum importance over the tasks being kept.
    Max,
    /// Deviation-mixed mean: `coeff·deviation + (1−coeff)·mean`.
    MeanDev,
    /// Deviation-mixed max: `coeff·deviation + (1−coeff)·max`.
    MaxDev,
    /// Deviation-only criterion under the constant relatedness kernel.
    Const,
    /// Fixed pseudo-random permutation seeded by the total unit count.
    Random,
    /// Mean over *all* tasks (task-agnostic baseline).
    AllMean,
    /// Constant-kernel deviation over all tasks (task-agnostic baseline).
    AllConst,
}

impl SelectionPolicy {
    fn uses_deviation_params(self) -> bool {
        matches!(self, Self::MeanDev | Self::MaxDev)
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Mean => "MEAN",
            Self::Max => "MAX",
            Self::MeanDev => "MEAN+DEV",
            Self::MaxDev => "MAX+DEV",
            Self::Const => "CONST",
            Self::Random => "RANDOM",
            Self::AllMean => "ALL_MEAN",
            Self::AllConst => "ALL_CONST",
        };
        write!(f, "{tag}")
    }
}

impl FromStr for SelectionPolicy {
    type Err = ForgetError;

    /// Parses experiment tags. A `:suffix` (used to distinguish repeated
    /// runs of one policy) is ignored, and purely numeric tags are sweep
    /// aliases for the deviation-mixed mean policy.
    fn from_str(s: &str) -> Result<Self> {
        let head = s.split(':').next().unwrap_or(s);
        if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::MeanDev);
        }
        match head {
            "MEAN" => Ok(Self::Mean),
            "MAX" => Ok(Self::Max),
            "MEAN+DEV" => Ok(Self::MeanDev),
            "MAX+DEV" => Ok(Self::MaxDev),
            "CONST" => Ok(Self::Const),
            "RANDOM" => Ok(Self::Random),
            "ALL_MEAN" => Ok(Self::AllMean),
            "ALL_CONST" => Ok(Self::AllConst),
            other => Err(ForgetError::UnsupportedPolicy(other.to_owned())),
        }
    }
}

/// A hyper-parameter supplied either directly or via a map keyed by
/// experiment identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParamValue {
    Direct(f32),
    Keyed(HashMap<String, f32>),
}

impl ParamValue {
    fn resolve(&self, key: Option<&str>) -> Option<f32> {
        match self {
            Self::Direct(v) => Some(*v),
            Self::Keyed(map) => key.and_then(|k| map.get(k).copied()),
        }
    }
}

/// Parameters for the deviation-mixed policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationParams {
    pub mixing_coeff: ParamValue,
    pub tau: ParamValue,
    pub kernel: RelatednessKernel,
    /// Lookup key for [`ParamValue::Keyed`] maps.
    pub experiment_key: Option<String>,
}

impl DeviationParams {
    pub fn direct(mixing_coeff: f32, tau: f32, kernel: RelatednessKernel) -> Self {
        Self {
            mixing_coeff: ParamValue::Direct(mixing_coeff),
            tau: ParamValue::Direct(tau),
            kernel,
            experiment_key: None,
        }
    }

    fn resolve_mixing_coeff(&self) -> Result<f32> {
        self.mixing_coeff.resolve(self.experiment_key.as_deref()).ok_or_else(|| {
            ForgetError::MissingMixingCoefficient {
                key: self.experiment_key.clone().unwrap_or_default(),
            }
        })
    }

    fn resolve_tau(&self) -> Result<f32> {
        self.tau.resolve(self.experiment_key.as_deref()).ok_or_else(|| ForgetError::MissingTau {
            key: self.experiment_key.clone().unwrap_or_default(),
        })
    }
}

/// Ranks units under a policy and slices the ranking into a selection.
#[derive(Debug, Clone)]
pub struct UnitSelector {
    mapper: UnitIndexMapper,
    /// Distribute the budget proportionally across layers instead of
    /// taking a single global bottom slice.
    layerwise: bool,
}

impl UnitSelector {
    pub fn new(mapper: UnitIndexMapper, layerwise: bool) -> Self {
        Self { mapper, layerwise }
    }

    pub fn mapper(&self) -> &UnitIndexMapper {
        &self.mapper
    }

    /// Select `count` units of `unit_type` to prune when forgetting
    /// `forget_tasks`, returned as layer-local index lists (one per scored
    /// layer, ranking order preserved).
    pub fn select(
        &self,
        store: &ImportanceMatrixStore,
        policy: SelectionPolicy,
        forget_tasks: &[usize],
        count: usize,
        unit_type: UnitType,
        params: Option<&DeviationParams>,
    ) -> Result<Vec<Vec<usize>>> {
        let ordered = match policy {
            SelectionPolicy::Random => self.random_ordering(),
            _ => {
                let criterion = self.criterion(store, policy, forget_tasks, params)?;
                argsort_ascending(&criterion)
            }
        };
        let filtered = self.mapper.filter_by_unit_type(&ordered, unit_type)?;
        debug!(%policy, count, %unit_type, candidates = filtered.len(), "ranking sliced");
        if self.layerwise {
            Ok(self.take_layerwise(&filtered, count))
        } else {
            let take = count.min(filtered.len());
            Ok(self.mapper.split_by_layer(&filtered[..take]))
        }
    }

    /// Criterion vector over the full flat unit space, lower = prune first.
    fn criterion(
        &self,
        store: &ImportanceMatrixStore,
        policy: SelectionPolicy,
        forget_tasks: &[usize],
        params: Option<&DeviationParams>,
    ) -> Result<Vec<f32>> {
        match policy {
            SelectionPolicy::Mean => Ok(store.flat_without_tasks(forget_tasks)?.col_mean()),
            SelectionPolicy::Max => Ok(store.flat_without_tasks(forget_tasks)?.col_max()),
            SelectionPolicy::AllMean => Ok(store.flat_without_tasks(&[])?.col_mean()),
            SelectionPolicy::Const => {
                task_related_deviation(store, forget_tasks, RelatednessKernel::Constant, 0.0)
            }
            SelectionPolicy::AllConst => {
                task_related_deviation(store, &[], RelatednessKernel::Constant, 0.0)
            }
            SelectionPolicy::MeanDev | SelectionPolicy::MaxDev => {
                let params = params.ok_or(ForgetError::MissingMixingCoefficient {
                    key: String::new(),
                })?;
                let coeff = params.resolve_mixing_coeff()?;
                let tau = params.resolve_tau()?;
                let base = if policy == SelectionPolicy::MeanDev {
                    store.flat_without_tasks(forget_tasks)?.col_mean()
                } else {
                    store.flat_without_tasks(forget_tasks)?.col_max()
                };
                if coeff <= 0.0 {
                    return Ok(base);
                }
                let deviation =
                    task_related_deviation(store, forget_tasks, params.kernel, tau)?;
                Ok(base
                    .iter()
                    .zip(&deviation)
                    .map(|(&b, &d)| coeff * d + (1.0 - coeff) * b)
                    .collect())
            }
            SelectionPolicy::Random => unreachable!("random ordering bypasses the criterion"),
        }
    }

    /// Fixed permutation of the full index range; the seed is the total
    /// unit count, so one architecture always shuffles the same way.
    fn random_ordering(&self) -> Vec<usize> {
        let total = self.mapper.total_units();
        let mut indices: Vec<usize> = (0..total).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(total as u64);
        indices.shuffle(&mut rng);
        indices
    }

    /// Layerwise budgeting: split the full ranking by layer, then keep the
    /// same fraction `count / candidates` of each layer's local ranking,
    /// rounding down. The floor can under-select relative to `count`; that
    /// discrepancy is part of the contract.
    fn take_layerwise(&self, filtered: &[usize], count: usize) -> Vec<Vec<usize>> {
        let ratio = if filtered.is_empty() { 0.0 } else { count as f64 / filtered.len() as f64 };
        self.mapper
            .split_by_layer(filtered)
            .into_iter()
            .map(|locals| {
                let take = (locals.len() as f64 * ratio).floor() as usize;
                locals[..take.min(locals.len())].to_vec()
            })
            .collect()
    }
}
