//! Task-relatedness-weighted deviation scoring.
//!
//! Measures how far each unit's importance for the tasks being kept deviates
//! from those tasks' mean importance, weighted by how related each kept task
//! is to the tasks being forgotten. Units that matter only to the forgotten
//! tasks score high and become pruning candidates.

use std::str::FromStr;

use forgetnet_common::{ForgetError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::ImportanceMatrixStore;

const EPSILON: f32 = 1e-7;

/// Relatedness weighting kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelatednessKernel {
    /// One tanh weight per kept task from the task-level distance to the
    /// forget-set mean, broadcast across that task's units.
    SymmetricTaskLevel,
    /// Per-task, per-unit tanh weight from the unit-level distance.
    SymmetricUnitLevel,
    /// Unit-level weight scaled by the unit's own importance magnitude.
    AsymmetricUnitLevel,
    /// No weighting: plain absolute deviation from the kept-task mean.
    Constant,
}

impl FromStr for RelatednessKernel {
    type Err = ForgetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "symmetric_task_level" => Ok(Self::SymmetricTaskLevel),
            "symmetric_unit_level" => Ok(Self::SymmetricUnitLevel),
            "asymmetric_unit_level" => Ok(Self::AsymmetricUnitLevel),
            "constant" => Ok(Self::Constant),
            other => Err(ForgetError::UnknownRelatednessType(other.to_owned())),
        }
    }
}

/// Per-unit task-related deviation over the flattened unit space.
///
/// `forget_tasks` holds the 1-based ids being forgotten; the remaining tasks
/// form the kept ("remember") set whose rows drive the deviation. For
/// non-constant kernels the mean relatedness weight must land strictly
/// inside `(0.1, 0.9)` or the call fails with
/// [`ForgetError::RelatednessOutOfRange`] — a degenerate tau is a
/// configuration bug, never silently rescaled.
pub fn task_related_deviation(
    store: &ImportanceMatrixStore,
    forget_tasks: &[usize],
    kernel: RelatednessKernel,
    tau: f32,
) -> Result<Vec<f32>> {
    let remember = store.flat_without_tasks(forget_tasks)?;
    let n_remember = remember.rows();
    let n_units = remember.cols();
    if n_remember == 0 {
        return Err(ForgetError::DegenerateTaskSplit {
            remember: 0,
            forget: forget_tasks.len(),
        });
    }

    let mean_remember = remember.col_mean();
    // deviation[t][u] = |remember[t][u] - mean_remember[u]|
    let deviation: Vec<Vec<f32>> = (0..n_remember)
        .map(|t| {
            remember
                .row(t)
                .iter()
                .zip(&mean_remember)
                .map(|(&v, &m)| (v - m).abs())
                .collect()
        })
        .collect();

    let rho: Vec<Vec<f32>> = match kernel {
        RelatednessKernel::Constant => vec![vec![1.0; n_units]; n_remember],
        _ => {
            let forget = store.flat_of_tasks(forget_tasks)?;
            if forget.rows() == 0 {
                return Err(ForgetError::DegenerateTaskSplit {
                    remember: n_remember,
                    forget: 0,
                });
            }
            let mean_forget = forget.col_mean();
            let weights = match kernel {
                RelatednessKernel::SymmetricTaskLevel => (0..n_remember)
                    .map(|t| {
                        let dist = remember
                            .row(t)
                            .iter()
                            .zip(&mean_forget)
                            .map(|(&v, &m)| (v - m) * (v - m))
                            .sum::<f32>()
                            .sqrt();
                        let w = (tau / (EPSILON + dist)).tanh();
                        vec![w; n_units]
                    })
                    .collect::<Vec<_>>(),
                RelatednessKernel::SymmetricUnitLevel => (0..n_remember)
                    .map(|t| {
                        remember
                            .row(t)
                            .iter()
                            .zip(&mean_forget)
                            .map(|(&v, &m)| (tau / (EPSILON + (v - m).abs())).tanh())
                            .collect()
                    })
                    .collect(),
                RelatednessKernel::AsymmetricUnitLevel => (0..n_remember)
                    .map(|t| {
                        remember
                            .row(t)
                            .iter()
                            .zip(&mean_forget)
                            .map(|(&v, &m)| (tau * v.abs() / (EPSILON + (v - m).abs())).tanh())
                            .collect()
                    })
                    .collect(),
                RelatednessKernel::Constant => unreachable!(),
            };
            check_weight_window(&weights, tau)?;
            weights
        }
    };

    let mut related = vec![0.0; n_units];
    for (rho_row, dev_row) in rho.iter().zip(&deviation) {
        for ((o, &r), &d) in related.iter_mut().zip(rho_row).zip(dev_row) {
            *o += r * d;
        }
    }
    let inv = 1.0 / n_remember as f32;
    for o in &mut related {
        *o *= inv;
    }
    Ok(related)
}

/// The sanity window on mean(ρ) guards against tau values that saturate
/// tanh toward 0 or 1 and flatten the signal.
fn check_weight_window(weights: &[Vec<f32>], tau: f32) -> Result<()> {
    let count = weights.iter().map(Vec::len).sum::<usize>();
    let mean = weights.iter().flatten().sum::<f32>() / count as f32;
    let var = weights.iter().flatten().map(|w| (w - mean) * (w - mean)).sum::<f32>()
        / count as f32;
    debug!(rho_mean = mean, rho_std = var.sqrt(), tau, "relatedness weights");
    if !(mean > 0.1 && mean < 0.9) {
        return Err(ForgetError::RelatednessOutOfRange { mean, tau });
    }
    Ok(())
}
