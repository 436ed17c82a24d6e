//! Accumulation of per-batch importance signals into per-layer vectors.
//!
//! The host model computes the raw signals (activation × gradient products,
//! activations, weight magnitudes, or raw gradients); this module only
//! reduces them. Fully-connected layers arrive as one value per sample and
//! unit; convolutional layers additionally carry spatial extents that are
//! averaged away before summing over the batch.

use std::str::FromStr;

use forgetnet_common::{ForgetError, Result};
use serde::{Deserialize, Serialize};

/// Which raw signal the host model must supply per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceCriteria {
    /// |activation × gradient|, the first-order Taylor term.
    FirstTaylor,
    /// Raw hidden activations.
    Activation,
    /// Weight magnitudes.
    Magnitude,
    /// Raw gradients.
    Gradient,
}

impl FromStr for ImportanceCriteria {
    type Err = ForgetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first_Taylor_approximation" => Ok(Self::FirstTaylor),
            "activation" => Ok(Self::Activation),
            "magnitude" => Ok(Self::Magnitude),
            "gradient" => Ok(Self::Gradient),
            other => Err(ForgetError::UnknownImportanceCriteria(other.to_owned())),
        }
    }
}

/// One layer's raw signal for one batch.
#[derive(Debug, Clone)]
pub enum BatchSignal {
    /// Fully-connected: `data` is row-major `(batch, units)`.
    Dense { units: usize, data: Vec<f32> },
    /// Convolutional: `data` is row-major `(batch, height, width, units)`;
    /// the spatial extents are reduced by mean before accumulation.
    Spatial { height: usize, width: usize, units: usize, data: Vec<f32> },
}

impl BatchSignal {
    fn units(&self) -> usize {
        match self {
            Self::Dense { units, .. } | Self::Spatial { units, .. } => *units,
        }
    }

    /// Sum of per-sample unit importances over the batch axis.
    fn reduce(&self) -> Vec<f32> {
        match self {
            Self::Dense { units, data } => {
                let mut out = vec![0.0; *units];
                for sample in data.chunks(*units) {
                    for (o, &v) in out.iter_mut().zip(sample) {
                        *o += v;
                    }
                }
                out
            }
            Self::Spatial { height, width, units, data } => {
                let spatial = height * width;
                let mut out = vec![0.0; *units];
                let inv = 1.0 / spatial as f32;
                for sample in data.chunks(spatial * units) {
                    for cell in sample.chunks(*units) {
                        for (o, &v) in out.iter_mut().zip(cell) {
                            *o += v * inv;
                        }
                    }
                }
                out
            }
        }
    }
}

/// Running per-layer importance sums over the batches of one task.
#[derive(Debug, Default)]
pub struct ImportanceAccumulator {
    layers: Vec<Vec<f32>>,
}

impl ImportanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch of per-layer signals into the running sums.
    ///
    /// The first batch fixes the layer count and unit widths; later batches
    /// must match them.
    pub fn add_batch(&mut self, signals: &[BatchSignal]) -> Result<()> {
        if self.layers.is_empty() {
            self.layers = signals.iter().map(|s| vec![0.0; s.units()]).collect();
        } else if signals.len() != self.layers.len() {
            return Err(ForgetError::ShapeMismatch {
                layer: 0,
                expected: self.layers.len(),
                actual: signals.len(),
            });
        }
        for (i, (sums, signal)) in self.layers.iter_mut().zip(signals).enumerate() {
            if signal.units() != sums.len() {
                return Err(ForgetError::ShapeMismatch {
                    layer: i,
                    expected: sums.len(),
                    actual: signal.units(),
                });
            }
            for (o, v) in sums.iter_mut().zip(signal.reduce()) {
                *o += v;
            }
        }
        Ok(())
    }

    /// Per-layer importance vectors accumulated so far.
    pub fn finish(self) -> Vec<Vec<f32>> {
        self.layers
    }
}
