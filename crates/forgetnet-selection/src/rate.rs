//! Exact parameter-level pruning-rate accounting.

use forgetnet_common::{LayerKind, UnitType};

/// Weight-tensor shape of one prunable layer.
///
/// The unit dimension is always last: fully-connected weights are
/// `(in, out)` and convolutional weights `(kh, kw, in, out)`, each with an
/// `(out,)` bias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerShape {
    pub kind: LayerKind,
    pub weight_dims: Vec<usize>,
}

impl LayerShape {
    pub fn new(kind: LayerKind, weight_dims: Vec<usize>) -> Self {
        Self { kind, weight_dims }
    }

    /// Number of units (size of the last weight dimension).
    pub fn units(&self) -> usize {
        self.weight_dims.last().copied().unwrap_or(0)
    }

    /// Parameters contributed by one pruned unit: the product of all weight
    /// dimensions except the unit dimension, plus its bias entry.
    fn params_per_unit(&self) -> usize {
        let dims = &self.weight_dims;
        dims[..dims.len().saturating_sub(1)].iter().product::<usize>() + 1
    }

    /// Total trainable parameters of this layer (weights and biases).
    fn total_params(&self) -> usize {
        self.weight_dims.iter().product::<usize>() + self.units()
    }
}

/// Converts per-layer selections into a fraction of trainable parameters
/// removed.
#[derive(Debug, Clone)]
pub struct PruningRateCalculator {
    layers: Vec<LayerShape>,
}

impl PruningRateCalculator {
    /// `layers` covers the scored (prunable) layers in layer order.
    pub fn new(layers: Vec<LayerShape>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[LayerShape] {
        &self.layers
    }

    /// Parameter-level pruning rate in `[0, 1]`.
    ///
    /// `groups` holds one per-layer selection per unit type (as produced by
    /// one [`select`](crate::UnitSelector::select) call each); the counts
    /// are combined per layer. The denominator spans every layer whose
    /// declared unit type is in `unit_types_of_interest`.
    pub fn rate(&self, groups: &[Vec<Vec<usize>>], unit_types_of_interest: &[UnitType]) -> f64 {
        let total: usize = self
            .layers
            .iter()
            .filter(|l| unit_types_of_interest.contains(&l.kind.unit_type()))
            .map(LayerShape::total_params)
            .sum();
        if total == 0 {
            return 0.0;
        }

        let mut pruned = 0usize;
        for (i, layer) in self.layers.iter().enumerate() {
            let n_selected: usize = groups.iter().map(|g| g.get(i).map_or(0, Vec::len)).sum();
            pruned += layer.params_per_unit() * n_selected;
        }
        pruned as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_fc_layers() -> Vec<LayerShape> {
        vec![
            // 11·11·3 weights per filter + bias, 96 filters
            LayerShape::new(LayerKind::Conv, vec![11, 11, 3, 96]),
            LayerShape::new(LayerKind::Fc, vec![4096, 1024]),
        ]
    }

    #[test]
    fn empty_selection_is_zero() {
        let calc = PruningRateCalculator::new(conv_fc_layers());
        let rate = calc.rate(
            &[vec![vec![], vec![]]],
            &[UnitType::Filter, UnitType::Neuron],
        );
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn full_selection_is_one() {
        let calc = PruningRateCalculator::new(conv_fc_layers());
        let all_filters: Vec<usize> = (0..96).collect();
        let all_neurons: Vec<usize> = (0..1024).collect();
        let rate = calc.rate(
            &[vec![all_filters, vec![]], vec![vec![], all_neurons]],
            &[UnitType::Filter, UnitType::Neuron],
        );
        assert!((rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn counts_exact_parameters_per_unit() {
        let calc = PruningRateCalculator::new(vec![LayerShape::new(LayerKind::Fc, vec![10, 4])]);
        // One pruned neuron removes 10 weights + 1 bias out of 44 params.
        let rate = calc.rate(&[vec![vec![2]]], &[UnitType::Neuron]);
        assert!((rate - 11.0 / 44.0).abs() < 1e-12);
    }

    #[test]
    fn conv_uses_all_dims_except_last() {
        let calc =
            PruningRateCalculator::new(vec![LayerShape::new(LayerKind::Conv, vec![3, 3, 2, 4])]);
        // One filter: 3·3·2 weights + 1 bias = 19 of 76 total.
        let rate = calc.rate(&[vec![vec![0]]], &[UnitType::Filter]);
        assert!((rate - 19.0 / 76.0).abs() < 1e-12);
    }

    #[test]
    fn monotone_in_selection_size() {
        let calc = PruningRateCalculator::new(conv_fc_layers());
        let interest = [UnitType::Filter, UnitType::Neuron];
        let mut previous = 0.0;
        for n in 0..=96 {
            let sel: Vec<usize> = (0..n).collect();
            let rate = calc.rate(&[vec![sel, vec![]]], &interest);
            assert!(rate >= previous);
            previous = rate;
        }
    }

    #[test]
    fn denominator_respects_unit_types_of_interest() {
        let calc = PruningRateCalculator::new(conv_fc_layers());
        // Only neurons of interest: the conv layer's parameters do not
        // count toward the denominator.
        let all_neurons: Vec<usize> = (0..1024).collect();
        let rate = calc.rate(&[vec![vec![], all_neurons]], &[UnitType::Neuron]);
        assert!((rate - 1.0).abs() < 1e-12);
    }
}
