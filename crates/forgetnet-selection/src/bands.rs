//! Global-index ↔ layer-local mapping.

use forgetnet_common::{ForgetError, LayerKind, Result, UnitType};

/// A contiguous range of global unit indices sharing one unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerBand {
    pub unit_type: UnitType,
    pub start: usize,
    pub end: usize,
}

/// Translates flat global unit indices back to per-layer, per-unit-type
/// ranges.
///
/// Global indices are defined by concatenating the per-layer importance
/// matrices column-wise in layer order; this mapper owns the boundary list
/// that makes that concatenation reversible.
#[derive(Debug, Clone)]
pub struct UnitIndexMapper {
    bands: Vec<LayerBand>,
    layer_widths: Vec<usize>,
}

impl UnitIndexMapper {
    /// Build the mapper from the declared layer kind sequence and the unit
    /// width of each scored layer.
    ///
    /// `kinds` covers every model layer including the final output layer,
    /// which is excluded from importance scoring; it must therefore be
    /// exactly one entry longer than `layer_widths`. Bands are grouped by
    /// contiguous runs of identical *unit type* — `fc` and its legacy
    /// `layer` alias merge into one NEURON band.
    pub fn from_layer_kinds(kinds: &[LayerKind], layer_widths: &[usize]) -> Result<Self> {
        if kinds.len() != layer_widths.len() + 1 {
            return Err(ForgetError::BoundaryCountMismatch {
                kinds: kinds.len(),
                layers: layer_widths.len(),
            });
        }
        let scored = &kinds[..kinds.len() - 1];
        let mut bands: Vec<LayerBand> = Vec::new();
        let mut offset = 0;
        for (kind, &width) in scored.iter().zip(layer_widths) {
            let utype = kind.unit_type();
            match bands.last_mut() {
                Some(band) if band.unit_type == utype => band.end += width,
                _ => bands.push(LayerBand { unit_type: utype, start: offset, end: offset + width }),
            }
            offset += width;
        }
        Ok(Self { bands, layer_widths: layer_widths.to_vec() })
    }

    pub fn bands(&self) -> &[LayerBand] {
        &self.bands
    }

    pub fn total_units(&self) -> usize {
        self.layer_widths.iter().sum()
    }

    /// Unit types present, deduplicated in band order.
    pub fn unit_types(&self) -> Vec<UnitType> {
        let mut out: Vec<UnitType> = Vec::new();
        for band in &self.bands {
            if !out.contains(&band.unit_type) {
                out.push(band.unit_type);
            }
        }
        out
    }

    /// The subsequence of `ordered` indices that fall inside bands of the
    /// requested unit type, preserving order.
    ///
    /// When only one unit type exists across all layers this is the
    /// identity; requesting a type that no band carries is an error.
    pub fn filter_by_unit_type(&self, ordered: &[usize], unit_type: UnitType) -> Result<Vec<usize>> {
        let available = self.unit_types();
        if !available.contains(&unit_type) {
            return Err(ForgetError::UnitTypeMismatch { requested: unit_type, available });
        }
        if available.len() == 1 {
            return Ok(ordered.to_vec());
        }
        Ok(ordered
            .iter()
            .copied()
            .filter(|&i| {
                self.bands
                    .iter()
                    .any(|b| b.unit_type == unit_type && i >= b.start && i < b.end)
            })
            .collect())
    }

    /// Convert global indices back to per-layer local offsets — the exact
    /// inverse of column concatenation.
    ///
    /// Each index lands in exactly one layer's output (minus that layer's
    /// start offset); indices outside `[0, total)` are dropped. Order
    /// within each layer follows the order of `indices`, so a ranking stays
    /// a ranking after the split.
    pub fn split_by_layer(&self, indices: &[usize]) -> Vec<Vec<usize>> {
        let mut out = Vec::with_capacity(self.layer_widths.len());
        let mut start = 0;
        for &width in &self.layer_widths {
            let end = start + width;
            out.push(
                indices
                    .iter()
                    .copied()
                    .filter(|&i| i >= start && i < end)
                    .map(|i| i - start)
                    .collect(),
            );
            start = end;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_fc_mapper() -> UnitIndexMapper {
        // conv(3) conv(5) fc(4) fc(2) + output fc
        let kinds = [LayerKind::Conv, LayerKind::Conv, LayerKind::Fc, LayerKind::Fc, LayerKind::Fc];
        UnitIndexMapper::from_layer_kinds(&kinds, &[3, 5, 4, 2]).unwrap()
    }

    #[test]
    fn bands_merge_contiguous_unit_types() {
        let mapper = conv_fc_mapper();
        assert_eq!(
            mapper.bands(),
            &[
                LayerBand { unit_type: UnitType::Filter, start: 0, end: 8 },
                LayerBand { unit_type: UnitType::Neuron, start: 8, end: 14 },
            ]
        );
        assert_eq!(mapper.total_units(), 14);
    }

    #[test]
    fn kind_sequence_must_include_the_output_layer() {
        let kinds = [LayerKind::Fc, LayerKind::Fc];
        let err = UnitIndexMapper::from_layer_kinds(&kinds, &[4, 6]);
        assert!(matches!(err, Err(ForgetError::BoundaryCountMismatch { .. })));
    }

    #[test]
    fn filter_keeps_only_the_requested_band() {
        let mapper = conv_fc_mapper();
        let ordered: Vec<usize> = (0..14).rev().collect();
        let filters = mapper.filter_by_unit_type(&ordered, UnitType::Filter).unwrap();
        assert_eq!(filters, vec![7, 6, 5, 4, 3, 2, 1, 0]);
        let neurons = mapper.filter_by_unit_type(&ordered, UnitType::Neuron).unwrap();
        assert_eq!(neurons, vec![13, 12, 11, 10, 9, 8]);
    }

    #[test]
    fn filter_is_identity_with_a_single_unit_type() {
        let kinds = [LayerKind::Layer, LayerKind::Fc, LayerKind::Fc];
        let mapper = UnitIndexMapper::from_layer_kinds(&kinds, &[4, 6]).unwrap();
        let ordered = vec![9, 0, 5];
        assert_eq!(mapper.filter_by_unit_type(&ordered, UnitType::Neuron).unwrap(), ordered);
    }

    #[test]
    fn absent_unit_type_is_an_error() {
        let mapper = conv_fc_mapper();
        let err = mapper.filter_by_unit_type(&[0], UnitType::None);
        assert!(matches!(err, Err(ForgetError::UnitTypeMismatch { .. })));
    }

    #[test]
    fn split_by_layer_subtracts_band_starts_and_keeps_order() {
        let mapper = conv_fc_mapper();
        let split = mapper.split_by_layer(&[13, 0, 8, 3, 7, 99]);
        // Layer ranges: [0,3) [3,8) [8,12) [12,14); 99 is out of range.
        assert_eq!(split, vec![vec![0], vec![0, 4], vec![0], vec![1]]);
    }

    proptest::proptest! {
        #[test]
        fn split_partitions_every_in_range_index_exactly_once(
            widths in proptest::collection::vec(1usize..6, 1..5),
        ) {
            let mut kinds: Vec<LayerKind> = widths.iter().map(|_| LayerKind::Fc).collect();
            kinds.push(LayerKind::Fc);
            let mapper = UnitIndexMapper::from_layer_kinds(&kinds, &widths).unwrap();
            let total = mapper.total_units();
            let all: Vec<usize> = (0..total).collect();
            let split = mapper.split_by_layer(&all);
            let count: usize = split.iter().map(Vec::len).sum();
            proptest::prop_assert_eq!(count, total);
            // Re-concatenating with offsets reconstructs the input exactly.
            let mut rebuilt = Vec::new();
            let mut start = 0;
            for (locals, w) in split.iter().zip(&widths) {
                rebuilt.extend(locals.iter().map(|l| l + start));
                start += w;
            }
            proptest::prop_assert_eq!(rebuilt, all);
        }

        #[test]
        fn unit_type_filters_union_to_the_full_range(
            conv_w in 1usize..6,
            fc_w in 1usize..6,
        ) {
            let kinds = [LayerKind::Conv, LayerKind::Fc, LayerKind::Fc];
            let mapper = UnitIndexMapper::from_layer_kinds(&kinds, &[conv_w, fc_w]).unwrap();
            let all: Vec<usize> = (0..mapper.total_units()).collect();
            let mut union = Vec::new();
            for ut in mapper.unit_types() {
                union.extend(mapper.filter_by_unit_type(&all, ut).unwrap());
            }
            union.sort_unstable();
            proptest::prop_assert_eq!(union, all);
        }
    }
}
