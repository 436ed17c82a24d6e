//! Per-layer importance matrix storage.

use forgetnet_common::{ForgetError, Result, TaskMatrix};
use tracing::{debug, warn};

/// Holds one (tasks × units) importance matrix per hidden layer.
///
/// Matrices are built task-by-task with the most recent task processed
/// first, so vectors from older (typically narrower) tasks are right-padded
/// against column widths already established by newer tasks and no column
/// is ever truncated. Row 0 of every finished matrix is task 1.
#[derive(Debug, Clone, Default)]
pub struct ImportanceMatrixStore {
    layers: Vec<TaskMatrix>,
    normalized: bool,
}

impl ImportanceMatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full store for `n_tasks` tasks.
    ///
    /// `importance_for(task_id)` supplies one vector per layer for the given
    /// 1-based task id; it is invoked in descending task order. Each vector
    /// is right-zero-padded to the layer's current width before being
    /// stacked on top of the rows gathered so far.
    pub fn build<F>(n_tasks: usize, mut importance_for: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Vec<Vec<f32>>>,
    {
        let mut layers: Vec<TaskMatrix> = Vec::new();
        for task_id in (1..=n_tasks).rev() {
            let vectors = importance_for(task_id)?;
            if task_id == n_tasks {
                layers = vectors.iter().map(|v| TaskMatrix::zeros(0, v.len())).collect();
            } else if vectors.len() != layers.len() {
                return Err(ForgetError::ShapeMismatch {
                    layer: 0,
                    expected: layers.len(),
                    actual: vectors.len(),
                });
            }
            for (i, mut vector) in vectors.into_iter().enumerate() {
                let width = layers[i].cols();
                if vector.len() > width {
                    // An older task may never report more units than a
                    // newer one; padding only widens rightwards.
                    return Err(ForgetError::ShapeMismatch {
                        layer: i,
                        expected: width,
                        actual: vector.len(),
                    });
                }
                vector.resize(width, 0.0);
                layers[i].push_row_top(&vector);
            }
        }
        debug!(n_tasks, n_layers = layers.len(), "importance matrix built");
        Ok(Self { layers, normalized: false })
    }

    /// Append a single task row in streaming ("online") mode.
    ///
    /// `task_id` must be the next 1-based task (current row count + 1);
    /// skipping or repeating a task would silently misalign rows against
    /// task ids, so it is rejected. Whichever side is narrower — the
    /// incoming vector or the stored matrix — is right-zero-padded to match
    /// the other before stacking.
    pub fn append_online(&mut self, task_id: usize, vectors: Vec<Vec<f32>>) -> Result<()> {
        let expected = self.layers.first().map_or(0, TaskMatrix::rows) + 1;
        if task_id != expected {
            return Err(ForgetError::OutOfOrderTask { task_id, expected });
        }
        if self.layers.is_empty() {
            self.layers = vectors.into_iter().map(|v| TaskMatrix::from_rows(&[v])).collect();
            return Ok(());
        }
        if vectors.len() != self.layers.len() {
            return Err(ForgetError::ShapeMismatch {
                layer: 0,
                expected: self.layers.len(),
                actual: vectors.len(),
            });
        }
        for (layer, mut vector) in self.layers.iter_mut().zip(vectors) {
            if vector.len() < layer.cols() {
                vector.resize(layer.cols(), 0.0);
            } else {
                layer.pad_cols(vector.len());
            }
            layer.push_row_bottom(&vector);
        }
        Ok(())
    }

    /// Number of stored layers.
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of task rows (identical across layers).
    pub fn n_tasks(&self) -> Result<usize> {
        self.require_built()?;
        Ok(self.layers[0].rows())
    }

    /// Column count of every layer, in layer order.
    pub fn layer_widths(&self) -> Vec<usize> {
        self.layers.iter().map(TaskMatrix::cols).collect()
    }

    /// Total unit count across all layers.
    pub fn total_units(&self) -> usize {
        self.layers.iter().map(TaskMatrix::cols).sum()
    }

    /// Layer-wise view of the matrices.
    pub fn as_layerwise(&self) -> Result<&[TaskMatrix]> {
        self.require_built()?;
        Ok(&self.layers)
    }

    /// Single matrix with all layers concatenated column-wise in layer order.
    pub fn as_flat(&self) -> Result<TaskMatrix> {
        self.require_built()?;
        let parts: Vec<&TaskMatrix> = self.layers.iter().collect();
        Ok(TaskMatrix::hconcat(&parts))
    }

    /// Flat matrix with the given 1-based task rows removed.
    pub fn flat_without_tasks(&self, task_ids: &[usize]) -> Result<TaskMatrix> {
        let flat = self.as_flat()?;
        let drop = to_row_indices(task_ids, flat.rows())?;
        Ok(flat.without_rows(&drop))
    }

    /// Flat matrix keeping only the given 1-based task rows.
    pub fn flat_of_tasks(&self, task_ids: &[usize]) -> Result<TaskMatrix> {
        let flat = self.as_flat()?;
        let keep = to_row_indices(task_ids, flat.rows())?;
        Ok(flat.only_rows(&keep))
    }

    /// Divide each task row by its Euclidean norm over the *concatenated*
    /// unit space, applied identically to every layer's sub-matrix.
    ///
    /// Calling this twice compounds the normalization; a repeat call is
    /// allowed but logged, and `is_normalized` lets callers track it.
    pub fn normalize(&mut self) -> Result<()> {
        let flat = self.as_flat()?;
        if self.normalized {
            warn!("importance matrix normalized again; row norms now compound");
        }
        for r in 0..flat.rows() {
            let norm = flat.row_norm(r);
            if norm > 0.0 {
                let inv = 1.0 / norm;
                for layer in &mut self.layers {
                    layer.scale_row(r, inv);
                }
            }
        }
        self.normalized = true;
        Ok(())
    }

    /// Whether [`normalize`](Self::normalize) has been applied.
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    fn require_built(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(ForgetError::EmptyMatrix);
        }
        Ok(())
    }
}

/// Map 1-based task ids to row indices, rejecting ids outside `1..=n_tasks`.
fn to_row_indices(task_ids: &[usize], n_tasks: usize) -> Result<Vec<usize>> {
    task_ids
        .iter()
        .map(|&t| {
            if t == 0 || t > n_tasks {
                Err(ForgetError::InvalidTaskId { task_id: t, n_tasks })
            } else {
                Ok(t - 1)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_task_store() -> ImportanceMatrixStore {
        // Task 3 is the widest (grown network); older tasks are narrower.
        ImportanceMatrixStore::build(3, |task_id| {
            Ok(match task_id {
                3 => vec![vec![3.0, 3.0, 3.0, 3.0], vec![3.0, 3.0]],
                2 => vec![vec![2.0, 2.0, 2.0], vec![2.0, 2.0]],
                1 => vec![vec![1.0, 1.0], vec![1.0]],
                _ => unreachable!(),
            })
        })
        .unwrap()
    }

    #[test]
    fn build_pads_older_tasks_and_orders_rows_ascending() {
        let store = three_task_store();
        let layers = store.as_layerwise().unwrap();
        assert_eq!(layers[0].row(0), &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(layers[0].row(1), &[2.0, 2.0, 2.0, 0.0]);
        assert_eq!(layers[0].row(2), &[3.0, 3.0, 3.0, 3.0]);
        assert_eq!(layers[1].row(0), &[1.0, 0.0]);
    }

    #[test]
    fn build_rejects_older_task_wider_than_newer() {
        let result = ImportanceMatrixStore::build(2, |task_id| {
            Ok(match task_id {
                2 => vec![vec![1.0, 1.0]],
                1 => vec![vec![1.0, 1.0, 1.0]],
                _ => unreachable!(),
            })
        });
        assert!(matches!(result, Err(ForgetError::ShapeMismatch { .. })));
    }

    #[test]
    fn flat_view_concatenates_in_layer_order() {
        let store = three_task_store();
        let flat = store.as_flat().unwrap();
        assert_eq!(flat.cols(), 6);
        assert_eq!(flat.row(2), &[3.0, 3.0, 3.0, 3.0, 3.0, 3.0]);
        assert_eq!(store.total_units(), 6);
    }

    #[test]
    fn empty_store_errors() {
        let store = ImportanceMatrixStore::new();
        assert!(matches!(store.as_flat(), Err(ForgetError::EmptyMatrix)));
        assert!(matches!(store.n_tasks(), Err(ForgetError::EmptyMatrix)));
    }

    #[test]
    fn online_append_pads_whichever_side_is_narrower() {
        let mut store = ImportanceMatrixStore::new();
        store.append_online(1, vec![vec![1.0, 1.0]]).unwrap();
        // Network grew: new row is wider, existing matrix gets padded.
        store.append_online(2, vec![vec![2.0, 2.0, 2.0]]).unwrap();
        // New row narrower than the matrix: the row gets padded.
        store.append_online(3, vec![vec![3.0]]).unwrap();
        let layers = store.as_layerwise().unwrap();
        assert_eq!(layers[0].row(0), &[1.0, 1.0, 0.0]);
        assert_eq!(layers[0].row(1), &[2.0, 2.0, 2.0]);
        assert_eq!(layers[0].row(2), &[3.0, 0.0, 0.0]);
    }

    #[test]
    fn online_append_rejects_out_of_order_task_ids() {
        let mut store = ImportanceMatrixStore::new();
        // First append must be task 1.
        assert!(matches!(
            store.append_online(2, vec![vec![1.0]]),
            Err(ForgetError::OutOfOrderTask { task_id: 2, expected: 1 })
        ));
        store.append_online(1, vec![vec![1.0]]).unwrap();
        // Repeating a task would overwrite the row-to-task mapping.
        assert!(matches!(
            store.append_online(1, vec![vec![2.0]]),
            Err(ForgetError::OutOfOrderTask { task_id: 1, expected: 2 })
        ));
        // Skipping ahead would leave a gap.
        assert!(matches!(
            store.append_online(3, vec![vec![2.0]]),
            Err(ForgetError::OutOfOrderTask { task_id: 3, expected: 2 })
        ));
        store.append_online(2, vec![vec![2.0]]).unwrap();
        assert_eq!(store.n_tasks().unwrap(), 2);
    }

    #[test]
    fn normalize_applies_one_norm_across_all_layers() {
        let mut store = ImportanceMatrixStore::build(1, |_| {
            Ok(vec![vec![3.0], vec![4.0]])
        })
        .unwrap();
        store.normalize().unwrap();
        let layers = store.as_layerwise().unwrap();
        // Row norm over the concatenated row [3, 4] is 5.
        assert!((layers[0].row(0)[0] - 0.6).abs() < 1e-6);
        assert!((layers[1].row(0)[0] - 0.8).abs() < 1e-6);
        assert!(store.is_normalized());
    }

    #[test]
    fn flat_without_tasks_drops_one_based_rows() {
        let store = three_task_store();
        let reduced = store.flat_without_tasks(&[2]).unwrap();
        assert_eq!(reduced.rows(), 2);
        assert_eq!(reduced.row(1), &[3.0, 3.0, 3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn task_ids_outside_the_one_based_range_error() {
        let store = three_task_store();
        assert!(matches!(
            store.flat_without_tasks(&[0]),
            Err(ForgetError::InvalidTaskId { task_id: 0, n_tasks: 3 })
        ));
        assert!(matches!(
            store.flat_of_tasks(&[4]),
            Err(ForgetError::InvalidTaskId { task_id: 4, n_tasks: 3 })
        ));
    }
}
