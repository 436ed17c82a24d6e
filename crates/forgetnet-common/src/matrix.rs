//! Dense task-by-unit matrices.
//!
//! All importance arithmetic in the workspace runs on row-major `f32`
//! storage with plain slice math. Rows are tasks in ascending task order
//! (row 0 = task 1), columns are units.

/// Dense row-major matrix with tasks as rows and units as columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl TaskMatrix {
    /// An all-zero matrix. `rows == 0` is allowed and used as a stacking seed.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    /// Build from equal-length rows. Panics in debug builds on ragged input;
    /// callers validate shapes before constructing.
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        debug_assert!(rows.iter().all(|r| r.len() == cols));
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in rows {
            data.extend_from_slice(r);
        }
        Self { rows: rows.len(), cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow one task row.
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Right-pad every row with zeros so the matrix has `new_cols` columns.
    /// A no-op when already that wide; never narrows.
    pub fn pad_cols(&mut self, new_cols: usize) {
        if new_cols <= self.cols {
            return;
        }
        let mut data = vec![0.0; self.rows * new_cols];
        for r in 0..self.rows {
            data[r * new_cols..r * new_cols + self.cols]
                .copy_from_slice(&self.data[r * self.cols..(r + 1) * self.cols]);
        }
        self.cols = new_cols;
        self.data = data;
    }

    /// Stack a row on top of the matrix (becomes row 0).
    ///
    /// The row must already be padded to the matrix width.
    pub fn push_row_top(&mut self, row: &[f32]) {
        if self.rows == 0 {
            self.cols = row.len();
        }
        debug_assert_eq!(row.len(), self.cols);
        let mut data = Vec::with_capacity((self.rows + 1) * self.cols);
        data.extend_from_slice(row);
        data.extend_from_slice(&self.data);
        self.rows += 1;
        self.data = data;
    }

    /// Append a row at the bottom (becomes the last row).
    pub fn push_row_bottom(&mut self, row: &[f32]) {
        if self.rows == 0 {
            self.cols = row.len();
        }
        debug_assert_eq!(row.len(), self.cols);
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    /// Concatenate matrices column-wise. All inputs must share a row count.
    pub fn hconcat(parts: &[&TaskMatrix]) -> Self {
        let rows = parts.first().map_or(0, |m| m.rows);
        debug_assert!(parts.iter().all(|m| m.rows == rows));
        let cols = parts.iter().map(|m| m.cols).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for m in parts {
                data.extend_from_slice(m.row(r));
            }
        }
        Self { rows, cols, data }
    }

    /// A copy with the given row indices removed (0-based, unordered, may
    /// contain duplicates).
    pub fn without_rows(&self, drop: &[usize]) -> Self {
        let mut out = Self::zeros(0, self.cols);
        for r in 0..self.rows {
            if !drop.contains(&r) {
                out.push_row_bottom(self.row(r));
            }
        }
        out
    }

    /// A copy keeping only the given row indices, in their original order.
    pub fn only_rows(&self, keep: &[usize]) -> Self {
        let mut out = Self::zeros(0, self.cols);
        for r in 0..self.rows {
            if keep.contains(&r) {
                out.push_row_bottom(self.row(r));
            }
        }
        out
    }

    /// Per-column mean over all rows.
    pub fn col_mean(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.cols];
        for r in 0..self.rows {
            for (o, &v) in out.iter_mut().zip(self.row(r)) {
                *o += v;
            }
        }
        if self.rows > 0 {
            let inv = 1.0 / self.rows as f32;
            for o in &mut out {
                *o *= inv;
            }
        }
        out
    }

    /// Per-column maximum over all rows.
    pub fn col_max(&self) -> Vec<f32> {
        let mut out = vec![f32::NEG_INFINITY; self.cols];
        for r in 0..self.rows {
            for (o, &v) in out.iter_mut().zip(self.row(r)) {
                *o = o.max(v);
            }
        }
        out
    }

    /// Euclidean norm of one row.
    pub fn row_norm(&self, r: usize) -> f32 {
        self.row(r).iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Multiply one row by a scalar in place.
    pub fn scale_row(&mut self, r: usize, factor: f32) {
        for v in self.row_mut(r) {
            *v *= factor;
        }
    }

    /// Iterate over all values row-major.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied()
    }

    /// Re-insert zero columns at the given (output-space) positions.
    ///
    /// Used to compare matrices across pruned and unpruned unit spaces: a
    /// matrix whose columns were removed at `zero_at` is widened back so
    /// each surviving column returns to its original position.
    ///
    /// ```
    /// use forgetnet_common::TaskMatrix;
    ///
    /// let m = TaskMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
    /// let e = m.zero_expanded_cols(&[0, 2, 3]);
    /// assert_eq!(e.row(0), &[0.0, 1.0, 0.0, 0.0, 2.0]);
    /// assert_eq!(e.row(1), &[0.0, 3.0, 0.0, 0.0, 4.0]);
    /// ```
    pub fn zero_expanded_cols(&self, zero_at: &[usize]) -> Self {
        let new_cols = self.cols + zero_at.len();
        let mut out = Self::zeros(self.rows, new_cols);
        for r in 0..self.rows {
            let mut src = self.row(r).iter();
            for c in 0..new_cols {
                if !zero_at.contains(&c) {
                    out.row_mut(r)[c] = *src.next().expect("column accounting");
                }
            }
        }
        out
    }
}

/// Indices that sort `values` ascending, stable on ties (equal values keep
/// their index order). Non-finite values compare as equal to everything
/// they cannot be ordered against, which keeps the sort total.
///
/// ```
/// use forgetnet_common::argsort_ascending;
///
/// assert_eq!(argsort_ascending(&[3.0, 1.0, 2.0, 1.0]), vec![1, 3, 2, 0]);
/// ```
pub fn argsort_ascending(values: &[f32]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| {
        values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal)
    });
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_top_builds_ascending_task_order() {
        // Tasks arrive newest-first: task 3, then 2, then 1.
        let mut m = TaskMatrix::zeros(0, 3);
        m.push_row_top(&[3.0, 3.0, 3.0]);
        m.push_row_top(&[2.0, 2.0, 2.0]);
        m.push_row_top(&[1.0, 1.0, 1.0]);
        assert_eq!(m.row(0), &[1.0, 1.0, 1.0]);
        assert_eq!(m.row(2), &[3.0, 3.0, 3.0]);
    }

    #[test]
    fn pad_cols_right_pads_with_zeros() {
        let mut m = TaskMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        m.pad_cols(4);
        assert_eq!(m.row(0), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(m.row(1), &[3.0, 4.0, 0.0, 0.0]);
        // Never narrows.
        m.pad_cols(1);
        assert_eq!(m.cols(), 4);
    }

    #[test]
    fn hconcat_preserves_row_alignment() {
        let a = TaskMatrix::from_rows(&[vec![1.0], vec![2.0]]);
        let b = TaskMatrix::from_rows(&[vec![10.0, 11.0], vec![20.0, 21.0]]);
        let c = TaskMatrix::hconcat(&[&a, &b]);
        assert_eq!(c.row(0), &[1.0, 10.0, 11.0]);
        assert_eq!(c.row(1), &[2.0, 20.0, 21.0]);
    }

    #[test]
    fn without_rows_drops_by_index() {
        let m = TaskMatrix::from_rows(&[vec![1.0], vec![2.0], vec![3.0]]);
        let r = m.without_rows(&[1]);
        assert_eq!(r.rows(), 2);
        assert_eq!(r.row(0), &[1.0]);
        assert_eq!(r.row(1), &[3.0]);
    }

    #[test]
    fn col_stats() {
        let m = TaskMatrix::from_rows(&[vec![1.0, 4.0], vec![3.0, 2.0]]);
        assert_eq!(m.col_mean(), vec![2.0, 3.0]);
        assert_eq!(m.col_max(), vec![3.0, 4.0]);
    }

    #[test]
    fn argsort_is_stable_on_ties() {
        let idx = argsort_ascending(&[1.0, 1.0, 0.5, 1.0]);
        assert_eq!(idx, vec![2, 0, 1, 3]);
    }

    proptest::proptest! {
        #[test]
        fn zero_expansion_round_trips(
            vals in proptest::collection::vec(-10.0f32..10.0, 1..12),
        ) {
            let m = TaskMatrix::from_rows(&[vals.clone()]);
            let expanded = m.zero_expanded_cols(&[0]);
            prop_cols_match(&expanded, &vals);
        }
    }

    fn prop_cols_match(expanded: &TaskMatrix, original: &[f32]) {
        assert_eq!(expanded.cols(), original.len() + 1);
        assert_eq!(expanded.row(0)[0], 0.0);
        assert_eq!(&expanded.row(0)[1..], original);
    }
}
