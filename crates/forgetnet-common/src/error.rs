//! Error taxonomy for the forgetting engine.
//!
//! Every failure is locally fatal to the current step and is never retried
//! or silently substituted; the [`ForgetError::Step`] wrapper attaches the
//! policy name, forgotten task ids, and step index so a sweep across many
//! policies can be diagnosed without re-running the whole experiment.

use crate::types::UnitType;

/// Errors from importance scoring, unit selection, and the forget loop.
#[derive(Debug, thiserror::Error)]
pub enum ForgetError {
    /// Importance vectors for different tasks of the same layer disagree in
    /// a way padding cannot fix (an older task reported more units than a
    /// newer one).
    #[error("importance vector shape mismatch at layer {layer}: expected at most {expected} units, got {actual}")]
    ShapeMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    /// The importance store was queried before any `build` or
    /// `append_online` call.
    #[error("importance matrix is empty: build it or append a task row first")]
    EmptyMatrix,

    /// A requested unit type does not occur in the declared layer sequence.
    #[error("unit type {requested:?} is absent from layer bands {available:?}")]
    UnitTypeMismatch {
        requested: UnitType,
        available: Vec<UnitType>,
    },

    /// The declared layer kinds do not line up with the importance store.
    /// The final (output) layer is excluded from importance scoring, so the
    /// kind sequence must be exactly one longer than the matrix list.
    #[error("{kinds} layer kinds but {layers} importance matrices: the kind sequence must have exactly one more entry (the output layer)")]
    BoundaryCountMismatch { kinds: usize, layers: usize },

    /// The mean relatedness weight left the sane window, indicating a
    /// degenerate tau choice. Never rescaled silently.
    #[error("mean relatedness weight {mean} is outside (0.1, 0.9) for tau {tau}; pick a different tau")]
    RelatednessOutOfRange { mean: f32, tau: f32 },

    /// An unrecognized relatedness kernel name.
    #[error("unknown relatedness type '{0}'")]
    UnknownRelatednessType(String),

    /// A deviation-mixed policy was configured with a keyed mixing
    /// coefficient map that has no entry for this experiment.
    #[error("no mixing coefficient registered for experiment '{key}'")]
    MissingMixingCoefficient { key: String },

    /// A deviation-mixed policy was configured with a keyed tau map that
    /// has no entry for this experiment.
    #[error("no tau registered for experiment '{key}'")]
    MissingTau { key: String },

    /// An unrecognized selection policy name.
    #[error("unsupported selection policy '{0}'")]
    UnsupportedPolicy(String),

    /// An unrecognized layer kind string.
    #[error("unknown layer kind '{0}'")]
    UnknownLayerKind(String),

    /// An unrecognized importance criteria string.
    #[error("unknown importance criteria '{0}'")]
    UnknownImportanceCriteria(String),

    /// The relatedness computation needs at least one task on each side of
    /// the remember/forget split for non-constant kernels.
    #[error("degenerate task split: {remember} task(s) to remember, {forget} to forget")]
    DegenerateTaskSplit { remember: usize, forget: usize },

    /// A task id outside the store's 1-based task range.
    #[error("task id {task_id} is outside 1..={n_tasks}")]
    InvalidTaskId { task_id: usize, n_tasks: usize },

    /// A streaming importance append arrived out of task order.
    #[error("online append for task {task_id}, but the next task row is {expected}")]
    OutOfOrderTask { task_id: usize, expected: usize },

    /// The host model has no parameter under the requested name.
    #[error("model has no parameter named '{0}'")]
    MissingParameter(String),

    /// A snapshot index fell outside the stack.
    #[error("snapshot index {index} out of range for stack of depth {depth}")]
    SnapshotOutOfRange { index: isize, depth: usize },

    /// Context wrapper attached by the sequential controller.
    #[error("step {step} of policy '{policy}' (forgetting tasks {tasks:?}) failed: {source}")]
    Step {
        policy: String,
        step: usize,
        tasks: Vec<usize>,
        #[source]
        source: Box<ForgetError>,
    },
}

impl ForgetError {
    /// Wrap an error with the step context required by the controller.
    pub fn at_step(self, policy: &str, step: usize, tasks: &[usize]) -> Self {
        Self::Step {
            policy: policy.to_owned(),
            step,
            tasks: tasks.to_vec(),
            source: Box::new(self),
        }
    }
}

/// Convenience result type for forgetnet operations.
pub type Result<T> = std::result::Result<T, ForgetError>;
