//! Sequential forgetting experiments.
//!
//! Drives repeated rounds of snapshot → select → zero → evaluate → record →
//! recover against a host model, accumulating the history that forms a
//! forgetting curve per selection policy.

pub mod controller;
pub mod curve;
pub mod model;
pub mod reference;
pub mod snapshot;

pub use controller::{EpisodeConfig, SequentialForgetController};
pub use curve::{CurvePoint, ForgettingCurve};
pub use model::{
    HostModel, ImportanceSource, ParamTensor, ParameterSnapshot, ParameterStore, TaskEvaluator,
};
pub use reference::ReferenceModel;
pub use snapshot::ParameterSnapshotStack;
