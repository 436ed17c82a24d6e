//! Importance scoring for multi-task pruning.
//!
//! Builds per-layer (tasks × units) importance matrices from collaborator
//! supplied signals and computes the task-relatedness deviation used to bias
//! pruning toward task-specific units.

pub mod accumulate;
pub mod relatedness;
pub mod store;

pub use accumulate::{BatchSignal, ImportanceAccumulator, ImportanceCriteria};
pub use relatedness::{task_related_deviation, RelatednessKernel};
pub use store::ImportanceMatrixStore;
