//! Common types, errors, and numeric primitives for the forgetnet engine
//!
//! This crate provides the foundational pieces shared across the forgetnet
//! workspace: the error taxonomy, unit/layer type vocabulary, pruning
//! records, and the dense task-by-unit matrix used by importance scoring.

pub mod error;
pub mod matrix;
pub mod types;

pub use error::{ForgetError, Result};
pub use matrix::{argsort_ascending, TaskMatrix};
pub use types::{LayerKind, PruningRecord, UnitType};
