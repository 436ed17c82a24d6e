//! Unit selection for structured pruning.
//!
//! Maps between flat global unit indices and per-layer offsets, ranks units
//! under interchangeable policies, and converts selections into exact
//! parameter-level pruning rates.

pub mod bands;
pub mod policy;
pub mod rate;

pub use bands::{LayerBand, UnitIndexMapper};
pub use policy::{DeviationParams, ParamValue, SelectionPolicy, UnitSelector};
pub use rate::{LayerShape, PruningRateCalculator};
