//! Branch tree structural model

pub mod branch;
pub mod sprout;
pub mod model;

pub use branch::{Branch, BranchId, Shaper};
pub use sprout::Sprout;
pub use model::{BranchCurveModel, TreeDocument};
