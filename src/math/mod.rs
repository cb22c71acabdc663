//! Mathematical utilities and data structures

pub mod range;
pub mod remap;

pub use range::{FloatRange, IntRange};
pub use remap::{CurveKey, FloatCurve};
