//! Batched mesh/curve transform engines and wind encoding

pub mod buffer;
pub mod engine;
pub mod curve_engine;
pub mod wind;

pub use buffer::{MAX_AUX_CHANNELS, PackedVertex, VertexBuffer};
pub use engine::{BatchHandle, BendMode, OffsetPhase, VertexTransformEngine};
pub use curve_engine::CurveTransformEngine;
pub use wind::{WindEncodingPass, WindUnit};
