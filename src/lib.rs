//! Sylva - procedural tree skeletons and batched mesh transforms
//!
//! A branching structure is authored as a tree of 3D curves
//! ([`tree::BranchCurveModel`]), secondary features are scattered along the
//! curves ([`distribution::CurvePointDistributor`]), and the resulting
//! geometry is pushed through a batched, data-parallel transform engine
//! ([`transform::VertexTransformEngine`]) that keeps curves and mesh in
//! lockstep and encodes wind channels for an external renderer.

pub mod core;
pub mod math;
pub mod curve;
pub mod tree;
pub mod distribution;
pub mod transform;
