//! Branch nodes
//!
//! A `Branch` owns one curve, its attached sprouts, and the authored girth
//! attributes. Structural links (parent, children, follow-up) are arena ids
//! resolved through `BranchCurveModel`; derived attributes (girth factors,
//! accumulated length, levels, origin offset, wind phase) are recomputed by
//! the model's passes and never authored directly.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::curve::Curve;
use crate::math::FloatCurve;
use crate::tree::sprout::Sprout;

/// Stable arena index of a branch. Ids are never reused within one model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BranchId(pub(crate) u32);

impl BranchId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Surface shape override for a branch
///
/// Maps a centerline girth to the distance from the centerline to the
/// visible surface at a given relative position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shaper {
    /// Surface sits exactly one girth from the centerline
    Cylindrical,
    /// Base flare: surface pushed outward toward the branch base
    Flared { gain: f32, exponent: f32 },
}

impl Shaper {
    /// Distance from centerline to surface at `position` in [0, 1]
    pub fn surface_distance(&self, girth: f32, position: f32) -> f32 {
        match *self {
            Shaper::Cylindrical => girth,
            Shaper::Flared { gain, exponent } => {
                let falloff = (1.0 - position.clamp(0.0, 1.0)).powf(exponent.max(0.0));
                girth * (1.0 + gain * falloff)
            }
        }
    }
}

/// A single branch in the tree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Branch {
    pub(crate) id: BranchId,
    pub(crate) parent: Option<BranchId>,
    pub(crate) children: Vec<BranchId>,
    pub(crate) follow_up: Option<BranchId>,

    pub curve: Curve,
    pub sprouts: Vec<Sprout>,

    /// Attach position in [0, 1] along the parent. Written only through
    /// `BranchCurveModel::set_position`.
    pub(crate) position: f32,

    pub min_girth: f32,
    pub max_girth: f32,
    pub girth_curve: FloatCurve,
    pub girth_scale: f32,
    /// Surface shape override; `None` uses the cylindrical approximation
    pub shaper: Option<Shaper>,

    // Derived, recomputed by model passes
    #[serde(skip)]
    pub(crate) girth_at_base_factor: f32,
    #[serde(skip)]
    pub(crate) girth_at_top_factor: f32,
    #[serde(skip)]
    pub(crate) accum_length: f32,
    #[serde(skip)]
    pub(crate) level: u32,
    #[serde(skip)]
    pub(crate) offspring_levels: u32,
    #[serde(skip)]
    pub(crate) origin: Vec3,
    #[serde(skip)]
    pub(crate) origin_offset: Vec3,

    // Wind grouping, assigned by the tree-wide phase pass
    #[serde(skip)]
    pub(crate) phase: f32,
    #[serde(skip)]
    pub(crate) phase_dir: Vec3,
    #[serde(skip)]
    pub(crate) phase_length: f32,
}

impl Branch {
    /// Create a detached branch around a curve, attached at the parent tip
    pub fn new(curve: Curve) -> Self {
        Self {
            id: BranchId(u32::MAX),
            parent: None,
            children: Vec::new(),
            follow_up: None,
            curve,
            sprouts: Vec::new(),
            position: 1.0,
            min_girth: 0.05,
            max_girth: 0.25,
            girth_curve: FloatCurve::identity(),
            girth_scale: 1.0,
            shaper: None,
            girth_at_base_factor: 0.0,
            girth_at_top_factor: 1.0,
            accum_length: 0.0,
            level: 0,
            offspring_levels: 0,
            origin: Vec3::ZERO,
            origin_offset: Vec3::ZERO,
            phase: 0.0,
            phase_dir: Vec3::Z,
            phase_length: 0.0,
        }
    }

    /// Builder-style attach position (clamped into [0, 1])
    pub fn with_position(mut self, position: f32) -> Self {
        self.position = position.clamp(0.0, 1.0);
        self
    }

    /// Builder-style girth bounds
    pub fn with_girth(mut self, min: f32, max: f32) -> Self {
        self.min_girth = min.min(max);
        self.max_girth = min.max(max);
        self
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    pub fn parent(&self) -> Option<BranchId> {
        self.parent
    }

    pub fn children(&self) -> &[BranchId] {
        &self.children
    }

    pub fn follow_up(&self) -> Option<BranchId> {
        self.follow_up
    }

    /// Attach position in [0, 1] along the parent
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Arc length accumulated from the tree base to this branch's base.
    /// A detached branch reports 0.
    pub fn accum_length(&self) -> f32 {
        self.accum_length
    }

    /// Depth from the root (root = 0)
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Greatest subtree depth below this branch (leaf = 0)
    pub fn offspring_levels(&self) -> u32 {
        self.offspring_levels
    }

    /// World origin of the curve's first node
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Surface-attachment offset from the parent centerline
    pub fn origin_offset(&self) -> Vec3 {
        self.origin_offset
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn phase_dir(&self) -> Vec3 {
        self.phase_dir
    }

    pub fn phase_length(&self) -> f32 {
        self.phase_length
    }

    /// Girth factor at a relative position along this branch
    pub(crate) fn girth_factor_at(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);
        self.girth_at_base_factor + (self.girth_at_top_factor - self.girth_at_base_factor) * t
    }

    /// Girth at a relative position along this branch
    ///
    /// The factor runs from the base factor at position 0 to the top factor
    /// at position 1; the remap curve is evaluated at (1 - factor). A NaN or
    /// out-of-range result degrades to the clamped bounds, never an error.
    pub fn girth_at(&self, position: f32) -> f32 {
        let factor = self.girth_factor_at(position);
        let shaped = self.girth_curve.evaluate(1.0 - factor);
        let girth = (self.max_girth + (self.min_girth - self.max_girth) * shaped) * self.girth_scale;
        if girth.is_finite() {
            girth.clamp(self.min_girth, self.max_girth)
        } else {
            self.min_girth
        }
    }
}
