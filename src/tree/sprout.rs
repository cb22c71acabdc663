//! Sprouts: secondary features attached to a branch
//!
//! A sprout stores its placement and five alignment knobs; its world-space
//! vectors are derived by `calculate_vectors` and never authored. The blend
//! order inside that derivation (horizontal, then flip, then gravity) is
//! load-bearing: reordering changes the visual output.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::Rng;
use crate::curve::{CurvePoint, any_perpendicular, project_on_plane};

/// A leaf/shoot placement on a branch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sprout {
    /// Relative position in [0, 1] along the owning branch
    pub position: f32,
    /// Roll around the gravity axis (radians)
    pub roll_angle: f32,

    /// Tilt away from the branch axis (radians)
    pub branch_align: f32,
    /// Blend toward the horizontal plane, [0, 1]
    pub horizontal_align: f32,
    /// Blend toward (+) or away from (-) the gravity axis, [-1, 1]
    pub gravity_align: f32,
    /// Blend of the sprout normal toward `flip_direction`, [0, 1]
    pub flip_align: f32,
    /// Target direction for the flip-align blend
    pub flip_direction: Vec3,
    /// Random perturbation of the flip target, [0, 1]
    pub normal_randomness: f32,
    /// Attach at the branch centerline instead of its surface
    pub from_branch_center: bool,

    // Derived by calculate_vectors
    #[serde(skip)]
    pub(crate) direction: Vec3,
    #[serde(skip)]
    pub(crate) normal: Vec3,
    #[serde(skip)]
    pub(crate) forward: Vec3,
    #[serde(skip)]
    pub(crate) attachment_point: Vec3,
}

impl Sprout {
    pub fn new(position: f32, roll_angle: f32) -> Self {
        Self {
            position: position.clamp(0.0, 1.0),
            roll_angle,
            branch_align: std::f32::consts::FRAC_PI_4,
            horizontal_align: 0.0,
            gravity_align: 0.0,
            flip_align: 0.0,
            flip_direction: Vec3::Y,
            normal_randomness: 0.0,
            from_branch_center: false,
            direction: Vec3::Y,
            normal: Vec3::X,
            forward: Vec3::Z,
            attachment_point: Vec3::ZERO,
        }
    }

    /// World growth axis, derived
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// World surface normal, derived
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// Third axis completing the right-handed frame, derived
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// World attachment point on the branch (surface or centerline)
    pub fn attachment_point(&self) -> Vec3 {
        self.attachment_point
    }

    /// Derive the sprout's world vectors from the branch frame at its
    /// position
    ///
    /// `point` is the branch sample at `self.position` (world space),
    /// `girth` the branch girth there, `gravity` the world down axis.
    /// The same inputs and rng state always produce the same vectors.
    pub fn calculate_vectors(
        &mut self,
        point: &CurvePoint,
        girth: f32,
        gravity: Vec3,
        rng: &mut Rng,
    ) {
        let gravity = gravity.try_normalize().unwrap_or(Vec3::NEG_Y);
        let up_axis = -gravity;

        // Base direction: tilt the reference axis away from the branch,
        // then spin it around the gravity axis.
        let tilt = Quat::from_axis_angle(Vec3::X, self.branch_align);
        let spin = Quat::from_axis_angle(Vec3::Y, self.roll_angle);
        let local_direction = spin * (tilt * Vec3::Y);
        let local_normal = spin * Vec3::X;

        // Reframe into the branch's local basis
        let basis = Mat3::from_cols(point.normal, point.forward, point.bitangent);
        let mut direction = (basis * local_direction)
            .try_normalize()
            .unwrap_or(point.forward);
        let mut normal = project_on_plane(basis * local_normal, direction, any_perpendicular(direction));

        // The randomness draw happens unconditionally so the rng stream does
        // not depend on the alignment weights.
        let jitter = Vec3::new(
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
        );

        // 1. Horizontal align: pull the direction toward the plane
        // perpendicular to gravity.
        if self.horizontal_align != 0.0 {
            let horizontal = project_on_plane(direction, gravity, direction);
            direction = direction
                .lerp(horizontal, self.horizontal_align.clamp(0.0, 1.0))
                .try_normalize()
                .unwrap_or(direction);
        }

        // 2. Flip align: pull the normal toward the flip direction, with
        // optional randomization of the target.
        if self.flip_align != 0.0 {
            let target = (self.flip_direction + jitter * self.normal_randomness)
                .try_normalize()
                .unwrap_or(self.flip_direction);
            normal = normal
                .lerp(target, self.flip_align.clamp(0.0, 1.0))
                .try_normalize()
                .unwrap_or(normal);
        }

        // 3. Gravity align: slerp the direction toward or away from the
        // gravity axis.
        if self.gravity_align != 0.0 {
            let target = if self.gravity_align >= 0.0 { up_axis } else { gravity };
            let arc = Quat::from_rotation_arc(direction, target);
            let q = Quat::IDENTITY.slerp(arc, self.gravity_align.abs().min(1.0));
            direction = (q * direction).normalize();
            normal = q * normal;
        }

        self.direction = direction;
        self.normal = project_on_plane(normal, direction, any_perpendicular(direction));
        self.forward = direction.cross(self.normal);

        self.attachment_point = if self.from_branch_center {
            point.position
        } else {
            let radial = project_on_plane(direction, point.forward, point.normal);
            point.position + radial * girth.max(0.0)
        };
    }
}
