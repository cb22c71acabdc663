//! Curve sample points
//!
//! `CurvePoint` is an immutable value sample on a cubic curve: a position,
//! an orthonormal frame (forward / normal / bitangent), girth and roll, and
//! three parameterizations of where the sample sits along its curve.
//! Transformations return a mutated copy or mutate in place explicitly;
//! samples are never implicitly shared.

use glam::{Quat, Vec2, Vec3};

/// Return an arbitrary unit vector perpendicular to `v`
///
/// Falls back through the cardinal axes for near-vertical input.
pub fn any_perpendicular(v: Vec3) -> Vec3 {
    if v.y.abs() < 0.9 {
        v.cross(Vec3::Y).try_normalize().unwrap_or(Vec3::X)
    } else {
        v.cross(Vec3::X).try_normalize().unwrap_or(Vec3::Z)
    }
}

/// Project `v` onto the plane perpendicular to `axis`, normalized
///
/// Returns `fallback` when the projection degenerates (v parallel to axis).
pub fn project_on_plane(v: Vec3, axis: Vec3, fallback: Vec3) -> Vec3 {
    (v - axis * v.dot(axis)).try_normalize().unwrap_or(fallback)
}

/// An arc-length parameterized sample on a 3D curve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvePoint {
    pub position: Vec3,
    /// Unit tangent along the curve
    pub forward: Vec3,
    /// Unit normal, perpendicular to forward
    pub normal: Vec3,
    /// forward x normal
    pub bitangent: Vec3,
    /// Cross-section scale
    pub scale: Vec2,
    pub girth: f32,
    /// Accumulated roll angle (radians) applied around forward
    pub roll: f32,
    /// Absolute arc length from the curve start
    pub length_position: f32,
    /// Arc length normalized to [0, 1]
    pub relative_position: f32,
    /// Raw curve parameter in [0, 1]
    pub time_position: f32,
}

impl CurvePoint {
    /// Create a point with an orthonormalized frame
    ///
    /// Degenerate input (zero forward, normal collinear with forward)
    /// falls back to the Y-forward / derived-perpendicular frame instead
    /// of producing NaNs.
    pub fn new(position: Vec3, forward: Vec3, normal: Vec3) -> Self {
        let forward = forward.try_normalize().unwrap_or(Vec3::Y);
        let normal = project_on_plane(normal, forward, any_perpendicular(forward));
        Self {
            position,
            forward,
            normal,
            bitangent: forward.cross(normal),
            scale: Vec2::ONE,
            girth: 0.0,
            roll: 0.0,
            length_position: 0.0,
            relative_position: 0.0,
            time_position: 0.0,
        }
    }

    /// Interpolate between two samples
    ///
    /// Positions and scalars lerp; the frame is lerped then re-orthonormalized
    /// against the interpolated forward.
    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let forward = a.forward.lerp(b.forward, t).try_normalize().unwrap_or(a.forward);
        let normal = project_on_plane(
            a.normal.lerp(b.normal, t),
            forward,
            any_perpendicular(forward),
        );
        Self {
            position: a.position.lerp(b.position, t),
            forward,
            normal,
            bitangent: forward.cross(normal),
            scale: a.scale.lerp(b.scale, t),
            girth: a.girth + (b.girth - a.girth) * t,
            roll: a.roll + (b.roll - a.roll) * t,
            length_position: a.length_position + (b.length_position - a.length_position) * t,
            relative_position: a.relative_position + (b.relative_position - a.relative_position) * t,
            time_position: a.time_position + (b.time_position - a.time_position) * t,
        }
    }

    /// Rotate the frame around forward by `angle` radians, in place
    pub fn roll(&mut self, angle: f32) {
        let q = Quat::from_axis_angle(self.forward, angle);
        self.normal = (q * self.normal).normalize();
        self.bitangent = self.forward.cross(self.normal);
        self.roll += angle;
    }

    /// Copy of this point rolled by `angle` radians
    pub fn rolled(&self, angle: f32) -> Self {
        let mut p = *self;
        p.roll(angle);
        p
    }

    /// Reframe the point toward a new forward/normal pair, in place
    ///
    /// The frame is re-orthonormalized; degenerate input keeps the prior
    /// normal direction where possible.
    pub fn look_at(&mut self, forward: Vec3, normal: Vec3) {
        let forward = forward.try_normalize().unwrap_or(self.forward);
        let fallback = project_on_plane(self.normal, forward, any_perpendicular(forward));
        self.forward = forward;
        self.normal = project_on_plane(normal, forward, fallback);
        self.bitangent = forward.cross(self.normal);
    }
}

impl Default for CurvePoint {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Y, Vec3::X)
    }
}
