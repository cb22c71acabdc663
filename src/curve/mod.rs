//! Cubic curves with cached arc-length samples
//!
//! A `Curve` is an ordered list of control nodes plus a cached list of
//! arc-length parameterized `CurvePoint` samples. The cache is regenerated
//! wholesale by `resample` (the only mutation path — no partial sample
//! edits) and is always monotonic in arc length. Frames are propagated
//! deterministically along the samples by parallel transport from the
//! curve's reference normal.

pub mod point;

pub use point::{CurvePoint, any_perpendicular, project_on_plane};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default number of cached samples per Bezier segment
pub const DEFAULT_SAMPLES_PER_SEGMENT: u32 = 12;

/// A cubic Bezier control node
///
/// Handles are stored as offsets from the node position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveNode {
    pub position: Vec3,
    pub handle_in: Vec3,
    pub handle_out: Vec3,
    /// Authoring-time up hint for this node
    pub up: Vec3,
}

impl CurveNode {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            handle_in: Vec3::ZERO,
            handle_out: Vec3::ZERO,
            up: Vec3::Y,
        }
    }

    pub fn with_handles(position: Vec3, handle_in: Vec3, handle_out: Vec3) -> Self {
        Self {
            position,
            handle_in,
            handle_out,
            up: Vec3::Y,
        }
    }

    /// Absolute position of the incoming handle
    pub fn handle_in_point(&self) -> Vec3 {
        self.position + self.handle_in
    }

    /// Absolute position of the outgoing handle
    pub fn handle_out_point(&self) -> Vec3 {
        self.position + self.handle_out
    }
}

/// Evaluate a cubic Bezier at t
fn bezier(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let u = 1.0 - t;
    p0 * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + p3 * (t * t * t)
}

/// First derivative of a cubic Bezier at t
fn bezier_tangent(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let u = 1.0 - t;
    (p1 - p0) * (3.0 * u * u) + (p2 - p1) * (6.0 * u * t) + (p3 - p2) * (3.0 * t * t)
}

/// A cubic curve: control nodes plus an arc-length sample cache
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Curve {
    nodes: Vec<CurveNode>,
    #[serde(skip)]
    samples: Vec<CurvePoint>,
    #[serde(skip)]
    length: f32,
    /// Seed normal for frame propagation, set by the owning model
    pub reference_normal: Vec3,
    /// Tangent at the curve start after the last resample
    pub reference_forward: Vec3,
    /// Authored normal the trunk frame is anchored to
    pub fixed_normal: Vec3,
    samples_per_segment: u32,
}

impl Curve {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            samples: Vec::new(),
            length: 0.0,
            reference_normal: Vec3::X,
            reference_forward: Vec3::Y,
            fixed_normal: Vec3::X,
            samples_per_segment: DEFAULT_SAMPLES_PER_SEGMENT,
        }
    }

    /// Straight-line curve between two points with auto handles
    pub fn line(from: Vec3, to: Vec3) -> Self {
        let dir = (to - from) / 3.0;
        let mut curve = Self::new();
        curve.add_node(CurveNode::with_handles(from, -dir, dir));
        curve.add_node(CurveNode::with_handles(to, -dir, dir));
        curve.resample();
        curve
    }

    pub fn add_node(&mut self, node: CurveNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[CurveNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Replace a control node. The sample cache is stale until `resample`.
    pub fn set_node(&mut self, index: usize, node: CurveNode) {
        if index < self.nodes.len() {
            self.nodes[index] = node;
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn samples(&self) -> &[CurvePoint] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [CurvePoint] {
        &mut self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn samples_per_segment(&self) -> u32 {
        self.samples_per_segment
    }

    pub fn set_samples_per_segment(&mut self, per_segment: u32) {
        self.samples_per_segment = per_segment.max(1);
    }

    /// First cached sample, if any
    pub fn first_point(&self) -> Option<&CurvePoint> {
        self.samples.first()
    }

    /// Tangent at the curve start, derived from node geometry
    ///
    /// Works before the first `resample`; degenerate nodes fall back to +Y.
    pub fn base_tangent(&self) -> Vec3 {
        if let Some(first) = self.samples.first() {
            return first.forward;
        }
        match self.nodes.len() {
            0 | 1 => Vec3::Y,
            _ => self.nodes[0]
                .handle_out
                .try_normalize()
                .or_else(|| (self.nodes[1].position - self.nodes[0].position).try_normalize())
                .unwrap_or(Vec3::Y),
        }
    }

    /// Last cached sample, if any
    pub fn last_point(&self) -> Option<&CurvePoint> {
        self.samples.last()
    }

    /// Regenerate the arc-length sample cache from the control nodes
    ///
    /// This is the only way the cache mutates. Frames are parallel
    /// transported from `reference_normal`; arc length accumulates
    /// monotonically. A curve with fewer than two nodes degrades to a
    /// single degenerate sample (or none), never an error.
    pub fn resample(&mut self) {
        self.samples.clear();
        self.length = 0.0;

        if self.nodes.is_empty() {
            return;
        }
        if self.nodes.len() == 1 {
            let mut p = CurvePoint::new(self.nodes[0].position, Vec3::Y, self.reference_normal);
            p.relative_position = 0.0;
            self.samples.push(p);
            self.reference_forward = Vec3::Y;
            return;
        }

        let segments = self.nodes.len() - 1;
        let per = self.samples_per_segment.max(1) as usize;
        let total_steps = segments * per;

        let mut accumulated = 0.0f32;
        let mut prev_position = self.nodes[0].position;
        let mut prev_normal = self.reference_normal;

        for step in 0..=total_steps {
            let seg = (step / per).min(segments - 1);
            let t = (step - seg * per) as f32 / per as f32;
            // Last step lands exactly on the final node
            let (seg, t) = if step == total_steps { (segments - 1, 1.0) } else { (seg, t) };

            let n0 = &self.nodes[seg];
            let n1 = &self.nodes[seg + 1];
            let (p0, p1, p2, p3) = (
                n0.position,
                n0.handle_out_point(),
                n1.handle_in_point(),
                n1.position,
            );

            let position = bezier(p0, p1, p2, p3, t);
            let tangent = bezier_tangent(p0, p1, p2, p3, t)
                .try_normalize()
                .or_else(|| (p3 - p0).try_normalize())
                .unwrap_or(Vec3::Y);

            if step > 0 {
                accumulated += (position - prev_position).length();
            }

            // Parallel transport of the frame
            let normal = project_on_plane(prev_normal, tangent, any_perpendicular(tangent));

            let mut point = CurvePoint::new(position, tangent, normal);
            point.length_position = accumulated;
            point.time_position = (seg as f32 + t) / segments as f32;
            self.samples.push(point);

            prev_position = position;
            prev_normal = normal;
        }

        self.length = accumulated;
        let inv = if accumulated > 0.0 { 1.0 / accumulated } else { 0.0 };
        for point in &mut self.samples {
            point.relative_position = point.length_position * inv;
        }
        self.reference_forward = self.samples[0].forward;
    }

    /// Sample the curve at a relative position in [0, 1]
    ///
    /// A curve with no samples returns the degenerate origin point rather
    /// than failing.
    pub fn point_at(&self, relative: f32) -> CurvePoint {
        self.point_at_length(relative.clamp(0.0, 1.0) * self.length)
    }

    /// Sample the curve at an absolute arc length
    pub fn point_at_length(&self, length: f32) -> CurvePoint {
        match self.samples.len() {
            0 => CurvePoint::default(),
            1 => self.samples[0],
            _ => {
                let length = length.clamp(0.0, self.length);
                let after = self
                    .samples
                    .partition_point(|p| p.length_position < length)
                    .clamp(1, self.samples.len() - 1);
                let a = &self.samples[after - 1];
                let b = &self.samples[after];
                let span = b.length_position - a.length_position;
                let t = if span > 0.0 { (length - a.length_position) / span } else { 0.0 };
                CurvePoint::lerp(a, b, t)
            }
        }
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_curve(height: f32) -> Curve {
        Curve::line(Vec3::ZERO, Vec3::new(0.0, height, 0.0))
    }

    #[test]
    fn test_line_length() {
        let curve = vertical_curve(10.0);
        assert!((curve.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_samples_monotonic_in_arc_length() {
        let mut curve = Curve::new();
        curve.add_node(CurveNode::with_handles(
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::new(0.0, 1.0, 1.5),
        ));
        curve.add_node(CurveNode::with_handles(
            Vec3::new(0.0, 4.0, -2.0),
            Vec3::new(0.0, -1.0, 1.0),
            Vec3::ZERO,
        ));
        curve.add_node(CurveNode::new(Vec3::new(1.0, 6.0, 0.0)));
        curve.resample();

        let samples = curve.samples();
        assert!(samples.len() > 2);
        for pair in samples.windows(2) {
            assert!(pair[1].length_position >= pair[0].length_position);
        }
        assert!((samples.last().unwrap().relative_position - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_is_only_mutation() {
        let mut curve = vertical_curve(5.0);
        let before = curve.samples().to_vec();
        curve.set_node(1, CurveNode::new(Vec3::new(0.0, 8.0, 0.0)));
        // Cache untouched until resample
        assert_eq!(curve.samples(), &before[..]);
        curve.resample();
        assert!((curve.length() - 8.0).abs() < 1e-3);
    }

    #[test]
    fn test_point_at_midpoint() {
        let curve = vertical_curve(10.0);
        let p = curve.point_at(0.5);
        assert!((p.position.y - 5.0).abs() < 1e-2);
        assert!((p.relative_position - 0.5).abs() < 1e-3);
        assert!((p.forward - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn test_point_at_clamps() {
        let curve = vertical_curve(10.0);
        let below = curve.point_at(-1.0);
        let above = curve.point_at(2.0);
        assert!((below.position.y - 0.0).abs() < 1e-4);
        assert!((above.position.y - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_curve_degrades() {
        let curve = Curve::new();
        let p = curve.point_at(0.5);
        assert_eq!(p.position, Vec3::ZERO);
        assert_eq!(p.forward, Vec3::Y);
    }

    #[test]
    fn test_single_node_degrades() {
        let mut curve = Curve::new();
        curve.add_node(CurveNode::new(Vec3::new(1.0, 2.0, 3.0)));
        curve.resample();
        assert_eq!(curve.length(), 0.0);
        let p = curve.point_at(0.7);
        assert_eq!(p.position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_frame_propagation_stays_orthonormal() {
        let mut curve = Curve::new();
        curve.add_node(CurveNode::with_handles(
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::new(0.0, 2.0, 0.0),
        ));
        curve.add_node(CurveNode::with_handles(
            Vec3::new(3.0, 5.0, 1.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::ZERO,
        ));
        curve.resample();
        for p in curve.samples() {
            assert!(p.forward.dot(p.normal).abs() < 1e-4);
            assert!((p.normal.length() - 1.0).abs() < 1e-4);
            assert!((p.bitangent - p.forward.cross(p.normal)).length() < 1e-4);
        }
    }

    #[test]
    fn test_frame_propagation_deterministic() {
        let make = || {
            let mut curve = Curve::new();
            curve.add_node(CurveNode::with_handles(Vec3::ZERO, Vec3::ZERO, Vec3::new(0.5, 1.0, 0.0)));
            curve.add_node(CurveNode::new(Vec3::new(1.0, 4.0, 2.0)));
            curve.resample();
            curve
        };
        let a = make();
        let b = make();
        for (pa, pb) in a.samples().iter().zip(b.samples()) {
            assert_eq!(pa.normal, pb.normal);
        }
    }

    #[test]
    fn test_reference_normal_seeds_frames() {
        let mut curve = vertical_curve(4.0);
        curve.reference_normal = Vec3::Z;
        curve.resample();
        assert!((curve.samples()[0].normal - Vec3::Z).length() < 1e-5);
    }
}
