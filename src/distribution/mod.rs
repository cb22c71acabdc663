//! Curve point distribution
//!
//! `CurvePointDistributor` scatters a filtered, aligned list of points along
//! a curve from a statistical configuration. It is the placement engine for
//! sprouts and structural subdivisions: a whole-curve probability gate, a
//! frequency draw, step layout from the distribution mode, jitter, masking,
//! and three ordered alignment blends.
//!
//! The algorithm is a single pass with no retained state; with a fixed rng
//! seed and identical parameters the output list is identical.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::Rng;
use crate::curve::{Curve, CurvePoint, project_on_plane};
use crate::math::{FloatCurve, FloatRange, IntRange};

/// Tolerance applied to the mask window so points sitting exactly on a
/// boundary do not flicker in and out between regenerations.
const MASK_EPSILON: f32 = 1e-4;

/// How many points share one step along the curve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionMode {
    /// One point per step
    Alternative,
    /// Two opposed points per step
    Opposite,
    /// N points per whorl
    Whorled(u32),
}

impl DistributionMode {
    pub fn points_per_step(&self) -> u32 {
        match *self {
            DistributionMode::Alternative => 1,
            DistributionMode::Opposite => 2,
            DistributionMode::Whorled(n) => n.max(1),
        }
    }
}

/// Which end of the curve steps are laid out from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionOrigin {
    FromTip,
    FromBase,
}

/// Statistical placement configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionParams {
    /// Inclusive point-count draw; non-positive draws yield no points
    pub frequency: IntRange,
    pub mode: DistributionMode,
    /// Whole-curve gate in [0, 1]; 0 always yields no points
    pub probability: f32,
    /// Positional jitter as a fraction of the step span, [0, 1]
    pub spacing_variance: f32,
    /// Roll jitter as a fraction of the intra-step angle, [0, 1]
    pub angle_variance: f32,
    /// Monotone remap of step positions in [0, 1]
    pub remap: FloatCurve,
    pub origin: DistributionOrigin,
    /// Per-step random roll accumulation (radians)
    pub twirl: FloatRange,
    /// Starting roll offset (radians)
    pub twirl_offset: f32,
    /// Window the raw positions are laid into
    pub range: FloatRange,
    /// Window surviving points must fall inside (± epsilon)
    pub mask: FloatRange,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            frequency: IntRange::default(),
            mode: DistributionMode::Alternative,
            probability: 1.0,
            spacing_variance: 0.0,
            angle_variance: 0.0,
            remap: FloatCurve::identity(),
            origin: DistributionOrigin::FromTip,
            twirl: FloatRange::splat(0.0),
            twirl_offset: 0.0,
            range: FloatRange::UNIT,
            mask: FloatRange::UNIT,
        }
    }
}

/// One alignment blend: weight drawn between a base range and a top range,
/// interpolated along the curve by a remap curve
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlignRange {
    pub base: FloatRange,
    pub top: FloatRange,
    pub remap: FloatCurve,
}

impl Default for AlignRange {
    fn default() -> Self {
        Self::fixed(0.0)
    }
}

impl AlignRange {
    pub fn fixed(weight: f32) -> Self {
        Self {
            base: FloatRange::splat(weight),
            top: FloatRange::splat(weight),
            remap: FloatCurve::identity(),
        }
    }

    /// Draw the weight for a point at normalized range position `t`
    fn draw(&self, t: f32, rng: &mut Rng) -> f32 {
        let base = self.base.draw(rng);
        let top = self.top.draw(rng);
        base + (top - base) * self.remap.evaluate(t)
    }
}

/// The three alignment blends, applied in fixed order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlignParams {
    /// Blend back toward the pre-roll frame, [0, 1]
    pub parallel: AlignRange,
    /// Blend toward (+) or away from (-) the gravity axis, [-1, 1]
    pub gravity: AlignRange,
    /// Blend the forward onto the horizontal plane, [0, 1]
    pub horizontal: AlignRange,
}

/// Signed angle from `a` to `b` around `axis`
fn signed_angle(a: Vec3, b: Vec3, axis: Vec3) -> f32 {
    a.cross(b).dot(axis).atan2(a.dot(b))
}

/// Scatters aligned points along a curve
pub struct CurvePointDistributor<'a> {
    params: &'a DistributionParams,
    align: &'a AlignParams,
    gravity: Vec3,
}

impl<'a> CurvePointDistributor<'a> {
    pub fn new(params: &'a DistributionParams, align: &'a AlignParams, gravity: Vec3) -> Self {
        Self {
            params,
            align,
            gravity: gravity.try_normalize().unwrap_or(Vec3::NEG_Y),
        }
    }

    /// Produce the filtered, aligned point list for `curve`
    pub fn distribute(&self, curve: &Curve, rng: &mut Rng) -> Vec<CurvePoint> {
        let params = self.params;

        // Whole-curve probability gate, not per-point
        if params.probability <= 0.0 {
            return Vec::new();
        }
        if rng.next_float() > params.probability {
            return Vec::new();
        }

        let frequency = params.frequency.draw(rng);
        if frequency <= 0 {
            return Vec::new();
        }
        let frequency = frequency as u32;

        let points_per_step = params.mode.points_per_step();
        let steps = frequency.div_ceil(points_per_step);
        let step_span = params.range.span() / steps as f32;
        let intra_angle = std::f32::consts::TAU / points_per_step as f32;

        // Step layout + jitter
        let mut placed: Vec<(f32, f32)> = Vec::with_capacity(frequency as usize);
        let mut accumulated_angle = params.twirl_offset;
        'steps: for step in 0..steps {
            let step_t = (step + 1) as f32 / steps as f32;
            let mut base = params.remap.evaluate(step_t);
            if params.origin == DistributionOrigin::FromBase {
                base = 1.0 - base;
            }
            let step_position = params.range.lerp(base);
            accumulated_angle += params.twirl.draw(rng);

            for k in 0..points_per_step {
                if placed.len() as u32 == frequency {
                    break 'steps;
                }
                let position_jitter =
                    rng.range(-0.5, 0.5) * params.spacing_variance * step_span;
                let angle_jitter = rng.range(-0.5, 0.5) * params.angle_variance * intra_angle;
                let position = params.range.clamp(step_position + position_jitter);
                let roll = accumulated_angle + k as f32 * intra_angle + angle_jitter;
                placed.push((position, roll));
            }
        }

        // Mask window, inclusive with tolerance
        placed.retain(|&(position, _)| {
            params.mask.contains_with_tolerance(position, MASK_EPSILON)
        });

        // Sample, roll, align
        let mut out = Vec::with_capacity(placed.len());
        for (position, roll) in placed {
            let original = curve.point_at(position);
            let mut point = original.rolled(roll);
            let range_t = params.range.inverse_lerp(position);

            // Weight draws are unconditional so the rng stream does not
            // depend on the align configuration.
            let parallel = self.align.parallel.draw(range_t, rng).clamp(0.0, 1.0);
            let gravity_w = self.align.gravity.draw(range_t, rng).clamp(-1.0, 1.0);
            let horizontal = self.align.horizontal.draw(range_t, rng).clamp(0.0, 1.0);

            // 1. Parallel: blend back toward the pre-roll frame
            if parallel > 0.0 {
                let normal = point
                    .normal
                    .lerp(original.normal, parallel)
                    .try_normalize()
                    .unwrap_or(point.normal);
                point.look_at(point.forward, normal);
            }

            // 2. Horizontal: flatten the forward onto the plane
            // perpendicular to gravity, then fold the residual twist back
            // into +/-90 degrees
            if horizontal > 0.0 {
                let flat = project_on_plane(point.forward, self.gravity, point.forward);
                let forward = point
                    .forward
                    .lerp(flat, horizontal)
                    .try_normalize()
                    .unwrap_or(point.forward);
                point.look_at(forward, point.normal);

                let flat_normal = project_on_plane(point.normal, self.gravity, point.normal);
                let mut twist = signed_angle(point.normal, flat_normal, point.forward);
                while twist > std::f32::consts::FRAC_PI_2 {
                    twist -= std::f32::consts::PI;
                }
                while twist < -std::f32::consts::FRAC_PI_2 {
                    twist += std::f32::consts::PI;
                }
                point.roll(twist * horizontal);
            }

            // 3. Gravity: pull the final forward toward or away from the
            // gravity axis
            if gravity_w != 0.0 {
                let target = if gravity_w >= 0.0 { -self.gravity } else { self.gravity };
                let arc = Quat::from_rotation_arc(point.forward, target);
                let q = Quat::IDENTITY.slerp(arc, gravity_w.abs());
                point.look_at(q * point.forward, q * point.normal);
            }

            out.push(point);
        }

        log::trace!(
            "distributed {} points (frequency {}, {} steps)",
            out.len(),
            frequency,
            steps
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn test_curve() -> Curve {
        Curve::line(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0))
    }

    fn params(frequency: i32) -> DistributionParams {
        DistributionParams {
            frequency: IntRange::splat(frequency),
            ..Default::default()
        }
    }

    #[test]
    fn test_probability_zero_is_always_empty() {
        let curve = test_curve();
        let align = AlignParams::default();
        let mut p = params(10);
        p.probability = 0.0;
        for seed in 0..50 {
            let mut rng = Rng::new(seed);
            let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
            assert!(d.distribute(&curve, &mut rng).is_empty());
        }
    }

    #[test]
    fn test_probability_one_always_produces() {
        let curve = test_curve();
        let align = AlignParams::default();
        let p = params(5);
        for seed in 0..50 {
            let mut rng = Rng::new(seed);
            let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
            assert_eq!(d.distribute(&curve, &mut rng).len(), 5);
        }
    }

    #[test]
    fn test_count_never_exceeds_frequency() {
        let curve = test_curve();
        let align = AlignParams::default();
        let mut p = params(4);
        p.mode = DistributionMode::Whorled(3);
        let mut rng = Rng::new(1);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        assert_eq!(d.distribute(&curve, &mut rng).len(), 4);
    }

    #[test]
    fn test_zero_frequency_is_empty() {
        let curve = test_curve();
        let align = AlignParams::default();
        let p = params(0);
        let mut rng = Rng::new(1);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        assert!(d.distribute(&curve, &mut rng).is_empty());
    }

    #[test]
    fn test_zero_variance_even_spacing() {
        let curve = test_curve();
        let align = AlignParams::default();
        let p = params(4);
        let mut rng = Rng::new(9);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        let points = d.distribute(&curve, &mut rng);
        let positions: Vec<f32> = points.iter().map(|p| p.relative_position).collect();
        for (i, &pos) in positions.iter().enumerate() {
            let expected = (i + 1) as f32 / 4.0;
            assert!((pos - expected).abs() < 1e-4, "expected {expected}, got {pos}");
        }
    }

    #[test]
    fn test_scenario_c_opposite_pairs() {
        // frequency (4,4), Opposite, full range/mask, probability 1, zero
        // variances: exactly 4 points at step-even positions, roll angles
        // 180 degrees apart within a step
        let curve = test_curve();
        let align = AlignParams::default();
        let mut p = params(4);
        p.mode = DistributionMode::Opposite;
        let mut rng = Rng::new(3);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        let points = d.distribute(&curve, &mut rng);

        assert_eq!(points.len(), 4);
        assert!((points[0].relative_position - 0.5).abs() < 1e-4);
        assert!((points[1].relative_position - 0.5).abs() < 1e-4);
        assert!((points[2].relative_position - 1.0).abs() < 1e-4);
        assert!((points[3].relative_position - 1.0).abs() < 1e-4);
        for pair in points.chunks(2) {
            let delta = (pair[1].roll - pair[0].roll).abs();
            assert!((delta - std::f32::consts::PI).abs() < 1e-4);
        }
    }

    #[test]
    fn test_positions_respect_range() {
        let curve = test_curve();
        let align = AlignParams::default();
        let mut p = params(16);
        p.range = FloatRange::new(0.2, 0.6);
        p.mask = FloatRange::UNIT;
        p.spacing_variance = 1.0;
        let mut rng = Rng::new(21);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        for point in d.distribute(&curve, &mut rng) {
            assert!(point.relative_position >= 0.2 - 1e-4);
            assert!(point.relative_position <= 0.6 + 1e-4);
        }
    }

    #[test]
    fn test_mask_filters_positions() {
        let curve = test_curve();
        let align = AlignParams::default();
        let mut p = params(20);
        p.mask = FloatRange::new(0.4, 0.8);
        p.spacing_variance = 0.5;
        for seed in 0..20 {
            let mut rng = Rng::new(seed);
            let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
            for point in d.distribute(&curve, &mut rng) {
                assert!(point.relative_position >= 0.4 - 1e-3);
                assert!(point.relative_position <= 0.8 + 1e-3);
            }
        }
    }

    #[test]
    fn test_from_base_flips_layout() {
        let curve = test_curve();
        let align = AlignParams::default();
        let mut p = params(2);
        p.origin = DistributionOrigin::FromBase;
        let mut rng = Rng::new(5);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        let points = d.distribute(&curve, &mut rng);
        assert_eq!(points.len(), 2);
        assert!((points[0].relative_position - 0.5).abs() < 1e-4);
        assert!(points[1].relative_position < 1e-4);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let curve = test_curve();
        let align = AlignParams {
            parallel: AlignRange::fixed(0.3),
            gravity: AlignRange {
                base: FloatRange::new(-0.5, 0.5),
                top: FloatRange::new(0.0, 1.0),
                remap: FloatCurve::identity(),
            },
            horizontal: AlignRange::fixed(0.2),
        };
        let mut p = params(8);
        p.spacing_variance = 0.6;
        p.angle_variance = 0.4;
        p.twirl = FloatRange::new(-1.0, 1.0);

        let run = || {
            let mut rng = Rng::new(1234);
            let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
            d.distribute(&curve, &mut rng)
        };
        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.iter().zip(&b) {
            assert_eq!(pa.position, pb.position);
            assert_eq!(pa.normal, pb.normal);
            assert_eq!(pa.roll, pb.roll);
        }
    }

    #[test]
    fn test_gravity_align_pulls_forward_up() {
        // Horizontal curve so the unaligned forward is perpendicular to up
        let curve = Curve::line(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
        let align = AlignParams {
            gravity: AlignRange::fixed(1.0),
            ..Default::default()
        };
        let p = params(3);
        let mut rng = Rng::new(2);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        for point in d.distribute(&curve, &mut rng) {
            assert!((point.forward - Vec3::Y).length() < 1e-3);
        }
    }

    #[test]
    fn test_horizontal_align_flattens_forward() {
        // Tilted curve so the forward has both vertical and horizontal parts
        let curve = Curve::line(Vec3::ZERO, Vec3::new(5.0, 5.0, 0.0));
        let align = AlignParams {
            horizontal: AlignRange::fixed(1.0),
            ..Default::default()
        };
        let p = params(3);
        let mut rng = Rng::new(2);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        for point in d.distribute(&curve, &mut rng) {
            assert!(point.forward.y.abs() < 1e-3);
        }
    }

    #[test]
    fn test_parallel_align_restores_pre_roll_frame() {
        let curve = test_curve();
        let align = AlignParams {
            parallel: AlignRange::fixed(1.0),
            ..Default::default()
        };
        let mut p = params(3);
        p.twirl_offset = 1.0;
        let mut rng = Rng::new(2);
        let d = CurvePointDistributor::new(&p, &align, Vec3::NEG_Y);
        for point in d.distribute(&curve, &mut rng) {
            let original = curve.point_at(point.relative_position);
            assert!((point.normal - original.normal).length() < 1e-3);
        }
    }
}
