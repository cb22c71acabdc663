//! Scalar remap curves
//!
//! `FloatCurve` is a piecewise-linear curve over sorted keys, sampled with
//! clamped ends. It drives girth falloff along branches, step remapping in
//! the point distributor, and alignment weight interpolation.

use serde::{Deserialize, Serialize};

/// A single (time, value) key on a remap curve
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
}

impl CurveKey {
    pub fn new(time: f32, value: f32) -> Self {
        Self { time, value }
    }
}

/// Piecewise-linear remap curve over [0, 1]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatCurve {
    keys: Vec<CurveKey>,
}

impl FloatCurve {
    /// Create a curve from keys (sorted by time on construction)
    pub fn new(mut keys: Vec<CurveKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// The identity mapping: f(t) = t
    pub fn identity() -> Self {
        Self::new(vec![CurveKey::new(0.0, 0.0), CurveKey::new(1.0, 1.0)])
    }

    /// Constant mapping: f(t) = v
    pub fn constant(v: f32) -> Self {
        Self::new(vec![CurveKey::new(0.0, v), CurveKey::new(1.0, v)])
    }

    /// Smoothstep-shaped ease, approximated with linear segments
    pub fn ease_in_out() -> Self {
        Self::new(vec![
            CurveKey::new(0.0, 0.0),
            CurveKey::new(0.25, 0.104),
            CurveKey::new(0.5, 0.5),
            CurveKey::new(0.75, 0.896),
            CurveKey::new(1.0, 1.0),
        ])
    }

    pub fn keys(&self) -> &[CurveKey] {
        &self.keys
    }

    /// Sample the curve at time t, clamping outside the key span
    pub fn evaluate(&self, t: f32) -> f32 {
        if self.keys.is_empty() {
            return t;
        }
        if t <= self.keys[0].time {
            return self.keys[0].value;
        }
        let last = &self.keys[self.keys.len() - 1];
        if t >= last.time {
            return last.value;
        }

        for i in 0..self.keys.len() - 1 {
            let current = &self.keys[i];
            let next = &self.keys[i + 1];
            if t >= current.time && t <= next.time {
                let duration = next.time - current.time;
                let s = if duration > 0.0 {
                    (t - current.time) / duration
                } else {
                    0.0
                };
                return current.value + (next.value - current.value) * s;
            }
        }

        last.value
    }
}

impl Default for FloatCurve {
    fn default() -> Self {
        Self::identity()
    }
}
