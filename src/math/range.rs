//! Closed value ranges with random draws

use serde::{Deserialize, Serialize};

use crate::core::Rng;

/// Closed f32 range [min, max]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub const UNIT: Self = Self { min: 0.0, max: 1.0 };

    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Single-value range
    pub fn splat(v: f32) -> Self {
        Self { min: v, max: v }
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }

    /// Containment test widened by a tolerance on both ends
    pub fn contains_with_tolerance(&self, v: f32, epsilon: f32) -> bool {
        v >= self.min - epsilon && v <= self.max + epsilon
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }

    /// Map t in [0,1] linearly into the range
    pub fn lerp(&self, t: f32) -> f32 {
        self.min + self.span() * t
    }

    /// Inverse of `lerp`: where v sits in the range, 0 at min, 1 at max.
    /// A zero-span range maps everything to 0.
    pub fn inverse_lerp(&self, v: f32) -> f32 {
        let span = self.span();
        if span.abs() < f32::EPSILON {
            0.0
        } else {
            ((v - self.min) / span).clamp(0.0, 1.0)
        }
    }

    /// Draw a uniform sample from the range
    pub fn draw(&self, rng: &mut Rng) -> f32 {
        rng.range(self.min, self.max)
    }
}

impl Default for FloatRange {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Closed i32 range [min, max]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: i32,
    pub max: i32,
}

impl IntRange {
    pub fn new(min: i32, max: i32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn splat(v: i32) -> Self {
        Self { min: v, max: v }
    }

    /// Draw a uniform integer sample (inclusive on both ends)
    pub fn draw(&self, rng: &mut Rng) -> i32 {
        rng.range_i32(self.min, self.max)
    }
}

impl Default for IntRange {
    fn default() -> Self {
        Self { min: 0, max: 0 }
    }
}
