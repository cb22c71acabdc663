//! Wind channel encoding
//!
//! A post-process pass that stamps wind-animation metadata into the spare
//! vertex channels. Each unit (one branch group, one sprout cluster) maps
//! to a disjoint contiguous vertex range; every write is a pure function of
//! the vertex position and the unit metadata, so units and vertices have no
//! ordering dependency and the pass runs fully data-parallel.

use std::time::Instant;

use glam::{Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::core::{Error, Result};
use crate::transform::buffer::VertexBuffer;

/// Per-unit wind metadata
#[derive(Clone, Copy, Debug)]
pub struct WindUnit {
    /// Sway origin the distance falloff is measured from
    pub origin: Vec3,
    /// Two swing-phase scalars copied into the second channel
    pub swing_phase: Vec2,
    /// Combined phase id shared by every vertex of the unit
    pub phase: f32,
}

/// Stamps wind channels over disjoint vertex ranges
pub struct WindEncodingPass {
    /// Distance-to-sway gain applied to channel 0
    pub amplitude: f32,
    units: Vec<(WindUnit, usize, usize)>,
}

impl WindEncodingPass {
    pub fn new(amplitude: f32) -> Self {
        Self {
            amplitude,
            units: Vec::new(),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    /// Map a unit onto `start..start + length`
    pub fn add_unit(&mut self, unit: WindUnit, start: usize, length: usize) {
        self.units.push((unit, start, length));
    }

    /// Encode all units in parallel
    ///
    /// Channel 0: horizontal distance from the unit origin times the pass
    /// amplitude, plus the phase id. Channel 1: channel 0's first two
    /// components plus the two swing phases. Channel 2: the raw vertex
    /// position plus its z-distance from the origin. Misuse (out-of-bounds
    /// or overlapping ranges) fails fast.
    pub fn execute(&self, buffer: &mut VertexBuffer) -> Result<()> {
        buffer.validate()?;
        let len = buffer.len();
        for &(_, start, length) in &self.units {
            if start + length > len {
                return Err(Error::Batch(format!(
                    "wind unit {}..{} exceeds buffer length {}",
                    start,
                    start + length,
                    len
                )));
            }
        }

        let mut order: Vec<usize> = (0..self.units.len())
            .filter(|&i| self.units[i].2 > 0)
            .collect();
        order.sort_by_key(|&i| self.units[i].1);
        for pair in order.windows(2) {
            let (_, a_start, a_len) = self.units[pair[0]];
            let (_, b_start, _) = self.units[pair[1]];
            if a_start + a_len > b_start {
                return Err(Error::Batch(format!(
                    "wind units overlap at vertex {}",
                    b_start
                )));
            }
        }

        buffer.enable_wind();
        let start_time = Instant::now();

        let positions = &buffer.positions;
        let Some(wind) = buffer.wind.as_mut() else {
            return Ok(());
        };
        let [w0, w1, w2] = wind;

        let jobs: Vec<(WindUnit, &[Vec3], &mut [Vec4], &mut [Vec4], &mut [Vec4])> = {
            let mut jobs = Vec::with_capacity(order.len());
            let mut rest0 = w0.as_mut_slice();
            let mut rest1 = w1.as_mut_slice();
            let mut rest2 = w2.as_mut_slice();
            let mut cursor = 0usize;
            for &i in &order {
                let (unit, start, length) = self.units[i];
                let (_, tail0) = rest0.split_at_mut(start - cursor);
                let (view0, tail0) = tail0.split_at_mut(length);
                let (_, tail1) = rest1.split_at_mut(start - cursor);
                let (view1, tail1) = tail1.split_at_mut(length);
                let (_, tail2) = rest2.split_at_mut(start - cursor);
                let (view2, tail2) = tail2.split_at_mut(length);
                jobs.push((unit, &positions[start..start + length], view0, view1, view2));
                rest0 = tail0;
                rest1 = tail1;
                rest2 = tail2;
                cursor = start + length;
            }
            jobs
        };

        let amplitude = self.amplitude;
        jobs.into_par_iter().for_each(|(unit, positions, w0, w1, w2)| {
            for i in 0..positions.len() {
                let p = positions[i];
                let planar = Vec2::new(p.x - unit.origin.x, p.z - unit.origin.z);
                let sway = planar.length() * amplitude;
                w0[i] = Vec4::new(sway, unit.phase, 0.0, 0.0);
                w1[i] = Vec4::new(sway, unit.phase, unit.swing_phase.x, unit.swing_phase.y);
                w2[i] = Vec4::new(p.x, p.y, p.z, p.z - unit.origin.z);
            }
        });

        log::debug!(
            "encoded wind for {} vertices in {} units in {:.2}ms",
            len,
            order.len(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }
}
