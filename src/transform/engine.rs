//! Batched vertex transform engine
//!
//! Batches are registered against disjoint vertex ranges and executed as
//! independent data-parallel kernels. Within a batch the step order is a
//! strict invariant: pivot, early offset, scale, rotation, bend, late
//! offset, flip, id stamp. Between batches there is no ordering at all;
//! the only shared state during `execute` is the gravity axis and the bend
//! mode, both read-only.
//!
//! Steps whose parameters are inert (unit scale, identity rotation, zero
//! offset/pivot) are skipped through flags computed once at registration,
//! never through per-vertex float comparison.

use std::time::Instant;

use glam::{Quat, Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::core::{Error, Result};
use crate::transform::buffer::VertexBuffer;

/// Forward bend weights below this threshold clamp to zero
const BEND_WEIGHT_THRESHOLD: f32 = 0.35;
/// Span the surviving weight range remaps into
const BEND_WEIGHT_SPAN: f32 = 0.65;
/// Radius gain applied before the forward curl in Add mode. Hand-tuned for
/// visual parity; treat as a fixed constant, not a derived value.
const BEND_RADIUS_GAIN: f32 = 1.35;

/// How the side and forward bend rotations combine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BendMode {
    /// Side rotation first, then the forward curl on a radius-compensated
    /// vertex; reads as bending a flexible rod outward then curling it
    #[default]
    Add,
    /// Side and forward rotations composed, applied once
    Multiply,
    /// Rotations slerp-blended by the weight ratio, applied once
    Stylized,
}

/// When the batch offset is added relative to the other steps
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OffsetPhase {
    /// Right after the pivot subtraction
    Early,
    /// After bending
    #[default]
    Late,
}

/// Handle to a registered batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchHandle(pub(crate) usize);

/// Per-batch transform descriptor with skip flags baked at registration
#[derive(Clone, Debug)]
pub(crate) struct TransformBatch {
    pub(crate) start: usize,
    pub(crate) length: usize,
    pub(crate) pivot: Vec3,
    pub(crate) offset: Vec3,
    pub(crate) scale: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) flip: bool,
    pub(crate) forward_bend: f32,
    pub(crate) side_bend: f32,
    pub(crate) group_id: f32,
    pub(crate) subgroup_id: f32,
    pub(crate) apply_pivot: bool,
    pub(crate) apply_offset: bool,
    pub(crate) apply_scale: bool,
    pub(crate) apply_rotation: bool,
    pub(crate) apply_bend: bool,
    pub(crate) stamp_ids: bool,
}

/// One batch's mutable slice views for the kernel
struct BatchJob<'a> {
    batch: &'a TransformBatch,
    positions: &'a mut [Vec3],
    normals: &'a mut [Vec3],
    tangents: Option<&'a mut [Vec4]>,
    aux: Vec<&'a mut [Vec3]>,
    weights: Option<&'a [Vec2]>,
    ids: Option<&'a mut [Vec2]>,
}

/// Split `data` into disjoint mutable views for sorted, non-overlapping
/// ranges
fn carve<'a, T>(mut data: &'a mut [T], ranges: &[(usize, usize)]) -> Vec<&'a mut [T]> {
    let mut views = Vec::with_capacity(ranges.len());
    let mut cursor = 0usize;
    for &(start, length) in ranges {
        let (_, rest) = data.split_at_mut(start - cursor);
        let (view, rest) = rest.split_at_mut(length);
        views.push(view);
        data = rest;
        cursor = start + length;
    }
    views
}

fn remap_bend_weight(weight: f32) -> f32 {
    ((weight - BEND_WEIGHT_THRESHOLD) / (1.0 - BEND_WEIGHT_THRESHOLD)).max(0.0) * BEND_WEIGHT_SPAN
}

/// Batched vertex transformer
pub struct VertexTransformEngine {
    batches: Vec<TransformBatch>,
    gravity: Vec3,
    pub bend_mode: BendMode,
    pub offset_phase: OffsetPhase,
}

impl VertexTransformEngine {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            batches: Vec::new(),
            gravity: gravity.try_normalize().unwrap_or(Vec3::NEG_Y),
            bend_mode: BendMode::default(),
            offset_phase: OffsetPhase::default(),
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Drop all registered batches
    pub fn clear(&mut self) {
        self.batches.clear();
    }

    /// Register a batch over `start..start + length`
    ///
    /// Skip flags for inert parameters are computed here, once.
    #[allow(clippy::too_many_arguments)]
    pub fn add_batch(
        &mut self,
        start: usize,
        length: usize,
        pivot: Vec3,
        offset: Vec3,
        scale: Vec3,
        rotation: Quat,
        flip: bool,
    ) -> BatchHandle {
        let handle = BatchHandle(self.batches.len());
        self.batches.push(TransformBatch {
            start,
            length,
            pivot,
            offset,
            scale,
            rotation,
            flip,
            forward_bend: 0.0,
            side_bend: 0.0,
            group_id: 0.0,
            subgroup_id: 0.0,
            apply_pivot: pivot != Vec3::ZERO,
            apply_offset: offset != Vec3::ZERO,
            apply_scale: scale != Vec3::ONE,
            apply_rotation: rotation != Quat::IDENTITY,
            apply_bend: false,
            stamp_ids: false,
        });
        handle
    }

    /// Set the forward/side bend parameters of a batch
    pub fn set_bend(&mut self, handle: BatchHandle, forward: f32, side: f32) {
        let batch = &mut self.batches[handle.0];
        batch.forward_bend = forward;
        batch.side_bend = side;
        batch.apply_bend = forward != 0.0 || side != 0.0;
    }

    /// Set the group/subgroup id a batch stamps into the id channel
    pub fn set_id(&mut self, handle: BatchHandle, group: f32, subgroup: f32) {
        let batch = &mut self.batches[handle.0];
        batch.group_id = group;
        batch.subgroup_id = subgroup;
        batch.stamp_ids = true;
    }

    /// Run every batch as an independent parallel kernel
    ///
    /// Blocks until all batches complete; per-batch views are borrowed for
    /// the duration of this call only. Misuse (range out of bounds,
    /// overlapping batches, misaligned channels) fails fast with an error.
    pub fn execute(&self, buffer: &mut VertexBuffer) -> Result<()> {
        buffer.validate()?;
        let len = buffer.len();

        for batch in &self.batches {
            let end = batch.start + batch.length;
            if end > len {
                return Err(Error::Batch(format!(
                    "batch {}..{} exceeds buffer length {}",
                    batch.start, end, len
                )));
            }
        }

        // Zero-length batches are no-ops and excluded from carving
        let mut order: Vec<usize> = (0..self.batches.len())
            .filter(|&i| self.batches[i].length > 0)
            .collect();
        order.sort_by_key(|&i| self.batches[i].start);
        for pair in order.windows(2) {
            let a = &self.batches[pair[0]];
            let b = &self.batches[pair[1]];
            if a.start + a.length > b.start {
                return Err(Error::Batch(format!(
                    "batches overlap at vertex {}",
                    b.start
                )));
            }
        }

        if self.batches.iter().any(|b| b.stamp_ids) {
            buffer.enable_ids();
        }

        let start_time = Instant::now();
        let ranges: Vec<(usize, usize)> = order
            .iter()
            .map(|&i| (self.batches[i].start, self.batches[i].length))
            .collect();

        let position_views = carve(&mut buffer.positions, &ranges);
        let normal_views = carve(&mut buffer.normals, &ranges);

        let tangent_views: Vec<Option<&mut [Vec4]>> = match buffer.tangents.as_deref_mut() {
            Some(tangents) => carve(tangents, &ranges).into_iter().map(Some).collect(),
            None => ranges.iter().map(|_| None).collect(),
        };
        let mut aux_views: Vec<Vec<&mut [Vec3]>> = ranges.iter().map(|_| Vec::new()).collect();
        for channel in &mut buffer.aux {
            for (b, view) in carve(channel.as_mut_slice(), &ranges).into_iter().enumerate() {
                aux_views[b].push(view);
            }
        }
        let weight_views: Vec<Option<&[Vec2]>> = match buffer.weights.as_deref() {
            Some(weights) => ranges.iter().map(|&(s, l)| Some(&weights[s..s + l])).collect(),
            None => ranges.iter().map(|_| None).collect(),
        };
        let id_views: Vec<Option<&mut [Vec2]>> = match buffer.ids.as_deref_mut() {
            Some(ids) => carve(ids, &ranges).into_iter().map(Some).collect(),
            None => ranges.iter().map(|_| None).collect(),
        };

        let jobs: Vec<BatchJob> = order
            .iter()
            .zip(position_views)
            .zip(normal_views)
            .zip(tangent_views)
            .zip(aux_views)
            .zip(weight_views)
            .zip(id_views)
            .map(|((((((&index, positions), normals), tangents), aux), weights), ids)| BatchJob {
                batch: &self.batches[index],
                positions,
                normals,
                tangents,
                aux,
                weights,
                ids,
            })
            .collect();

        let gravity = self.gravity;
        let bend_mode = self.bend_mode;
        let offset_phase = self.offset_phase;
        let job_count = jobs.len();

        jobs.into_par_iter()
            .for_each(|mut job| run_batch(&mut job, gravity, bend_mode, offset_phase));

        log::debug!(
            "transformed {} vertices in {} batches in {:.2}ms",
            len,
            job_count,
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }
}

/// Gravity factor for a batch: 0 when the batch's local up is parallel to
/// gravity, easing out to 1 at perpendicular and beyond
fn gravity_factor(gravity: Vec3, rotation: Quat) -> f32 {
    let up = (rotation * -gravity).try_normalize().unwrap_or(Vec3::Y);
    let angle = gravity.angle_between(up).to_degrees();
    let t = (angle / 90.0).clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

fn run_batch(job: &mut BatchJob, gravity: Vec3, bend_mode: BendMode, offset_phase: OffsetPhase) {
    let batch = job.batch;

    let bend_active = batch.apply_bend;
    let (bend_gravity_factor, forward_dir, side_dir, up_dir) = if bend_active {
        let rotation = if batch.apply_rotation { batch.rotation } else { Quat::IDENTITY };
        (
            gravity_factor(gravity, rotation),
            (rotation * Vec3::Z).normalize(),
            (rotation * Vec3::X).normalize(),
            (rotation * Vec3::Y).normalize(),
        )
    } else {
        (0.0, Vec3::Z, Vec3::X, Vec3::Y)
    };

    for i in 0..job.positions.len() {
        let mut position = job.positions[i];
        // Net rotation applied to directional data for this vertex
        let mut direction_rotation = Quat::IDENTITY;
        let mut rotated = false;

        // 1. Pivot
        if batch.apply_pivot {
            position -= batch.pivot;
        }
        // 2. Early offset
        if offset_phase == OffsetPhase::Early && batch.apply_offset {
            position += batch.offset;
        }
        // 3. Scale
        if batch.apply_scale {
            position *= batch.scale;
        }
        // 4. Rotation
        if batch.apply_rotation {
            position = batch.rotation * position;
            direction_rotation = batch.rotation;
            rotated = true;
        }
        // 5. Bend
        if bend_active {
            let weight = job.weights.map(|w| w[i]).unwrap_or(Vec2::ONE);
            let forward_strength =
                remap_bend_weight(weight.x) * batch.forward_bend * bend_gravity_factor;
            let side_strength = weight.y * batch.side_bend * bend_gravity_factor;

            // Sign flips with the side of the bend plane the vertex sits on
            let sign_f = if position.dot(forward_dir) >= 0.0 { 1.0 } else { -1.0 };
            let sign_s = if position.dot(side_dir) >= 0.0 { 1.0 } else { -1.0 };
            let forward_strength = (forward_strength * sign_f).clamp(-1.0, 1.0);
            let side_strength = (side_strength * sign_s).clamp(-1.0, 1.0);

            let forward_rot =
                Quat::from_axis_angle(side_dir, forward_strength * std::f32::consts::FRAC_PI_2);
            let side_rot =
                Quat::from_axis_angle(forward_dir, -side_strength * std::f32::consts::FRAC_PI_2);

            let bend_rot = match bend_mode {
                BendMode::Add => {
                    position = side_rot * position;
                    // Push the vertex radially outward before the curl
                    let up_component = up_dir * position.dot(up_dir);
                    let radial = position - up_component;
                    let gain = 1.0 + (BEND_RADIUS_GAIN - 1.0) * forward_strength.abs();
                    position = up_component + radial * gain;
                    position = forward_rot * position;
                    forward_rot * side_rot
                }
                BendMode::Multiply => {
                    let combined = side_rot * forward_rot;
                    position = combined * position;
                    combined
                }
                BendMode::Stylized => {
                    let blend = side_strength
                        .abs()
                        .atan2(forward_strength.abs())
                        / std::f32::consts::FRAC_PI_2;
                    let combined = forward_rot.slerp(side_rot, blend);
                    position = combined * position;
                    combined
                }
            };
            direction_rotation = bend_rot * direction_rotation;
            rotated = true;
        }
        // 6. Late offset
        if offset_phase == OffsetPhase::Late && batch.apply_offset {
            position += batch.offset;
        }
        job.positions[i] = position;

        // 7. Rotate directional data, then flip (normals/tangents only)
        if rotated {
            job.normals[i] = direction_rotation * job.normals[i];
            for channel in job.aux.iter_mut() {
                channel[i] = direction_rotation * channel[i];
            }
            if let Some(tangents) = job.tangents.as_deref_mut() {
                let t = tangents[i];
                let xyz = direction_rotation * Vec3::new(t.x, t.y, t.z);
                tangents[i] = Vec4::new(xyz.x, xyz.y, xyz.z, t.w);
            }
        }
        if batch.flip {
            job.normals[i] = -job.normals[i];
            if let Some(tangents) = job.tangents.as_deref_mut() {
                let t = tangents[i];
                tangents[i] = Vec4::new(-t.x, -t.y, -t.z, t.w);
            }
        }

        // 8. Id stamp
        if batch.stamp_ids {
            if let Some(ids) = job.ids.as_deref_mut() {
                ids[i] = Vec2::new(batch.group_id, batch.subgroup_id);
            }
        }
    }
}
