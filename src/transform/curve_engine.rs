//! Curve-synchronized transforms
//!
//! `CurveTransformEngine` extends the vertex engine so a branch's
//! authoritative curve rides through the exact same batch kernel as its
//! mesh. Registering a branch appends, after the mesh vertices: one
//! reference pseudo-vertex (reference normal/forward and fixed normal in
//! the aux channels), then every control node with both absolute handle
//! points, then every cached sample, as one contiguous batch. After
//! `execute` the transformed values are written back onto the curve, so
//! mesh and curve can never drift apart through separate transform calls.

use glam::{Quat, Vec3};

use crate::core::{Error, Result};
use crate::curve::CurveNode;
use crate::transform::buffer::VertexBuffer;
use crate::transform::engine::{BatchHandle, VertexTransformEngine};
use crate::tree::{BranchCurveModel, BranchId};

/// Where one branch's curve data landed in the buffer
struct CurveRegistration {
    branch: BranchId,
    extra_start: usize,
    node_count: usize,
    sample_count: usize,
}

/// Vertex transform engine that keeps branch curves in sync with the mesh
pub struct CurveTransformEngine {
    engine: VertexTransformEngine,
    registrations: Vec<CurveRegistration>,
}

impl CurveTransformEngine {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            engine: VertexTransformEngine::new(gravity),
            registrations: Vec::new(),
        }
    }

    pub fn engine(&self) -> &VertexTransformEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut VertexTransformEngine {
        &mut self.engine
    }

    /// Forward a plain mesh batch with no curve attached
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
        self.engine.add_batch(start, length, pivot, offset, scale, rotation, flip)
    }

    pub fn set_bend(&mut self, handle: BatchHandle, forward: f32, side: f32) {
        self.engine.set_bend(handle, forward, side);
    }

    pub fn set_id(&mut self, handle: BatchHandle, group: f32, subgroup: f32) {
        self.engine.set_id(handle, group, subgroup);
    }

    pub fn clear(&mut self) {
        self.engine.clear();
        self.registrations.clear();
    }

    /// Register a branch's mesh range plus its curve as one batch
    ///
    /// The branch's mesh vertices must be the current buffer tail, starting
    /// at `mesh_start`; the curve data is appended directly behind them so
    /// the whole batch is contiguous. Callers must not transform this
    /// branch's mesh or curve through any other call.
    #[allow(clippy::too_many_arguments)]
    pub fn add_branch_batch(
        &mut self,
        buffer: &mut VertexBuffer,
        model: &BranchCurveModel,
        branch: BranchId,
        mesh_start: usize,
        pivot: Vec3,
        offset: Vec3,
        scale: Vec3,
        rotation: Quat,
        flip: bool,
    ) -> Result<BatchHandle> {
        if mesh_start > buffer.len() {
            return Err(Error::CurveSync(format!(
                "mesh start {} is past the buffer end {}",
                mesh_start,
                buffer.len()
            )));
        }
        buffer.ensure_aux_channels(2);

        let b = model.branch(branch);
        let origin = b.origin();
        let curve = &b.curve;
        let extra_start = buffer.len();

        // Reference pseudo-vertex: frame seeds ride in normal + aux slots
        let index = buffer.push(origin, curve.reference_normal);
        if let Some(aux0) = buffer.aux_channel_mut(0) {
            aux0[index] = curve.reference_forward;
        }
        if let Some(aux1) = buffer.aux_channel_mut(1) {
            aux1[index] = curve.fixed_normal;
        }

        // Control nodes: position plus both absolute handle points
        for node in curve.nodes() {
            buffer.push(origin + node.position, Vec3::Y);
            buffer.push(origin + node.handle_in_point(), Vec3::Y);
            buffer.push(origin + node.handle_out_point(), Vec3::Y);
        }

        // Cached samples: position, frame normal, forward in aux 0
        for sample in curve.samples() {
            let index = buffer.push(origin + sample.position, sample.normal);
            if let Some(aux0) = buffer.aux_channel_mut(0) {
                aux0[index] = sample.forward;
            }
        }

        let handle = self.engine.add_batch(
            mesh_start,
            buffer.len() - mesh_start,
            pivot,
            offset,
            scale,
            rotation,
            flip,
        );
        self.registrations.push(CurveRegistration {
            branch,
            extra_start,
            node_count: curve.node_count(),
            sample_count: curve.sample_count(),
        });
        Ok(handle)
    }

    /// Execute all batches, then write transformed curve data back onto the
    /// registered branches
    pub fn execute(&self, buffer: &mut VertexBuffer, model: &mut BranchCurveModel) -> Result<()> {
        self.engine.execute(buffer)?;

        for reg in &self.registrations {
            let needed = 1 + reg.node_count * 3 + reg.sample_count;
            if reg.extra_start + needed > buffer.len() {
                return Err(Error::CurveSync(format!(
                    "curve data for branch {:?} is missing from the buffer",
                    reg.branch
                )));
            }
            let branch = model.branch_mut(reg.branch);
            if branch.curve.node_count() != reg.node_count
                || branch.curve.sample_count() != reg.sample_count
            {
                return Err(Error::CurveSync(format!(
                    "curve of branch {:?} changed between registration and execute",
                    reg.branch
                )));
            }

            let new_origin = buffer.positions[reg.extra_start];
            branch.origin = new_origin;

            let curve = &mut branch.curve;
            if let Some(n) = buffer.normals[reg.extra_start].try_normalize() {
                curve.reference_normal = n;
            }
            if let Some(aux0) = buffer.aux_channel(0) {
                if let Some(f) = aux0[reg.extra_start].try_normalize() {
                    curve.reference_forward = f;
                }
            }
            if let Some(aux1) = buffer.aux_channel(1) {
                if let Some(f) = aux1[reg.extra_start].try_normalize() {
                    curve.fixed_normal = f;
                }
            }

            for n in 0..reg.node_count {
                let base = reg.extra_start + 1 + n * 3;
                let position = buffer.positions[base];
                let mut node = CurveNode::with_handles(
                    position - new_origin,
                    buffer.positions[base + 1] - position,
                    buffer.positions[base + 2] - position,
                );
                node.up = curve.nodes()[n].up;
                curve.set_node(n, node);
            }

            let sample_base = reg.extra_start + 1 + reg.node_count * 3;
            let aux_forward: Vec<Vec3> = buffer
                .aux_channel(0)
                .map(|aux0| aux0[sample_base..sample_base + reg.sample_count].to_vec())
                .unwrap_or_default();
            for (k, sample) in curve.samples_mut().iter_mut().enumerate() {
                let index = sample_base + k;
                sample.position = buffer.positions[index] - new_origin;
                if let Some(n) = buffer.normals[index].try_normalize() {
                    sample.normal = n;
                }
                if let Some(f) = aux_forward.get(k).and_then(|f| f.try_normalize()) {
                    sample.forward = f;
                }
                sample.bitangent = sample.forward.cross(sample.normal);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use crate::tree::Branch;

    fn trunk_model() -> (BranchCurveModel, BranchId) {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(
            Branch::new(Curve::line(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0)))
                .with_girth(0.05, 0.25),
        );
        model.rebuild(1);
        (model, trunk)
    }

    #[test]
    fn test_rigid_transform_keeps_curve_and_mesh_in_sync() {
        let (mut model, trunk) = trunk_model();
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let offset = Vec3::new(3.0, 1.0, -2.0);

        // Record pre-transform world samples
        let checks: Vec<(f32, Vec3, Vec3)> = [0.0, 0.25, 0.5, 0.75, 1.0]
            .iter()
            .map(|&t| {
                let p = model.point_at_position(trunk, t);
                (t, p.position, p.normal)
            })
            .collect();

        // Mesh: a few surface points for the same branch
        let mut buffer = VertexBuffer::new();
        for &(t, _, _) in &checks {
            let p = model.point_at_position(trunk, t);
            buffer.push(p.position + p.normal * p.girth, p.normal);
        }
        let mesh0_before = buffer.positions[0];

        let mut engine = CurveTransformEngine::new(Vec3::NEG_Y);
        engine
            .add_branch_batch(
                &mut buffer, &model, trunk, 0, Vec3::ZERO, offset, Vec3::ONE, rotation, false,
            )
            .unwrap();
        engine.execute(&mut buffer, &mut model).unwrap();

        // Mesh vertex transformed
        let expected_mesh = rotation * mesh0_before + offset;
        assert!((buffer.positions[0] - expected_mesh).length() < 1e-4);

        // Re-sampling the curve gives the same rigid transform of the old
        // samples
        for (t, old_position, old_normal) in checks {
            let new_point = model.point_at_position(trunk, t);
            let expected = rotation * old_position + offset;
            assert!(
                (new_point.position - expected).length() < 1e-3,
                "at {t}: {:?} != {:?}",
                new_point.position,
                expected
            );
            let expected_normal = rotation * old_normal;
            assert!((new_point.normal - expected_normal).length() < 1e-3);
        }
    }

    #[test]
    fn test_pure_offset_preserves_curve_length() {
        let (mut model, trunk) = trunk_model();
        let length_before = model.branch(trunk).curve.length();

        let mut buffer = VertexBuffer::new();
        let mut engine = CurveTransformEngine::new(Vec3::NEG_Y);
        engine
            .add_branch_batch(
                &mut buffer,
                &model,
                trunk,
                0,
                Vec3::ZERO,
                Vec3::new(5.0, 0.0, 0.0),
                Vec3::ONE,
                Quat::IDENTITY,
                false,
            )
            .unwrap();
        engine.execute(&mut buffer, &mut model).unwrap();

        // Node-space geometry is unchanged by a rigid offset
        let curve = &model.branch(trunk).curve;
        assert!((curve.length() - length_before).abs() < 1e-4);
        assert!((model.branch(trunk).origin() - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-5);
        // Local sample coordinates did not move
        assert!((curve.samples()[0].position - Vec3::ZERO).length() < 1e-5);
    }

    #[test]
    fn test_frame_seeds_rotate_with_batch() {
        let (mut model, trunk) = trunk_model();
        let reference_before = model.branch(trunk).curve.reference_normal;
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);

        let mut buffer = VertexBuffer::new();
        let mut engine = CurveTransformEngine::new(Vec3::NEG_Y);
        engine
            .add_branch_batch(
                &mut buffer, &model, trunk, 0, Vec3::ZERO, Vec3::ZERO, Vec3::ONE, rotation, false,
            )
            .unwrap();
        engine.execute(&mut buffer, &mut model).unwrap();

        let expected = rotation * reference_before;
        assert!((model.branch(trunk).curve.reference_normal - expected).length() < 1e-4);
    }

    #[test]
    fn test_mesh_start_past_end_fails() {
        let (model, trunk) = trunk_model();
        let mut buffer = VertexBuffer::new();
        let mut engine = CurveTransformEngine::new(Vec3::NEG_Y);
        let result = engine.add_branch_batch(
            &mut buffer, &model, trunk, 5, Vec3::ZERO, Vec3::ZERO, Vec3::ONE, Quat::IDENTITY, false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resample_between_register_and_execute_fails() {
        let (mut model, trunk) = trunk_model();
        let mut buffer = VertexBuffer::new();
        let mut engine = CurveTransformEngine::new(Vec3::NEG_Y);
        engine
            .add_branch_batch(
                &mut buffer, &model, trunk, 0, Vec3::ZERO, Vec3::ZERO, Vec3::ONE, Quat::IDENTITY,
                false,
            )
            .unwrap();
        model.branch_mut(trunk).curve.set_samples_per_segment(3);
        model.branch_mut(trunk).curve.resample();
        assert!(engine.execute(&mut buffer, &mut model).is_err());
    }
}
