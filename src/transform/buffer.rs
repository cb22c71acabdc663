//! Flat vertex buffers
//!
//! `VertexBuffer` is a structure-of-arrays buffer keyed by vertex index.
//! Positions and normals are always present; tangents, auxiliary vector
//! channels, bend weights, group ids, and wind channels are enabled on
//! demand and stay length-aligned with the positions. `pack` produces a
//! Pod record stream for handoff to an external renderer.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::core::{Error, Result};

/// Auxiliary vector channels rotated together with the mesh
pub const MAX_AUX_CHANNELS: usize = 4;

/// Interleaved per-vertex record for renderer handoff
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    /// Group / subgroup id stamped by the transform engine
    pub ids: [f32; 2],
    pub wind0: [f32; 4],
    pub wind1: [f32; 4],
    pub wind2: [f32; 4],
}

/// Structure-of-arrays vertex data
#[derive(Clone, Debug, Default)]
pub struct VertexBuffer {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub(crate) tangents: Option<Vec<Vec4>>,
    pub(crate) aux: Vec<Vec<Vec3>>,
    pub(crate) weights: Option<Vec<Vec2>>,
    pub(crate) ids: Option<Vec<Vec2>>,
    pub(crate) wind: Option<[Vec<Vec4>; 3]>,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            normals: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Append a vertex, padding every enabled channel with its default
    pub fn push(&mut self, position: Vec3, normal: Vec3) -> usize {
        let index = self.positions.len();
        self.positions.push(position);
        self.normals.push(normal);
        if let Some(tangents) = &mut self.tangents {
            tangents.push(Vec4::new(1.0, 0.0, 0.0, 1.0));
        }
        for channel in &mut self.aux {
            channel.push(Vec3::ZERO);
        }
        if let Some(weights) = &mut self.weights {
            weights.push(Vec2::ONE);
        }
        if let Some(ids) = &mut self.ids {
            ids.push(Vec2::ZERO);
        }
        if let Some(wind) = &mut self.wind {
            for channel in wind {
                channel.push(Vec4::ZERO);
            }
        }
        index
    }

    pub fn enable_tangents(&mut self) {
        if self.tangents.is_none() {
            self.tangents = Some(vec![Vec4::new(1.0, 0.0, 0.0, 1.0); self.len()]);
        }
    }

    /// Add an auxiliary vector channel, returning its index
    ///
    /// Panics past `MAX_AUX_CHANNELS`; the channel count is a fixed layout
    /// decision, not data-dependent.
    pub fn add_aux_channel(&mut self) -> usize {
        assert!(self.aux.len() < MAX_AUX_CHANNELS, "aux channel limit reached");
        self.aux.push(vec![Vec3::ZERO; self.len()]);
        self.aux.len() - 1
    }

    /// Make sure at least `count` aux channels exist
    pub fn ensure_aux_channels(&mut self, count: usize) {
        while self.aux.len() < count.min(MAX_AUX_CHANNELS) {
            self.add_aux_channel();
        }
    }

    pub fn aux_count(&self) -> usize {
        self.aux.len()
    }

    pub fn aux_channel(&self, channel: usize) -> Option<&[Vec3]> {
        self.aux.get(channel).map(|c| c.as_slice())
    }

    pub fn aux_channel_mut(&mut self, channel: usize) -> Option<&mut [Vec3]> {
        self.aux.get_mut(channel).map(|c| c.as_mut_slice())
    }

    pub fn enable_weights(&mut self) {
        if self.weights.is_none() {
            self.weights = Some(vec![Vec2::ONE; self.len()]);
        }
    }

    /// Set the (forward, side) bend weights of a vertex
    pub fn set_weight(&mut self, index: usize, weight: Vec2) {
        self.enable_weights();
        if let Some(weights) = &mut self.weights {
            if index < weights.len() {
                weights[index] = weight;
            }
        }
    }

    pub fn weights(&self) -> Option<&[Vec2]> {
        self.weights.as_deref()
    }

    pub(crate) fn enable_ids(&mut self) {
        if self.ids.is_none() {
            self.ids = Some(vec![Vec2::ZERO; self.len()]);
        }
    }

    pub fn ids(&self) -> Option<&[Vec2]> {
        self.ids.as_deref()
    }

    pub(crate) fn enable_wind(&mut self) {
        if self.wind.is_none() {
            let n = self.len();
            self.wind = Some([vec![Vec4::ZERO; n], vec![Vec4::ZERO; n], vec![Vec4::ZERO; n]]);
        }
    }

    pub fn wind_channel(&self, channel: usize) -> Option<&[Vec4]> {
        self.wind
            .as_ref()
            .and_then(|w| w.get(channel))
            .map(|c| c.as_slice())
    }

    pub fn tangents(&self) -> Option<&[Vec4]> {
        self.tangents.as_deref()
    }

    pub fn tangents_mut(&mut self) -> Option<&mut [Vec4]> {
        self.tangents.as_deref_mut()
    }

    /// Check that every enabled channel is length-aligned with positions
    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        let check = |name: &str, len: usize| -> Result<()> {
            if len != n {
                return Err(Error::Channel(format!(
                    "{name} has {len} entries, expected {n}"
                )));
            }
            Ok(())
        };
        check("normals", self.normals.len())?;
        if let Some(tangents) = &self.tangents {
            check("tangents", tangents.len())?;
        }
        for (i, channel) in self.aux.iter().enumerate() {
            check(&format!("aux{i}"), channel.len())?;
        }
        if let Some(weights) = &self.weights {
            check("weights", weights.len())?;
        }
        if let Some(ids) = &self.ids {
            check("ids", ids.len())?;
        }
        if let Some(wind) = &self.wind {
            for (i, channel) in wind.iter().enumerate() {
                check(&format!("wind{i}"), channel.len())?;
            }
        }
        Ok(())
    }

    /// Interleave into Pod records; absent channels pack as zeros
    pub fn pack(&self) -> Vec<PackedVertex> {
        let zero4 = [0.0f32; 4];
        (0..self.len())
            .map(|i| PackedVertex {
                position: self.positions[i].to_array(),
                normal: self.normals[i].to_array(),
                tangent: self
                    .tangents
                    .as_ref()
                    .map(|t| t[i].to_array())
                    .unwrap_or([1.0, 0.0, 0.0, 1.0]),
                ids: self.ids.as_ref().map(|d| d[i].to_array()).unwrap_or([0.0; 2]),
                wind0: self.wind.as_ref().map(|w| w[0][i].to_array()).unwrap_or(zero4),
                wind1: self.wind.as_ref().map(|w| w[1][i].to_array()).unwrap_or(zero4),
                wind2: self.wind.as_ref().map(|w| w[2][i].to_array()).unwrap_or(zero4),
            })
            .collect()
    }
}
