//! The branch/curve structural model
//!
//! `BranchCurveModel` owns every branch in an arena addressed by stable
//! `BranchId` indices; parent/child links are id lookups, never raw
//! back-pointers. All structural edits go through the operations here, and
//! every derived attribute (levels, accumulated length, girth factors,
//! origins, frames, wind phases) is recomputed by an explicit pass rather
//! than authored.
//!
//! The model is single-threaded by design: mutations run sequentially
//! before any transform engine is invoked, and no internal locking exists.

use std::time::Instant;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::{Result, Rng};
use crate::curve::{CurvePoint, any_perpendicular, project_on_plane};
use crate::distribution::{AlignParams, CurvePointDistributor, DistributionParams};
use crate::tree::branch::{Branch, BranchId};
use crate::tree::sprout::Sprout;

/// Lowest cosine used in the surface-attachment correction; keeps nearly
/// parallel children from being pushed out to infinity.
const MIN_ATTACH_COS: f32 = 0.2;

/// Serializable snapshot of the authored structure
///
/// Derived caches never appear in the document; they are recomputed on
/// import.
#[derive(Serialize, Deserialize)]
pub struct TreeDocument {
    pub gravity: Vec3,
    pub roots: Vec<BranchId>,
    pub branches: Vec<Branch>,
}

/// A tree of branches with explicit recompute passes
#[derive(Clone, Debug)]
pub struct BranchCurveModel {
    branches: Vec<Branch>,
    roots: Vec<BranchId>,
    /// World down axis shared by every pass
    pub gravity: Vec3,
    total_levels: u32,
}

impl BranchCurveModel {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            roots: Vec::new(),
            gravity: Vec3::NEG_Y,
            total_levels: 1,
        }
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn roots(&self) -> &[BranchId] {
        &self.roots
    }

    pub fn total_levels(&self) -> u32 {
        self.total_levels
    }

    pub fn branch(&self, id: BranchId) -> &Branch {
        &self.branches[id.index()]
    }

    /// Mutable access for authoring (curve nodes, girth knobs, sprouts).
    /// Derived fields stay crate-private, so they cannot be set from here.
    pub fn branch_mut(&mut self, id: BranchId) -> &mut Branch {
        &mut self.branches[id.index()]
    }

    /// Drop every branch
    pub fn clear(&mut self) {
        self.branches.clear();
        self.roots.clear();
        self.total_levels = 1;
    }

    // --- Structural operations ---

    /// Insert a detached branch into the arena
    fn insert(&mut self, mut branch: Branch) -> BranchId {
        let id = BranchId(self.branches.len() as u32);
        branch.id = id;
        branch.parent = None;
        self.branches.push(branch);
        id
    }

    /// Add a branch as a new tree root
    pub fn add_root(&mut self, mut branch: Branch) -> BranchId {
        branch.curve.resample();
        let id = self.insert(branch);
        self.roots.push(id);
        self.refresh_total_levels();
        id
    }

    /// Add a branch under `parent`
    ///
    /// Appends to the parent's child list, sets the parent back-link,
    /// elects the follow-up if the parent has none and the branch sits at
    /// position 1, propagates `offspring_levels` up to the root, and
    /// recomputes accumulated length for the subtree.
    pub fn add_branch(&mut self, parent: BranchId, mut branch: Branch) -> BranchId {
        branch.curve.resample();
        let id = self.insert(branch);
        self.attach_branch(parent, id);
        id
    }

    /// Attach an existing detached branch under `parent`
    ///
    /// Silent no-op if the child already has a parent (callers must detach
    /// first) or if the attachment would create a cycle.
    pub fn attach_branch(&mut self, parent: BranchId, child: BranchId) {
        if self.branches[child.index()].parent.is_some() {
            log::debug!("attach_branch: branch {:?} already has a parent, ignoring", child);
            return;
        }
        if parent == child || self.is_ancestor(child, parent) {
            log::debug!("attach_branch: attaching {:?} under {:?} would cycle, ignoring", child, parent);
            return;
        }

        self.branches[parent.index()].children.push(child);
        self.branches[child.index()].parent = Some(parent);
        self.roots.retain(|&r| r != child);

        if self.branches[parent.index()].follow_up.is_none()
            && self.branches[child.index()].position == 1.0
        {
            self.branches[parent.index()].follow_up = Some(child);
        }

        let parent_level = self.branches[parent.index()].level;
        self.recompute_levels(child, parent_level + 1);
        self.propagate_offspring_levels(parent);
        self.refresh_total_levels();
        self.recompute_accum_length(child);
    }

    /// Detach a branch from its parent
    ///
    /// The branch keeps its subtree and becomes a free-floating root with
    /// no dangling back-reference in the model.
    pub fn detach_branch(&mut self, child: BranchId) {
        let Some(parent) = self.branches[child.index()].parent else {
            return;
        };
        self.branches[parent.index()].children.retain(|&c| c != child);
        if self.branches[parent.index()].follow_up == Some(child) {
            self.branches[parent.index()].follow_up = None;
            self.elect_follow_up(parent);
        }
        self.branches[child.index()].parent = None;

        self.recompute_levels(child, 0);
        self.propagate_offspring_levels(parent);
        self.refresh_total_levels();
        self.recompute_accum_length(child);
    }

    /// Set a branch's attach position
    ///
    /// Clamps into [0, 1]. Demotes the branch from follow-up when it leaves
    /// position 1 and re-elects among siblings at position 1, preferring the
    /// largest `offspring_levels` (tie-break: first in child order). Always
    /// re-derives accumulated length for the subtree.
    pub fn set_position(&mut self, id: BranchId, position: f32) {
        let position = position.clamp(0.0, 1.0);
        self.branches[id.index()].position = position;

        if let Some(parent) = self.branches[id.index()].parent {
            if self.branches[parent.index()].follow_up == Some(id) && position != 1.0 {
                self.branches[parent.index()].follow_up = None;
            }
            if self.branches[parent.index()].follow_up.is_none() {
                self.elect_follow_up(parent);
            }
        }

        self.recompute_accum_length(id);
    }

    /// Attach a sprout to a branch
    pub fn add_sprout(&mut self, id: BranchId, sprout: Sprout) {
        self.branches[id.index()].sprouts.push(sprout);
    }

    /// True if `ancestor` lies on `id`'s parent chain
    fn is_ancestor(&self, ancestor: BranchId, id: BranchId) -> bool {
        let mut current = self.branches[id.index()].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.branches[p.index()].parent;
        }
        false
    }

    /// Pick the follow-up among children at position 1
    fn elect_follow_up(&mut self, parent: BranchId) {
        let mut best: Option<(BranchId, u32)> = None;
        for &child in &self.branches[parent.index()].children {
            let b = &self.branches[child.index()];
            if b.position == 1.0 {
                let deeper = match best {
                    Some((_, levels)) => b.offspring_levels > levels,
                    None => true,
                };
                if deeper {
                    best = Some((child, b.offspring_levels));
                }
            }
        }
        self.branches[parent.index()].follow_up = best.map(|(id, _)| id);
    }

    fn recompute_levels(&mut self, root: BranchId, level: u32) {
        let mut stack = vec![(root, level)];
        while let Some((id, level)) = stack.pop() {
            self.branches[id.index()].level = level;
            for &child in &self.branches[id.index()].children {
                stack.push((child, level + 1));
            }
        }
    }

    /// Recompute `offspring_levels` from `id` up to its root
    fn propagate_offspring_levels(&mut self, id: BranchId) {
        let mut current = Some(id);
        while let Some(cid) = current {
            let levels = self.branches[cid.index()]
                .children
                .iter()
                .map(|&c| self.branches[c.index()].offspring_levels + 1)
                .max()
                .unwrap_or(0);
            self.branches[cid.index()].offspring_levels = levels;
            current = self.branches[cid.index()].parent;
        }
    }

    fn refresh_total_levels(&mut self) {
        self.total_levels = self
            .roots
            .iter()
            .map(|&r| self.branches[r.index()].offspring_levels + 1)
            .max()
            .unwrap_or(1);
    }

    /// Recompute accumulated length for a subtree
    ///
    /// `accum_length` at a branch base = parent accumulation + the arc
    /// length of the parent curve up to the attach position. NaN parent
    /// lengths degrade to zero contribution.
    fn recompute_accum_length(&mut self, root: BranchId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let accum = match self.branches[id.index()].parent {
                Some(parent) => {
                    let p = &self.branches[parent.index()];
                    let len = p.curve.length();
                    let len = if len.is_finite() { len } else { 0.0 };
                    p.accum_length + len * self.branches[id.index()].position
                }
                None => 0.0,
            };
            self.branches[id.index()].accum_length = accum;
            for &child in &self.branches[id.index()].children {
                stack.push(child);
            }
        }
    }

    // --- Derived-attribute passes ---

    /// Recompute girth factors for a subtree, top-down
    ///
    /// A subtree root with no parent gets factors `(0, (level+1)/total)`;
    /// a child's base factor is the parent factor at its attach position and
    /// its top factor interpolates the remaining levels.
    pub fn update_girth(&mut self, root: BranchId) {
        let total = self.total_levels.max(1);

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let (base, level) = match self.branches[id.index()].parent {
                Some(parent) => {
                    let position = self.branches[id.index()].position;
                    (
                        self.branches[parent.index()].girth_factor_at(position),
                        self.branches[id.index()].level,
                    )
                }
                None => (0.0, self.branches[id.index()].level),
            };
            let remaining = total.saturating_sub(level).max(1) as f32;
            let top = base + (1.0 - base) / remaining;

            let b = &mut self.branches[id.index()];
            b.girth_at_base_factor = base;
            b.girth_at_top_factor = top;

            for &child in &self.branches[id.index()].children {
                stack.push(child);
            }
        }
    }

    /// Recompute world origins and surface-attachment offsets, top-down
    ///
    /// Follow-up children inherit the parent curve endpoint with zero extra
    /// offset. Other children are pushed out of the parent's visual volume
    /// along the derived radial: by the shaper surface distance when a
    /// shaper is set, else by the cosine-corrected cylindrical distance
    /// between parent and child girths.
    pub fn update_position(&mut self, root: BranchId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(parent) = self.branches[id.index()].parent {
                let position = self.branches[id.index()].position;
                let is_follow_up = self.branches[parent.index()].follow_up == Some(id);

                let (parent_origin, attach_point, offset) = {
                    let p = &self.branches[parent.index()];
                    if is_follow_up {
                        let end = p
                            .curve
                            .last_point()
                            .map(|s| s.position)
                            .unwrap_or(Vec3::ZERO);
                        (p.origin, end, Vec3::ZERO)
                    } else {
                        let point = p.curve.point_at(position);
                        let child_dir = self.branches[id.index()].curve.base_tangent();
                        let radial = project_on_plane(child_dir, point.forward, point.normal);
                        let parent_girth = p.girth_at(position);
                        let child_girth = self.branches[id.index()].girth_at(0.0);

                        let distance = match p.shaper {
                            Some(shaper) => shaper.surface_distance(parent_girth, position),
                            None => {
                                let cos = child_dir.dot(radial).clamp(MIN_ATTACH_COS, 1.0);
                                (parent_girth - child_girth).max(0.0) / cos + child_girth
                            }
                        };
                        (p.origin, point.position, radial * distance)
                    }
                };

                let b = &mut self.branches[id.index()];
                b.origin_offset = offset;
                b.origin = parent_origin + attach_point + offset;
            } else {
                self.branches[id.index()].origin_offset = Vec3::ZERO;
            }

            for &child in &self.branches[id.index()].children {
                stack.push(child);
            }
        }
    }

    /// Propagate a consistent orientation frame down a subtree
    ///
    /// The trunk anchors to its fixed reference normal; a follow-up inherits
    /// the parent's exact end frame; any other branch derives its reference
    /// normal by projecting its base tangent onto the plane perpendicular to
    /// the parent's reference forward. Keeps cross-sections from twisting at
    /// the attachment seam.
    pub fn recalculate_normals(&mut self, root: BranchId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let reference = match self.branches[id.index()].parent {
                None => self.branches[id.index()].curve.fixed_normal,
                Some(parent) => {
                    let is_follow_up = self.branches[parent.index()].follow_up == Some(id);
                    let p = &self.branches[parent.index()];
                    if is_follow_up {
                        p.curve
                            .last_point()
                            .map(|s| s.normal)
                            .unwrap_or(p.curve.reference_normal)
                    } else {
                        let tangent = self.branches[id.index()].curve.base_tangent();
                        project_on_plane(
                            tangent,
                            p.curve.reference_forward,
                            any_perpendicular(tangent),
                        )
                    }
                }
            };

            let curve = &mut self.branches[id.index()].curve;
            curve.reference_normal = reference;
            curve.resample();

            for &child in &self.branches[id.index()].children {
                stack.push(child);
            }
        }
    }

    /// Recompute all sprout vectors from current branch frames
    ///
    /// Deterministic for a fixed seed: branches are visited in preorder,
    /// sprouts in list order.
    pub fn recalculate_sprouts(&mut self, seed: u64) {
        let mut rng = Rng::new(seed);
        let order: Vec<BranchId> = self
            .roots
            .clone()
            .into_iter()
            .flat_map(|r| {
                let mut ids = vec![r];
                ids.extend(self.descendant_branches(r));
                ids
            })
            .collect();

        let gravity = self.gravity;
        for id in order {
            let mut sprouts = std::mem::take(&mut self.branches[id.index()].sprouts);
            for sprout in &mut sprouts {
                let point = self.point_at_position(id, sprout.position);
                let girth = self.branches[id.index()].girth_at(sprout.position);
                sprout.calculate_vectors(&point, girth, gravity, &mut rng);
            }
            self.branches[id.index()].sprouts = sprouts;
        }
    }

    /// Scatter sprouts onto a branch with the point distributor
    ///
    /// Returns how many sprouts were added (zero is a normal outcome of the
    /// probability and frequency gates).
    pub fn scatter_sprouts(
        &mut self,
        id: BranchId,
        params: &DistributionParams,
        align: &AlignParams,
        rng: &mut Rng,
    ) -> usize {
        let gravity = self.gravity;
        let points = {
            let distributor = CurvePointDistributor::new(params, align, gravity);
            distributor.distribute(&self.branches[id.index()].curve, rng)
        };
        let count = points.len();
        for point in points {
            self.branches[id.index()]
                .sprouts
                .push(Sprout::new(point.relative_position, point.roll));
        }
        count
    }

    /// Assign wind-phase groups across the whole tree
    ///
    /// A root chain (a branch plus its transitive follow-ups) forms one
    /// phase group sharing a single draw; every non-follow-up subtree draws
    /// a new phase. `phase_dir` is the branch origin direction projected on
    /// the horizontal plane, `phase_length` the accumulated length at the
    /// branch tip. Deterministic for a fixed seed.
    pub fn assign_wind_phases(&mut self, seed: u64) {
        let mut rng = Rng::new(seed);
        let gravity = self.gravity;

        for root in self.roots.clone() {
            let root_origin = self.branches[root.index()].origin;
            let root_phase = rng.range(0.0, std::f32::consts::TAU);
            let mut stack = vec![(root, root_phase)];
            while let Some((id, phase)) = stack.pop() {
                let origin = self.branches[id.index()].origin;
                let dir = project_on_plane(origin - root_origin, gravity, Vec3::Z);
                let len = self.branches[id.index()].curve.length();
                let len = if len.is_finite() { len } else { 0.0 };

                let b = &mut self.branches[id.index()];
                b.phase = phase;
                b.phase_dir = dir;
                b.phase_length = b.accum_length + len;

                let follow_up = self.branches[id.index()].follow_up;
                for &child in &self.branches[id.index()].children {
                    if Some(child) == follow_up {
                        stack.push((child, phase));
                    } else {
                        stack.push((child, rng.range(0.0, std::f32::consts::TAU)));
                    }
                }
            }
        }
    }

    /// Run every derived pass over the whole tree
    pub fn rebuild(&mut self, seed: u64) {
        let start = Instant::now();
        for root in self.roots.clone() {
            self.recalculate_normals(root);
            self.update_girth(root);
            self.update_position(root);
        }
        self.recalculate_sprouts(seed);
        self.assign_wind_phases(seed);
        log::debug!(
            "rebuilt {} branches in {:.2}ms",
            self.branches.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    // --- Queries ---

    /// All descendants of a branch in preorder (excluding the branch itself)
    pub fn descendant_branches(&self, id: BranchId) -> Vec<BranchId> {
        let mut out = Vec::new();
        let mut stack: Vec<BranchId> = self.branches[id.index()].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.branches[current.index()].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// World-space sample of a branch at a relative position, girth included
    pub fn point_at_position(&self, id: BranchId, position: f32) -> CurvePoint {
        let b = &self.branches[id.index()];
        let mut point = b.curve.point_at(position);
        point.position += b.origin;
        point.girth = b.girth_at(position);
        point
    }

    /// Girth of a branch at a relative position
    pub fn girth_at_position(&self, id: BranchId, position: f32) -> f32 {
        self.branches[id.index()].girth_at(position)
    }

    /// Frame normal of a branch at a relative position
    pub fn normal_at_position(&self, id: BranchId, position: f32) -> Vec3 {
        self.branches[id.index()].curve.point_at(position).normal
    }

    /// World surface point at a relative position and roll angle
    ///
    /// The surface distance comes from the branch shaper when present, else
    /// from the cylindrical girth.
    pub fn surface_point_at(&self, id: BranchId, position: f32, roll_angle: f32) -> Vec3 {
        let b = &self.branches[id.index()];
        let point = b.curve.point_at(position).rolled(roll_angle);
        let girth = b.girth_at(position);
        let distance = match b.shaper {
            Some(shaper) => shaper.surface_distance(girth, position),
            None => girth,
        };
        b.origin + point.position + point.normal * distance
    }

    // --- Persistence ---

    /// Value-semantics deep copy: every branch, curve sample, and sprout is
    /// duplicated; nothing mutable is shared with the original.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }

    /// Export the authored structure as JSON
    pub fn to_json(&self) -> Result<String> {
        let doc = TreeDocument {
            gravity: self.gravity,
            roots: self.roots.clone(),
            branches: self.branches.clone(),
        };
        Ok(serde_json::to_string(&doc)?)
    }

    /// Import a document and recompute every derived attribute
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: TreeDocument = serde_json::from_str(json)?;
        let mut model = Self {
            branches: doc.branches,
            roots: doc.roots,
            gravity: doc.gravity,
            total_levels: 1,
        };

        // Sample caches are never persisted; regenerate them before any
        // length-dependent recompute.
        for branch in &mut model.branches {
            branch.curve.resample();
        }

        for root in model.roots.clone() {
            model.recompute_levels(root, 0);
            let leaves: Vec<BranchId> = std::iter::once(root)
                .chain(model.descendant_branches(root))
                .filter(|&id| model.branches[id.index()].children.is_empty())
                .collect();
            for leaf in leaves {
                model.propagate_offspring_levels(leaf);
            }
        }
        model.refresh_total_levels();
        for root in model.roots.clone() {
            model.recompute_accum_length(root);
        }
        model.rebuild(0);
        Ok(model)
    }
}

impl Default for BranchCurveModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;

    fn vertical_trunk(height: f32) -> Branch {
        Branch::new(Curve::line(Vec3::ZERO, Vec3::new(0.0, height, 0.0))).with_girth(0.05, 0.25)
    }

    fn side_branch() -> Branch {
        Branch::new(Curve::line(Vec3::ZERO, Vec3::new(2.0, 2.0, 0.0)))
            .with_girth(0.02, 0.1)
            .with_position(0.5)
    }

    #[test]
    fn test_add_root_and_branch() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let child = model.add_branch(trunk, side_branch());

        assert_eq!(model.branch(child).parent(), Some(trunk));
        assert_eq!(model.branch(trunk).children(), &[child]);
        assert_eq!(model.branch(child).level(), 1);
    }

    #[test]
    fn test_attach_already_parented_is_noop() {
        let mut model = BranchCurveModel::new();
        let a = model.add_root(vertical_trunk(10.0));
        let b = model.add_root(vertical_trunk(8.0));
        let child = model.add_branch(a, side_branch());

        model.attach_branch(b, child);
        assert_eq!(model.branch(child).parent(), Some(a));
        assert!(model.branch(b).children().is_empty());
    }

    #[test]
    fn test_attach_cycle_is_noop() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let child = model.add_branch(trunk, side_branch());
        model.detach_branch(trunk);

        // trunk has no parent now, but attaching it under its own child
        // would create a cycle
        model.attach_branch(child, trunk);
        assert_eq!(model.branch(trunk).parent(), None);
    }

    #[test]
    fn test_follow_up_elected_at_position_one() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let side = model.add_branch(trunk, side_branch());
        let continuation = model.add_branch(trunk, vertical_trunk(6.0).with_position(1.0));

        assert_eq!(model.branch(trunk).follow_up(), Some(continuation));
        assert_ne!(model.branch(trunk).follow_up(), Some(side));
    }

    #[test]
    fn test_set_position_demotes_and_reelects() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let first = model.add_branch(trunk, vertical_trunk(6.0).with_position(1.0));
        let second = model.add_branch(trunk, vertical_trunk(4.0).with_position(1.0));
        // Give the second candidate a deeper subtree
        model.add_branch(second, side_branch().with_position(1.0));

        assert_eq!(model.branch(trunk).follow_up(), Some(first));
        model.set_position(first, 0.5);
        // Demoted; re-election prefers the deepest subtree at position 1
        assert_eq!(model.branch(trunk).follow_up(), Some(second));
        assert_eq!(model.branch(first).position(), 0.5);
    }

    #[test]
    fn test_set_position_clamps() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        model.set_position(trunk, 7.0);
        assert_eq!(model.branch(trunk).position(), 1.0);
        model.set_position(trunk, -2.0);
        assert_eq!(model.branch(trunk).position(), 0.0);
    }

    #[test]
    fn test_accum_length_invariant() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let mid = model.add_branch(trunk, side_branch());
        let tip = model.add_branch(mid, side_branch().with_position(1.0));

        assert_eq!(model.branch(trunk).accum_length(), 0.0);
        let mid_accum = model.branch(mid).accum_length();
        assert!((mid_accum - 5.0).abs() < 1e-2);
        assert!(model.branch(tip).accum_length() >= mid_accum);
    }

    #[test]
    fn test_detached_branch_accum_is_zero() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let child = model.add_branch(trunk, side_branch());
        assert!(model.branch(child).accum_length() > 0.0);

        model.detach_branch(child);
        assert_eq!(model.branch(child).accum_length(), 0.0);
        assert_eq!(model.branch(child).parent(), None);
        assert!(model.branch(trunk).children().is_empty());
    }

    #[test]
    fn test_offspring_levels_propagate() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let a = model.add_branch(trunk, side_branch());
        let b = model.add_branch(a, side_branch());
        model.add_branch(b, side_branch());

        assert_eq!(model.branch(trunk).offspring_levels(), 3);
        assert_eq!(model.branch(a).offspring_levels(), 2);
        assert_eq!(model.total_levels(), 4);
    }

    #[test]
    fn test_scenario_a_trunk_girth_endpoints() {
        // Single trunk, curve length 10, girth 0.05..0.25, identity curve
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        model.update_girth(trunk);

        assert!((model.girth_at_position(trunk, 0.0) - 0.05).abs() < 1e-6);
        assert!((model.girth_at_position(trunk, 1.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_scenario_b_child_offset_along_parent_normal() {
        // Trunk along +Z with fixed normal +Y; child attached at 0.5
        let mut model = BranchCurveModel::new();
        let mut trunk_branch =
            Branch::new(Curve::line(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0))).with_girth(0.05, 0.25);
        trunk_branch.curve.fixed_normal = Vec3::Y;
        let trunk = model.add_root(trunk_branch);

        let child_branch = Branch::new(Curve::line(Vec3::ZERO, Vec3::new(0.0, 3.0, 3.0)))
            .with_girth(0.02, 0.1)
            .with_position(0.5);
        let child = model.add_branch(trunk, child_branch);

        model.recalculate_normals(trunk);
        assert!((model.normal_at_position(trunk, 0.5) - Vec3::Y).length() < 1e-4);

        model.update_girth(trunk);
        model.update_position(trunk);

        let offset = model.branch(child).origin_offset();
        assert!(offset.length() > 0.0, "non-follow-up child must be pushed off the centerline");
        let dir = offset.normalize();
        assert!(dir.dot(Vec3::Y) > 0.9, "offset should point along the parent normal");
        assert!(dir.dot(Vec3::Z).abs() < 0.1, "offset should not point along the parent tangent");
    }

    #[test]
    fn test_follow_up_inherits_zero_offset() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let next = model.add_branch(trunk, vertical_trunk(5.0).with_position(1.0));

        model.update_girth(trunk);
        model.update_position(trunk);

        assert_eq!(model.branch(next).origin_offset(), Vec3::ZERO);
        let expected = model.branch(trunk).curve.last_point().unwrap().position;
        assert!((model.branch(next).origin() - expected).length() < 1e-5);
    }

    #[test]
    fn test_follow_up_inherits_end_frame() {
        let mut model = BranchCurveModel::new();
        let mut trunk_branch = vertical_trunk(10.0);
        trunk_branch.curve.fixed_normal = Vec3::Z;
        let trunk = model.add_root(trunk_branch);
        let next = model.add_branch(trunk, vertical_trunk(5.0).with_position(1.0));

        model.recalculate_normals(trunk);

        let trunk_end = model.branch(trunk).curve.last_point().unwrap().normal;
        let next_start = model.branch(next).curve.first_point().unwrap().normal;
        assert!((trunk_end - next_start).length() < 1e-4);
    }

    #[test]
    fn test_shaper_overrides_attachment_distance() {
        let mut model = BranchCurveModel::new();
        let mut trunk_branch = vertical_trunk(10.0);
        trunk_branch.shaper = Some(crate::tree::branch::Shaper::Flared { gain: 1.0, exponent: 1.0 });
        let trunk = model.add_root(trunk_branch);
        let child = model.add_branch(trunk, side_branch());

        model.update_girth(trunk);
        model.update_position(trunk);

        let girth = model.girth_at_position(trunk, 0.5);
        let expected = girth * 1.5; // flare gain 1.0, falloff 0.5 at mid
        assert!((model.branch(child).origin_offset().length() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_surface_point_offset_by_girth() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        model.update_girth(trunk);

        let center = model.point_at_position(trunk, 0.5).position;
        let surface = model.surface_point_at(trunk, 0.5, 0.0);
        let girth = model.girth_at_position(trunk, 0.5);
        assert!(((surface - center).length() - girth).abs() < 1e-4);
    }

    #[test]
    fn test_descendants_preorder() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let a = model.add_branch(trunk, side_branch());
        let b = model.add_branch(a, side_branch());
        let c = model.add_branch(trunk, side_branch());

        assert_eq!(model.descendant_branches(trunk), vec![a, b, c]);
    }

    #[test]
    fn test_deep_clone_shares_nothing() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        model.add_sprout(trunk, Sprout::new(0.5, 0.0));

        let mut copy = model.deep_clone();
        copy.branch_mut(trunk).min_girth = 0.9;
        copy.branch_mut(trunk).sprouts.clear();
        copy.branch_mut(trunk).curve.set_node(1, crate::curve::CurveNode::new(Vec3::ONE));
        copy.branch_mut(trunk).curve.resample();

        assert_eq!(model.branch(trunk).min_girth, 0.05);
        assert_eq!(model.branch(trunk).sprouts.len(), 1);
        assert!((model.branch(trunk).curve.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_json_round_trip() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let child = model.add_branch(trunk, side_branch());
        model.add_branch(child, side_branch().with_position(1.0));
        model.rebuild(42);

        let json = model.to_json().unwrap();
        let restored = BranchCurveModel::from_json(&json).unwrap();

        assert_eq!(restored.branch_count(), model.branch_count());
        assert_eq!(restored.total_levels(), model.total_levels());
        for pos in [0.0, 0.3, 0.7, 1.0] {
            assert!(
                (restored.girth_at_position(trunk, pos) - model.girth_at_position(trunk, pos)).abs()
                    < 1e-5
            );
        }
        assert!(
            (restored.branch(child).accum_length() - model.branch(child).accum_length()).abs() < 1e-5
        );
    }

    #[test]
    fn test_wind_phases_deterministic() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        model.add_branch(trunk, side_branch());
        model.rebuild(0);

        model.assign_wind_phases(7);
        let first = model.branch(trunk).phase();
        model.assign_wind_phases(7);
        assert_eq!(model.branch(trunk).phase(), first);
    }

    #[test]
    fn test_wind_phase_shared_along_follow_up_chain() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let next = model.add_branch(trunk, vertical_trunk(5.0).with_position(1.0));
        let side = model.add_branch(trunk, side_branch());
        model.rebuild(0);
        model.assign_wind_phases(3);

        assert_eq!(model.branch(trunk).phase(), model.branch(next).phase());
        assert_ne!(model.branch(trunk).phase(), model.branch(side).phase());
        assert!(model.branch(next).phase_length() > model.branch(trunk).phase_length());
    }

    #[test]
    fn test_scatter_sprouts_appends() {
        let mut model = BranchCurveModel::new();
        let trunk = model.add_root(vertical_trunk(10.0));
        let params = DistributionParams {
            frequency: crate::math::IntRange::new(6, 6),
            probability: 1.0,
            ..Default::default()
        };
        let mut rng = Rng::new(5);
        let count = model.scatter_sprouts(trunk, &params, &AlignParams::default(), &mut rng);
        assert!(count > 0);
        assert_eq!(model.branch(trunk).sprouts.len(), count);
    }
}
