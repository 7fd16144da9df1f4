//! World matrix evaluation.
//!
//! World matrices live in flat arrays parallel to the transform pool,
//! double-buffered so the renderer can derive motion vectors. Evaluation is
//! memoized top-down recursion: each slot is computed exactly once per tick,
//! in whatever order transforms are visited, with parents resolved on
//! demand. A depth counter guards against cyclic parent chains, which are a
//! caller bug; hitting the limit is reported as a hard error and the slot
//! falls back to its local matrix.

use glam::Mat4;

use crate::registry::GenRef;
use crate::scene::node::ComponentIdx;
use crate::scene::{NodeRef, Scene};

/// Maximum parent-chain depth walked during evaluation. Exceeding it means a
/// cycle or a pathologically deep hierarchy; evaluation stops and logs.
pub const MAX_TRANSFORM_DEPTH: u32 = 255;

impl Scene {
    /// Sizes the world-matrix buffers to the transform pool capacity and
    /// marks every slot stale. Call once per tick before evaluation.
    pub fn ready_world_matrices(&mut self) {
        // capacity, not len: the pool can have holes and slot indices map
        // 1:1 to matrix entries
        let capacity = self.transforms.capacity();
        self.transform_worlds.resize(capacity, Mat4::IDENTITY);
        self.transform_worlds_updated.resize(capacity, false);
        self.transform_worlds_updated.fill(false);
    }

    /// Computes the world matrix of every live transform.
    pub fn compute_world_matrices(&mut self) {
        let mut r = self.transforms.first_ref();
        while !r.is_invalid() {
            self.compute_transform_world_matrix(r.idx);
            r = self.transforms.next_ref(r);
        }
    }

    /// Computes one transform's world matrix, resolving the parent chain
    /// first. Returns the cached value when the slot was already computed or
    /// force-set this tick.
    pub fn compute_transform_world_matrix(&mut self, idx: u32) {
        self.compute_transform_world_matrix_(idx, 0);
    }

    fn compute_transform_world_matrix_(&mut self, idx: u32, depth: u32) {
        if self
            .transform_worlds_updated
            .get(idx as usize)
            .copied()
            .unwrap_or(true)
        {
            return;
        }

        let Some(trs) = self.transforms.value_at(idx) else {
            return;
        };
        let local = trs.local_matrix();
        let parent_trs_ref = self
            .nodes
            .get(trs.parent)
            .map_or(GenRef::INVALID, |n| n.component(ComponentIdx::Transform));

        if depth > MAX_TRANSFORM_DEPTH {
            log::error!("Transform parent chain exceeds depth limit, cycle suspected");
            self.transform_worlds_updated[idx as usize] = true;
            self.transform_worlds[idx as usize] = local;
            return;
        }

        let mut world = local;
        if self.transforms.is_valid(parent_trs_ref) {
            self.compute_transform_world_matrix_(parent_trs_ref.idx, depth + 1);
            world = self.transform_worlds[parent_trs_ref.idx as usize] * local;
        }

        self.transform_worlds_updated[idx as usize] = true;
        self.transform_worlds[idx as usize] = world;
    }

    /// Swaps the current and previous world-matrix buffers. Call at the
    /// start of a tick, before recomputing.
    pub fn store_previous_world_matrices(&mut self) {
        std::mem::swap(&mut self.transform_worlds, &mut self.previous_transform_worlds);
        std::mem::swap(
            &mut self.transform_worlds_updated,
            &mut self.previous_transform_worlds_updated,
        );
    }

    /// Back-fills previous matrices for slots that were not updated last
    /// tick (new transforms, skipped chains) with their current value, so
    /// first-frame motion vectors are zero rather than garbage.
    pub fn fixup_previous_world_matrices(&mut self) {
        self.previous_transform_worlds
            .resize(self.transform_worlds.len(), Mat4::IDENTITY);
        self.previous_transform_worlds_updated
            .resize(self.transform_worlds_updated.len(), false);

        for i in 0..self.transform_worlds.len() {
            if !self.previous_transform_worlds_updated[i] {
                self.previous_transform_worlds[i] = self.transform_worlds[i];
            }
        }
    }

    /// Current world matrices, indexed by transform slot.
    #[must_use]
    pub fn transform_world_matrices(&self) -> &[Mat4] {
        &self.transform_worlds
    }

    /// Previous-tick world matrices, indexed by transform slot.
    #[must_use]
    pub fn previous_transform_world_matrices(&self) -> &[Mat4] {
        &self.previous_transform_worlds
    }

    #[must_use]
    pub fn transform_world_matrix(&self, transform_idx: u32) -> Mat4 {
        self.transform_worlds
            .get(transform_idx as usize)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }

    #[must_use]
    pub fn previous_transform_world_matrix(&self, transform_idx: u32) -> Mat4 {
        self.previous_transform_worlds
            .get(transform_idx as usize)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }

    /// World matrix of a node, or the documented identity default when the
    /// node has no computed transform.
    #[must_use]
    pub fn get_node_world_matrix(&self, r: NodeRef) -> Mat4 {
        let trs_ref = self.node_transform_ref(r);
        if !self.transforms.is_valid(trs_ref) {
            log::warn!("Invalid node transform reference");
            return Mat4::IDENTITY;
        }
        self.transform_world_matrix(trs_ref.idx)
    }

    /// Force-sets a node's world matrix and flags the slot as updated so the
    /// evaluator will not overwrite it later this tick. Used when an
    /// external physics step owns the authoritative pose. The transform TRS
    /// fields are intentionally left untouched.
    pub fn set_node_world_matrix(&mut self, r: NodeRef, world: Mat4) {
        let trs_ref = self.node_transform_ref(r);
        if !self.transforms.is_valid(trs_ref) {
            log::warn!("Invalid node transform reference");
            return;
        }
        let idx = trs_ref.idx as usize;
        if idx >= self.transform_worlds.len() {
            self.transform_worlds.resize(idx + 1, Mat4::IDENTITY);
            self.transform_worlds_updated.resize(idx + 1, false);
        }
        self.transform_worlds[idx] = world;
        self.transform_worlds_updated[idx] = true;
    }

    /// Computes a node's world matrix from scratch, ignoring the per-tick
    /// caches. Slow, for use when scene matrices are not yet up to date.
    #[must_use]
    pub fn compute_node_world_matrix(&self, r: NodeRef) -> Mat4 {
        let mut world = Mat4::IDENTITY;
        let mut current = r;
        let mut depth = 0_u32;

        while let Some(trs) = self.node_transform(current) {
            if depth > MAX_TRANSFORM_DEPTH {
                log::error!("Transform parent chain exceeds depth limit, cycle suspected");
                break;
            }
            world = trs.local_matrix() * world;
            current = trs.parent;
            depth += 1;
        }

        world
    }
}
