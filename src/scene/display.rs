//! Display list production.
//!
//! The renderer never walks nodes or components; it consumes flat draw
//! lists referencing material slots, model refs and world-matrix slots,
//! bucketed by blend class and skinning.

use crate::resources::{ModelRef, ResourceCache};
use crate::scene::components::BlendMode;
use crate::scene::node::{ComponentIdx, NodeFlags};
use crate::scene::{ComponentRef, Scene};

/// One non-skinned draw: a material slot of an object, the transform slot
/// holding its world matrix, and the model mesh list to submit.
#[derive(Debug, Clone)]
pub struct ModelDisplayList {
    pub object: ComponentRef,
    pub material_slot: u16,
    /// Index into the world-matrix arrays; maps 1:1 to the transform pool.
    pub mtx_idx: u32,
    pub model: ModelRef,
    pub mesh_list: u16,
}

/// One skinned draw: per-bone world-matrix slots resolved from the object's
/// bone nodes.
#[derive(Debug, Clone)]
pub struct SkinnedModelDisplayList {
    pub object: ComponentRef,
    pub material_slot: u16,
    pub model: ModelRef,
    pub mesh_list: u16,

    pub mtx_idxs: Vec<u32>,
    pub bone_idxs: Vec<u16>,
}

/// Draw lists for one frame, bucketed for the renderer.
#[derive(Debug, Clone, Default)]
pub struct ModelDisplayLists {
    pub opaque: Vec<ModelDisplayList>,
    pub transparent: Vec<ModelDisplayList>,
    pub opaque_skinned: Vec<SkinnedModelDisplayList>,
    pub transparent_skinned: Vec<SkinnedModelDisplayList>,
}

impl Scene {
    /// Builds the frame's draw lists from enabled object-bearing nodes.
    /// Objects whose model is unknown to the resource cache are skipped;
    /// invalid bone references fall back to the node's own matrix.
    #[must_use]
    pub fn get_model_display_lists(&self, resources: &dyn ResourceCache) -> ModelDisplayLists {
        let mut out = ModelDisplayLists::default();

        for (_, node) in self.nodes.iter() {
            if node
                .flags
                .intersects(NodeFlags::DISABLED | NodeFlags::INSTANCE_DISABLED)
            {
                continue;
            }

            let trs_ref = node.component(ComponentIdx::Transform);
            if !self.transforms.is_valid(trs_ref) {
                continue;
            }

            let Some(object) = self.objects.get(node.component(ComponentIdx::Object)) else {
                continue;
            };
            let object_ref = node.component(ComponentIdx::Object);

            let Some(info) = resources.model_display_info(object.model) else {
                continue; // unknown or still-loading model
            };

            let bone_count = object.bones.len();
            let has_valid_skin = bone_count > 0 && bone_count == info.bind_pose_bone_count;

            for (list_idx, mesh_list) in info.mesh_lists.iter().enumerate() {
                let slot = mesh_list.material_slot as usize;
                let Some(material) = object.materials.get(slot) else {
                    continue;
                };
                let is_transparent = material.blend != BlendMode::Opaque;

                if has_valid_skin {
                    let mut display = SkinnedModelDisplayList {
                        object: object_ref,
                        material_slot: mesh_list.material_slot,
                        model: object.model,
                        mesh_list: list_idx as u16,
                        mtx_idxs: Vec::with_capacity(mesh_list.bones_table.len()),
                        bone_idxs: Vec::with_capacity(mesh_list.bones_table.len()),
                    };

                    for &bone_idx in &mesh_list.bones_table {
                        // node matrix stands in for any unresolvable bone
                        let mut mtx_idx = trs_ref.idx;
                        let mut resolved_bone = bone_idx;

                        if (bone_idx as usize) < bone_count {
                            let bone_ref = object.bones[bone_idx as usize];
                            if let Some(bone_node) = self.nodes.get(bone_ref) {
                                let bone_trs = bone_node.component(ComponentIdx::Transform);
                                if self.transforms.is_valid(bone_trs) {
                                    mtx_idx = bone_trs.idx;
                                }
                            }
                        } else {
                            resolved_bone = 0;
                        }

                        display.mtx_idxs.push(mtx_idx);
                        display.bone_idxs.push(resolved_bone);
                    }

                    if is_transparent {
                        out.transparent_skinned.push(display);
                    } else {
                        out.opaque_skinned.push(display);
                    }
                } else {
                    let display = ModelDisplayList {
                        object: object_ref,
                        material_slot: mesh_list.material_slot,
                        mtx_idx: trs_ref.idx,
                        model: object.model,
                        mesh_list: list_idx as u16,
                    };
                    if is_transparent {
                        out.transparent.push(display);
                    } else {
                        out.opaque.push(display);
                    }
                }
            }
        }

        out
    }
}
