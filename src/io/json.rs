//! JSON scene documents.
//!
//! The same logical content as the binary format, expressed as a serde
//! document. Components are de-duplicated into per-kind lists and nodes
//! reference them by list index; node-to-node references are saved node
//! indices, remapped on load. JSON content is recognized by not starting
//! with the binary magic.

use std::collections::BTreeMap;
use std::io::Write;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::anim::{Anim, NodeAnim, SceneAnim};
use crate::errors::{Result, SceneError};
use crate::io::binary::collect_save_sets;
use crate::registry::GenRef;
use crate::resources::{LoadPolicy, ReadProvider, ResourceCache};
use crate::scene::{
    Camera, Collision, ComponentIdx, ComponentRef, Light, LoadContext, LoadSaveFlags, Material,
    NodeFlags, NodeRef, RigidBody, Scene, Script,
};

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Serialize, Deserialize, Default)]
struct TransformDoc {
    pos: Vec3,
    rot: Vec3,
    scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<u32>,
}

#[derive(Serialize, Deserialize, Default)]
struct ObjectDoc {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    materials: Vec<Material>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    material_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bones: Vec<Option<u32>>,
}

#[derive(Serialize, Deserialize, Default)]
struct InstanceDoc {
    path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    on_instantiate_anim: String,
    #[serde(default)]
    loop_mode: crate::anim::LoopMode,
}

#[derive(Serialize, Deserialize, Default)]
struct NodeDoc {
    idx: u32,
    name: String,
    #[serde(default)]
    flags: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    light: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rigid_body: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    collisions: Vec<Option<u32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scripts: Vec<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance: Option<u32>,
}

#[derive(Serialize, Deserialize, Default)]
struct SceneGlobalsDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_camera: Option<u32>,
    ambient: Vec4,
    fog_near: f32,
    fog_far: f32,
    fog_color: Vec4,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    irradiance_map: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    radiance_map: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    brdf_map: String,
    canvas_clear_z: bool,
    canvas_clear_color: bool,
    canvas_color: Vec4,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scene_scripts: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct AnimDoc {
    idx: u32,
    anim: Anim,
}

#[derive(Serialize, Deserialize, Default)]
struct NodeAnimDoc {
    node: u32,
    anim: u32,
}

#[derive(Serialize, Deserialize, Default)]
struct SceneAnimDoc {
    name: String,
    t_start: f32,
    t_end: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anim: Option<u32>,
    frame_duration: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    node_anims: Vec<NodeAnimDoc>,
}

#[derive(Serialize, Deserialize, Default)]
struct SceneDoc {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    transforms: Vec<TransformDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cameras: Vec<Camera>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<ObjectDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    lights: Vec<Light>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rigid_bodies: Vec<RigidBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    collisions: Vec<Collision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scripts: Vec<Script>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    instances: Vec<InstanceDoc>,
    #[serde(default, skip_serializing_if = "is_false")]
    has_nodes: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<NodeDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scene: Option<SceneGlobalsDoc>,
    #[serde(default, skip_serializing_if = "is_false")]
    has_anims: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    anims: Vec<AnimDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scene_anims: Vec<SceneAnimDoc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    key_values: BTreeMap<String, String>,
}

fn opt_index(idx: u32) -> Option<u32> {
    if idx == u32::MAX {
        None
    } else {
        Some(idx)
    }
}

impl Scene {
    /// Saves the scene as a JSON document. Section selection matches the
    /// binary saver.
    pub fn save_json(
        &self,
        w: &mut impl Write,
        resources: &dyn ResourceCache,
        save_flags: LoadSaveFlags,
        nodes_to_save: Option<&[NodeRef]>,
    ) -> Result<()> {
        let sets = collect_save_sets(self, save_flags, nodes_to_save);
        let mut doc = SceneDoc::default();

        for &cref in &sets.transforms.refs {
            if let Some(trs) = self.transform(cref) {
                doc.transforms.push(TransformDoc {
                    pos: trs.pos,
                    rot: trs.rot,
                    scale: trs.scale,
                    parent: opt_index(trs.parent.idx),
                });
            }
        }

        for &cref in &sets.cameras.refs {
            if let Some(camera) = self.camera(cref) {
                doc.cameras.push(*camera);
            }
        }

        for &cref in &sets.objects.refs {
            if let Some(object) = self.object(cref) {
                doc.objects.push(ObjectDoc {
                    model: resources
                        .model_name(object.model)
                        .unwrap_or("")
                        .to_owned(),
                    materials: object.materials.clone(),
                    material_names: object.material_names.clone(),
                    bones: object.bones.iter().map(|b| opt_index(b.idx)).collect(),
                });
            }
        }

        for &cref in &sets.lights.refs {
            if let Some(light) = self.light(cref) {
                doc.lights.push(*light);
            }
        }

        if save_flags.contains(LoadSaveFlags::PHYSICS) {
            for &cref in &sets.rigid_bodies.refs {
                if let Some(body) = self.rigid_body(cref) {
                    doc.rigid_bodies.push(*body);
                }
            }
            for &cref in &sets.collisions.refs {
                if let Some(collision) = self.collision(cref) {
                    doc.collisions.push(collision.clone());
                }
            }
        }

        if save_flags.contains(LoadSaveFlags::SCRIPTS) {
            for &cref in &sets.scripts.refs {
                if let Some(script) = self.script(cref) {
                    doc.scripts.push(script.clone());
                }
            }
        }

        for &cref in &sets.instances.refs {
            if let Some(instance) = self.instance(cref) {
                doc.instances.push(InstanceDoc {
                    path: instance.path.clone(),
                    on_instantiate_anim: instance.on_instantiate_anim.clone(),
                    loop_mode: instance.loop_mode,
                });
            }
        }

        if save_flags.contains(LoadSaveFlags::NODES) {
            doc.has_nodes = true;
            for &r in &sets.node_refs {
                let mut node_doc = NodeDoc {
                    idx: r.idx,
                    name: self.node_name(r).to_owned(),
                    flags: self.node_flags(r).serialized(),
                    transform: sets
                        .transforms
                        .index_opt(self.node_component_ref(r, ComponentIdx::Transform)),
                    camera: sets
                        .cameras
                        .index_opt(self.node_component_ref(r, ComponentIdx::Camera)),
                    object: sets
                        .objects
                        .index_opt(self.node_component_ref(r, ComponentIdx::Object)),
                    light: sets
                        .lights
                        .index_opt(self.node_component_ref(r, ComponentIdx::Light)),
                    rigid_body: sets
                        .rigid_bodies
                        .index_opt(self.node_component_ref(r, ComponentIdx::RigidBody)),
                    instance: sets.instances.index_opt(self.node_instance_ref(r)),
                    ..NodeDoc::default()
                };

                if save_flags.contains(LoadSaveFlags::PHYSICS) {
                    for slot in 0..self.node_collision_count(r) {
                        node_doc
                            .collisions
                            .push(sets.collisions.index_opt(self.node_collision_ref(r, slot)));
                    }
                }
                if save_flags.contains(LoadSaveFlags::SCRIPTS) {
                    for slot in 0..self.node_script_count(r) {
                        node_doc
                            .scripts
                            .push(sets.scripts.index_opt(self.node_script_ref(r, slot)));
                    }
                }

                doc.nodes.push(node_doc);
            }
        }

        if save_flags.contains(LoadSaveFlags::SCENE) {
            doc.scene = Some(SceneGlobalsDoc {
                current_camera: if save_flags.contains(LoadSaveFlags::NODES) {
                    opt_index(self.current_camera().idx)
                } else {
                    None
                },
                ambient: self.environment.ambient,
                fog_near: self.environment.fog_near,
                fog_far: self.environment.fog_far,
                fog_color: self.environment.fog_color,
                irradiance_map: resources
                    .texture_name(self.environment.irradiance_map)
                    .unwrap_or("")
                    .to_owned(),
                radiance_map: resources
                    .texture_name(self.environment.radiance_map)
                    .unwrap_or("")
                    .to_owned(),
                brdf_map: resources
                    .texture_name(self.environment.brdf_map)
                    .unwrap_or("")
                    .to_owned(),
                canvas_clear_z: self.canvas.clear_z,
                canvas_clear_color: self.canvas.clear_color,
                canvas_color: self.canvas.color,
                scene_scripts: self
                    .scene_scripts()
                    .iter()
                    .filter_map(|&cref| sets.scripts.index_opt(cref))
                    .collect(),
            });
        }

        if save_flags.contains(LoadSaveFlags::ANIMS) {
            doc.has_anims = true;
            for (r, anim) in self.iter_saved_anims() {
                doc.anims.push(AnimDoc {
                    idx: r.idx,
                    anim: anim.clone(),
                });
            }
            for (_, scene_anim) in self.iter_saved_scene_anims() {
                doc.scene_anims.push(SceneAnimDoc {
                    name: scene_anim.name.clone(),
                    t_start: scene_anim.t_start,
                    t_end: scene_anim.t_end,
                    anim: opt_index(scene_anim.scene_anim.idx),
                    frame_duration: scene_anim.frame_duration,
                    node_anims: scene_anim
                        .node_anims
                        .iter()
                        .map(|na| NodeAnimDoc {
                            node: na.node.idx,
                            anim: na.anim.idx,
                        })
                        .collect(),
                });
            }
        }

        if save_flags.contains(LoadSaveFlags::KEY_VALUES) {
            for key in self.get_keys() {
                doc.key_values
                    .insert(key.clone(), self.get_value(&key).to_owned());
            }
        }

        serde_json::to_writer_pretty(w, &doc)?;
        Ok(())
    }

    /// Loads a JSON scene document, merging into this scene. Behaves like
    /// [`Scene::load_binary`] with respect to flags, remapping and instance
    /// setup.
    pub fn load_json(
        &mut self,
        data: &[u8],
        name: &str,
        provider: &dyn ReadProvider,
        resources: &mut dyn ResourceCache,
        ctx: &mut LoadContext,
        load_flags: LoadSaveFlags,
    ) -> Result<()> {
        let doc: SceneDoc = serde_json::from_slice(data)
            .map_err(|e| {
                log::error!("Cannot load scene '{name}': {e}");
                SceneError::Json(e)
            })?;

        let model_policy = if load_flags.contains(LoadSaveFlags::DO_NOT_LOAD_RESOURCES) {
            LoadPolicy::NameOnly
        } else if load_flags.contains(LoadSaveFlags::QUEUE_MODEL_LOADS) {
            LoadPolicy::Queue
        } else {
            LoadPolicy::Now
        };
        let texture_policy = if load_flags.contains(LoadSaveFlags::DO_NOT_LOAD_RESOURCES) {
            LoadPolicy::NameOnly
        } else if load_flags.contains(LoadSaveFlags::QUEUE_TEXTURE_LOADS) {
            LoadPolicy::Queue
        } else {
            LoadPolicy::Now
        };

        let to_placeholder = |idx: Option<u32>| -> GenRef {
            idx.map_or(GenRef::INVALID, |idx| GenRef { idx, gen: 0 })
        };

        let transform_refs: Vec<ComponentRef> = doc
            .transforms
            .iter()
            .map(|trs| {
                self.create_transform(crate::scene::Transform {
                    pos: trs.pos,
                    rot: trs.rot,
                    scale: trs.scale,
                    parent: to_placeholder(trs.parent),
                })
            })
            .collect();

        let camera_refs: Vec<ComponentRef> = doc
            .cameras
            .iter()
            .map(|camera| self.create_camera(*camera))
            .collect();

        let object_refs: Vec<ComponentRef> = doc
            .objects
            .iter()
            .map(|object| {
                let model = if object.model.is_empty() {
                    GenRef::INVALID
                } else {
                    resources.load_model(&object.model, model_policy)
                };
                self.create_object(crate::scene::Object {
                    model,
                    materials: object.materials.clone(),
                    material_names: object.material_names.clone(),
                    bones: object.bones.iter().map(|&b| to_placeholder(b)).collect(),
                })
            })
            .collect();

        let light_refs: Vec<ComponentRef> = doc
            .lights
            .iter()
            .map(|light| self.create_light(*light))
            .collect();

        let rigid_body_refs: Vec<ComponentRef> = doc
            .rigid_bodies
            .iter()
            .map(|body| self.create_rigid_body(*body))
            .collect();

        let collision_refs: Vec<ComponentRef> = doc
            .collisions
            .iter()
            .map(|collision| self.create_collision(collision.clone()))
            .collect();

        let script_refs: Vec<ComponentRef> = doc
            .scripts
            .iter()
            .map(|script| {
                let cref = self.create_script(script.path.clone());
                if let Some(live) = self.script_mut(cref) {
                    live.params = script.params.clone();
                }
                cref
            })
            .collect();

        let instance_refs: Vec<ComponentRef> = doc
            .instances
            .iter()
            .map(|instance| {
                let cref = self.create_instance(instance.path.clone());
                if let Some(live) = self.instance_mut(cref) {
                    live.on_instantiate_anim = instance.on_instantiate_anim.clone();
                    live.loop_mode = instance.loop_mode;
                }
                cref
            })
            .collect();

        let at = |refs: &[ComponentRef], idx: Option<u32>| -> ComponentRef {
            idx.and_then(|idx| refs.get(idx as usize).copied())
                .unwrap_or(GenRef::INVALID)
        };

        let mut nodes_to_disable: Vec<NodeRef> = Vec::new();
        let mut nodes_with_instance: Vec<NodeRef> = Vec::new();

        for node_doc in &doc.nodes {
            let node_ref = self.create_node(node_doc.name.clone());
            ctx.node_refs.insert(node_doc.idx, node_ref);
            ctx.view.nodes.push(node_ref);

            if node_doc.flags & NodeFlags::DISABLED.bits() != 0 {
                nodes_to_disable.push(node_ref);
            }

            self.set_node_component(
                node_ref,
                ComponentIdx::Transform,
                at(&transform_refs, node_doc.transform),
            );
            self.set_node_component(
                node_ref,
                ComponentIdx::Camera,
                at(&camera_refs, node_doc.camera),
            );
            self.set_node_component(
                node_ref,
                ComponentIdx::Object,
                at(&object_refs, node_doc.object),
            );
            self.set_node_component(
                node_ref,
                ComponentIdx::Light,
                at(&light_refs, node_doc.light),
            );
            self.set_node_component(
                node_ref,
                ComponentIdx::RigidBody,
                at(&rigid_body_refs, node_doc.rigid_body),
            );

            for (slot, &idx) in node_doc.collisions.iter().enumerate() {
                self.set_node_collision(node_ref, slot, at(&collision_refs, idx));
            }
            for (slot, &idx) in node_doc.scripts.iter().enumerate() {
                self.set_node_script(node_ref, slot, at(&script_refs, idx));
            }

            let instance_ref = at(&instance_refs, node_doc.instance);
            if !instance_ref.is_invalid() {
                self.set_node_instance(node_ref, instance_ref);
                nodes_with_instance.push(node_ref);
            }
        }

        if !load_flags.contains(LoadSaveFlags::DO_NOT_LOAD_RESOURCES) {
            let option_bits = load_flags
                & (LoadSaveFlags::QUEUE_TEXTURE_LOADS
                    | LoadSaveFlags::QUEUE_MODEL_LOADS
                    | LoadSaveFlags::DO_NOT_LOAD_RESOURCES);
            for &node_ref in &nodes_with_instance {
                self.node_setup_instance(
                    node_ref,
                    provider,
                    resources,
                    LoadSaveFlags::ALL_NODE_FEATURES | option_bits,
                    ctx.recursion_level + 1,
                );
                self.node_start_on_instantiate_anim(node_ref);
            }
        }

        // fix-up pass: parents and bones were saved node indices
        for &cref in &transform_refs {
            if let Some(trs) = self.transform_mut(cref) {
                if !trs.parent.is_invalid() {
                    trs.parent = ctx
                        .node_refs
                        .get(&trs.parent.idx)
                        .copied()
                        .unwrap_or(GenRef::INVALID);
                }
            }
        }
        for &cref in &object_refs {
            let mapped: Option<Vec<NodeRef>> = self.object(cref).map(|object| {
                object
                    .bones
                    .iter()
                    .map(|bone| {
                        if bone.is_invalid() {
                            GenRef::INVALID
                        } else {
                            ctx.node_refs
                                .get(&bone.idx)
                                .copied()
                                .unwrap_or(GenRef::INVALID)
                        }
                    })
                    .collect()
            });
            if let Some(bones) = mapped {
                if let Some(object) = self.object_mut(cref) {
                    object.bones = bones;
                }
            }
        }

        if let Some(globals) = &doc.scene {
            if load_flags.contains(LoadSaveFlags::SCENE) {
                if load_flags.contains(LoadSaveFlags::NODES) {
                    if let Some(camera_idx) = globals.current_camera {
                        if let Some(&camera_ref) = ctx.node_refs.get(&camera_idx) {
                            self.set_current_camera(camera_ref);
                        }
                    }
                }

                self.environment.ambient = globals.ambient;
                self.environment.fog_near = globals.fog_near;
                self.environment.fog_far = globals.fog_far;
                self.environment.fog_color = globals.fog_color;

                let load_map = |resources: &mut dyn ResourceCache, name: &str| {
                    if name.is_empty() {
                        GenRef::INVALID
                    } else {
                        resources.load_texture(name, 0, texture_policy)
                    }
                };
                self.environment.irradiance_map = load_map(resources, &globals.irradiance_map);
                self.environment.radiance_map = load_map(resources, &globals.radiance_map);
                self.environment.brdf_map = load_map(resources, &globals.brdf_map);

                self.canvas.clear_z = globals.canvas_clear_z;
                self.canvas.clear_color = globals.canvas_clear_color;
                self.canvas.color = globals.canvas_color;

                for &idx in &globals.scene_scripts {
                    let cref = at(&script_refs, Some(idx));
                    if !cref.is_invalid() {
                        self.add_scene_script(cref);
                    }
                }
            }
        }

        if load_flags.contains(LoadSaveFlags::ANIMS) {
            let mut anim_map: rustc_hash::FxHashMap<u32, GenRef> =
                rustc_hash::FxHashMap::default();

            for anim_doc in &doc.anims {
                let anim_ref = self.add_anim(anim_doc.anim.clone());
                ctx.view.anims.push(anim_ref);
                anim_map.insert(anim_doc.idx, anim_ref);
            }

            for scene_anim_doc in &doc.scene_anims {
                let mut scene_anim = SceneAnim {
                    name: scene_anim_doc.name.clone(),
                    t_start: scene_anim_doc.t_start,
                    t_end: scene_anim_doc.t_end,
                    frame_duration: scene_anim_doc.frame_duration,
                    ..SceneAnim::default()
                };

                scene_anim.scene_anim = scene_anim_doc
                    .anim
                    .and_then(|idx| anim_map.get(&idx).copied())
                    .unwrap_or(GenRef::INVALID);

                for na in &scene_anim_doc.node_anims {
                    let node = ctx.node_refs.get(&na.node);
                    let anim = anim_map.get(&na.anim);
                    if let (Some(&node), Some(&anim)) = (node, anim) {
                        scene_anim.node_anims.push(NodeAnim { node, anim });
                    }
                }

                let scene_anim_ref = self.add_scene_anim(scene_anim);
                ctx.view.scene_anims.push(scene_anim_ref);
            }
        }

        if load_flags.contains(LoadSaveFlags::KEY_VALUES) {
            for (key, value) in &doc.key_values {
                self.set_value(key.clone(), value.clone());
            }
        }

        for &node_ref in &nodes_to_disable {
            self.disable_node(node_ref);
        }

        self.ready_world_matrices();
        self.compute_world_matrices();

        log::debug!("Loaded scene '{name}'");
        Ok(())
    }
}
