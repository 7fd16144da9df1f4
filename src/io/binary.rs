//! Versioned binary scene format.
//!
//! Layout: magic, marker byte, version, save-flag bitmask, then the
//! component pool sections in fixed order (Transform, Camera, Object,
//! Light, RigidBody and Collision under the PHYSICS flag, Script under
//! SCRIPTS, Instance), the node section, scene globals, a byte-length
//! prefixed animation section and the key/value section. Components are
//! de-duplicated into per-kind ordered sets and nodes reference them by
//! set index, so the file is self-contained and independent of runtime
//! slot numbering. Node-to-node references (transform parents, bones) are
//! written as saved node indices and rewritten in a second fix-up pass on
//! load, after every node exists.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use rustc_hash::FxHashMap;

use crate::anim::{
    Anim, AnimFlags, AnimKey, AnimTrack, InstanceAnimKey, LoopMode, NodeAnim, SceneAnim,
};
use crate::errors::{Result, SceneError};
use crate::io::wire::{
    read_bool, read_f32, read_i32, read_quat, read_string, read_u16, read_u32, read_u8, read_vec3,
    read_vec4, skip, skip_string, write_bool, write_f32, write_i32, write_quat, write_string,
    write_u16, write_u32, write_u8, write_vec3, write_vec4,
};
use crate::registry::GenRef;
use crate::resources::{LoadPolicy, ReadProvider, ResourceCache};
use crate::scene::{
    BlendMode, Camera, CameraZRange, Collision, CollisionType, ComponentIdx, ComponentRef,
    Instance, Light, LightShadowType, LightType, LoadContext, LoadSaveFlags, Material, NodeFlags,
    NodeRef, Object, RigidBody, RigidBodyType, Scene, Script, ScriptParam, Transform,
};

/// "NACR" in little-endian byte order.
pub const SCENE_MAGIC: u32 = 0x5243_414E;
/// Marker byte distinguishing scene files from other engine formats.
pub const SCENE_MARKER: u8 = 0x53;
/// Exact version this build reads and writes; any other value aborts a load.
pub const SCENE_BINARY_FORMAT_VERSION: u32 = 1;

const NO_INDEX: u32 = u32::MAX;

fn resource_policy(flags: LoadSaveFlags, queue_bit: LoadSaveFlags) -> LoadPolicy {
    if flags.contains(LoadSaveFlags::DO_NOT_LOAD_RESOURCES) {
        LoadPolicy::NameOnly
    } else if flags.contains(queue_bit) {
        LoadPolicy::Queue
    } else {
        LoadPolicy::Now
    }
}

// ============================================================================
// Component payloads
// ============================================================================

fn save_transform(w: &mut impl Write, trs: &Transform) -> Result<()> {
    write_vec3(w, trs.pos)?;
    write_vec3(w, trs.rot)?;
    write_vec3(w, trs.scale)?;
    write_u32(w, trs.parent.idx)?; // saved node index, fixed up on load
    Ok(())
}

/// Saved node indices stand in for node references until the fix-up pass;
/// the no-parent sentinel maps straight to the invalid reference.
fn placeholder_node_ref(idx: u32) -> GenRef {
    if idx == NO_INDEX {
        GenRef::INVALID
    } else {
        GenRef { idx, gen: 0 }
    }
}

fn load_transform(r: &mut impl Read) -> Result<Transform> {
    Ok(Transform {
        pos: read_vec3(r)?,
        rot: read_vec3(r)?,
        scale: read_vec3(r)?,
        parent: placeholder_node_ref(read_u32(r)?),
    })
}

fn save_camera(w: &mut impl Write, camera: &Camera) -> Result<()> {
    write_f32(w, camera.zrange.znear)?;
    write_f32(w, camera.zrange.zfar)?;
    write_f32(w, camera.fov)?;
    write_bool(w, camera.ortho)?;
    write_f32(w, camera.size)?;
    Ok(())
}

fn load_camera(r: &mut impl Read) -> Result<Camera> {
    Ok(Camera {
        zrange: CameraZRange {
            znear: read_f32(r)?,
            zfar: read_f32(r)?,
        },
        fov: read_f32(r)?,
        ortho: read_bool(r)?,
        size: read_f32(r)?,
    })
}

fn save_material(w: &mut impl Write, material: &Material) -> Result<()> {
    write_u8(w, material.blend.to_u8())?;
    let mut names: Vec<&String> = material.values.keys().collect();
    names.sort();
    write_u16(w, names.len() as u16)?;
    for name in names {
        write_string(w, name)?;
        write_vec4(w, material.values[name])?;
    }
    Ok(())
}

fn load_material(r: &mut impl Read) -> Result<Material> {
    let blend = BlendMode::from_u8(read_u8(r)?);
    let count = read_u16(r)?;
    let mut values = FxHashMap::default();
    for _ in 0..count {
        let name = read_string(r)?;
        let value = read_vec4(r)?;
        values.insert(name, value);
    }
    Ok(Material { blend, values })
}

fn save_object(w: &mut impl Write, object: &Object, resources: &dyn ResourceCache) -> Result<()> {
    write_string(w, resources.model_name(object.model).unwrap_or(""))?;

    write_u16(w, object.materials.len() as u16)?;
    for material in &object.materials {
        save_material(w, material)?;
    }
    for slot in 0..object.materials.len() {
        write_string(w, object.material_names.get(slot).map_or("", String::as_str))?;
    }

    write_u16(w, object.bones.len() as u16)?;
    for bone in &object.bones {
        write_u32(w, bone.idx)?; // saved node index, fixed up on load
    }
    Ok(())
}

fn load_object(
    r: &mut impl Read,
    resources: &mut dyn ResourceCache,
    flags: LoadSaveFlags,
) -> Result<Object> {
    let model_name = read_string(r)?;
    let model = if model_name.is_empty() {
        GenRef::INVALID
    } else {
        resources.load_model(
            &model_name,
            resource_policy(flags, LoadSaveFlags::QUEUE_MODEL_LOADS),
        )
    };

    let mat_count = read_u16(r)? as usize;
    let mut materials = Vec::with_capacity(mat_count);
    for _ in 0..mat_count {
        materials.push(load_material(r)?);
    }
    let mut material_names = Vec::with_capacity(mat_count);
    for _ in 0..mat_count {
        material_names.push(read_string(r)?);
    }

    let bone_count = read_u16(r)? as usize;
    let mut bones = Vec::with_capacity(bone_count);
    for _ in 0..bone_count {
        bones.push(placeholder_node_ref(read_u32(r)?));
    }

    Ok(Object {
        model,
        materials,
        material_names,
        bones,
    })
}

fn save_light(w: &mut impl Write, light: &Light) -> Result<()> {
    write_u8(w, light.light_type.to_u8())?;
    write_u8(w, light.shadow_type.to_u8())?;
    write_vec4(w, light.diffuse)?;
    write_f32(w, light.diffuse_intensity)?;
    write_vec4(w, light.specular)?;
    write_f32(w, light.specular_intensity)?;
    write_f32(w, light.radius)?;
    write_f32(w, light.inner_angle)?;
    write_f32(w, light.outer_angle)?;
    write_vec4(w, light.pssm_split)?;
    write_f32(w, light.priority)?;
    write_f32(w, light.shadow_bias)?;
    Ok(())
}

fn load_light(r: &mut impl Read) -> Result<Light> {
    Ok(Light {
        light_type: LightType::from_u8(read_u8(r)?),
        shadow_type: LightShadowType::from_u8(read_u8(r)?),
        diffuse: read_vec4(r)?,
        diffuse_intensity: read_f32(r)?,
        specular: read_vec4(r)?,
        specular_intensity: read_f32(r)?,
        radius: read_f32(r)?,
        inner_angle: read_f32(r)?,
        outer_angle: read_f32(r)?,
        pssm_split: read_vec4(r)?,
        priority: read_f32(r)?,
        shadow_bias: read_f32(r)?,
    })
}

fn save_rigid_body(w: &mut impl Write, body: &RigidBody) -> Result<()> {
    write_u8(w, body.body_type.to_u8())?;
    write_f32(w, body.linear_damping())?;
    write_f32(w, body.angular_damping())?;
    write_f32(w, body.restitution())?;
    write_f32(w, body.friction())?;
    write_f32(w, body.rolling_friction())?;
    Ok(())
}

fn load_rigid_body(r: &mut impl Read) -> Result<RigidBody> {
    let mut body = RigidBody::default();
    body.body_type = RigidBodyType::from_u8(read_u8(r)?);
    body.set_linear_damping(read_f32(r)?);
    body.set_angular_damping(read_f32(r)?);
    body.set_restitution(read_f32(r)?);
    body.set_friction(read_f32(r)?);
    body.set_rolling_friction(read_f32(r)?);
    Ok(body)
}

fn save_collision(w: &mut impl Write, collision: &Collision) -> Result<()> {
    write_u8(w, collision.shape.to_u8())?;
    write_f32(w, collision.mass)?;
    write_string(w, &collision.resource_path)?;
    write_vec3(w, collision.pos)?;
    write_vec3(w, collision.rot)?;
    write_vec3(w, collision.size)?;
    write_f32(w, collision.radius)?;
    write_f32(w, collision.height)?;
    Ok(())
}

fn load_collision(r: &mut impl Read) -> Result<Collision> {
    Ok(Collision {
        shape: CollisionType::from_u8(read_u8(r)?),
        mass: read_f32(r)?,
        resource_path: read_string(r)?,
        pos: read_vec3(r)?,
        rot: read_vec3(r)?,
        size: read_vec3(r)?,
        radius: read_f32(r)?,
        height: read_f32(r)?,
    })
}

fn save_script(w: &mut impl Write, script: &Script) -> Result<()> {
    write_string(w, &script.path)?;

    let mut names: Vec<&String> = script.params.keys().collect();
    names.sort();
    write_u16(w, names.len() as u16)?;
    for name in names {
        write_string(w, name)?;
        match &script.params[name] {
            ScriptParam::Bool(v) => {
                write_u16(w, 0)?;
                write_bool(w, *v)?;
            }
            ScriptParam::Int(v) => {
                write_u16(w, 1)?;
                write_i32(w, *v)?;
            }
            ScriptParam::Float(v) => {
                write_u16(w, 2)?;
                write_f32(w, *v)?;
            }
            ScriptParam::Str(v) => {
                write_u16(w, 3)?;
                write_string(w, v)?;
            }
        }
    }
    Ok(())
}

fn load_script(r: &mut impl Read) -> Result<Script> {
    let path = read_string(r)?;
    let count = read_u16(r)?;
    let mut params = FxHashMap::default();
    for _ in 0..count {
        let name = read_string(r)?;
        let param = match read_u16(r)? {
            0 => ScriptParam::Bool(read_bool(r)?),
            1 => ScriptParam::Int(read_i32(r)?),
            2 => ScriptParam::Float(read_f32(r)?),
            _ => ScriptParam::Str(read_string(r)?),
        };
        params.insert(name, param);
    }
    Ok(Script { path, params })
}

fn save_instance(w: &mut impl Write, instance: &Instance) -> Result<()> {
    write_string(w, &instance.path)?;
    write_string(w, &instance.on_instantiate_anim)?;
    write_u8(w, instance.loop_mode.to_u8())?;
    Ok(())
}

fn load_instance(r: &mut impl Read) -> Result<Instance> {
    Ok(Instance {
        path: read_string(r)?,
        on_instantiate_anim: read_string(r)?,
        loop_mode: LoopMode::from_u8(read_u8(r)?),
        ..Instance::default()
    })
}

// ============================================================================
// Animation payloads
// ============================================================================

fn save_track<W: Write, T>(
    w: &mut W,
    track: &AnimTrack<T>,
    mut write_value: impl FnMut(&mut W, &T) -> Result<()>,
) -> Result<()> {
    write_string(w, &track.target)?;
    write_u32(w, track.keys.len() as u32)?;
    for key in &track.keys {
        write_f32(w, key.t)?;
        write_value(w, &key.v)?;
    }
    Ok(())
}

fn load_track<R: Read, T>(
    r: &mut R,
    mut read_value: impl FnMut(&mut R) -> Result<T>,
) -> Result<AnimTrack<T>> {
    let target = read_string(r)?;
    let count = read_u32(r)?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let t = read_f32(r)?;
        let v = read_value(r)?;
        keys.push(AnimKey { t, v });
    }
    Ok(AnimTrack { target, keys })
}

fn save_tracks<W: Write, T>(
    w: &mut W,
    tracks: &[AnimTrack<T>],
    mut write_value: impl FnMut(&mut W, &T) -> Result<()>,
) -> Result<()> {
    write_u32(w, tracks.len() as u32)?;
    for track in tracks {
        save_track(w, track, &mut write_value)?;
    }
    Ok(())
}

fn load_tracks<R: Read, T>(
    r: &mut R,
    mut read_value: impl FnMut(&mut R) -> Result<T>,
) -> Result<Vec<AnimTrack<T>>> {
    let count = read_u32(r)?;
    let mut tracks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        tracks.push(load_track(r, &mut read_value)?);
    }
    Ok(tracks)
}

pub(crate) fn save_anim(w: &mut impl Write, anim: &Anim) -> Result<()> {
    write_u8(w, anim.flags.bits() & AnimFlags::SERIALIZED_BITS)?;
    write_f32(w, anim.t_start)?;
    write_f32(w, anim.t_end)?;

    save_tracks(w, &anim.bool_tracks, |w, v| Ok(write_bool(w, *v)?))?;
    save_tracks(w, &anim.int_tracks, |w, v| Ok(write_i32(w, *v)?))?;
    save_tracks(w, &anim.float_tracks, |w, v| Ok(write_f32(w, *v)?))?;
    save_tracks(w, &anim.vec2_tracks, |w, v| {
        write_f32(w, v.x)?;
        write_f32(w, v.y)?;
        Ok(())
    })?;
    save_tracks(w, &anim.vec3_tracks, |w, v| Ok(write_vec3(w, *v)?))?;
    save_tracks(w, &anim.vec4_tracks, |w, v| Ok(write_vec4(w, *v)?))?;
    save_tracks(w, &anim.quat_tracks, |w, v| Ok(write_quat(w, *v)?))?;
    save_tracks(w, &anim.color_tracks, |w, v| Ok(write_vec4(w, *v)?))?;
    save_tracks(w, &anim.string_tracks, |w, v| Ok(write_string(w, v)?))?;
    save_track(w, &anim.instance_anim_track, |w, v| {
        write_string(w, &v.anim_name)?;
        write_u8(w, v.loop_mode.to_u8())?;
        write_f32(w, v.t_scale)?;
        Ok(())
    })?;
    Ok(())
}

pub(crate) fn load_anim(r: &mut impl Read) -> Result<Anim> {
    let flags = AnimFlags::from_bits_truncate(read_u8(r)?);
    let t_start = read_f32(r)?;
    let t_end = read_f32(r)?;

    Ok(Anim {
        flags,
        t_start,
        t_end,
        bool_tracks: load_tracks(r, |r| Ok(read_bool(r)?))?,
        int_tracks: load_tracks(r, |r| Ok(read_i32(r)?))?,
        float_tracks: load_tracks(r, |r| Ok(read_f32(r)?))?,
        vec2_tracks: load_tracks(r, |r| {
            Ok(glam::Vec2::new(read_f32(r)?, read_f32(r)?))
        })?,
        vec3_tracks: load_tracks(r, |r| Ok(read_vec3(r)?))?,
        vec4_tracks: load_tracks(r, |r| Ok(read_vec4(r)?))?,
        quat_tracks: load_tracks(r, |r| Ok(read_quat(r)?))?,
        color_tracks: load_tracks(r, |r| Ok(read_vec4(r)?))?,
        string_tracks: load_tracks(r, |r| Ok(read_string(r)?))?,
        instance_anim_track: load_track(r, |r| {
            Ok(InstanceAnimKey {
                anim_name: read_string(r)?,
                loop_mode: LoopMode::from_u8(read_u8(r)?),
                t_scale: read_f32(r)?,
            })
        })?,
    })
}

// ============================================================================
// Scene save
// ============================================================================

/// Ordered de-duplicated component set with O(1) index lookup.
pub(crate) struct SavedSet {
    index_of: FxHashMap<ComponentRef, u32>,
    pub(crate) refs: Vec<ComponentRef>,
}

impl SavedSet {
    fn build(set: &BTreeSet<ComponentRef>) -> Self {
        let refs: Vec<ComponentRef> = set.iter().copied().collect();
        let index_of = refs
            .iter()
            .enumerate()
            .map(|(i, &r)| (r, i as u32))
            .collect();
        Self { index_of, refs }
    }

    pub(crate) fn index(&self, r: ComponentRef) -> u32 {
        self.index_of.get(&r).copied().unwrap_or(NO_INDEX)
    }

    /// Like [`Self::index`] but `None` for components outside the set.
    pub(crate) fn index_opt(&self, r: ComponentRef) -> Option<u32> {
        self.index_of.get(&r).copied()
    }
}

/// Everything the node section references, de-duplicated and ordered.
pub(crate) struct SaveSets {
    pub(crate) node_refs: Vec<NodeRef>,
    pub(crate) transforms: SavedSet,
    pub(crate) cameras: SavedSet,
    pub(crate) objects: SavedSet,
    pub(crate) lights: SavedSet,
    pub(crate) rigid_bodies: SavedSet,
    pub(crate) collisions: SavedSet,
    pub(crate) scripts: SavedSet,
    pub(crate) instances: SavedSet,
}

/// Collects the nodes to save (instantiated content excluded) and the
/// per-kind component sets they reference.
pub(crate) fn collect_save_sets(
    scene: &Scene,
    save_flags: LoadSaveFlags,
    nodes_to_save: Option<&[NodeRef]>,
) -> SaveSets {
    let mut node_refs: Vec<NodeRef> = Vec::new();
    if save_flags.contains(LoadSaveFlags::NODES) {
        node_refs = match nodes_to_save {
            Some(refs) => refs.to_vec(),
            None => scene.all_nodes(),
        };
        node_refs.retain(|&r| {
            !scene
                .node_flags(r)
                .contains(NodeFlags::INSTANTIATED)
                && scene.is_valid_node_ref(r)
        });
    }

    let mut used: [BTreeSet<ComponentRef>; 5] = Default::default();
    let mut used_collisions: BTreeSet<ComponentRef> = BTreeSet::new();
    let mut used_scripts: BTreeSet<ComponentRef> = BTreeSet::new();
    let mut used_instances: BTreeSet<ComponentRef> = BTreeSet::new();

    for &r in &node_refs {
        let slots = [
            (
                ComponentIdx::Transform,
                scene.is_valid_transform_ref(scene.node_component_ref(r, ComponentIdx::Transform)),
            ),
            (
                ComponentIdx::Camera,
                scene.is_valid_camera_ref(scene.node_component_ref(r, ComponentIdx::Camera)),
            ),
            (
                ComponentIdx::Object,
                scene.is_valid_object_ref(scene.node_component_ref(r, ComponentIdx::Object)),
            ),
            (
                ComponentIdx::Light,
                scene.is_valid_light_ref(scene.node_component_ref(r, ComponentIdx::Light)),
            ),
            (
                ComponentIdx::RigidBody,
                save_flags.contains(LoadSaveFlags::PHYSICS)
                    && scene
                        .is_valid_rigid_body_ref(scene.node_component_ref(r, ComponentIdx::RigidBody)),
            ),
        ];
        for (slot, valid) in slots {
            if valid {
                used[slot as usize].insert(scene.node_component_ref(r, slot));
            }
        }

        if save_flags.contains(LoadSaveFlags::PHYSICS) {
            for slot in 0..scene.node_collision_count(r) {
                let cref = scene.node_collision_ref(r, slot);
                if scene.is_valid_collision_ref(cref) {
                    used_collisions.insert(cref);
                }
            }
        }

        if save_flags.contains(LoadSaveFlags::SCRIPTS) {
            for slot in 0..scene.node_script_count(r) {
                let cref = scene.node_script_ref(r, slot);
                if scene.is_valid_script_ref(cref) {
                    used_scripts.insert(cref);
                }
            }
        }

        let instance_ref = scene.node_instance_ref(r);
        if scene.is_valid_instance_ref(instance_ref) {
            used_instances.insert(instance_ref);
        }
    }

    if save_flags.contains(LoadSaveFlags::SCENE) {
        for &cref in scene.scene_scripts() {
            if scene.is_valid_script_ref(cref) {
                used_scripts.insert(cref);
            }
        }
    }

    SaveSets {
        node_refs,
        transforms: SavedSet::build(&used[ComponentIdx::Transform as usize]),
        cameras: SavedSet::build(&used[ComponentIdx::Camera as usize]),
        objects: SavedSet::build(&used[ComponentIdx::Object as usize]),
        lights: SavedSet::build(&used[ComponentIdx::Light as usize]),
        rigid_bodies: SavedSet::build(&used[ComponentIdx::RigidBody as usize]),
        collisions: SavedSet::build(&used_collisions),
        scripts: SavedSet::build(&used_scripts),
        instances: SavedSet::build(&used_instances),
    }
}

impl Scene {
    /// Saves the scene. `nodes_to_save` restricts the node section (and the
    /// component de-duplication) to a sub-set; nodes owned by instance
    /// views are never saved.
    pub fn save_binary(
        &self,
        w: &mut impl Write,
        resources: &dyn ResourceCache,
        save_flags: LoadSaveFlags,
        nodes_to_save: Option<&[NodeRef]>,
    ) -> Result<()> {
        write_u32(w, SCENE_MAGIC)?;
        write_u8(w, SCENE_MARKER)?;
        write_u32(w, SCENE_BINARY_FORMAT_VERSION)?;
        write_u32(w, save_flags.sections().bits())?;

        let sets = collect_save_sets(self, save_flags, nodes_to_save);
        let SaveSets {
            node_refs,
            transforms: transform_set,
            cameras: camera_set,
            objects: object_set,
            lights: light_set,
            rigid_bodies: rigid_body_set,
            collisions: collision_set,
            scripts: script_set,
            instances: instance_set,
        } = sets;

        // component pool sections, fixed order
        write_u32(w, transform_set.refs.len() as u32)?;
        for &cref in &transform_set.refs {
            if let Some(trs) = self.transforms.get(cref) {
                save_transform(w, trs)?;
            }
        }

        write_u32(w, camera_set.refs.len() as u32)?;
        for &cref in &camera_set.refs {
            if let Some(camera) = self.cameras.get(cref) {
                save_camera(w, camera)?;
            }
        }

        write_u32(w, object_set.refs.len() as u32)?;
        for &cref in &object_set.refs {
            if let Some(object) = self.objects.get(cref) {
                save_object(w, object, resources)?;
            }
        }

        write_u32(w, light_set.refs.len() as u32)?;
        for &cref in &light_set.refs {
            if let Some(light) = self.lights.get(cref) {
                save_light(w, light)?;
            }
        }

        if save_flags.contains(LoadSaveFlags::PHYSICS) {
            write_u32(w, rigid_body_set.refs.len() as u32)?;
            for &cref in &rigid_body_set.refs {
                if let Some(body) = self.rigid_bodies.get(cref) {
                    save_rigid_body(w, body)?;
                }
            }

            write_u32(w, collision_set.refs.len() as u32)?;
            for &cref in &collision_set.refs {
                if let Some(collision) = self.collisions.get(cref) {
                    save_collision(w, collision)?;
                }
            }
        }

        if save_flags.contains(LoadSaveFlags::SCRIPTS) {
            write_u32(w, script_set.refs.len() as u32)?;
            for &cref in &script_set.refs {
                if let Some(script) = self.scripts.get(cref) {
                    save_script(w, script)?;
                }
            }
        }

        write_u32(w, instance_set.refs.len() as u32)?;
        for &cref in &instance_set.refs {
            if let Some(instance) = self.instances.get(cref) {
                save_instance(w, instance)?;
            }
        }

        // node section
        if save_flags.contains(LoadSaveFlags::NODES) {
            write_u32(w, node_refs.len() as u32)?;

            for &r in &node_refs {
                let Some(node) = self.nodes.get(r) else {
                    continue;
                };

                write_u32(w, r.idx)?;
                write_string(w, &node.name)?;
                write_u32(w, node.flags.serialized())?;

                write_u32(w, transform_set.index(node.component(ComponentIdx::Transform)))?;
                write_u32(w, camera_set.index(node.component(ComponentIdx::Camera)))?;
                write_u32(w, object_set.index(node.component(ComponentIdx::Object)))?;
                write_u32(w, light_set.index(node.component(ComponentIdx::Light)))?;
                write_u32(w, rigid_body_set.index(node.component(ComponentIdx::RigidBody)))?;

                if save_flags.contains(LoadSaveFlags::PHYSICS) {
                    match self.node_collisions.get(&r) {
                        Some(list) => {
                            write_u32(w, list.len() as u32)?;
                            for &cref in list {
                                write_u32(w, collision_set.index(cref))?;
                            }
                        }
                        None => write_u32(w, 0)?,
                    }
                }

                if save_flags.contains(LoadSaveFlags::SCRIPTS) {
                    match self.node_scripts.get(&r) {
                        Some(list) => {
                            write_u32(w, list.len() as u32)?;
                            for &cref in list {
                                write_u32(w, script_set.index(cref))?;
                            }
                        }
                        None => write_u32(w, 0)?,
                    }
                }

                let instance_idx = self
                    .node_instance
                    .get(&r)
                    .map_or(NO_INDEX, |&cref| instance_set.index(cref));
                write_u32(w, instance_idx)?;
            }
        }

        // scene globals
        if save_flags.contains(LoadSaveFlags::SCENE) {
            if save_flags.contains(LoadSaveFlags::NODES) {
                write_u32(w, self.current_camera().idx)?;
            }

            write_vec4(w, self.environment.ambient)?;
            write_f32(w, self.environment.fog_near)?;
            write_f32(w, self.environment.fog_far)?;
            write_vec4(w, self.environment.fog_color)?;

            write_string(w, resources.texture_name(self.environment.irradiance_map).unwrap_or(""))?;
            write_string(w, resources.texture_name(self.environment.radiance_map).unwrap_or(""))?;
            write_string(w, resources.texture_name(self.environment.brdf_map).unwrap_or(""))?;

            write_bool(w, self.canvas.clear_z)?;
            write_bool(w, self.canvas.clear_color)?;
            write_vec4(w, self.canvas.color)?;

            // scene script associations are only meaningful when the script
            // pool section is present
            if save_flags.contains(LoadSaveFlags::SCRIPTS) {
                write_u32(w, self.scene_scripts.len() as u32)?;
                for &cref in &self.scene_scripts {
                    write_u32(w, script_set.index(cref))?;
                }
            } else {
                write_u32(w, 0)?;
            }
        }

        // animations, byte-length prefixed so partial loads can skip
        if save_flags.contains(LoadSaveFlags::ANIMS) {
            let mut section: Vec<u8> = Vec::new();
            self.save_anims_section(&mut section)?;
            write_u32(w, section.len() as u32)?;
            w.write_all(&section)?;
        }

        // key/values
        if save_flags.contains(LoadSaveFlags::KEY_VALUES) {
            let mut keys = self.get_keys();
            keys.sort();
            write_u32(w, keys.len() as u32)?;
            for key in keys {
                write_string(w, &key)?;
                write_string(w, self.get_value(&key))?;
            }
        }

        Ok(())
    }

    fn save_anims_section(&self, w: &mut impl Write) -> Result<()> {
        // anims, instantiated content excluded, referenced by saved index
        let saved_anims: Vec<(GenRef, &Anim)> = self.iter_saved_anims().collect();
        write_u32(w, saved_anims.len() as u32)?;
        for (r, anim) in saved_anims {
            write_u32(w, r.idx)?;
            save_anim(w, anim)?;
        }

        let saved_scene_anims: Vec<(GenRef, &SceneAnim)> =
            self.iter_saved_scene_anims().collect();
        write_u32(w, saved_scene_anims.len() as u32)?;
        for (_, scene_anim) in saved_scene_anims {
            write_string(w, &scene_anim.name)?;
            write_f32(w, scene_anim.t_start)?;
            write_f32(w, scene_anim.t_end)?;
            write_u32(w, scene_anim.scene_anim.idx)?;
            write_f32(w, scene_anim.frame_duration)?;

            write_u32(w, scene_anim.node_anims.len() as u32)?;
            for node_anim in &scene_anim.node_anims {
                write_u32(w, node_anim.node.idx)?;
                write_u32(w, node_anim.anim.idx)?;
            }
        }

        Ok(())
    }

    /// Saves only the listed nodes with physics and script sections.
    pub fn save_nodes_binary(
        &self,
        w: &mut impl Write,
        nodes_to_save: &[NodeRef],
        resources: &dyn ResourceCache,
    ) -> Result<()> {
        self.save_binary(
            w,
            resources,
            LoadSaveFlags::NODES | LoadSaveFlags::PHYSICS | LoadSaveFlags::SCRIPTS,
            Some(nodes_to_save),
        )
    }

    // ========================================================================
    // Scene load
    // ========================================================================

    /// Loads scene content into this scene, merging with what is already
    /// there. On error the scene is left partially populated and must be
    /// discarded by the caller.
    pub fn load_binary(
        &mut self,
        r: &mut impl Read,
        name: &str,
        provider: &dyn ReadProvider,
        resources: &mut dyn ResourceCache,
        ctx: &mut LoadContext,
        load_flags: LoadSaveFlags,
    ) -> Result<()> {
        if read_u32(r)? != SCENE_MAGIC {
            return Err(SceneError::BadMagic(name.to_owned()));
        }
        if read_u8(r)? != SCENE_MARKER {
            return Err(SceneError::BadMarker(name.to_owned()));
        }
        let version = read_u32(r)?;
        if version != SCENE_BINARY_FORMAT_VERSION {
            return Err(SceneError::BadVersion {
                name: name.to_owned(),
                version,
            });
        }

        // what was actually written to this file
        let file_flags = LoadSaveFlags::from_bits_truncate(read_u32(r)?);

        // component pools
        let count = read_u32(r)?;
        let mut transform_refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            transform_refs.push(self.transforms.add(load_transform(r)?));
        }

        let count = read_u32(r)?;
        let mut camera_refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            camera_refs.push(self.cameras.add(load_camera(r)?));
        }

        let count = read_u32(r)?;
        let mut object_refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            object_refs.push(self.objects.add(load_object(r, resources, load_flags)?));
        }

        let count = read_u32(r)?;
        let mut light_refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            light_refs.push(self.lights.add(load_light(r)?));
        }

        let mut rigid_body_refs = Vec::new();
        let mut collision_refs = Vec::new();
        if file_flags.contains(LoadSaveFlags::PHYSICS) {
            let count = read_u32(r)?;
            for _ in 0..count {
                rigid_body_refs.push(self.rigid_bodies.add(load_rigid_body(r)?));
            }

            let count = read_u32(r)?;
            for _ in 0..count {
                collision_refs.push(self.collisions.add(load_collision(r)?));
            }
        }

        let mut script_refs = Vec::new();
        if file_flags.contains(LoadSaveFlags::SCRIPTS) {
            let count = read_u32(r)?;
            for _ in 0..count {
                script_refs.push(self.scripts.add(load_script(r)?));
            }
        }

        let count = read_u32(r)?;
        let mut instance_refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            instance_refs.push(self.instances.add(load_instance(r)?));
        }

        let at = |refs: &[ComponentRef], idx: u32| -> ComponentRef {
            if idx == NO_INDEX {
                GenRef::INVALID
            } else {
                refs.get(idx as usize).copied().unwrap_or(GenRef::INVALID)
            }
        };

        // node section
        let mut nodes_to_disable: Vec<NodeRef> = Vec::new();
        let mut nodes_with_instance: Vec<NodeRef> = Vec::new();

        if file_flags.contains(LoadSaveFlags::NODES) {
            let node_count = read_u32(r)?;
            for _ in 0..node_count {
                let saved_idx = read_u32(r)?;
                let node_ref = self.create_node("");
                ctx.node_refs.insert(saved_idx, node_ref);
                ctx.view.nodes.push(node_ref);

                let node_name = read_string(r)?;
                self.set_node_name(node_ref, node_name);

                let node_flags = read_u32(r)?;
                if node_flags & NodeFlags::DISABLED.bits() != 0 {
                    nodes_to_disable.push(node_ref);
                }

                let transform = at(&transform_refs, read_u32(r)?);
                let camera = at(&camera_refs, read_u32(r)?);
                let object = at(&object_refs, read_u32(r)?);
                let light = at(&light_refs, read_u32(r)?);
                let rigid_body = at(&rigid_body_refs, read_u32(r)?);

                self.set_node_component(node_ref, ComponentIdx::Transform, transform);
                self.set_node_component(node_ref, ComponentIdx::Camera, camera);
                self.set_node_component(node_ref, ComponentIdx::Object, object);
                self.set_node_component(node_ref, ComponentIdx::Light, light);
                self.set_node_component(node_ref, ComponentIdx::RigidBody, rigid_body);

                if file_flags.contains(LoadSaveFlags::PHYSICS) {
                    let collision_count = read_u32(r)?;
                    for slot in 0..collision_count {
                        let cref = at(&collision_refs, read_u32(r)?);
                        self.set_node_collision(node_ref, slot as usize, cref);
                    }
                }

                if file_flags.contains(LoadSaveFlags::SCRIPTS) {
                    let script_count = read_u32(r)?;
                    for slot in 0..script_count {
                        let cref = at(&script_refs, read_u32(r)?);
                        self.set_node_script(node_ref, slot as usize, cref);
                    }
                }

                let instance_idx = read_u32(r)?;
                if instance_idx != NO_INDEX {
                    let cref = at(&instance_refs, instance_idx);
                    if !cref.is_invalid() {
                        self.set_node_instance(node_ref, cref);
                        nodes_with_instance.push(node_ref);
                    }
                }
            }

            // set up instances now that their host nodes exist
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

            // second pass: rewrite parent references recorded as saved
            // indices, now that every node exists
            for &cref in &transform_refs {
                if let Some(trs) = self.transforms.get_mut(cref) {
                    if !trs.parent.is_invalid() {
                        trs.parent = ctx
                            .node_refs
                            .get(&trs.parent.idx)
                            .copied()
                            .unwrap_or(GenRef::INVALID);
                    }
                }
            }

            // and bone references
            for &cref in &object_refs {
                // map indices first to sidestep aliasing the registry borrow
                let mapped: Option<Vec<NodeRef>> = self.objects.get(cref).map(|object| {
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
                if let (Some(bones), Some(object)) = (mapped, self.objects.get_mut(cref)) {
                    object.bones = bones;
                }
            }
        }

        // scene globals
        if file_flags.contains(LoadSaveFlags::SCENE) {
            if load_flags.contains(LoadSaveFlags::SCENE) {
                if file_flags.contains(LoadSaveFlags::NODES) {
                    let camera_idx = read_u32(r)?;
                    if load_flags.contains(LoadSaveFlags::NODES) && camera_idx != NO_INDEX {
                        if let Some(&camera_ref) = ctx.node_refs.get(&camera_idx) {
                            self.set_current_camera(camera_ref);
                        }
                    }
                }

                self.environment.ambient = read_vec4(r)?;
                self.environment.fog_near = read_f32(r)?;
                self.environment.fog_far = read_f32(r)?;
                self.environment.fog_color = read_vec4(r)?;

                let texture_policy =
                    resource_policy(load_flags, LoadSaveFlags::QUEUE_TEXTURE_LOADS);
                for slot in 0..3 {
                    let texture_name = read_string(r)?;
                    let texture = if texture_name.is_empty() {
                        GenRef::INVALID
                    } else {
                        resources.load_texture(&texture_name, 0, texture_policy)
                    };
                    match slot {
                        0 => self.environment.irradiance_map = texture,
                        1 => self.environment.radiance_map = texture,
                        _ => self.environment.brdf_map = texture,
                    }
                }

                self.canvas.clear_z = read_bool(r)?;
                self.canvas.clear_color = read_bool(r)?;
                self.canvas.color = read_vec4(r)?;

                let scene_script_count = read_u32(r)?;
                for _ in 0..scene_script_count {
                    let cref = at(&script_refs, read_u32(r)?);
                    if !cref.is_invalid() {
                        self.add_scene_script(cref);
                    }
                }
            } else {
                // skip the section field-wise
                if file_flags.contains(LoadSaveFlags::NODES) {
                    skip(r, 4)?; // current camera
                }
                skip(r, 16 + 4 + 4 + 16)?; // environment chunk
                skip_string(r)?; // irradiance name
                skip_string(r)?; // radiance name
                skip_string(r)?; // brdf name
                skip(r, 1 + 1 + 16)?; // canvas chunk
                let scene_script_count = read_u32(r)?;
                skip(r, u64::from(scene_script_count) * 4)?;
            }
        }

        // animations
        if file_flags.contains(LoadSaveFlags::ANIMS) {
            let section_len = read_u32(r)?;
            if load_flags.contains(LoadSaveFlags::ANIMS) {
                self.load_anims_section(r, ctx)?;
            } else {
                skip(r, u64::from(section_len))?;
            }
        }

        // key/values
        if file_flags.contains(LoadSaveFlags::KEY_VALUES) {
            let count = read_u32(r)?;
            if load_flags.contains(LoadSaveFlags::KEY_VALUES) {
                for _ in 0..count {
                    let key = read_string(r)?;
                    let value = read_string(r)?;
                    self.set_value(key, value);
                }
            } else {
                for _ in 0..count {
                    skip_string(r)?;
                    skip_string(r)?;
                }
            }
        }

        // deferred so the disable propagates into instantiated content
        for &node_ref in &nodes_to_disable {
            self.disable_node(node_ref);
        }

        self.ready_world_matrices();
        self.compute_world_matrices();

        log::debug!("Loaded scene '{name}'");
        Ok(())
    }

    fn load_anims_section(&mut self, r: &mut impl Read, ctx: &mut LoadContext) -> Result<()> {
        let mut anim_map: FxHashMap<u32, GenRef> = FxHashMap::default();

        let anim_count = read_u32(r)?;
        for _ in 0..anim_count {
            let saved_idx = read_u32(r)?;
            let anim_ref = self.add_anim(load_anim(r)?);
            ctx.view.anims.push(anim_ref);
            anim_map.insert(saved_idx, anim_ref);
        }

        let scene_anim_count = read_u32(r)?;
        for _ in 0..scene_anim_count {
            let mut scene_anim = SceneAnim {
                name: read_string(r)?,
                t_start: read_f32(r)?,
                t_end: read_f32(r)?,
                ..SceneAnim::default()
            };

            let scene_level_idx = read_u32(r)?;
            scene_anim.scene_anim = anim_map
                .get(&scene_level_idx)
                .copied()
                .unwrap_or(GenRef::INVALID);

            scene_anim.frame_duration = read_f32(r)?;

            let node_anim_count = read_u32(r)?;
            for _ in 0..node_anim_count {
                let node_idx = read_u32(r)?;
                let anim_idx = read_u32(r)?;

                let node = ctx.node_refs.get(&node_idx);
                let anim = anim_map.get(&anim_idx);
                if let (Some(&node), Some(&anim)) = (node, anim) {
                    scene_anim.node_anims.push(NodeAnim { node, anim });
                }
            }

            let scene_anim_ref = self.add_scene_anim(scene_anim);
            ctx.view.scene_anims.push(scene_anim_ref);
        }

        Ok(())
    }
}
