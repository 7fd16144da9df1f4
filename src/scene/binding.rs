//! Animation binding and evaluation.
//!
//! Binding resolves a track's named target ("Position",
//! "Light.DiffuseIntensity", `Material.<slot>.<name>`, ...) to a fixed slot
//! in a per-value-kind lookup table, once, so per-tick evaluation never
//! compares strings. Material value targets are the one open-ended case and
//! bind to a variable-length triple list. Evaluation samples the bound
//! tracks and writes the results straight into live components.

use glam::{Quat, Vec3, Vec4};

use crate::anim::tracks::{evaluate, evaluate_step};
use crate::anim::{AnimFlags, InstanceAnimKey, LoopMode};
use crate::registry::GenRef;
use crate::scene::node::ComponentIdx;
use crate::scene::{AnimRef, NodeRef, Scene, SceneAnimRef};

// Node track table slots.
const NB_ENABLE: usize = 0;
const NB_COUNT: usize = 1;

const NF_LIGHT_DIFFUSE_INTENSITY: usize = 0;
const NF_LIGHT_SPECULAR_INTENSITY: usize = 1;
const NF_CAMERA_FOV: usize = 2;
const NF_COUNT: usize = 3;

const NV3_POSITION: usize = 0;
const NV3_ROTATION: usize = 1;
const NV3_SCALE: usize = 2;
const NV3_COUNT: usize = 3;

const NQ_ROTATION: usize = 0;
const NQ_COUNT: usize = 1;

const NC_LIGHT_DIFFUSE: usize = 0;
const NC_LIGHT_SPECULAR: usize = 1;
const NC_COUNT: usize = 2;

// Scene track table slots.
const SF_FOG_NEAR: usize = 0;
const SF_FOG_FAR: usize = 1;
const SF_COUNT: usize = 2;

const SC_FOG_COLOR: usize = 0;
const SC_AMBIENT_COLOR: usize = 1;
const SC_COUNT: usize = 2;

/// Bound `Material.<slot>.<name>` vec4 track.
#[derive(Debug, Clone)]
pub struct BoundMaterialTrack {
    pub track_idx: usize,
    pub slot_idx: usize,
    pub value_name: String,
}

/// Rebinding cache for the instance-anim track: the nested bound animation
/// is resolved again only when the active keyframe changes.
#[derive(Debug, Clone, Default)]
struct InstanceAnimCursor {
    kf: i32,
    bound: Option<Box<SceneBoundAnim>>,
}

/// Animation bound to one node: per-kind track tables resolved to indices.
#[derive(Debug, Clone, Default)]
pub struct BoundNodeAnim {
    pub node: NodeRef,
    pub anim: AnimRef,

    bool_track: [Option<usize>; NB_COUNT],
    float_track: [Option<usize>; NF_COUNT],
    vec3_track: [Option<usize>; NV3_COUNT],
    quat_track: [Option<usize>; NQ_COUNT],
    color_track: [Option<usize>; NC_COUNT],

    mat_value_tracks: Vec<BoundMaterialTrack>,

    instance_cursor: Option<InstanceAnimCursor>,
}

/// Animation bound to the scene globals.
#[derive(Debug, Clone, Default)]
pub struct BoundSceneAnim {
    pub anim: AnimRef,

    float_track: [Option<usize>; SF_COUNT],
    color_track: [Option<usize>; SC_COUNT],
}

/// Fully bound scene animation: globals plus every node anim.
#[derive(Debug, Clone, Default)]
pub struct SceneBoundAnim {
    pub bound_scene_anim: BoundSceneAnim,
    pub bound_node_anims: Vec<BoundNodeAnim>,
}

/// Parses `Material.<slot-index>.<value-name>`.
fn split_material_property_name(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("Material.")?;
    let (slot, value) = rest.split_once('.')?;
    if value.is_empty() {
        return None;
    }
    Some((slot.parse().ok()?, value))
}

impl Scene {
    /// Resolves a scene-global animation's track names to table slots.
    #[must_use]
    pub fn bind_scene_anim(&self, anim_ref: AnimRef) -> BoundSceneAnim {
        let Some(anim) = self.anims.get(anim_ref) else {
            log::warn!("Invalid animation");
            return BoundSceneAnim::default();
        };

        let mut bound = BoundSceneAnim {
            anim: anim_ref,
            ..BoundSceneAnim::default()
        };

        for (i, track) in anim.float_tracks.iter().enumerate() {
            match track.target.as_str() {
                "FogNear" => bound.float_track[SF_FOG_NEAR] = Some(i),
                "FogFar" => bound.float_track[SF_FOG_FAR] = Some(i),
                _ => {}
            }
        }

        for (i, track) in anim.color_tracks.iter().enumerate() {
            match track.target.as_str() {
                "FogColor" => bound.color_track[SC_FOG_COLOR] = Some(i),
                "AmbientColor" => bound.color_track[SC_AMBIENT_COLOR] = Some(i),
                _ => {}
            }
        }

        bound
    }

    /// Resolves a node animation's track names to table slots.
    #[must_use]
    pub fn bind_node_anim(&self, node_ref: NodeRef, anim_ref: AnimRef) -> BoundNodeAnim {
        let Some(anim) = self.anims.get(anim_ref) else {
            log::warn!("Invalid animation");
            return BoundNodeAnim::default();
        };

        let mut bound = BoundNodeAnim {
            node: node_ref,
            anim: anim_ref,
            ..BoundNodeAnim::default()
        };

        for (i, track) in anim.bool_tracks.iter().enumerate() {
            if track.target == "Enable" {
                bound.bool_track[NB_ENABLE] = Some(i);
            }
        }

        for (i, track) in anim.float_tracks.iter().enumerate() {
            match track.target.as_str() {
                "Light.DiffuseIntensity" => {
                    bound.float_track[NF_LIGHT_DIFFUSE_INTENSITY] = Some(i);
                }
                "Light.SpecularIntensity" => {
                    bound.float_track[NF_LIGHT_SPECULAR_INTENSITY] = Some(i);
                }
                "Camera.Fov" => bound.float_track[NF_CAMERA_FOV] = Some(i),
                _ => {}
            }
        }

        for (i, track) in anim.vec3_tracks.iter().enumerate() {
            match track.target.as_str() {
                "Position" => bound.vec3_track[NV3_POSITION] = Some(i),
                "Rotation" => bound.vec3_track[NV3_ROTATION] = Some(i),
                "Scale" => bound.vec3_track[NV3_SCALE] = Some(i),
                _ => {}
            }
        }

        for (i, track) in anim.vec4_tracks.iter().enumerate() {
            if let Some((slot_idx, value_name)) = split_material_property_name(&track.target) {
                bound.mat_value_tracks.push(BoundMaterialTrack {
                    track_idx: i,
                    slot_idx,
                    value_name: value_name.to_owned(),
                });
            }
        }

        for (i, track) in anim.quat_tracks.iter().enumerate() {
            if track.target == "Rotation" {
                bound.quat_track[NQ_ROTATION] = Some(i);
            }
        }

        for (i, track) in anim.color_tracks.iter().enumerate() {
            match track.target.as_str() {
                "Light.Diffuse" => bound.color_track[NC_LIGHT_DIFFUSE] = Some(i),
                "Light.Specular" => bound.color_track[NC_LIGHT_SPECULAR] = Some(i),
                _ => {}
            }
        }

        if !anim.instance_anim_track.keys.is_empty() {
            bound.instance_cursor = Some(InstanceAnimCursor {
                kf: -1,
                bound: None,
            });
        }

        bound
    }

    /// Binds every animation referenced by a scene anim.
    #[must_use]
    pub fn bind_anim(&self, r: SceneAnimRef) -> SceneBoundAnim {
        let Some(scene_anim) = self.scene_anims.get(r) else {
            log::warn!("Invalid scene animation reference");
            return SceneBoundAnim::default();
        };

        let mut bound = SceneBoundAnim::default();

        if self.anims.is_valid(scene_anim.scene_anim) {
            bound.bound_scene_anim = self.bind_scene_anim(scene_anim.scene_anim);
        }

        for node_anim in &scene_anim.node_anims {
            bound
                .bound_node_anims
                .push(self.bind_node_anim(node_anim.node, node_anim.anim));
        }

        bound
    }

    /// Evaluates a fully bound scene animation at `t`, writing into live
    /// components and scene globals.
    pub fn evaluate_bound_anim(&mut self, bound: &mut SceneBoundAnim, t: f32) {
        self.evaluate_bound_scene_anim(&bound.bound_scene_anim, t);

        for node_bound in &mut bound.bound_node_anims {
            self.evaluate_bound_node_anim(node_bound, t);
        }
    }

    /// Evaluates scene-global tracks at `t`.
    pub fn evaluate_bound_scene_anim(&mut self, bound: &BoundSceneAnim, t: f32) {
        let Some(anim) = self.anims.get(bound.anim) else {
            return;
        };

        let fog_near = bound.float_track[SF_FOG_NEAR]
            .and_then(|i| evaluate(&anim.float_tracks[i], t));
        let fog_far = bound.float_track[SF_FOG_FAR]
            .and_then(|i| evaluate(&anim.float_tracks[i], t));
        let fog_color = bound.color_track[SC_FOG_COLOR]
            .and_then(|i| evaluate(&anim.color_tracks[i], t));
        let ambient = bound.color_track[SC_AMBIENT_COLOR]
            .and_then(|i| evaluate(&anim.color_tracks[i], t));

        if let Some(v) = fog_near {
            self.environment.fog_near = v;
        }
        if let Some(v) = fog_far {
            self.environment.fog_far = v;
        }
        if let Some(v) = fog_color {
            self.environment.fog_color = v;
        }
        if let Some(v) = ambient {
            self.environment.ambient = v;
        }
    }

    /// Evaluates node tracks at `t`, including the nested instance-anim
    /// track.
    pub fn evaluate_bound_node_anim(&mut self, bound: &mut BoundNodeAnim, t: f32) {
        if !self.anims.is_valid(bound.anim) || !self.nodes.is_valid(bound.node) {
            return;
        }

        // Sample every bound track first; component writes follow once the
        // animation borrow ends.
        struct Samples {
            enable: Option<bool>,
            pos: Option<Vec3>,
            rot_euler: Option<Vec3>,
            rot_quat: Option<Quat>,
            scale: Option<Vec3>,
            light_diffuse: Option<Vec4>,
            light_specular: Option<Vec4>,
            light_diffuse_intensity: Option<f32>,
            light_specular_intensity: Option<f32>,
            camera_fov: Option<f32>,
            mat_values: Vec<(usize, Vec4)>, // (mat_value_tracks entry, value)
            instance_key: Option<(i32, f32, InstanceAnimKey)>, // (kf, key time, key)
        }

        let samples = {
            let Some(anim) = self.anims.get(bound.anim) else {
                return;
            };
            let use_quat = anim.flags.contains(AnimFlags::USE_QUATERNION_FOR_ROTATION);

            let mut mat_values = Vec::new();
            for (entry_idx, mat_track) in bound.mat_value_tracks.iter().enumerate() {
                // the anim may have been edited since binding; a vanished
                // track simply stops driving its target
                if let Some(v) = anim
                    .vec4_tracks
                    .get(mat_track.track_idx)
                    .and_then(|track| evaluate(track, t))
                {
                    mat_values.push((entry_idx, v));
                }
            }

            // closest key at or before t, -1 when t precedes every key
            let instance_key = if anim.instance_anim_track.keys.is_empty() {
                None
            } else {
                let keys = &anim.instance_anim_track.keys;
                let mut kf = keys.len() as i32 - 1;
                while kf >= 0 && t < keys[kf as usize].t {
                    kf -= 1;
                }
                if kf >= 0 {
                    let key = &keys[kf as usize];
                    Some((kf, key.t, key.v.clone()))
                } else {
                    Some((-1, 0.0, InstanceAnimKey::default()))
                }
            };

            let sample_vec3 = |slot: Option<usize>| {
                slot.and_then(|i| anim.vec3_tracks.get(i))
                    .and_then(|track| evaluate(track, t))
            };
            let sample_float = |slot: Option<usize>| {
                slot.and_then(|i| anim.float_tracks.get(i))
                    .and_then(|track| evaluate(track, t))
            };
            let sample_color = |slot: Option<usize>| {
                slot.and_then(|i| anim.color_tracks.get(i))
                    .and_then(|track| evaluate(track, t))
            };

            Samples {
                enable: bound.bool_track[NB_ENABLE]
                    .and_then(|i| anim.bool_tracks.get(i))
                    .and_then(|track| evaluate_step(track, t)),
                pos: sample_vec3(bound.vec3_track[NV3_POSITION]),
                rot_euler: if use_quat {
                    None
                } else {
                    sample_vec3(bound.vec3_track[NV3_ROTATION])
                },
                rot_quat: if use_quat {
                    bound.quat_track[NQ_ROTATION]
                        .and_then(|i| anim.quat_tracks.get(i))
                        .and_then(|track| evaluate(track, t))
                } else {
                    None
                },
                scale: sample_vec3(bound.vec3_track[NV3_SCALE]),
                light_diffuse: sample_color(bound.color_track[NC_LIGHT_DIFFUSE]),
                light_specular: sample_color(bound.color_track[NC_LIGHT_SPECULAR]),
                light_diffuse_intensity: sample_float(bound.float_track[NF_LIGHT_DIFFUSE_INTENSITY]),
                light_specular_intensity: sample_float(bound.float_track[NF_LIGHT_SPECULAR_INTENSITY]),
                camera_fov: sample_float(bound.float_track[NF_CAMERA_FOV]),
                mat_values,
                instance_key,
            }
        };

        if let Some(enable) = samples.enable {
            if enable {
                self.enable_node(bound.node);
            } else {
                self.disable_node(bound.node);
            }
        }

        let trs_ref = self.node_component_ref(bound.node, ComponentIdx::Transform);
        if let Some(trs) = self.transforms.get_mut(trs_ref) {
            if let Some(pos) = samples.pos {
                trs.pos = pos;
            }
            if let Some(rot) = samples.rot_euler {
                trs.rot = rot;
            }
            if let Some(quat) = samples.rot_quat {
                // slerp output is not exactly unit length; normalize before
                // converting
                let (x, y, z) = quat.normalize().to_euler(glam::EulerRot::XYZ);
                trs.rot = Vec3::new(x, y, z);
            }
            if let Some(scale) = samples.scale {
                trs.scale = scale;
            }
        }

        let light_ref = self.node_component_ref(bound.node, ComponentIdx::Light);
        if let Some(light) = self.lights.get_mut(light_ref) {
            if let Some(v) = samples.light_diffuse {
                light.diffuse = v;
            }
            if let Some(v) = samples.light_specular {
                light.specular = v;
            }
            if let Some(v) = samples.light_diffuse_intensity {
                light.diffuse_intensity = v;
            }
            if let Some(v) = samples.light_specular_intensity {
                light.specular_intensity = v;
            }
        }

        let camera_ref = self.node_component_ref(bound.node, ComponentIdx::Camera);
        if let Some(camera) = self.cameras.get_mut(camera_ref) {
            if let Some(v) = samples.camera_fov {
                camera.fov = v;
            }
        }

        if !samples.mat_values.is_empty() {
            let object_ref = self.node_component_ref(bound.node, ComponentIdx::Object);
            if let Some(object) = self.objects.get_mut(object_ref) {
                for (entry_idx, v) in samples.mat_values {
                    let mat_track = &bound.mat_value_tracks[entry_idx];
                    let Some(material) = object.materials.get_mut(mat_track.slot_idx) else {
                        continue; // invalid material slot
                    };
                    // only update values the material actually declares
                    if let Some(value) = material.values.get_mut(&mat_track.value_name) {
                        *value = v;
                    }
                }
            }
        }

        if let Some((kf, key_t, key)) = samples.instance_key {
            self.evaluate_instance_anim_key(bound, t, kf, key_t, &key);
        }
    }

    /// Resolves and evaluates the nested animation named by the active
    /// instance-anim key, rebinding only when the key index changes.
    fn evaluate_instance_anim_key(
        &mut self,
        bound: &mut BoundNodeAnim,
        t: f32,
        kf: i32,
        key_t: f32,
        key: &InstanceAnimKey,
    ) {
        if !self.node_instance_view.contains_key(&bound.node) {
            return;
        }
        let Some(cursor) = bound.instance_cursor.as_mut() else {
            return;
        };

        if kf != cursor.kf {
            let nested_ref = if kf >= 0 {
                self.node_instance_view
                    .get(&bound.node)
                    .map_or(GenRef::INVALID, |view| {
                        view.get_scene_anim(self, &key.anim_name)
                    })
            } else {
                GenRef::INVALID
            };

            cursor.bound = if nested_ref.is_invalid() {
                None
            } else {
                Some(Box::new(self.bind_anim(nested_ref)))
            };
        }
        cursor.kf = kf;

        let Some(mut nested) = cursor.bound.take() else {
            return;
        };

        let mut sub_t = (t - key_t) * key.t_scale;

        // negative time scale and looping both need the target anim range
        if key.t_scale < 0.0 || key.loop_mode == LoopMode::Loop {
            let nested_range = self
                .node_instance_view
                .get(&bound.node)
                .map(|view| view.get_scene_anim(self, &key.anim_name))
                .and_then(|r| self.scene_anims.get(r))
                .map(|a| (a.t_start, a.t_end));

            if let Some((t_start, t_end)) = nested_range {
                if key.t_scale < 0.0 {
                    sub_t += t_end;
                }
                if key.loop_mode == LoopMode::Loop && t_end > t_start {
                    if key.t_scale >= 0.0 {
                        while sub_t >= t_end {
                            sub_t -= t_end - t_start;
                        }
                    } else {
                        while sub_t <= t_start {
                            sub_t += t_end - t_start;
                        }
                    }
                }
            }
        }

        self.evaluate_bound_anim(&mut nested, sub_t);

        if let Some(cursor) = bound.instance_cursor.as_mut() {
            cursor.bound = Some(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_property_name_parsing() {
        assert_eq!(
            split_material_property_name("Material.2.uDiffuse"),
            Some((2, "uDiffuse"))
        );
        assert_eq!(split_material_property_name("Material.x.uDiffuse"), None);
        assert_eq!(split_material_property_name("Material.3."), None);
        assert_eq!(split_material_property_name("Position"), None);
    }
}
