//! Component data for the fixed node slots and the variable associations.
//!
//! Components are plain data owned by the scene pools; the scene hands out
//! `&`/`&mut` access checked through generational references. Fields that
//! reference other entities (`Transform::parent`, `Object::bones`) hold weak
//! [`NodeRef`]s that must be validated before use.

use glam::{Mat4, Quat, Vec3, Vec4};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::anim::LoopMode;
use crate::registry::GenRef;
use crate::resources::{ModelRef, TextureRef};
use crate::scene::{NodeRef, PlayAnimRef};

// ============================================================================
// Transform
// ============================================================================

/// Position, rotation (Euler radians), scale and parent link. Transforms of
/// different nodes form a forest through the parent references; no child
/// back-pointers are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub pos: Vec3,
    pub rot: Vec3,
    pub scale: Vec3,
    pub parent: NodeRef,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            rot: Vec3::ZERO,
            scale: Vec3::ONE,
            parent: GenRef::INVALID,
        }
    }
}

impl Transform {
    /// Local TRS matrix.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.pos)
    }

    #[must_use]
    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(glam::EulerRot::XYZ, self.rot.x, self.rot.y, self.rot.z)
    }

    /// Decomposes a local matrix into the TRS fields. Shear is lost.
    pub fn set_local_matrix(&mut self, m: &Mat4) {
        let (scale, rot, pos) = m.to_scale_rotation_translation();
        self.scale = scale;
        let (x, y, z) = rot.to_euler(glam::EulerRot::XYZ);
        self.rot = Vec3::new(x, y, z);
        self.pos = pos;
    }
}

// ============================================================================
// Camera
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraZRange {
    pub znear: f32,
    pub zfar: f32,
}

impl Default for CameraZRange {
    fn default() -> Self {
        Self {
            znear: 0.01,
            zfar: 5000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub zrange: CameraZRange,
    /// Vertical field of view in radians; ignored for orthographic cameras.
    pub fov: f32,
    pub ortho: bool,
    /// Half vertical extent for orthographic cameras.
    pub size: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            zrange: CameraZRange::default(),
            fov: 40.0_f32.to_radians(),
            ortho: false,
            size: 1.0,
        }
    }
}

// ============================================================================
// Object
// ============================================================================

/// Material blend class, used to bucket display lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
}

impl BlendMode {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        if v == 1 {
            Self::Alpha
        } else {
            Self::Opaque
        }
    }
}

/// Material state owned by an object slot: blend class plus the named
/// uniform values animation can write to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    pub blend: BlendMode,
    pub values: FxHashMap<String, Vec4>,
}

/// Renderable component: a model reference, its per-slot materials and the
/// optional skinning bones (weak node references, not owned).
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub model: ModelRef,
    pub materials: Vec<Material>,
    /// Authoring name per material slot, kept for save and lookup.
    pub material_names: Vec<String>,
    pub bones: Vec<NodeRef>,
}

impl Object {
    /// Material slot index registered under `name`, if any.
    #[must_use]
    pub fn material_slot(&self, name: &str) -> Option<usize> {
        self.material_names.iter().position(|n| n == name)
    }
}

// ============================================================================
// Light
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum LightType {
    #[default]
    Point,
    Spot,
    Linear,
}

impl LightType {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Spot,
            2 => Self::Linear,
            _ => Self::Point,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum LightShadowType {
    #[default]
    None,
    Map,
}

impl LightShadowType {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        if v == 1 {
            Self::Map
        } else {
            Self::None
        }
    }
}

pub const DEFAULT_SHADOW_BIAS: f32 = 0.0001;
pub const DEFAULT_PSSM_SPLIT: Vec4 = Vec4::new(10.0, 50.0, 100.0, 200.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub light_type: LightType,
    pub shadow_type: LightShadowType,

    pub diffuse: Vec4,
    pub diffuse_intensity: f32,
    pub specular: Vec4,
    pub specular_intensity: f32,
    /// Influence radius; 0 means unbounded.
    pub radius: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,

    pub pssm_split: Vec4,
    pub priority: f32,
    pub shadow_bias: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            shadow_type: LightShadowType::None,
            diffuse: Vec4::ONE,
            diffuse_intensity: 1.0,
            specular: Vec4::ONE,
            specular_intensity: 1.0,
            radius: 0.0,
            inner_angle: 30.0_f32.to_radians(),
            outer_angle: 45.0_f32.to_radians(),
            pssm_split: DEFAULT_PSSM_SPLIT,
            priority: 0.0,
            shadow_bias: DEFAULT_SHADOW_BIAS,
        }
    }
}

// ============================================================================
// RigidBody
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RigidBodyType {
    #[default]
    Dynamic,
    Kinematic,
    Static,
}

impl RigidBodyType {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Kinematic,
            2 => Self::Static,
            _ => Self::Dynamic,
        }
    }
}

#[inline]
fn pack_unit_float(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

#[inline]
fn unpack_unit_float(v: u8) -> f32 {
    f32::from(v) / 255.0
}

/// Physics body parameters. Unit-range factors are stored packed to a byte,
/// matching the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigidBody {
    pub body_type: RigidBodyType,

    linear_damping: u8,
    angular_damping: u8,
    restitution: u8,
    friction: u8,
    rolling_friction: u8,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            body_type: RigidBodyType::Dynamic,
            linear_damping: pack_unit_float(0.0),
            angular_damping: pack_unit_float(0.0),
            restitution: pack_unit_float(0.0),
            friction: pack_unit_float(0.5),
            rolling_friction: pack_unit_float(0.0),
        }
    }
}

macro_rules! packed_accessors {
    ($get:ident, $set:ident, $field:ident) => {
        #[must_use]
        pub fn $get(&self) -> f32 {
            unpack_unit_float(self.$field)
        }

        pub fn $set(&mut self, v: f32) {
            self.$field = pack_unit_float(v);
        }
    };
}

impl RigidBody {
    packed_accessors!(linear_damping, set_linear_damping, linear_damping);
    packed_accessors!(angular_damping, set_angular_damping, angular_damping);
    packed_accessors!(restitution, set_restitution, restitution);
    packed_accessors!(friction, set_friction, friction);
    packed_accessors!(rolling_friction, set_rolling_friction, rolling_friction);
}

// ============================================================================
// Collision
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CollisionType {
    #[default]
    Sphere,
    Cube,
    Capsule,
    Cylinder,
    Cone,
    Mesh,
    MeshConvex,
}

impl CollisionType {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Cube,
            2 => Self::Capsule,
            3 => Self::Cylinder,
            4 => Self::Cone,
            5 => Self::Mesh,
            6 => Self::MeshConvex,
            _ => Self::Sphere,
        }
    }
}

/// Collision shape attached to a node, expressed in the node's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub shape: CollisionType,
    pub mass: f32,
    /// Path of the collision mesh resource for mesh shapes.
    pub resource_path: String,

    pub pos: Vec3,
    pub rot: Vec3,
    /// Box dimensions for cube shapes.
    pub size: Vec3,
    pub radius: f32,
    pub height: f32,
}

impl Default for Collision {
    fn default() -> Self {
        Self {
            shape: CollisionType::Sphere,
            mass: 1.0,
            resource_path: String::new(),
            pos: Vec3::ZERO,
            rot: Vec3::ZERO,
            size: Vec3::ONE,
            radius: 0.5,
            height: 1.0,
        }
    }
}

// ============================================================================
// Script
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptParam {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

/// Script attachment: a path into the scripting layer plus its startup
/// parameters. The VM itself lives outside the scene core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Script {
    pub path: String,
    pub params: FxHashMap<String, ScriptParam>,
}

// ============================================================================
// Instance
// ============================================================================

/// Sub-scene instantiation component: which scene to load and which of its
/// animations to start once instantiated.
#[derive(Debug, Clone)]
pub struct Instance {
    pub path: String,
    /// Name of the scene anim to start on instantiation; empty for none.
    pub on_instantiate_anim: String,
    pub loop_mode: LoopMode,
    /// Playback handle of the running on-instantiate anim, if any.
    pub play_anim_ref: PlayAnimRef,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            path: String::new(),
            on_instantiate_anim: String::new(),
            loop_mode: LoopMode::Once,
            play_anim_ref: GenRef::INVALID,
        }
    }
}

// ============================================================================
// Scene globals
// ============================================================================

/// Environment properties; the scene-level animation targets live here.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub ambient: Vec4,
    pub fog_color: Vec4,
    pub fog_near: f32,
    pub fog_far: f32,

    pub irradiance_map: TextureRef,
    pub radiance_map: TextureRef,
    pub brdf_map: TextureRef,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            ambient: Vec4::ZERO,
            fog_color: Vec4::ZERO,
            fog_near: 0.0,
            fog_far: 0.0,
            irradiance_map: GenRef::INVALID,
            radiance_map: GenRef::INVALID,
            brdf_map: GenRef::INVALID,
        }
    }
}

/// Canvas clear properties of a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub clear_z: bool,
    pub clear_color: bool,
    pub color: Vec4,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            clear_z: true,
            clear_color: true,
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rigid_body_packing_round_trip() {
        let mut body = RigidBody::default();
        body.set_friction(0.25);
        assert!((body.friction() - 0.25).abs() < 1.0 / 255.0);

        body.set_restitution(1.5); // clamped
        assert!((body.restitution() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn transform_local_matrix_translates() {
        let trs = Transform {
            pos: Vec3::new(1.0, 2.0, 3.0),
            ..Transform::default()
        };
        let world = trs.local_matrix();
        let p = world.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn transform_matrix_decompose_round_trip() {
        let trs = Transform {
            pos: Vec3::new(1.0, -2.0, 0.5),
            rot: Vec3::new(0.3, 0.0, 0.1),
            scale: Vec3::new(2.0, 2.0, 2.0),
            parent: GenRef::INVALID,
        };
        let mut out = Transform::default();
        out.set_local_matrix(&trs.local_matrix());
        assert!((out.pos - trs.pos).length() < 1e-5);
        assert!((out.scale - trs.scale).length() < 1e-5);
        assert!((out.rot - trs.rot).length() < 1e-4);
    }
}
