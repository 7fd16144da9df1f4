//! Low-level animation data.
//!
//! An [`Anim`] is a bag of typed tracks targeting named properties of a
//! single node or of the scene globals. A [`SceneAnim`] groups one optional
//! scene-level anim with per-node anims under a shared time range; it is the
//! unit of playback. Binding and evaluation against live components happens
//! in [`crate::scene`].

pub mod tracks;

use bitflags::bitflags;
use glam::{Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::registry::GenRef;

pub use tracks::{evaluate, evaluate_step, AnimKey, AnimTrack, Lerp};

/// Playback loop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoopMode {
    /// Clamp to the end bound and stop after one final evaluation there.
    #[default]
    Once,
    /// Never clamp; the clock runs past the animation range.
    Infinite,
    /// Wrap the clock back into `[t_start, t_end)`.
    Loop,
}

impl LoopMode {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Infinite,
            2 => Self::Loop,
            _ => Self::Once,
        }
    }
}

/// Key value of the instance-anim track: names an animation to run inside
/// the target node's instance view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceAnimKey {
    pub anim_name: String,
    pub loop_mode: LoopMode,
    pub t_scale: f32,
}

bitflags! {
    /// Animation flags. Only the low serialized bits go to disk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct AnimFlags: u8 {
        /// Rotation is driven by the quaternion track instead of the Euler
        /// vec3 track.
        const USE_QUATERNION_FOR_ROTATION = 0x01;
        /// Owned by an instance view; hidden from enumeration and save.
        const INSTANTIATED = 0x10;
    }
}

impl AnimFlags {
    pub const SERIALIZED_BITS: u8 = 0x0f;
}

/// Typed track bag with a shared time range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Anim {
    pub bool_tracks: Vec<AnimTrack<bool>>,
    pub int_tracks: Vec<AnimTrack<i32>>,
    pub float_tracks: Vec<AnimTrack<f32>>,
    pub vec2_tracks: Vec<AnimTrack<Vec2>>,
    pub vec3_tracks: Vec<AnimTrack<Vec3>>,
    pub vec4_tracks: Vec<AnimTrack<Vec4>>,
    pub quat_tracks: Vec<AnimTrack<Quat>>,
    pub color_tracks: Vec<AnimTrack<Vec4>>,
    pub string_tracks: Vec<AnimTrack<String>>,
    pub instance_anim_track: AnimTrack<InstanceAnimKey>,

    pub t_start: f32,
    pub t_end: f32,
    pub flags: AnimFlags,
}

impl Anim {
    /// `true` when any track holds at least one key.
    #[must_use]
    pub fn has_keys(&self) -> bool {
        !self.bool_tracks.iter().all(|t| t.keys.is_empty())
            || !self.int_tracks.iter().all(|t| t.keys.is_empty())
            || !self.float_tracks.iter().all(|t| t.keys.is_empty())
            || !self.vec2_tracks.iter().all(|t| t.keys.is_empty())
            || !self.vec3_tracks.iter().all(|t| t.keys.is_empty())
            || !self.vec4_tracks.iter().all(|t| t.keys.is_empty())
            || !self.quat_tracks.iter().all(|t| t.keys.is_empty())
            || !self.color_tracks.iter().all(|t| t.keys.is_empty())
            || !self.string_tracks.iter().all(|t| t.keys.is_empty())
            || !self.instance_anim_track.keys.is_empty()
    }

    /// Drops tracks that carry no keys.
    pub fn delete_empty_tracks(&mut self) {
        self.bool_tracks.retain(|t| !t.keys.is_empty());
        self.int_tracks.retain(|t| !t.keys.is_empty());
        self.float_tracks.retain(|t| !t.keys.is_empty());
        self.vec2_tracks.retain(|t| !t.keys.is_empty());
        self.vec3_tracks.retain(|t| !t.keys.is_empty());
        self.vec4_tracks.retain(|t| !t.keys.is_empty());
        self.quat_tracks.retain(|t| !t.keys.is_empty());
        self.color_tracks.retain(|t| !t.keys.is_empty());
        self.string_tracks.retain(|t| !t.keys.is_empty());
    }
}

/// Association between a node and the anim that drives it, by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAnim {
    pub node: GenRef,
    pub anim: GenRef,
}

bitflags! {
    /// Scene-anim flags; none of these are serialized.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SceneAnimFlags: u8 {
        /// Owned by an instance view; hidden from enumeration and save.
        const INSTANTIATED = 0x01;
    }
}

/// Default frame duration for authored scene anims (20 fps), in seconds.
pub const DEFAULT_FRAME_DURATION: f32 = 1.0 / 20.0;

/// Named playback unit: one optional scene-level anim plus per-node anims.
#[derive(Debug, Clone)]
pub struct SceneAnim {
    pub name: String,
    pub t_start: f32,
    pub t_end: f32,

    /// Anim targeting scene globals (fog, ambient), if any.
    pub scene_anim: GenRef,
    pub node_anims: Vec<NodeAnim>,

    pub frame_duration: f32,
    pub flags: SceneAnimFlags,
}

impl Default for SceneAnim {
    fn default() -> Self {
        Self {
            name: String::new(),
            t_start: 0.0,
            t_end: 0.0,
            scene_anim: GenRef::INVALID,
            node_anims: Vec::new(),
            frame_duration: DEFAULT_FRAME_DURATION,
            flags: SceneAnimFlags::empty(),
        }
    }
}
