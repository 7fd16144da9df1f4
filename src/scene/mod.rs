//! Scene graph core.
//!
//! [`Scene`] owns every node, component pool, animation and playback state.
//! All entities are addressed by generational references; a reference
//! outlives its entity only as a detectably-stale value, never as a dangling
//! pointer. Components removed from nodes are reclaimed by the explicit
//! garbage collector, not immediately.

mod binding;
mod components;
mod display;
mod gc;
mod instance;
mod node;
mod player;
#[allow(clippy::module_inception)]
mod scene;
mod world;

use bitflags::bitflags;

use crate::registry::GenRef;

pub use binding::{BoundNodeAnim, BoundSceneAnim, SceneBoundAnim};
pub use components::{
    BlendMode, Camera, CameraZRange, Canvas, Collision, CollisionType, Environment, Instance,
    Light, LightShadowType, LightType, Material, Object, RigidBody, RigidBodyType, Script,
    ScriptParam, Transform, DEFAULT_PSSM_SPLIT, DEFAULT_SHADOW_BIAS,
};
pub use display::{ModelDisplayList, ModelDisplayLists, SkinnedModelDisplayList};
pub use instance::{LoadContext, SceneView, MAX_INSTANCE_RECURSION};
pub use node::{ComponentIdx, NodeData, NodeFlags, COMPONENT_SLOT_COUNT};
pub use player::ScenePlayAnim;
pub use scene::{NodesChildren, Scene};
pub use world::MAX_TRANSFORM_DEPTH;

/// Reference to a node.
pub type NodeRef = GenRef;
/// Reference to a component in one of the scene pools.
pub type ComponentRef = GenRef;
/// Reference to a low-level animation.
pub type AnimRef = GenRef;
/// Reference to a scene animation.
pub type SceneAnimRef = GenRef;
/// Reference to a playing animation.
pub type PlayAnimRef = GenRef;

bitflags! {
    /// Sections and options for scene save/load. The low 16 bits name file
    /// sections; the high bits are load-time options that never reach disk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LoadSaveFlags: u32 {
        const NODES = 0x0000_0001;
        const SCENE = 0x0000_0002;
        const ANIMS = 0x0000_0004;
        const KEY_VALUES = 0x0000_0008;
        const PHYSICS = 0x0000_0010;
        const SCRIPTS = 0x0000_0020;

        /// Queue texture loads instead of loading synchronously.
        const QUEUE_TEXTURE_LOADS = 0x0001_0000;
        /// Register resource names without loading anything.
        const DO_NOT_LOAD_RESOURCES = 0x0004_0000;
        /// Queue model loads instead of loading synchronously.
        const QUEUE_MODEL_LOADS = 0x0008_0000;

        const ALL = Self::NODES.bits()
            | Self::SCENE.bits()
            | Self::ANIMS.bits()
            | Self::KEY_VALUES.bits()
            | Self::PHYSICS.bits()
            | Self::SCRIPTS.bits();

        const ALL_NODE_FEATURES = Self::NODES.bits()
            | Self::ANIMS.bits()
            | Self::PHYSICS.bits()
            | Self::SCRIPTS.bits();
    }
}

impl LoadSaveFlags {
    /// Bits describing file sections, as written to the header.
    #[must_use]
    pub fn sections(self) -> Self {
        self & Self::ALL
    }
}
