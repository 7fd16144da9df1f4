#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod anim;
pub mod easing;
pub mod errors;
pub mod io;
pub mod registry;
pub mod resources;
pub mod scene;

pub use anim::{Anim, AnimTrack, InstanceAnimKey, LoopMode, SceneAnim};
pub use easing::Easing;
pub use errors::{Result, SceneError};
pub use registry::{GenRef, GenRegistry};
pub use resources::{LoadPolicy, ModelRef, NameCache, ReadProvider, ResourceCache, TextureRef};
pub use scene::{
    AnimRef, ComponentIdx, ComponentRef, LoadContext, LoadSaveFlags, NodeFlags, NodeRef,
    PlayAnimRef, Scene, SceneAnimRef, SceneView,
};
