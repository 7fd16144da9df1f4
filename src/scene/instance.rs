//! Nested scene instancing.
//!
//! An instance component names a sub-scene; setting it up loads that scene's
//! content into a private, trackable set of nodes and animations owned by
//! the host node. The [`SceneView`] records exactly what was created so the
//! instance can be torn down, moved between hosts, or reached by the
//! garbage collector.

use rustc_hash::FxHashMap;

use crate::anim::{AnimFlags, SceneAnimFlags};
use crate::registry::GenRef;
use crate::resources::{ReadProvider, ResourceCache};
use crate::scene::node::{ComponentIdx, NodeFlags};
use crate::scene::{AnimRef, LoadSaveFlags, NodeRef, PlayAnimRef, Scene, SceneAnimRef};

/// Maximum instance nesting depth. A chain deeper than this (typically a
/// self-referential scene) stops instantiating; by policy the setup call
/// still reports success and simply creates nothing.
pub const MAX_INSTANCE_RECURSION: u32 = 4;

/// The exact set of entities created by one instantiation.
#[derive(Debug, Clone, Default)]
pub struct SceneView {
    pub nodes: Vec<NodeRef>,
    pub anims: Vec<AnimRef>,
    pub scene_anims: Vec<SceneAnimRef>,
}

impl SceneView {
    /// First node of the view carrying `name`.
    #[must_use]
    pub fn get_node(&self, scene: &Scene, name: &str) -> NodeRef {
        self.nodes
            .iter()
            .copied()
            .find(|&r| scene.nodes.get(r).is_some_and(|n| n.name == name))
            .unwrap_or(GenRef::INVALID)
    }

    /// First scene anim of the view carrying `name`.
    #[must_use]
    pub fn get_scene_anim(&self, scene: &Scene, name: &str) -> SceneAnimRef {
        self.scene_anims
            .iter()
            .copied()
            .find(|&r| scene.scene_anims.get(r).is_some_and(|a| a.name == name))
            .unwrap_or(GenRef::INVALID)
    }
}

/// State threaded through a scene load: the view being populated and the
/// saved-index to live-reference node map used for fix-ups.
#[derive(Debug, Default)]
pub struct LoadContext {
    pub recursion_level: u32,
    pub view: SceneView,
    pub node_refs: FxHashMap<u32, NodeRef>,
}

impl LoadContext {
    #[must_use]
    pub fn new(recursion_level: u32) -> Self {
        Self {
            recursion_level,
            ..Self::default()
        }
    }
}

impl Scene {
    /// Destroys every entity owned by a view. Destroyed nodes may leave
    /// orphaned components behind; those are reclaimed by the next garbage
    /// collection.
    pub fn destroy_view_content(&mut self, view: &SceneView) {
        for &node in &view.nodes {
            self.nodes.remove(node);
        }
        for &anim in &view.anims {
            self.anims.remove(anim);
        }
        for &scene_anim in &view.scene_anims {
            self.scene_anims.remove(scene_anim);
        }
    }

    /// Loads the sub-scene referenced by the node's instance component into
    /// a fresh view owned by the node. Binary and JSON content are told
    /// apart by the leading magic bytes. An existing view is torn down
    /// first, so re-setup is idempotent. Returns `false` when the node has
    /// no instance association or the content fails to load.
    pub fn node_setup_instance(
        &mut self,
        r: NodeRef,
        provider: &dyn ReadProvider,
        resources: &mut dyn ResourceCache,
        flags: LoadSaveFlags,
        recursion_level: u32,
    ) -> bool {
        if recursion_level > MAX_INSTANCE_RECURSION {
            return true; // nesting limit: successful no-op by policy
        }

        let Some(&instance_ref) = self.node_instance.get(&r) else {
            return false;
        };
        if !self.instances.is_valid(instance_ref) {
            return false;
        }

        // tear down the previous instantiation, if any
        if let Some(old_view) = self.node_instance_view.remove(&r) {
            self.node_stop_on_instantiate_anim(r);
            self.destroy_view_content(&old_view);
        }

        let host_is_enabled = self.is_node_enabled(r);
        let path = self
            .instances
            .get(instance_ref)
            .map(|i| i.path.clone())
            .unwrap_or_default();

        let Some(data) = provider.read(&path) else {
            log::warn!("Failed to read instance content '{path}'");
            return false;
        };

        let mut ctx = LoadContext::new(recursion_level);
        let loaded = if crate::io::is_binary_scene_data(&data) {
            self.load_binary(
                &mut std::io::Cursor::new(&data),
                &path,
                provider,
                resources,
                &mut ctx,
                flags,
            )
        } else {
            self.load_json(&data, &path, provider, resources, &mut ctx, flags)
        };

        if let Err(err) = loaded {
            log::warn!("Failed to load instance content '{path}': {err}");
            return false;
        }

        for &node in &ctx.view.nodes {
            let Some(node_) = self.nodes.get_mut(node) else {
                continue;
            };

            node_.flags |= NodeFlags::INSTANTIATED;
            if !host_is_enabled {
                node_.flags |= NodeFlags::INSTANCE_DISABLED;
            }

            // parent any instantiated root onto the host node
            let trs_ref = node_.component(ComponentIdx::Transform);
            if let Some(trs) = self.transforms.get_mut(trs_ref) {
                if trs.parent.is_invalid() {
                    trs.parent = r;
                }
            }
        }

        for &anim in &ctx.view.anims {
            if let Some(anim_) = self.anims.get_mut(anim) {
                anim_.flags |= AnimFlags::INSTANTIATED;
            }
        }

        for &scene_anim in &ctx.view.scene_anims {
            if let Some(scene_anim_) = self.scene_anims.get_mut(scene_anim) {
                scene_anim_.flags |= SceneAnimFlags::INSTANTIATED;
            }
        }

        self.node_instance_view.insert(r, ctx.view);
        true
    }

    /// Destroys the node's instantiated content and stops its
    /// on-instantiate animation. The instance component itself stays on the
    /// node.
    pub fn node_destroy_instance(&mut self, r: NodeRef) {
        self.node_stop_on_instantiate_anim(r);

        if let Some(view) = self.node_instance_view.remove(&r) {
            self.destroy_view_content(&view);
        } else {
            log::warn!("Invalid node instance view");
        }
    }

    /// Moves the instance component and its live view from one node to
    /// another. The target's own instance, if any, is destroyed first.
    /// Instantiated nodes parented to the source are re-parented onto the
    /// target and the target's enable state is propagated into the view.
    pub fn node_move_instance(&mut self, from: NodeRef, to: NodeRef) {
        if !self.nodes.is_valid(from) || !self.nodes.is_valid(to) {
            return;
        }

        if self.node_instance_view.contains_key(&to) {
            self.node_destroy_instance(to);
        }
        self.node_instance.remove(&to);

        let target_disabled = self.node_flags(to).contains(NodeFlags::DISABLED);

        if let Some(view) = self.node_instance_view.remove(&from) {
            for &n in &view.nodes {
                let trs_ref = self.node_transform_ref(n);
                if let Some(trs) = self.transforms.get_mut(trs_ref) {
                    if trs.parent == from {
                        trs.parent = to;
                    }
                }

                if target_disabled {
                    self.disable_node_(n, true);
                } else {
                    self.enable_node_(n, true);
                }
            }
            self.node_instance_view.insert(to, view);
        }

        if let Some(cref) = self.node_instance.remove(&from) {
            self.node_instance.insert(to, cref);
        }
    }

    /// Starts the animation the instance component nominates, looked up by
    /// name inside the node's view, and records the playback reference on
    /// the component. Any previous on-instantiate playback is stopped first.
    pub fn node_start_on_instantiate_anim(&mut self, r: NodeRef) -> PlayAnimRef {
        self.node_stop_on_instantiate_anim(r);

        let Some(&instance_ref) = self.node_instance.get(&r) else {
            return GenRef::INVALID; // no instance on node
        };
        let Some(instance) = self.instances.get(instance_ref) else {
            return GenRef::INVALID; // invalid instance ref
        };
        if instance.on_instantiate_anim.is_empty() {
            return GenRef::INVALID; // nothing to play
        }
        let anim_name = instance.on_instantiate_anim.clone();
        let loop_mode = instance.loop_mode;

        let Some(view) = self.node_instance_view.get(&r) else {
            return GenRef::INVALID; // no instance view
        };

        let anim_ref = view.get_scene_anim(self, &anim_name);
        let play_ref = self.play_anim(anim_ref, loop_mode);

        if let Some(instance) = self.instances.get_mut(instance_ref) {
            instance.play_anim_ref = play_ref;
        }
        play_ref
    }

    /// Stops the running on-instantiate animation and clears the stored
    /// playback reference.
    pub fn node_stop_on_instantiate_anim(&mut self, r: NodeRef) {
        let Some(&instance_ref) = self.node_instance.get(&r) else {
            return;
        };
        let Some(instance) = self.instances.get_mut(instance_ref) else {
            return;
        };

        let play_ref = instance.play_anim_ref;
        instance.play_anim_ref = GenRef::INVALID;
        self.stop_anim(play_ref);
    }

    /// View owned by the node's instantiation, if set up.
    #[must_use]
    pub fn node_instance_scene_view(&self, r: NodeRef) -> Option<&SceneView> {
        let view = self.node_instance_view.get(&r);
        if view.is_none() {
            log::warn!("No instance scene view on node ({}:{})", r.idx, r.gen);
        }
        view
    }
}
