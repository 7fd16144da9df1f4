//! Scene container and component CRUD.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::anim::{Anim, AnimFlags, SceneAnim, SceneAnimFlags};
use crate::registry::{GenRef, GenRegistry};
use crate::scene::components::{
    Camera, CameraZRange, Canvas, Collision, CollisionType, Environment, Instance, Light,
    LightType, Object, RigidBody, Script, Transform,
};
use crate::scene::instance::SceneView;
use crate::scene::node::{ComponentIdx, NodeData, NodeFlags};
use crate::scene::player::ScenePlayAnim;
use crate::scene::{AnimRef, ComponentRef, NodeRef, SceneAnimRef};

/// Per-node association list; removed entries become invalid-ref sentinels
/// so surviving entries keep their attachment index.
pub(crate) type AttachmentList = SmallVec<[ComponentRef; 4]>;

/// The scene registry: nodes, component pools, animations, world matrices
/// and the association maps tying them together.
///
/// Single-threaded by design; no reference is valid across two scenes.
pub struct Scene {
    pub(crate) nodes: GenRegistry<NodeData>,

    pub(crate) transforms: GenRegistry<Transform>,
    pub(crate) cameras: GenRegistry<Camera>,
    pub(crate) objects: GenRegistry<Object>,
    pub(crate) lights: GenRegistry<Light>,
    pub(crate) rigid_bodies: GenRegistry<RigidBody>,

    pub(crate) collisions: GenRegistry<Collision>,
    pub(crate) node_collisions: FxHashMap<NodeRef, AttachmentList>,

    pub(crate) scripts: GenRegistry<Script>,
    pub(crate) scene_scripts: Vec<ComponentRef>,
    pub(crate) node_scripts: FxHashMap<NodeRef, AttachmentList>,

    pub(crate) instances: GenRegistry<Instance>,
    pub(crate) node_instance: FxHashMap<NodeRef, ComponentRef>,
    pub(crate) node_instance_view: FxHashMap<NodeRef, SceneView>,

    pub(crate) anims: GenRegistry<Anim>,
    pub(crate) scene_anims: GenRegistry<SceneAnim>,
    pub(crate) play_anims: GenRegistry<ScenePlayAnim>,

    // World matrices, indexed by transform slot, double-buffered for motion
    // vectors.
    pub(crate) transform_worlds: Vec<Mat4>,
    pub(crate) transform_worlds_updated: Vec<bool>,
    pub(crate) previous_transform_worlds: Vec<Mat4>,
    pub(crate) previous_transform_worlds_updated: Vec<bool>,

    pub(crate) current_camera: NodeRef,
    pub environment: Environment,
    pub canvas: Canvas,

    pub(crate) key_values: FxHashMap<String, String>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: GenRegistry::new(),
            transforms: GenRegistry::new(),
            cameras: GenRegistry::new(),
            objects: GenRegistry::new(),
            lights: GenRegistry::new(),
            rigid_bodies: GenRegistry::new(),
            collisions: GenRegistry::new(),
            node_collisions: FxHashMap::default(),
            scripts: GenRegistry::new(),
            scene_scripts: Vec::new(),
            node_scripts: FxHashMap::default(),
            instances: GenRegistry::new(),
            node_instance: FxHashMap::default(),
            node_instance_view: FxHashMap::default(),
            anims: GenRegistry::new(),
            scene_anims: GenRegistry::new(),
            play_anims: GenRegistry::new(),
            transform_worlds: Vec::new(),
            transform_worlds_updated: Vec::new(),
            previous_transform_worlds: Vec::new(),
            previous_transform_worlds_updated: Vec::new(),
            current_camera: GenRef::INVALID,
            environment: Environment::default(),
            canvas: Canvas::default(),
            key_values: FxHashMap::default(),
        }
    }

    /// Clears all scene content. All outstanding references are invalidated.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.transforms.clear();
        self.cameras.clear();
        self.objects.clear();
        self.lights.clear();
        self.rigid_bodies.clear();
        self.collisions.clear();
        self.node_collisions.clear();
        self.scripts.clear();
        self.scene_scripts.clear();
        self.node_scripts.clear();
        self.instances.clear();
        self.node_instance.clear();
        self.node_instance_view.clear();
        self.anims.clear();
        self.scene_anims.clear();
        self.play_anims.clear();
        self.transform_worlds.clear();
        self.transform_worlds_updated.clear();
        self.previous_transform_worlds.clear();
        self.previous_transform_worlds_updated.clear();
        self.current_camera = GenRef::INVALID;
        self.environment = Environment::default();
        self.canvas = Canvas::default();
        self.key_values.clear();
    }

    /// Per-tick update: stores previous world matrices, advances playing
    /// animations, recomputes world matrices and back-fills motion-vector
    /// sources for new transforms. `dt` is in seconds.
    pub fn update(&mut self, dt: f32) {
        self.store_previous_world_matrices();
        self.ready_world_matrices();

        self.update_playing_anims(dt);

        self.compute_world_matrices();
        self.fixup_previous_world_matrices();
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn create_node(&mut self, name: impl Into<String>) -> NodeRef {
        self.nodes.add(NodeData::new(name.into()))
    }

    pub fn destroy_node(&mut self, r: NodeRef) {
        self.nodes.remove(r);
    }

    #[must_use]
    pub fn is_valid_node_ref(&self, r: NodeRef) -> bool {
        self.nodes.is_valid(r)
    }

    /// Name of a node, or the documented default `""` for a stale reference.
    #[must_use]
    pub fn node_name(&self, r: NodeRef) -> &str {
        match self.nodes.get(r) {
            Some(node) => &node.name,
            None => {
                log::warn!("Invalid node reference");
                ""
            }
        }
    }

    pub fn set_node_name(&mut self, r: NodeRef, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(r) {
            node.name = name.into();
        } else {
            log::warn!("Invalid node reference");
        }
    }

    #[must_use]
    pub fn node_flags(&self, r: NodeRef) -> NodeFlags {
        self.nodes.get(r).map(|n| n.flags).unwrap_or_default()
    }

    pub fn set_node_flags(&mut self, r: NodeRef, flags: NodeFlags) {
        if let Some(node) = self.nodes.get_mut(r) {
            node.flags = flags;
        }
    }

    pub fn reserve_nodes(&mut self, count: usize) {
        self.nodes.reserve(count);
    }

    /// First node carrying `name`, instantiated nodes included.
    #[must_use]
    pub fn get_node(&self, name: &str) -> NodeRef {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map_or(GenRef::INVALID, |(r, _)| r)
    }

    /// Path lookup. `/` descends into transform children, `:` descends into
    /// the instance view hosted by the named node, e.g. `"rig/arm:hand"`.
    #[must_use]
    pub fn get_node_ex(&self, path: &str) -> NodeRef {
        let roots: Vec<NodeRef> = self
            .nodes
            .iter()
            .filter(|&(r, _)| self.is_root(r))
            .map(|(r, _)| r)
            .collect();
        self.get_node_ex_in(&roots, path)
    }

    fn get_node_ex_in(&self, refs: &[NodeRef], path: &str) -> NodeRef {
        let (name, separator, remainder) = match path.find([':', '/']) {
            Some(pos) => (
                &path[..pos],
                path.as_bytes()[pos],
                &path[pos + 1..],
            ),
            None => (path, 0, ""),
        };

        for &r in refs {
            let Some(node) = self.nodes.get(r) else {
                continue;
            };
            if node.name != name {
                continue;
            }
            return match separator {
                0 => r,
                b':' => {
                    let Some(view) = self.node_instance_view.get(&r) else {
                        return GenRef::INVALID; // not an instance
                    };
                    let roots: Vec<NodeRef> = view
                        .nodes
                        .iter()
                        .copied()
                        .filter(|&n| self.is_child_of(n, r))
                        .collect();
                    self.get_node_ex_in(&roots, remainder)
                }
                _ => self.get_node_ex_in(&self.node_child_refs(r), remainder),
            };
        }
        GenRef::INVALID
    }

    /// Node count, excluding nodes owned by instance views.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.flags.contains(NodeFlags::INSTANTIATED))
            .count()
    }

    /// Total node count, instance views included.
    #[must_use]
    pub fn all_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live nodes, excluding nodes owned by instance views.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.flags.contains(NodeFlags::INSTANTIATED))
            .map(|(r, _)| r)
            .collect()
    }

    #[must_use]
    pub fn all_nodes(&self) -> Vec<NodeRef> {
        self.nodes.iter().map(|(r, _)| r).collect()
    }

    #[must_use]
    pub fn nodes_with_component(&self, idx: ComponentIdx) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|(_, n)| {
                !n.flags.contains(NodeFlags::INSTANTIATED) && !n.component(idx).is_invalid()
            })
            .map(|(r, _)| r)
            .collect()
    }

    #[must_use]
    pub fn all_nodes_with_component(&self, idx: ComponentIdx) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.component(idx).is_invalid())
            .map(|(r, _)| r)
            .collect()
    }

    #[must_use]
    pub fn node_ref_at(&self, idx: u32) -> NodeRef {
        self.nodes.get_ref(idx)
    }

    // ========================================================================
    // Hierarchy queries
    // ========================================================================

    /// Direct transform children of a node.
    #[must_use]
    pub fn node_child_refs(&self, r: NodeRef) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|&(child, _)| {
                self.node_transform(child)
                    .is_some_and(|trs| trs.parent == r)
            })
            .map(|(child, _)| child)
            .collect()
    }

    /// `true` when the node's direct transform parent is `parent`. With
    /// `parent == GenRef::INVALID` this tests for root nodes.
    #[must_use]
    pub fn is_child_of(&self, r: NodeRef, parent: NodeRef) -> bool {
        if !self.nodes.is_valid(r) {
            return false;
        }
        match self.node_transform(r) {
            Some(trs) => trs.parent == parent,
            None => parent.is_invalid(),
        }
    }

    #[must_use]
    pub fn is_root(&self, r: NodeRef) -> bool {
        self.is_child_of(r, GenRef::INVALID)
    }

    /// Host node whose instance view owns `r`, if any.
    #[must_use]
    pub fn is_instantiated_by(&self, r: NodeRef) -> NodeRef {
        for (&host, view) in &self.node_instance_view {
            if view.nodes.contains(&r) {
                return host;
            }
        }
        GenRef::INVALID
    }

    /// Child lists for every node, valid until the scene graph is modified.
    #[must_use]
    pub fn build_nodes_children(&self) -> NodesChildren {
        let mut counts: FxHashMap<NodeRef, (u32, u32)> = FxHashMap::default();

        for (_, node) in self.nodes.iter() {
            if let Some(trs) = self.transforms.get(node.component(ComponentIdx::Transform)) {
                if self.nodes.is_valid(trs.parent) {
                    counts.entry(trs.parent).or_default().1 += 1;
                }
            }
        }

        let total: u32 = counts.values().map(|&(_, count)| count).sum();
        let mut all_children = vec![GenRef::INVALID; total as usize];

        let mut offset = 0;
        for entry in counts.values_mut() {
            entry.0 = offset;
            offset += entry.1;
            entry.1 = 0; // refilled below
        }

        for (r, node) in self.nodes.iter() {
            if let Some(trs) = self.transforms.get(node.component(ComponentIdx::Transform)) {
                if self.nodes.is_valid(trs.parent) {
                    if let Some(entry) = counts.get_mut(&trs.parent) {
                        all_children[(entry.0 + entry.1) as usize] = r;
                        entry.1 += 1;
                    }
                }
            }
        }

        NodesChildren {
            ranges: counts,
            all_children,
        }
    }

    // ========================================================================
    // Enable / disable
    // ========================================================================

    pub(crate) fn enable_node_(&mut self, r: NodeRef, through_instance: bool) {
        let Some(node) = self.nodes.get_mut(r) else {
            log::warn!("Invalid node reference");
            return;
        };

        node.flags &= if through_instance {
            !NodeFlags::INSTANCE_DISABLED
        } else {
            !NodeFlags::DISABLED
        };

        // only propagate into instance content once fully enabled
        if node
            .flags
            .intersects(NodeFlags::DISABLED | NodeFlags::INSTANCE_DISABLED)
        {
            return;
        }

        if let Some(view) = self.node_instance_view.get(&r) {
            let instantiated: Vec<NodeRef> = view.nodes.clone();
            for n in instantiated {
                self.enable_node_(n, true);
            }
        }
    }

    pub(crate) fn disable_node_(&mut self, r: NodeRef, through_instance: bool) {
        let Some(node) = self.nodes.get_mut(r) else {
            log::warn!("Invalid node reference");
            return;
        };

        node.flags |= if through_instance {
            NodeFlags::INSTANCE_DISABLED
        } else {
            NodeFlags::DISABLED
        };

        if let Some(view) = self.node_instance_view.get(&r) {
            let instantiated: Vec<NodeRef> = view.nodes.clone();
            for n in instantiated {
                self.disable_node_(n, true);
            }
        }
    }

    pub fn enable_node(&mut self, r: NodeRef) {
        self.enable_node_(r, false);
    }

    pub fn disable_node(&mut self, r: NodeRef) {
        self.disable_node_(r, false);
    }

    /// `true` when neither the node nor its instancing host disables it.
    #[must_use]
    pub fn is_node_enabled(&self, r: NodeRef) -> bool {
        self.nodes.get(r).is_some_and(|n| {
            !n.flags
                .intersects(NodeFlags::DISABLED | NodeFlags::INSTANCE_DISABLED)
        })
    }

    /// `true` when the node itself is not explicitly disabled, regardless of
    /// its host.
    #[must_use]
    pub fn is_node_itself_enabled(&self, r: NodeRef) -> bool {
        self.nodes
            .get(r)
            .is_some_and(|n| !n.flags.contains(NodeFlags::DISABLED))
    }

    // ========================================================================
    // Fixed component slots
    // ========================================================================

    #[must_use]
    pub fn node_component_ref(&self, r: NodeRef, idx: ComponentIdx) -> ComponentRef {
        self.nodes
            .get(r)
            .map_or(GenRef::INVALID, |n| n.component(idx))
    }

    pub fn set_node_component(&mut self, r: NodeRef, idx: ComponentIdx, cref: ComponentRef) {
        if let Some(node) = self.nodes.get_mut(r) {
            node.set_component(idx, cref);
        }
    }

    // --- transform

    pub fn create_transform(&mut self, trs: Transform) -> ComponentRef {
        self.transforms.add(trs)
    }

    pub fn create_transform_trs(&mut self, pos: Vec3, rot: Vec3, scale: Vec3, parent: NodeRef) -> ComponentRef {
        self.transforms.add(Transform {
            pos,
            rot,
            scale,
            parent,
        })
    }

    pub fn destroy_transform(&mut self, r: ComponentRef) {
        self.transforms.remove(r);
    }

    #[must_use]
    pub fn is_valid_transform_ref(&self, r: ComponentRef) -> bool {
        self.transforms.is_valid(r)
    }

    #[must_use]
    pub fn transform(&self, r: ComponentRef) -> Option<&Transform> {
        self.transforms.get(r)
    }

    pub fn transform_mut(&mut self, r: ComponentRef) -> Option<&mut Transform> {
        self.transforms.get_mut(r)
    }

    /// Transform position, or the documented default for a stale reference.
    #[must_use]
    pub fn transform_pos(&self, r: ComponentRef) -> Vec3 {
        match self.transforms.get(r) {
            Some(trs) => trs.pos,
            None => {
                log::warn!("Invalid transform reference");
                Vec3::ZERO
            }
        }
    }

    #[must_use]
    pub fn node_transform_ref(&self, r: NodeRef) -> ComponentRef {
        self.node_component_ref(r, ComponentIdx::Transform)
    }

    #[must_use]
    pub fn node_transform(&self, r: NodeRef) -> Option<&Transform> {
        self.transforms.get(self.node_transform_ref(r))
    }

    pub fn node_transform_mut(&mut self, r: NodeRef) -> Option<&mut Transform> {
        let cref = self.node_transform_ref(r);
        self.transforms.get_mut(cref)
    }

    pub fn set_node_transform(&mut self, r: NodeRef, cref: ComponentRef) {
        self.set_node_component(r, ComponentIdx::Transform, cref);
    }

    pub fn reserve_transforms(&mut self, count: usize) {
        self.transforms.reserve(count);
    }

    // --- camera

    pub fn create_camera(&mut self, camera: Camera) -> ComponentRef {
        self.cameras.add(camera)
    }

    pub fn create_perspective_camera(&mut self, znear: f32, zfar: f32, fov: f32) -> ComponentRef {
        self.cameras.add(Camera {
            zrange: CameraZRange { znear, zfar },
            fov,
            ortho: false,
            size: 1.0,
        })
    }

    pub fn create_orthographic_camera(&mut self, znear: f32, zfar: f32, size: f32) -> ComponentRef {
        self.cameras.add(Camera {
            zrange: CameraZRange { znear, zfar },
            ortho: true,
            size,
            ..Camera::default()
        })
    }

    pub fn destroy_camera(&mut self, r: ComponentRef) {
        self.cameras.remove(r);
    }

    #[must_use]
    pub fn is_valid_camera_ref(&self, r: ComponentRef) -> bool {
        self.cameras.is_valid(r)
    }

    #[must_use]
    pub fn camera(&self, r: ComponentRef) -> Option<&Camera> {
        self.cameras.get(r)
    }

    pub fn camera_mut(&mut self, r: ComponentRef) -> Option<&mut Camera> {
        self.cameras.get_mut(r)
    }

    #[must_use]
    pub fn node_camera_ref(&self, r: NodeRef) -> ComponentRef {
        self.node_component_ref(r, ComponentIdx::Camera)
    }

    pub fn set_node_camera(&mut self, r: NodeRef, cref: ComponentRef) {
        self.set_node_component(r, ComponentIdx::Camera, cref);
    }

    // --- object

    pub fn create_object(&mut self, object: Object) -> ComponentRef {
        self.objects.add(object)
    }

    pub fn destroy_object(&mut self, r: ComponentRef) {
        self.objects.remove(r);
    }

    #[must_use]
    pub fn is_valid_object_ref(&self, r: ComponentRef) -> bool {
        self.objects.is_valid(r)
    }

    #[must_use]
    pub fn object(&self, r: ComponentRef) -> Option<&Object> {
        self.objects.get(r)
    }

    pub fn object_mut(&mut self, r: ComponentRef) -> Option<&mut Object> {
        self.objects.get_mut(r)
    }

    #[must_use]
    pub fn node_object_ref(&self, r: NodeRef) -> ComponentRef {
        self.node_component_ref(r, ComponentIdx::Object)
    }

    pub fn set_node_object(&mut self, r: NodeRef, cref: ComponentRef) {
        self.set_node_component(r, ComponentIdx::Object, cref);
    }

    /// Bone node for skinning; out-of-range or stale accesses return the
    /// invalid reference.
    #[must_use]
    pub fn object_bone(&self, r: ComponentRef, idx: usize) -> NodeRef {
        self.objects
            .get(r)
            .and_then(|o| o.bones.get(idx).copied())
            .unwrap_or(GenRef::INVALID)
    }

    pub fn set_object_bone(&mut self, r: ComponentRef, idx: usize, bone: NodeRef) -> bool {
        match self.objects.get_mut(r) {
            Some(o) if idx < o.bones.len() => {
                o.bones[idx] = bone;
                true
            }
            _ => false,
        }
    }

    // --- light

    pub fn create_light(&mut self, light: Light) -> ComponentRef {
        self.lights.add(light)
    }

    pub fn create_point_light(&mut self, radius: f32) -> ComponentRef {
        self.lights.add(Light {
            light_type: LightType::Point,
            radius,
            ..Light::default()
        })
    }

    pub fn create_spot_light(&mut self, radius: f32, inner_angle: f32, outer_angle: f32) -> ComponentRef {
        self.lights.add(Light {
            light_type: LightType::Spot,
            radius,
            inner_angle,
            outer_angle,
            ..Light::default()
        })
    }

    pub fn create_linear_light(&mut self) -> ComponentRef {
        self.lights.add(Light {
            light_type: LightType::Linear,
            ..Light::default()
        })
    }

    pub fn destroy_light(&mut self, r: ComponentRef) {
        self.lights.remove(r);
    }

    #[must_use]
    pub fn is_valid_light_ref(&self, r: ComponentRef) -> bool {
        self.lights.is_valid(r)
    }

    #[must_use]
    pub fn light(&self, r: ComponentRef) -> Option<&Light> {
        self.lights.get(r)
    }

    pub fn light_mut(&mut self, r: ComponentRef) -> Option<&mut Light> {
        self.lights.get_mut(r)
    }

    #[must_use]
    pub fn node_light_ref(&self, r: NodeRef) -> ComponentRef {
        self.node_component_ref(r, ComponentIdx::Light)
    }

    pub fn set_node_light(&mut self, r: NodeRef, cref: ComponentRef) {
        self.set_node_component(r, ComponentIdx::Light, cref);
    }

    /// Nodes carrying both a light and a transform.
    #[must_use]
    pub fn get_lights(&self) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|(_, n)| {
                self.lights.is_valid(n.component(ComponentIdx::Light))
                    && self.transforms.is_valid(n.component(ComponentIdx::Transform))
            })
            .map(|(r, _)| r)
            .collect()
    }

    // --- rigid body

    pub fn create_rigid_body(&mut self, body: RigidBody) -> ComponentRef {
        self.rigid_bodies.add(body)
    }

    pub fn destroy_rigid_body(&mut self, r: ComponentRef) {
        self.rigid_bodies.remove(r);
    }

    #[must_use]
    pub fn is_valid_rigid_body_ref(&self, r: ComponentRef) -> bool {
        self.rigid_bodies.is_valid(r)
    }

    #[must_use]
    pub fn rigid_body(&self, r: ComponentRef) -> Option<&RigidBody> {
        self.rigid_bodies.get(r)
    }

    pub fn rigid_body_mut(&mut self, r: ComponentRef) -> Option<&mut RigidBody> {
        self.rigid_bodies.get_mut(r)
    }

    #[must_use]
    pub fn node_rigid_body_ref(&self, r: NodeRef) -> ComponentRef {
        self.node_component_ref(r, ComponentIdx::RigidBody)
    }

    pub fn set_node_rigid_body(&mut self, r: NodeRef, cref: ComponentRef) {
        self.set_node_component(r, ComponentIdx::RigidBody, cref);
    }

    // ========================================================================
    // Collision attachments
    // ========================================================================

    pub fn create_collision(&mut self, collision: Collision) -> ComponentRef {
        self.collisions.add(collision)
    }

    pub fn create_sphere_collision(&mut self, radius: f32, mass: f32) -> ComponentRef {
        self.collisions.add(Collision {
            shape: CollisionType::Sphere,
            radius,
            mass,
            ..Collision::default()
        })
    }

    pub fn create_cube_collision(&mut self, size: Vec3, mass: f32) -> ComponentRef {
        self.collisions.add(Collision {
            shape: CollisionType::Cube,
            size,
            mass,
            ..Collision::default()
        })
    }

    pub fn create_capsule_collision(&mut self, radius: f32, height: f32, mass: f32) -> ComponentRef {
        self.collisions.add(Collision {
            shape: CollisionType::Capsule,
            radius,
            height,
            mass,
            ..Collision::default()
        })
    }

    pub fn create_mesh_collision(&mut self, resource_path: impl Into<String>, mass: f32) -> ComponentRef {
        self.collisions.add(Collision {
            shape: CollisionType::Mesh,
            resource_path: resource_path.into(),
            mass,
            ..Collision::default()
        })
    }

    pub fn destroy_collision(&mut self, r: ComponentRef) {
        self.collisions.remove(r);
    }

    #[must_use]
    pub fn is_valid_collision_ref(&self, r: ComponentRef) -> bool {
        self.collisions.is_valid(r)
    }

    #[must_use]
    pub fn collision(&self, r: ComponentRef) -> Option<&Collision> {
        self.collisions.get(r)
    }

    pub fn collision_mut(&mut self, r: ComponentRef) -> Option<&mut Collision> {
        self.collisions.get_mut(r)
    }

    #[must_use]
    pub fn node_collision_count(&self, r: NodeRef) -> usize {
        self.node_collisions.get(&r).map_or(0, SmallVec::len)
    }

    /// Collision attached at `idx`; the invalid reference for holes left by
    /// removal.
    #[must_use]
    pub fn node_collision_ref(&self, r: NodeRef, idx: usize) -> ComponentRef {
        self.node_collisions
            .get(&r)
            .and_then(|list| list.get(idx).copied())
            .unwrap_or(GenRef::INVALID)
    }

    /// Attaches a collision at a stable index, growing the list with
    /// sentinel holes as needed.
    pub fn set_node_collision(&mut self, r: NodeRef, idx: usize, cref: ComponentRef) {
        if !self.nodes.is_valid(r) {
            log::warn!("Invalid node reference");
            return;
        }
        let list = self.node_collisions.entry(r).or_default();
        if idx >= list.len() {
            list.resize(idx + 1, GenRef::INVALID);
        }
        list[idx] = cref;
    }

    pub fn remove_node_collision(&mut self, r: NodeRef, cref: ComponentRef) {
        Self::remove_attachment(&mut self.node_collisions, r, |entry| *entry == cref);
    }

    pub fn remove_node_collision_at(&mut self, r: NodeRef, idx: usize) {
        let mut i = 0;
        Self::remove_attachment(&mut self.node_collisions, r, |_| {
            let hit = i == idx;
            i += 1;
            hit
        });
    }

    /// Replaces matching entries with the sentinel and trims trailing
    /// sentinels so attachment indices stay stable while the list still
    /// compacts from the back.
    fn remove_attachment(
        map: &mut FxHashMap<NodeRef, AttachmentList>,
        r: NodeRef,
        mut matches: impl FnMut(&ComponentRef) -> bool,
    ) {
        if let Some(list) = map.get_mut(&r) {
            for entry in list.iter_mut() {
                if matches(entry) {
                    *entry = GenRef::INVALID;
                }
            }
            while list.last().is_some_and(|entry| entry.is_invalid()) {
                list.pop();
            }
        }
    }

    // ========================================================================
    // Script attachments
    // ========================================================================

    pub fn create_script(&mut self, path: impl Into<String>) -> ComponentRef {
        self.scripts.add(Script {
            path: path.into(),
            params: FxHashMap::default(),
        })
    }

    pub fn destroy_script(&mut self, r: ComponentRef) {
        self.scripts.remove(r);
    }

    #[must_use]
    pub fn is_valid_script_ref(&self, r: ComponentRef) -> bool {
        self.scripts.is_valid(r)
    }

    #[must_use]
    pub fn script(&self, r: ComponentRef) -> Option<&Script> {
        self.scripts.get(r)
    }

    pub fn script_mut(&mut self, r: ComponentRef) -> Option<&mut Script> {
        self.scripts.get_mut(r)
    }

    pub fn reserve_scripts(&mut self, count: usize) {
        self.scripts.reserve(count);
    }

    #[must_use]
    pub fn node_script_count(&self, r: NodeRef) -> usize {
        self.node_scripts.get(&r).map_or(0, SmallVec::len)
    }

    #[must_use]
    pub fn node_script_ref(&self, r: NodeRef, idx: usize) -> ComponentRef {
        self.node_scripts
            .get(&r)
            .and_then(|list| list.get(idx).copied())
            .unwrap_or(GenRef::INVALID)
    }

    pub fn set_node_script(&mut self, r: NodeRef, idx: usize, cref: ComponentRef) {
        if !self.nodes.is_valid(r) {
            log::warn!("Invalid node reference");
            return;
        }
        let list = self.node_scripts.entry(r).or_default();
        if idx >= list.len() {
            list.resize(idx + 1, GenRef::INVALID);
        }
        list[idx] = cref;
    }

    pub fn remove_node_script(&mut self, r: NodeRef, cref: ComponentRef) {
        Self::remove_attachment(&mut self.node_scripts, r, |entry| *entry == cref);
    }

    pub fn remove_node_script_at(&mut self, r: NodeRef, idx: usize) {
        let mut i = 0;
        Self::remove_attachment(&mut self.node_scripts, r, |_| {
            let hit = i == idx;
            i += 1;
            hit
        });
    }

    /// Scripts attached to the scene itself rather than to a node.
    #[must_use]
    pub fn scene_scripts(&self) -> &[ComponentRef] {
        &self.scene_scripts
    }

    pub fn add_scene_script(&mut self, cref: ComponentRef) {
        self.scene_scripts.push(cref);
    }

    pub fn remove_scene_script(&mut self, cref: ComponentRef) {
        self.scene_scripts.retain(|&entry| entry != cref);
    }

    // ========================================================================
    // Instance component
    // ========================================================================

    pub fn create_instance(&mut self, path: impl Into<String>) -> ComponentRef {
        self.instances.add(Instance {
            path: path.into(),
            ..Instance::default()
        })
    }

    pub fn destroy_instance(&mut self, r: ComponentRef) {
        self.instances.remove(r);
    }

    #[must_use]
    pub fn is_valid_instance_ref(&self, r: ComponentRef) -> bool {
        self.instances.is_valid(r)
    }

    #[must_use]
    pub fn instance(&self, r: ComponentRef) -> Option<&Instance> {
        self.instances.get(r)
    }

    pub fn instance_mut(&mut self, r: ComponentRef) -> Option<&mut Instance> {
        self.instances.get_mut(r)
    }

    #[must_use]
    pub fn node_instance_ref(&self, r: NodeRef) -> ComponentRef {
        self.node_instance.get(&r).copied().unwrap_or(GenRef::INVALID)
    }

    /// Associates an instance component with a node; the invalid reference
    /// clears the association.
    pub fn set_node_instance(&mut self, r: NodeRef, cref: ComponentRef) {
        if cref.is_invalid() {
            self.node_instance.remove(&r);
        } else {
            self.node_instance.insert(r, cref);
        }
    }

    // ========================================================================
    // Animations
    // ========================================================================

    pub fn add_anim(&mut self, anim: Anim) -> AnimRef {
        self.anims.add(anim)
    }

    pub fn destroy_anim(&mut self, r: AnimRef) {
        self.anims.remove(r);
    }

    #[must_use]
    pub fn is_valid_anim(&self, r: AnimRef) -> bool {
        self.anims.is_valid(r)
    }

    #[must_use]
    pub fn anim(&self, r: AnimRef) -> Option<&Anim> {
        self.anims.get(r)
    }

    pub fn anim_mut(&mut self, r: AnimRef) -> Option<&mut Anim> {
        self.anims.get_mut(r)
    }

    #[must_use]
    pub fn anims(&self) -> Vec<AnimRef> {
        self.anims.iter().map(|(r, _)| r).collect()
    }

    #[must_use]
    pub fn anim_ref_at(&self, idx: u32) -> AnimRef {
        self.anims.get_ref(idx)
    }

    pub fn add_scene_anim(&mut self, anim: SceneAnim) -> SceneAnimRef {
        self.scene_anims.add(anim)
    }

    pub fn destroy_scene_anim(&mut self, r: SceneAnimRef) {
        self.scene_anims.remove(r);
    }

    #[must_use]
    pub fn is_valid_scene_anim(&self, r: SceneAnimRef) -> bool {
        self.scene_anims.is_valid(r)
    }

    #[must_use]
    pub fn scene_anim(&self, r: SceneAnimRef) -> Option<&SceneAnim> {
        self.scene_anims.get(r)
    }

    pub fn scene_anim_mut(&mut self, r: SceneAnimRef) -> Option<&mut SceneAnim> {
        self.scene_anims.get_mut(r)
    }

    /// Scene animations, excluding those owned by instance views.
    #[must_use]
    pub fn get_scene_anims(&self) -> Vec<SceneAnimRef> {
        self.scene_anims
            .iter()
            .filter(|(_, a)| !a.flags.contains(SceneAnimFlags::INSTANTIATED))
            .map(|(r, _)| r)
            .collect()
    }

    /// First non-instantiated scene anim carrying `name`.
    #[must_use]
    pub fn get_scene_anim(&self, name: &str) -> SceneAnimRef {
        self.scene_anims
            .iter()
            .find(|(_, a)| !a.flags.contains(SceneAnimFlags::INSTANTIATED) && a.name == name)
            .map_or(GenRef::INVALID, |(r, _)| r)
    }

    /// Anims eligible for save: everything not owned by an instance view.
    pub(crate) fn iter_saved_anims(&self) -> impl Iterator<Item = (AnimRef, &Anim)> {
        self.anims
            .iter()
            .filter(|(_, a)| !a.flags.contains(AnimFlags::INSTANTIATED))
    }

    /// Scene anims eligible for save, with their references.
    pub(crate) fn iter_saved_scene_anims(
        &self,
    ) -> impl Iterator<Item = (SceneAnimRef, &SceneAnim)> {
        self.scene_anims
            .iter()
            .filter(|(_, a)| !a.flags.contains(SceneAnimFlags::INSTANTIATED))
    }

    /// Deep-copies a scene anim together with the anims it references.
    pub fn duplicate_scene_anim(&mut self, r: SceneAnimRef) -> SceneAnimRef {
        let Some(src) = self.scene_anims.get(r).cloned() else {
            log::warn!("Invalid scene animation reference");
            return GenRef::INVALID;
        };

        let mut out = SceneAnim {
            name: src.name.clone(),
            t_start: src.t_start,
            t_end: src.t_end,
            frame_duration: src.frame_duration,
            ..SceneAnim::default()
        };

        if let Some(anim) = self.anims.get(src.scene_anim).cloned() {
            out.scene_anim = self.anims.add(anim);
        }

        for node_anim in &src.node_anims {
            if let Some(anim) = self.anims.get(node_anim.anim).cloned() {
                out.node_anims.push(crate::anim::NodeAnim {
                    node: node_anim.node,
                    anim: self.anims.add(anim),
                });
            }
        }

        self.scene_anims.add(out)
    }

    // ========================================================================
    // Scene state
    // ========================================================================

    #[must_use]
    pub fn current_camera(&self) -> NodeRef {
        self.current_camera
    }

    pub fn set_current_camera(&mut self, r: NodeRef) {
        self.current_camera = r;
    }

    // ========================================================================
    // Key/value store
    // ========================================================================

    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.key_values.contains_key(key)
    }

    #[must_use]
    pub fn get_keys(&self) -> Vec<String> {
        self.key_values.keys().cloned().collect()
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> &str {
        self.key_values.get(key).map_or("", String::as_str)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_values.insert(key.into(), value.into());
    }

    pub fn remove_key(&mut self, key: &str) {
        self.key_values.remove(key);
    }
}

/// Flattened per-node child lists, built once by
/// [`Scene::build_nodes_children`] and valid until the graph changes.
pub struct NodesChildren {
    ranges: FxHashMap<NodeRef, (u32, u32)>,
    all_children: Vec<NodeRef>,
}

impl NodesChildren {
    #[must_use]
    pub fn get_children(&self, r: NodeRef) -> &[NodeRef] {
        match self.ranges.get(&r) {
            Some(&(offset, count)) => {
                &self.all_children[offset as usize..(offset + count) as usize]
            }
            None => &[],
        }
    }
}
