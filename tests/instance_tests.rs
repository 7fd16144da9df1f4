//! Instancing Tests
//!
//! Tests for:
//! - Sub-scene instantiation into a private view
//! - Node counts excluding instantiated content
//! - Re-setup idempotence
//! - Enable/disable propagation through views
//! - Moving instances between host nodes
//! - On-instantiate animation startup
//! - Recursion depth policy

use glam::Vec3;
use nacre_scene::anim::{Anim, AnimTrack, LoopMode, NodeAnim, SceneAnim};
use nacre_scene::resources::MemoryReadProvider;
use nacre_scene::scene::{LoadSaveFlags, NodeFlags, Scene};
use nacre_scene::{GenRef, NameCache};

const EPSILON: f32 = 1e-4;

/// Serializes a two-node sub-scene ("root" with child "leaf") with a scene
/// anim "spin" that moves the root on x over one second.
fn sub_scene_bytes() -> Vec<u8> {
    let mut scene = Scene::new();
    let resources = NameCache::new();

    let root = scene.create_node("root");
    let root_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(root, root_trs);

    let leaf = scene.create_node("leaf");
    let leaf_trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, root);
    scene.set_node_transform(leaf, leaf_trs);

    let mut anim = Anim {
        t_start: 0.0,
        t_end: 1.0,
        ..Anim::default()
    };
    let mut track = AnimTrack::new("Position");
    track.set_key(0.0, Vec3::ZERO);
    track.set_key(1.0, Vec3::new(10.0, 0.0, 0.0));
    anim.vec3_tracks.push(track);
    let anim_ref = scene.add_anim(anim);

    let scene_anim = SceneAnim {
        name: "spin".to_owned(),
        t_start: 0.0,
        t_end: 1.0,
        node_anims: vec![NodeAnim {
            node: root,
            anim: anim_ref,
        }],
        ..SceneAnim::default()
    };
    scene.add_scene_anim(scene_anim);

    let mut bytes = Vec::new();
    scene
        .save_binary(&mut bytes, &resources, LoadSaveFlags::ALL, None)
        .expect("sub-scene save");
    bytes
}

fn host_with_instance(path: &str) -> (Scene, nacre_scene::NodeRef) {
    let mut scene = Scene::new();
    let host = scene.create_node("host");
    let trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(host, trs);
    let instance = scene.create_instance(path);
    scene.set_node_instance(host, instance);
    (scene, host)
}

// ============================================================================
// Setup
// ============================================================================

#[test]
fn setup_creates_instantiated_view() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    assert_eq!(scene.node_count(), 1);

    let ok = scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    assert!(ok);

    // instantiated nodes are hidden from normal enumeration
    assert_eq!(scene.node_count(), 1);
    assert_eq!(scene.all_node_count(), 3);

    let view = scene.node_instance_scene_view(host).expect("view");
    assert_eq!(view.nodes.len(), 2);
    for &node in &view.nodes {
        assert!(scene.node_flags(node).contains(NodeFlags::INSTANTIATED));
    }

    // the sub-scene root is re-parented onto the host
    let root = view.get_node(&scene, "root");
    assert!(scene.is_child_of(root, host));
}

#[test]
fn setup_fails_without_content() {
    let provider = MemoryReadProvider::new();
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("missing.scn");
    let ok = scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    assert!(!ok);
    assert_eq!(scene.all_node_count(), 1);
}

#[test]
fn re_setup_is_idempotent() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    let count_after_first = scene.all_node_count();

    // the old view is torn down before the new one is created
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    assert_eq!(scene.all_node_count(), count_after_first);
}

#[test]
fn destroy_instance_removes_view_content() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    assert_eq!(scene.all_node_count(), 3);

    scene.node_destroy_instance(host);
    assert_eq!(scene.all_node_count(), 1);
}

// ============================================================================
// Enable propagation
// ============================================================================

#[test]
fn disabling_host_disables_view_through_instance_flag() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);

    scene.disable_node(host);

    let view_nodes = scene.node_instance_scene_view(host).unwrap().nodes.clone();
    for &node in &view_nodes {
        assert!(!scene.is_node_enabled(node));
        assert!(
            scene.is_node_itself_enabled(node),
            "host-driven disable must not set the explicit bit"
        );
    }

    scene.enable_node(host);
    for &node in &view_nodes {
        assert!(scene.is_node_enabled(node));
    }
}

#[test]
fn explicit_child_disable_survives_host_toggle() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);

    let leaf = scene
        .node_instance_scene_view(host)
        .unwrap()
        .get_node(&scene, "leaf");
    scene.disable_node(leaf);

    scene.disable_node(host);
    scene.enable_node(host);

    // the explicit per-node disable is independent of the host's state
    assert!(!scene.is_node_enabled(leaf));
    assert!(!scene.is_node_itself_enabled(leaf));
}

// ============================================================================
// Moving instances
// ============================================================================

#[test]
fn move_instance_transfers_view_and_reparents() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);

    let target = scene.create_node("target");
    let t_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(target, t_trs);

    scene.node_move_instance(host, target);

    assert!(scene.node_instance_scene_view(host).is_none());
    let view = scene.node_instance_scene_view(target).expect("moved view");
    let root = view.get_node(&scene, "root");
    assert!(scene.is_child_of(root, target));

    assert!(scene.node_instance_ref(host).is_invalid());
    assert!(!scene.node_instance_ref(target).is_invalid());
}

#[test]
fn move_to_disabled_target_disables_view() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);

    let target = scene.create_node("target");
    scene.disable_node(target);

    scene.node_move_instance(host, target);

    let view_nodes = scene
        .node_instance_scene_view(target)
        .unwrap()
        .nodes
        .clone();
    for &node in &view_nodes {
        assert!(!scene.is_node_enabled(node));
    }
}

// ============================================================================
// On-instantiate animation
// ============================================================================

#[test]
fn on_instantiate_anim_starts_from_view() {
    let mut provider = MemoryReadProvider::new();
    provider.insert("sub.scn", sub_scene_bytes());
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("sub.scn");
    let instance_ref = scene.node_instance_ref(host);
    {
        let instance = scene.instance_mut(instance_ref).unwrap();
        instance.on_instantiate_anim = "spin".to_owned();
        instance.loop_mode = LoopMode::Loop;
    }

    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    let play = scene.node_start_on_instantiate_anim(host);
    assert!(scene.is_playing(play));

    // the animation drives the instantiated root, not any global node
    scene.update_playing_anims(0.5);
    let root = scene
        .node_instance_scene_view(host)
        .unwrap()
        .get_node(&scene, "root");
    let x = scene.node_transform(root).unwrap().pos.x;
    assert!((x - 5.0).abs() < EPSILON);

    scene.node_stop_on_instantiate_anim(host);
    assert!(!scene.is_playing(play));
}

// ============================================================================
// Recursion policy
// ============================================================================

#[test]
fn self_referential_instance_stops_at_depth_limit() {
    // a scene that instances itself: nesting must stop at the documented
    // depth and still report success
    let mut template = Scene::new();
    let node = template.create_node("recursive");
    let trs = template.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    template.set_node_transform(node, trs);
    let instance = template.create_instance("self.scn");
    template.set_node_instance(node, instance);

    let resources_ro = NameCache::new();
    let mut bytes = Vec::new();
    template
        .save_binary(&mut bytes, &resources_ro, LoadSaveFlags::ALL, None)
        .expect("save");

    let mut provider = MemoryReadProvider::new();
    provider.insert("self.scn", bytes);
    let mut resources = NameCache::new();

    let (mut scene, host) = host_with_instance("self.scn");
    let ok = scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);

    assert!(ok, "depth overflow is a successful no-op by policy");
    assert!(scene.all_node_count() < 16, "nesting must be bounded");
}
