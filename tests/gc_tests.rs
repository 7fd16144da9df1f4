//! Garbage Collection Tests
//!
//! Tests for:
//! - Orphaned component reclamation after node destruction
//! - Deferred collection ("remove now, collect later")
//! - Fixed-point iteration across cascading teardowns
//! - Association map pruning

use glam::Vec3;
use nacre_scene::resources::MemoryReadProvider;
use nacre_scene::scene::{LoadSaveFlags, Scene};
use nacre_scene::{GenRef, NameCache};

fn node_with_transform(scene: &mut Scene, name: &str) -> nacre_scene::NodeRef {
    let node = scene.create_node(name);
    let trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(node, trs);
    node
}

// ============================================================================
// Basic collection
// ============================================================================

#[test]
fn orphaned_components_survive_until_gc() {
    let mut scene = Scene::new();
    let node = node_with_transform(&mut scene, "n");
    let trs = scene.node_transform_ref(node);
    let camera = scene.create_perspective_camera(0.1, 100.0, 1.0);
    scene.set_node_camera(node, camera);

    scene.destroy_node(node);

    // components linger until an explicit collection pass
    assert!(scene.is_valid_transform_ref(trs));
    assert!(scene.is_valid_camera_ref(camera));

    let removed = scene.garbage_collect();
    assert_eq!(removed, 2);
    assert!(!scene.is_valid_transform_ref(trs));
    assert!(!scene.is_valid_camera_ref(camera));
}

#[test]
fn referenced_components_are_kept() {
    let mut scene = Scene::new();
    let node = node_with_transform(&mut scene, "kept");
    let trs = scene.node_transform_ref(node);

    assert_eq!(scene.garbage_collect(), 0);
    assert!(scene.is_valid_transform_ref(trs));
}

#[test]
fn shared_component_kept_while_any_referrer_lives() {
    let mut scene = Scene::new();
    let camera = scene.create_perspective_camera(0.1, 100.0, 1.0);

    let a = scene.create_node("a");
    let b = scene.create_node("b");
    scene.set_node_camera(a, camera);
    scene.set_node_camera(b, camera);

    scene.destroy_node(a);
    scene.garbage_collect();
    assert!(scene.is_valid_camera_ref(camera));

    scene.destroy_node(b);
    scene.garbage_collect();
    assert!(!scene.is_valid_camera_ref(camera));
}

// ============================================================================
// Fixed point
// ============================================================================

#[test]
fn second_collection_removes_nothing() {
    let mut scene = Scene::new();
    for i in 0..4 {
        let node = node_with_transform(&mut scene, format!("n{i}").as_str());
        let collision = scene.create_sphere_collision(1.0, 1.0);
        scene.set_node_collision(node, 0, collision);
        scene.destroy_node(node);
    }

    assert!(scene.garbage_collect() > 0);
    assert_eq!(scene.garbage_collect(), 0, "collection must reach a fixed point");
}

#[test]
fn view_teardown_cascades_across_passes() {
    // destroying a host node must eventually reclaim the instance, the
    // view's nodes and their components, however many passes that takes
    let mut template = Scene::new();
    node_with_transform(&mut template, "inner");
    let resources_ro = NameCache::new();
    let mut bytes = Vec::new();
    template
        .save_binary(&mut bytes, &resources_ro, LoadSaveFlags::ALL, None)
        .expect("save");

    let mut provider = MemoryReadProvider::new();
    provider.insert("inner.scn", bytes);
    let mut resources = NameCache::new();

    let mut scene = Scene::new();
    let host = node_with_transform(&mut scene, "host");
    let instance = scene.create_instance("inner.scn");
    scene.set_node_instance(host, instance);
    scene.node_setup_instance(host, &provider, &mut resources, LoadSaveFlags::ALL, 1);
    assert_eq!(scene.all_node_count(), 2);

    scene.destroy_node(host);
    scene.garbage_collect();

    assert_eq!(scene.all_node_count(), 0);
    assert!(!scene.is_valid_instance_ref(instance));
    assert_eq!(scene.garbage_collect(), 0);
}

// ============================================================================
// Association maps and anims
// ============================================================================

#[test]
fn collision_list_of_dead_node_is_pruned() {
    let mut scene = Scene::new();
    let node = scene.create_node("body");
    let collision = scene.create_sphere_collision(0.5, 1.0);
    scene.set_node_collision(node, 0, collision);

    scene.destroy_node(node);
    scene.garbage_collect();

    assert!(!scene.is_valid_collision_ref(collision));
    assert_eq!(scene.node_collision_count(node), 0);
}

#[test]
fn anims_follow_their_scene_anim() {
    let mut scene = Scene::new();
    let anim_ref = scene.add_anim(nacre_scene::anim::Anim::default());
    let scene_anim_ref = scene.add_scene_anim(nacre_scene::anim::SceneAnim {
        name: "a".to_owned(),
        scene_anim: anim_ref,
        ..nacre_scene::anim::SceneAnim::default()
    });

    assert_eq!(scene.garbage_collect_anims(), 0);

    scene.destroy_scene_anim(scene_anim_ref);
    assert_eq!(scene.garbage_collect_anims(), 1);
    assert!(!scene.is_valid_anim(anim_ref));
}
