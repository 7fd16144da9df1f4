//! Scene Registry Tests
//!
//! Tests for:
//! - Node creation/destruction and reference validity
//! - Fixed component slots and accessors
//! - Collision/script attachment lists with stable indices
//! - Enable/disable semantics
//! - Name and path lookups
//! - Key/value store

use glam::Vec3;
use nacre_scene::scene::{Camera, ComponentIdx, NodeFlags, Scene};
use nacre_scene::GenRef;

// ============================================================================
// Nodes
// ============================================================================

#[test]
fn create_and_destroy_node() {
    let mut scene = Scene::new();
    let node = scene.create_node("player");

    assert!(scene.is_valid_node_ref(node));
    assert_eq!(scene.node_name(node), "player");
    assert_eq!(scene.node_count(), 1);

    scene.destroy_node(node);
    assert!(!scene.is_valid_node_ref(node));
    assert_eq!(scene.node_count(), 0);
}

#[test]
fn stale_node_ref_yields_defaults() {
    let mut scene = Scene::new();
    let node = scene.create_node("gone");
    scene.destroy_node(node);

    // documented defaults, never a panic
    assert_eq!(scene.node_name(node), "");
    assert_eq!(scene.node_flags(node), NodeFlags::empty());
    assert!(scene.node_transform(node).is_none());
}

#[test]
fn node_ref_stays_stale_after_slot_reuse() {
    let mut scene = Scene::new();
    let first = scene.create_node("first");
    scene.destroy_node(first);
    let second = scene.create_node("second");

    assert_eq!(first.idx, second.idx, "slot must be reused");
    assert!(!scene.is_valid_node_ref(first));
    assert!(scene.is_valid_node_ref(second));
    assert_eq!(scene.node_name(second), "second");
}

#[test]
fn get_node_by_name() {
    let mut scene = Scene::new();
    scene.create_node("a");
    let b = scene.create_node("b");

    assert_eq!(scene.get_node("b"), b);
    assert!(scene.get_node("missing").is_invalid());
}

#[test]
fn get_node_ex_walks_children() {
    let mut scene = Scene::new();

    let root = scene.create_node("root");
    let root_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(root, root_trs);

    let arm = scene.create_node("arm");
    let arm_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, root);
    scene.set_node_transform(arm, arm_trs);

    let hand = scene.create_node("hand");
    let hand_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, arm);
    scene.set_node_transform(hand, hand_trs);

    assert_eq!(scene.get_node_ex("root/arm/hand"), hand);
    assert!(scene.get_node_ex("root/leg").is_invalid());
}

// ============================================================================
// Fixed component slots
// ============================================================================

#[test]
fn camera_component_slot() {
    let mut scene = Scene::new();
    let node = scene.create_node("cam");
    let camera = scene.create_perspective_camera(0.1, 100.0, 1.0);
    scene.set_node_camera(node, camera);

    assert_eq!(scene.node_camera_ref(node), camera);
    assert!(scene.camera(camera).is_some());

    // replacing the slot does not destroy the old component
    let other = scene.create_camera(Camera::default());
    scene.set_node_camera(node, other);
    assert!(scene.is_valid_camera_ref(camera));
}

#[test]
fn nodes_with_component_filters() {
    let mut scene = Scene::new();
    let lit = scene.create_node("lit");
    let light = scene.create_point_light(5.0);
    scene.set_node_light(lit, light);
    scene.create_node("plain");

    let with_light = scene.nodes_with_component(ComponentIdx::Light);
    assert_eq!(with_light, vec![lit]);
}

#[test]
fn light_fields_accessible_through_ref() {
    let mut scene = Scene::new();
    let light = scene.create_spot_light(10.0, 0.3, 0.6);

    let l = scene.light(light).unwrap();
    assert!((l.radius - 10.0).abs() < f32::EPSILON);

    scene.light_mut(light).unwrap().diffuse_intensity = 2.0;
    assert!((scene.light(light).unwrap().diffuse_intensity - 2.0).abs() < f32::EPSILON);
}

// ============================================================================
// Attachment lists
// ============================================================================

#[test]
fn collision_attachment_indices_are_stable() {
    let mut scene = Scene::new();
    let node = scene.create_node("body");

    let c0 = scene.create_sphere_collision(0.5, 1.0);
    let c1 = scene.create_cube_collision(Vec3::ONE, 1.0);
    let c2 = scene.create_capsule_collision(0.3, 1.8, 70.0);

    scene.set_node_collision(node, 0, c0);
    scene.set_node_collision(node, 1, c1);
    scene.set_node_collision(node, 2, c2);
    assert_eq!(scene.node_collision_count(node), 3);

    // removing the middle entry leaves a sentinel so later indices hold
    scene.remove_node_collision(node, c1);
    assert_eq!(scene.node_collision_count(node), 3);
    assert!(scene.node_collision_ref(node, 1).is_invalid());
    assert_eq!(scene.node_collision_ref(node, 2), c2);

    // removing the tail trims trailing sentinels
    scene.remove_node_collision(node, c2);
    assert_eq!(scene.node_collision_count(node), 1);
    assert_eq!(scene.node_collision_ref(node, 0), c0);
}

#[test]
fn script_attachment_and_scene_scripts() {
    let mut scene = Scene::new();
    let node = scene.create_node("scripted");

    let s0 = scene.create_script("scripts/ai.lua");
    scene.set_node_script(node, 0, s0);
    assert_eq!(scene.node_script_count(node), 1);
    assert_eq!(scene.script(s0).unwrap().path, "scripts/ai.lua");

    let global = scene.create_script("scripts/boot.lua");
    scene.add_scene_script(global);
    assert_eq!(scene.scene_scripts(), &[global]);

    scene.remove_scene_script(global);
    assert!(scene.scene_scripts().is_empty());
}

// ============================================================================
// Enable / disable
// ============================================================================

#[test]
fn disable_and_enable_node() {
    let mut scene = Scene::new();
    let node = scene.create_node("n");

    assert!(scene.is_node_enabled(node));
    scene.disable_node(node);
    assert!(!scene.is_node_enabled(node));
    assert!(!scene.is_node_itself_enabled(node));
    scene.enable_node(node);
    assert!(scene.is_node_enabled(node));
}

// ============================================================================
// Hierarchy queries
// ============================================================================

#[test]
fn child_refs_and_is_child_of() {
    let mut scene = Scene::new();
    let parent = scene.create_node("p");
    let p_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(parent, p_trs);

    let child = scene.create_node("c");
    let c_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, parent);
    scene.set_node_transform(child, c_trs);

    assert_eq!(scene.node_child_refs(parent), vec![child]);
    assert!(scene.is_child_of(child, parent));
    assert!(scene.is_root(parent));
    assert!(!scene.is_root(child));
}

#[test]
fn nodes_children_batch_lookup() {
    let mut scene = Scene::new();
    let parent = scene.create_node("p");
    let p_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(parent, p_trs);

    let mut children = Vec::new();
    for i in 0..3 {
        let child = scene.create_node(format!("c{i}"));
        let trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, parent);
        scene.set_node_transform(child, trs);
        children.push(child);
    }

    let table = scene.build_nodes_children();
    let mut listed: Vec<_> = table.get_children(parent).to_vec();
    listed.sort();
    children.sort();
    assert_eq!(listed, children);
    assert!(table.get_children(children[0]).is_empty());
}

// ============================================================================
// Key/value store
// ============================================================================

#[test]
fn key_value_store() {
    let mut scene = Scene::new();
    assert!(!scene.has_key("author"));

    scene.set_value("author", "nacre");
    assert!(scene.has_key("author"));
    assert_eq!(scene.get_value("author"), "nacre");
    assert_eq!(scene.get_value("missing"), "");

    scene.remove_key("author");
    assert!(!scene.has_key("author"));
}

// ============================================================================
// Clear
// ============================================================================

#[test]
fn clear_invalidates_everything() {
    let mut scene = Scene::new();
    let node = scene.create_node("n");
    let trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(node, trs);
    scene.set_value("k", "v");

    scene.clear();

    assert!(!scene.is_valid_node_ref(node));
    assert!(!scene.is_valid_transform_ref(trs));
    assert_eq!(scene.all_node_count(), 0);
    assert!(!scene.has_key("k"));
}
