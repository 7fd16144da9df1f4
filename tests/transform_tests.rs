//! Transform Hierarchy Tests
//!
//! Tests for:
//! - World matrix evaluation through parent chains
//! - Per-tick memoization and staleness reset
//! - Previous-matrix double buffering and first-frame fixup
//! - Force-set world matrices (physics contract)
//! - Cycle guard on pathological parent chains

use glam::{Mat4, Vec3};
use nacre_scene::scene::{Scene, Transform};
use nacre_scene::GenRef;

const EPSILON: f32 = 1e-5;

fn approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

fn world_pos(scene: &Scene, node: nacre_scene::NodeRef) -> Vec3 {
    scene
        .get_node_world_matrix(node)
        .transform_point3(Vec3::ZERO)
}

// ============================================================================
// Basic evaluation
// ============================================================================

#[test]
fn child_inherits_parent_translation() {
    let mut scene = Scene::new();

    let a = scene.create_node("A");
    let a_trs = scene.create_transform_trs(Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(a, a_trs);

    let b = scene.create_node("B");
    let b_trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, a);
    scene.set_node_transform(b, b_trs);

    scene.ready_world_matrices();
    scene.compute_world_matrices();

    assert!(approx(world_pos(&scene, b), Vec3::new(6.0, 0.0, 0.0)));
}

#[test]
fn root_world_matrix_is_local() {
    let mut scene = Scene::new();
    let node = scene.create_node("root");
    let trs = scene.create_transform(Transform {
        pos: Vec3::new(1.0, 2.0, 3.0),
        scale: Vec3::splat(2.0),
        ..Transform::default()
    });
    scene.set_node_transform(node, trs);

    scene.ready_world_matrices();
    scene.compute_world_matrices();

    assert!(approx(world_pos(&scene, node), Vec3::new(1.0, 2.0, 3.0)));
}

#[test]
fn three_level_chain_accumulates() {
    let mut scene = Scene::new();

    let mut parent = GenRef::INVALID;
    let mut nodes = Vec::new();
    for i in 0..3 {
        let node = scene.create_node(format!("n{i}"));
        let trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, parent);
        scene.set_node_transform(node, trs);
        nodes.push(node);
        parent = node;
    }

    scene.ready_world_matrices();
    scene.compute_world_matrices();

    assert!(approx(world_pos(&scene, nodes[2]), Vec3::new(3.0, 0.0, 0.0)));
}

// ============================================================================
// Memoization
// ============================================================================

#[test]
fn repeated_compute_is_idempotent_within_tick() {
    let mut scene = Scene::new();
    let node = scene.create_node("n");
    let trs = scene.create_transform_trs(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(node, trs);

    scene.ready_world_matrices();
    scene.compute_world_matrices();
    let first = scene.get_node_world_matrix(node);

    // mutate the transform, then recompute WITHOUT readying: the cached
    // value must win
    scene.node_transform_mut(node).unwrap().pos = Vec3::new(9.0, 0.0, 0.0);
    scene.compute_world_matrices();
    let second = scene.get_node_world_matrix(node);

    assert_eq!(first.to_cols_array(), second.to_cols_array());
}

#[test]
fn child_sees_current_tick_parent_value() {
    let mut scene = Scene::new();

    let a = scene.create_node("A");
    let a_trs = scene.create_transform_trs(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(a, a_trs);

    let b = scene.create_node("B");
    let b_trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, a);
    scene.set_node_transform(b, b_trs);

    scene.ready_world_matrices();
    scene.compute_world_matrices();
    assert!(approx(world_pos(&scene, b), Vec3::new(1.0, 0.0, 0.0)));

    // move the parent, next tick the child must not see last tick's cache
    scene.node_transform_mut(a).unwrap().pos = Vec3::new(5.0, 0.0, 0.0);
    scene.ready_world_matrices();

    // compute the child FIRST; it must pull the parent's fresh value
    let b_trs_ref = scene.node_transform_ref(b);
    scene.compute_transform_world_matrix(b_trs_ref.idx);

    assert!(approx(world_pos(&scene, b), Vec3::new(6.0, 0.0, 0.0)));
}

// ============================================================================
// Double buffering
// ============================================================================

#[test]
fn previous_matrices_lag_one_tick() {
    let mut scene = Scene::new();
    let node = scene.create_node("n");
    let trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(node, trs);

    scene.update(0.016);
    scene.node_transform_mut(node).unwrap().pos = Vec3::new(2.0, 0.0, 0.0);
    scene.update(0.016);

    let trs_idx = scene.node_transform_ref(node).idx;
    let current = scene.transform_world_matrix(trs_idx).transform_point3(Vec3::ZERO);
    let previous = scene
        .previous_transform_world_matrix(trs_idx)
        .transform_point3(Vec3::ZERO);

    assert!(approx(current, Vec3::new(2.0, 0.0, 0.0)));
    assert!(approx(previous, Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn new_transform_has_zero_motion_on_first_frame() {
    let mut scene = Scene::new();
    scene.update(0.016);

    let node = scene.create_node("late");
    let trs = scene.create_transform_trs(Vec3::new(7.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(node, trs);

    scene.update(0.016);

    let trs_idx = scene.node_transform_ref(node).idx;
    let current = scene.transform_world_matrix(trs_idx);
    let previous = scene.previous_transform_world_matrix(trs_idx);

    // fixup back-fills the previous matrix so motion vectors start at zero
    assert_eq!(current.to_cols_array(), previous.to_cols_array());
}

// ============================================================================
// Forced world matrices
// ============================================================================

#[test]
fn forced_world_matrix_survives_evaluation() {
    let mut scene = Scene::new();
    let node = scene.create_node("body");
    let trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(node, trs);

    scene.ready_world_matrices();
    let physics_pose = Mat4::from_translation(Vec3::new(42.0, 0.0, 0.0));
    scene.set_node_world_matrix(node, physics_pose);
    scene.compute_world_matrices();

    // the evaluator must not overwrite a slot force-set this tick
    assert!(approx(world_pos(&scene, node), Vec3::new(42.0, 0.0, 0.0)));
    // and the TRS fields stay untouched
    assert!(approx(
        scene.node_transform(node).unwrap().pos,
        Vec3::new(1.0, 0.0, 0.0)
    ));
}

#[test]
fn compute_node_world_matrix_ignores_caches() {
    let mut scene = Scene::new();
    let a = scene.create_node("A");
    let a_trs = scene.create_transform_trs(Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, GenRef::INVALID);
    scene.set_node_transform(a, a_trs);

    let b = scene.create_node("B");
    let b_trs = scene.create_transform_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE, a);
    scene.set_node_transform(b, b_trs);

    // no ready/compute calls at all
    let world = scene.compute_node_world_matrix(b);
    assert!(approx(
        world.transform_point3(Vec3::ZERO),
        Vec3::new(6.0, 0.0, 0.0)
    ));
}

// ============================================================================
// Cycle guard
// ============================================================================

#[test]
fn cyclic_parent_chain_terminates() {
    let mut scene = Scene::new();

    let a = scene.create_node("A");
    let b = scene.create_node("B");
    let a_trs = scene.create_transform_trs(Vec3::X, Vec3::ZERO, Vec3::ONE, b);
    let b_trs = scene.create_transform_trs(Vec3::X, Vec3::ZERO, Vec3::ONE, a);
    scene.set_node_transform(a, a_trs);
    scene.set_node_transform(b, b_trs);

    // a cycle is a caller bug; evaluation must terminate, not recurse
    // forever
    scene.ready_world_matrices();
    scene.compute_world_matrices();

    let _ = scene.compute_node_world_matrix(a);
}
