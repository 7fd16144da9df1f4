//! Serialization Tests
//!
//! Tests for:
//! - Binary round trip of nodes, components and animations
//! - Parent/bone remapping through saved indices
//! - Selective section loading via flags
//! - Header validation (magic, marker, version)
//! - JSON round trip and format auto-detection

use std::io::Cursor;

use glam::{Vec3, Vec4};
use nacre_scene::anim::{Anim, AnimTrack, NodeAnim, SceneAnim};
use nacre_scene::io::is_binary_scene_data;
use nacre_scene::resources::{LoadPolicy, MemoryReadProvider, ResourceCache};
use nacre_scene::scene::{
    LoadContext, LoadSaveFlags, Material, NodeFlags, Object, Scene, ScriptParam,
};
use nacre_scene::{GenRef, NameCache, SceneError};

const EPSILON: f32 = 1e-5;

/// A scene exercising every section: two-node hierarchy, camera, light,
/// object with materials and a model, rigid body, collision, script,
/// animation and key/values.
fn rich_scene(resources: &mut NameCache) -> Scene {
    let mut scene = Scene::new();

    let parent = scene.create_node("parent");
    let parent_trs = scene.create_transform_trs(
        Vec3::new(5.0, 0.0, 0.0),
        Vec3::ZERO,
        Vec3::ONE,
        GenRef::INVALID,
    );
    scene.set_node_transform(parent, parent_trs);

    let child = scene.create_node("child");
    let child_trs =
        scene.create_transform_trs(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::ONE, parent);
    scene.set_node_transform(child, child_trs);
    scene.disable_node(child);

    let camera = scene.create_perspective_camera(0.25, 250.0, 0.9);
    scene.set_node_camera(parent, camera);
    scene.set_current_camera(parent);

    let light = scene.create_point_light(12.0);
    scene.light_mut(light).unwrap().diffuse_intensity = 3.5;
    scene.set_node_light(child, light);

    let mut material = Material::default();
    material.values.insert("uTint".to_owned(), Vec4::new(0.1, 0.2, 0.3, 1.0));
    let model = resources.load_model("models/crate.mdl", LoadPolicy::NameOnly);
    let object = scene.create_object(Object {
        model,
        materials: vec![material],
        material_names: vec!["crate".to_owned()],
        bones: vec![parent, child],
    });
    scene.set_node_object(child, object);

    let body = scene.create_rigid_body(nacre_scene::scene::RigidBody::default());
    scene.rigid_body_mut(body).unwrap().set_friction(0.25);
    scene.set_node_rigid_body(parent, body);

    let collision = scene.create_sphere_collision(0.75, 10.0);
    scene.set_node_collision(parent, 0, collision);

    let script = scene.create_script("scripts/spin.lua");
    scene
        .script_mut(script)
        .unwrap()
        .params
        .insert("speed".to_owned(), ScriptParam::Float(2.5));
    scene.set_node_script(child, 0, script);

    let mut anim = Anim {
        t_start: 0.0,
        t_end: 2.0,
        ..Anim::default()
    };
    let mut track = AnimTrack::new("Position");
    track.set_key(0.0, Vec3::ZERO);
    track.set_key(2.0, Vec3::new(4.0, 0.0, 0.0));
    anim.vec3_tracks.push(track);
    let anim_ref = scene.add_anim(anim);
    scene.add_scene_anim(SceneAnim {
        name: "slide".to_owned(),
        t_start: 0.0,
        t_end: 2.0,
        node_anims: vec![NodeAnim {
            node: child,
            anim: anim_ref,
        }],
        ..SceneAnim::default()
    });

    scene.set_value("author", "test-suite");
    scene
}

fn save(scene: &Scene, resources: &NameCache, flags: LoadSaveFlags) -> Vec<u8> {
    let mut bytes = Vec::new();
    scene
        .save_binary(&mut bytes, resources, flags, None)
        .expect("save");
    bytes
}

fn load(bytes: &[u8], resources: &mut NameCache, flags: LoadSaveFlags) -> Scene {
    let mut scene = Scene::new();
    let provider = MemoryReadProvider::new();
    let mut ctx = LoadContext::new(0);
    scene
        .load_binary(
            &mut Cursor::new(bytes),
            "test",
            &provider,
            resources,
            &mut ctx,
            flags,
        )
        .expect("load");
    scene
}

// ============================================================================
// Binary round trip
// ============================================================================

#[test]
fn round_trip_preserves_nodes_and_topology() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(&original, &resources, LoadSaveFlags::ALL);

    let mut load_resources = NameCache::new();
    let loaded = load(&bytes, &mut load_resources, LoadSaveFlags::ALL);

    assert_eq!(loaded.node_count(), 2);

    let parent = loaded.get_node("parent");
    let child = loaded.get_node("child");
    assert!(!parent.is_invalid());
    assert!(!child.is_invalid());

    // topology survives by remapping, not by raw index equality
    assert!(loaded.is_child_of(child, parent));
    assert!(loaded.is_root(parent));

    // serialized flag subset
    assert!(!loaded.is_node_itself_enabled(child));
    assert!(loaded.is_node_itself_enabled(parent));
    assert!(!loaded
        .node_flags(child)
        .contains(NodeFlags::INSTANTIATED));
}

#[test]
fn round_trip_preserves_component_fields() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(&original, &resources, LoadSaveFlags::ALL);

    let mut load_resources = NameCache::new();
    let loaded = load(&bytes, &mut load_resources, LoadSaveFlags::ALL);

    let parent = loaded.get_node("parent");
    let child = loaded.get_node("child");

    let trs = loaded.node_transform(child).unwrap();
    assert!((trs.pos - Vec3::new(1.0, 2.0, 3.0)).length() < EPSILON);

    let camera = loaded.camera(loaded.node_camera_ref(parent)).unwrap();
    assert!((camera.fov - 0.9).abs() < EPSILON);
    assert!((camera.zrange.zfar - 250.0).abs() < EPSILON);
    assert_eq!(loaded.current_camera(), parent);

    let light = loaded.light(loaded.node_light_ref(child)).unwrap();
    assert!((light.diffuse_intensity - 3.5).abs() < EPSILON);
    assert!((light.radius - 12.0).abs() < EPSILON);

    let body = loaded
        .rigid_body(loaded.node_rigid_body_ref(parent))
        .unwrap();
    assert!((body.friction() - 0.25).abs() < 1.0 / 255.0);

    let collision = loaded
        .collision(loaded.node_collision_ref(parent, 0))
        .unwrap();
    assert!((collision.radius - 0.75).abs() < EPSILON);

    let script = loaded.script(loaded.node_script_ref(child, 0)).unwrap();
    assert_eq!(script.path, "scripts/spin.lua");
    assert_eq!(script.params["speed"], ScriptParam::Float(2.5));

    assert_eq!(loaded.get_value("author"), "test-suite");
}

#[test]
fn round_trip_remaps_model_and_bones() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(&original, &resources, LoadSaveFlags::ALL);

    let mut load_resources = NameCache::new();
    let loaded = load(&bytes, &mut load_resources, LoadSaveFlags::ALL);

    let parent = loaded.get_node("parent");
    let child = loaded.get_node("child");

    let object = loaded.object(loaded.node_object_ref(child)).unwrap();
    assert_eq!(
        load_resources.model_name(object.model),
        Some("models/crate.mdl")
    );
    assert_eq!(object.material_names, vec!["crate".to_owned()]);
    let tint = object.materials[0].values["uTint"];
    assert!((tint - Vec4::new(0.1, 0.2, 0.3, 1.0)).length() < EPSILON);

    // bone references point at the re-created nodes
    assert_eq!(object.bones, vec![parent, child]);
}

#[test]
fn round_trip_preserves_animations() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(&original, &resources, LoadSaveFlags::ALL);

    let mut load_resources = NameCache::new();
    let mut loaded = load(&bytes, &mut load_resources, LoadSaveFlags::ALL);

    let scene_anim_ref = loaded.get_scene_anim("slide");
    assert!(!scene_anim_ref.is_invalid());

    // play it to prove node anim references were remapped
    let play = loaded.play_anim(scene_anim_ref, nacre_scene::anim::LoopMode::Once);
    assert!(loaded.is_playing(play));
    loaded.update_playing_anims(1.0);

    let child = loaded.get_node("child");
    let x = loaded.node_transform(child).unwrap().pos.x;
    assert!((x - 2.0).abs() < EPSILON);
}

// ============================================================================
// Selective loading
// ============================================================================

#[test]
fn anims_section_can_be_skipped() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(&original, &resources, LoadSaveFlags::ALL);

    let mut load_resources = NameCache::new();
    let loaded = load(
        &bytes,
        &mut load_resources,
        LoadSaveFlags::ALL & !LoadSaveFlags::ANIMS,
    );

    // the section is byte-skipped; everything after it still parses
    assert!(loaded.get_scene_anim("slide").is_invalid());
    assert_eq!(loaded.get_value("author"), "test-suite");
    assert_eq!(loaded.node_count(), 2);
}

#[test]
fn physics_sections_absent_when_not_saved() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(
        &original,
        &resources,
        LoadSaveFlags::ALL & !LoadSaveFlags::PHYSICS,
    );

    let mut load_resources = NameCache::new();
    let loaded = load(&bytes, &mut load_resources, LoadSaveFlags::ALL);

    let parent = loaded.get_node("parent");
    assert!(loaded.node_rigid_body_ref(parent).is_invalid());
    assert_eq!(loaded.node_collision_count(parent), 0);

    // non-physics content is unaffected
    assert!(!loaded.node_camera_ref(parent).is_invalid());
}

// ============================================================================
// Header validation
// ============================================================================

#[test]
fn bad_magic_aborts_load() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let mut bytes = save(&original, &resources, LoadSaveFlags::ALL);
    bytes[0] ^= 0xff;

    let mut scene = Scene::new();
    let provider = MemoryReadProvider::new();
    let mut ctx = LoadContext::new(0);
    let result = scene.load_binary(
        &mut Cursor::new(&bytes),
        "corrupt",
        &provider,
        &mut resources,
        &mut ctx,
        LoadSaveFlags::ALL,
    );
    assert!(matches!(result, Err(SceneError::BadMagic(_))));
}

#[test]
fn version_mismatch_aborts_load() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let mut bytes = save(&original, &resources, LoadSaveFlags::ALL);
    // version lives after the 4-byte magic and 1-byte marker
    bytes[5] ^= 0xff;

    let mut scene = Scene::new();
    let provider = MemoryReadProvider::new();
    let mut ctx = LoadContext::new(0);
    let result = scene.load_binary(
        &mut Cursor::new(&bytes),
        "future",
        &provider,
        &mut resources,
        &mut ctx,
        LoadSaveFlags::ALL,
    );
    assert!(matches!(result, Err(SceneError::BadVersion { .. })));
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn json_round_trip_preserves_nodes_and_components() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);

    let mut bytes = Vec::new();
    original
        .save_json(&mut bytes, &resources, LoadSaveFlags::ALL, None)
        .expect("save json");
    assert!(!is_binary_scene_data(&bytes));

    let mut loaded = Scene::new();
    let provider = MemoryReadProvider::new();
    let mut load_resources = NameCache::new();
    let mut ctx = LoadContext::new(0);
    loaded
        .load_json(
            &bytes,
            "test.json",
            &provider,
            &mut load_resources,
            &mut ctx,
            LoadSaveFlags::ALL,
        )
        .expect("load json");

    let parent = loaded.get_node("parent");
    let child = loaded.get_node("child");
    assert!(loaded.is_child_of(child, parent));

    let light = loaded.light(loaded.node_light_ref(child)).unwrap();
    assert!((light.diffuse_intensity - 3.5).abs() < EPSILON);

    let object = loaded.object(loaded.node_object_ref(child)).unwrap();
    assert_eq!(
        load_resources.model_name(object.model),
        Some("models/crate.mdl")
    );
    assert_eq!(object.bones, vec![parent, child]);

    assert!(!loaded.get_scene_anim("slide").is_invalid());
    assert_eq!(loaded.get_value("author"), "test-suite");
}

#[test]
fn binary_data_is_detected_by_magic() {
    let mut resources = NameCache::new();
    let original = rich_scene(&mut resources);
    let bytes = save(&original, &resources, LoadSaveFlags::ALL);

    assert!(is_binary_scene_data(&bytes));
    assert!(!is_binary_scene_data(b"{ \"nodes\": [] }"));
    assert!(!is_binary_scene_data(b""));
}
