//! External resource interfaces.
//!
//! The scene core does not own models or textures. It refers to them through
//! opaque generational references into caches owned by the renderer or asset
//! layer, reached through the narrow [`ResourceCache`] trait. Sub-scene
//! content for instancing is fetched through [`ReadProvider`].
//!
//! A failed lookup degrades to [`GenRef::INVALID`]; the scene operation that
//! requested it proceeds with a placeholder reference and rendering-side
//! code is expected to skip or substitute.

use rustc_hash::FxHashMap;

use crate::registry::{GenRef, GenRegistry};

/// Reference into an external model cache.
pub type ModelRef = GenRef;
/// Reference into an external texture cache.
pub type TextureRef = GenRef;

/// How a resource request should be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Load synchronously before returning.
    Now,
    /// Register and queue for asynchronous loading.
    Queue,
    /// Register the name only; never touch storage. Used by diffing and
    /// headless tooling.
    NameOnly,
}

/// Per-mesh-list display metadata of a model, consumed by the display-list
/// builder.
#[derive(Debug, Clone, Default)]
pub struct MeshListInfo {
    /// Material slot this list draws with.
    pub material_slot: u16,
    /// Model-local bone indices referenced by this list; empty when the
    /// list is not skinned.
    pub bones_table: Vec<u16>,
}

/// Display metadata of a model.
#[derive(Debug, Clone, Default)]
pub struct ModelDisplayInfo {
    pub mesh_lists: Vec<MeshListInfo>,
    /// Bone count of the bind pose; a node's object skins only when its bone
    /// list matches this exactly.
    pub bind_pose_bone_count: usize,
}

/// Supplies raw bytes for a named sub-scene or asset.
pub trait ReadProvider {
    fn read(&self, path: &str) -> Option<Vec<u8>>;
}

/// Narrow view of the engine resource caches used by the scene core.
pub trait ResourceCache {
    fn load_model(&mut self, name: &str, policy: LoadPolicy) -> ModelRef;
    fn load_texture(&mut self, name: &str, flags: u32, policy: LoadPolicy) -> TextureRef;

    /// Name a model reference was registered under; needed when saving.
    fn model_name(&self, model: ModelRef) -> Option<&str>;
    fn texture_name(&self, texture: TextureRef) -> Option<&str>;

    fn model_display_info(&self, model: ModelRef) -> Option<&ModelDisplayInfo>;
}

/// Name-indexed reference cache with no storage behind it.
///
/// Implements [`ResourceCache`] with every policy behaving as
/// [`LoadPolicy::NameOnly`]. This is the cache used by headless tools and
/// tests; engine integrations provide their own backed implementation.
#[derive(Default)]
pub struct NameCache {
    models: GenRegistry<String>,
    model_by_name: FxHashMap<String, ModelRef>,
    model_infos: FxHashMap<ModelRef, ModelDisplayInfo>,

    textures: GenRegistry<String>,
    texture_by_name: FxHashMap<String, TextureRef>,
}

impl NameCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches display metadata to a registered model, for tests and tools
    /// that exercise display-list production.
    pub fn set_model_display_info(&mut self, model: ModelRef, info: ModelDisplayInfo) {
        self.model_infos.insert(model, info);
    }
}

impl ResourceCache for NameCache {
    fn load_model(&mut self, name: &str, _policy: LoadPolicy) -> ModelRef {
        if name.is_empty() {
            return GenRef::INVALID;
        }
        if let Some(&r) = self.model_by_name.get(name) {
            return r;
        }
        let r = self.models.add(name.to_owned());
        self.model_by_name.insert(name.to_owned(), r);
        r
    }

    fn load_texture(&mut self, name: &str, _flags: u32, _policy: LoadPolicy) -> TextureRef {
        if name.is_empty() {
            return GenRef::INVALID;
        }
        if let Some(&r) = self.texture_by_name.get(name) {
            return r;
        }
        let r = self.textures.add(name.to_owned());
        self.texture_by_name.insert(name.to_owned(), r);
        r
    }

    fn model_name(&self, model: ModelRef) -> Option<&str> {
        self.models.get(model).map(String::as_str)
    }

    fn texture_name(&self, texture: TextureRef) -> Option<&str> {
        self.textures.get(texture).map(String::as_str)
    }

    fn model_display_info(&self, model: ModelRef) -> Option<&ModelDisplayInfo> {
        self.model_infos.get(&model)
    }
}

/// Read provider over an in-memory path→bytes table. Useful for tests and
/// for tools that assemble scenes without touching the filesystem.
#[derive(Default)]
pub struct MemoryReadProvider {
    entries: FxHashMap<String, Vec<u8>>,
}

impl MemoryReadProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(path.into(), data);
    }
}

impl ReadProvider for MemoryReadProvider {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.entries.get(path).cloned()
    }
}

/// Read provider backed by the local filesystem.
pub struct FileReadProvider;

impl ReadProvider for FileReadProvider {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(path).ok()
    }
}
