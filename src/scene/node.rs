//! Node storage.

use bitflags::bitflags;

use crate::registry::GenRef;
use crate::scene::ComponentRef;

bitflags! {
    /// Node state flags. Only the low 16 bits are serialized; the runtime
    /// bits describe instance ownership and host-driven disabling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u32 {
        /// Explicitly disabled by the user.
        const DISABLED = 0x0000_0001;
        /// Owned by an instance view; hidden from normal enumeration and
        /// never saved.
        const INSTANTIATED = 0x0001_0000;
        /// Disabled because the node that instantiated it is disabled. Kept
        /// separate from `DISABLED` so re-enabling the host does not clobber
        /// an explicit per-node disable.
        const INSTANCE_DISABLED = 0x0002_0000;
    }
}

impl NodeFlags {
    pub const SERIALIZED_BITS: u32 = 0x0000_ffff;

    /// Flags as stored in the scene file.
    #[must_use]
    pub fn serialized(self) -> u32 {
        self.bits() & Self::SERIALIZED_BITS
    }
}

/// Fixed component slots on a node, in pool and save order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ComponentIdx {
    Transform = 0,
    Camera = 1,
    Object = 2,
    Light = 3,
    RigidBody = 4,
}

pub const COMPONENT_SLOT_COUNT: usize = 5;

/// Node storage: a name, flags, and one optional reference per fixed
/// component kind. Collision, script and instance attachments live in
/// scene-side association maps keyed by the node reference.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub name: String,
    pub flags: NodeFlags,
    pub components: [ComponentRef; COMPONENT_SLOT_COUNT],
}

impl NodeData {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name,
            flags: NodeFlags::empty(),
            components: [GenRef::INVALID; COMPONENT_SLOT_COUNT],
        }
    }

    #[inline]
    #[must_use]
    pub fn component(&self, idx: ComponentIdx) -> ComponentRef {
        self.components[idx as usize]
    }

    #[inline]
    pub fn set_component(&mut self, idx: ComponentIdx, r: ComponentRef) {
        self.components[idx as usize] = r;
    }
}
