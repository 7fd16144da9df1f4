//! Generational slot registry.
//!
//! Every node, component and animation in the scene lives in a
//! [`GenRegistry`] and is addressed by a [`GenRef`]: a slot index paired
//! with the generation the slot had when the value was inserted. Removing a
//! value bumps the slot generation, so every outstanding reference to it
//! turns stale and can be detected by [`GenRegistry::is_valid`] instead of
//! dereferencing freed storage.
//!
//! A stale reference (generation mismatch on a reused slot) is
//! distinguishable from [`GenRef::INVALID`] (never allocated). A removed
//! slot's generation is never reused until the `u32` counter wraps; this is
//! documented rather than hardened.

/// Reference into a [`GenRegistry`]: slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenRef {
    pub idx: u32,
    pub gen: u32,
}

impl GenRef {
    /// Reference that never designates a live slot.
    pub const INVALID: Self = Self {
        idx: u32::MAX,
        gen: u32::MAX,
    };

    #[inline]
    #[must_use]
    pub fn is_invalid(self) -> bool {
        self.idx == u32::MAX
    }
}

impl Default for GenRef {
    fn default() -> Self {
        Self::INVALID
    }
}

struct Slot<T> {
    gen: u32,
    value: Option<T>,
}

/// Growable arena with generation-checked references.
pub struct GenRegistry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for GenRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest slot count ever allocated, including holes. Parallel arrays
    /// indexed by slot (world matrices, GC bitsets) are sized to this.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    /// Inserts a value, reusing a free slot if one exists.
    pub fn add(&mut self, value: T) -> GenRef {
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.value = Some(value);
            GenRef { idx, gen: slot.gen }
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                gen: 0,
                value: Some(value),
            });
            GenRef { idx, gen: 0 }
        }
    }

    /// Removes the referenced value, invalidating all outstanding references
    /// to the slot. No-op returning `false` when the reference is stale or
    /// invalid.
    pub fn remove(&mut self, r: GenRef) -> bool {
        if self.is_valid(r) {
            self.remove_index(r.idx)
        } else {
            false
        }
    }

    /// Removes by raw slot index, bypassing the generation check. Used by the
    /// garbage collector which walks used slots directly.
    pub fn remove_index(&mut self, idx: u32) -> bool {
        let Some(slot) = self.slots.get_mut(idx as usize) else {
            return false;
        };
        if slot.value.is_none() {
            return false;
        }
        slot.value = None;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(idx);
        self.len -= 1;
        true
    }

    #[must_use]
    pub fn is_valid(&self, r: GenRef) -> bool {
        self.slots
            .get(r.idx as usize)
            .is_some_and(|s| s.gen == r.gen && s.value.is_some())
    }

    /// `true` when the slot currently holds a value, whatever its generation.
    #[must_use]
    pub fn is_used(&self, idx: u32) -> bool {
        self.slots
            .get(idx as usize)
            .is_some_and(|s| s.value.is_some())
    }

    /// Rebuilds the current reference for a used slot index.
    #[must_use]
    pub fn get_ref(&self, idx: u32) -> GenRef {
        match self.slots.get(idx as usize) {
            Some(s) if s.value.is_some() => GenRef { idx, gen: s.gen },
            _ => GenRef::INVALID,
        }
    }

    #[must_use]
    pub fn get(&self, r: GenRef) -> Option<&T> {
        let slot = self.slots.get(r.idx as usize)?;
        if slot.gen == r.gen {
            slot.value.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, r: GenRef) -> Option<&mut T> {
        let slot = self.slots.get_mut(r.idx as usize)?;
        if slot.gen == r.gen {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Access by raw index, ignoring generations. Returns `None` on holes.
    #[must_use]
    pub fn value_at(&self, idx: u32) -> Option<&T> {
        self.slots.get(idx as usize)?.value.as_ref()
    }

    pub fn value_at_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.slots.get_mut(idx as usize)?.value.as_mut()
    }

    /// First live reference in slot order, or [`GenRef::INVALID`].
    #[must_use]
    pub fn first_ref(&self) -> GenRef {
        self.next_used(0)
    }

    /// Next live reference after `r` in slot order, or [`GenRef::INVALID`].
    #[must_use]
    pub fn next_ref(&self, r: GenRef) -> GenRef {
        if r.is_invalid() {
            GenRef::INVALID
        } else {
            self.next_used(r.idx + 1)
        }
    }

    fn next_used(&self, from: u32) -> GenRef {
        for idx in (from as usize)..self.slots.len() {
            if self.slots[idx].value.is_some() {
                return GenRef {
                    idx: idx as u32,
                    gen: self.slots[idx].gen,
                };
            }
        }
        GenRef::INVALID
    }

    /// Forward iteration over live slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (GenRef, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    GenRef {
                        idx: idx as u32,
                        gen: slot.gen,
                    },
                    v,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (GenRef, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            let gen = slot.gen;
            slot.value.as_mut().map(|v| {
                (
                    GenRef {
                        idx: idx as u32,
                        gen,
                    },
                    v,
                )
            })
        })
    }

    /// Drops every value and resets all generations. All external references
    /// are invalidated by construction since slots start over at generation 0
    /// with nothing stored.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get() {
        let mut reg = GenRegistry::new();
        let r = reg.add(7_i32);
        assert_eq!(reg.get(r), Some(&7));
        assert!(reg.is_valid(r));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_invalidates_reference() {
        let mut reg = GenRegistry::new();
        let r = reg.add("a");
        assert!(reg.remove(r));
        assert!(!reg.is_valid(r));
        assert_eq!(reg.get(r), None);
        assert!(!reg.remove(r), "second remove is a no-op");
    }

    #[test]
    fn stale_reference_survives_slot_reuse() {
        let mut reg = GenRegistry::new();
        let a = reg.add(1);
        reg.remove(a);
        let b = reg.add(2);
        assert_eq!(a.idx, b.idx, "slot must be reused");
        assert!(!reg.is_valid(a));
        assert!(reg.is_valid(b));
        assert_eq!(reg.get(b), Some(&2));
        assert_ne!(a, GenRef::INVALID, "stale is distinguishable from invalid");
    }

    #[test]
    fn iteration_skips_holes() {
        let mut reg = GenRegistry::new();
        let a = reg.add(1);
        let b = reg.add(2);
        let c = reg.add(3);
        reg.remove(b);

        let collected: Vec<i32> = reg.iter().map(|(_, v)| *v).collect();
        assert_eq!(collected, vec![1, 3]);

        let mut r = reg.first_ref();
        assert_eq!(r, a);
        r = reg.next_ref(r);
        assert_eq!(r, c);
        r = reg.next_ref(r);
        assert!(r.is_invalid());
    }

    #[test]
    fn capacity_includes_holes() {
        let mut reg = GenRegistry::new();
        let a = reg.add(1);
        reg.add(2);
        reg.remove(a);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.capacity(), 2);
        assert!(!reg.is_used(a.idx));
        assert!(reg.get_ref(a.idx).is_invalid());
    }

    #[test]
    fn get_on_invalid_is_none() {
        let reg: GenRegistry<i32> = GenRegistry::new();
        assert_eq!(reg.get(GenRef::INVALID), None);
        assert!(!reg.is_valid(GenRef::INVALID));
    }
}
