//! Garbage collection.
//!
//! Components stay allocated after their owning node goes away; callers
//! batch deletions and reclaim explicitly. One pass marks, per pool, every
//! slot still referenced by a live owner and removes the rest. Because
//! cleanup cascades (tearing down an instance view destroys nodes which may
//! have been the last referrer into another pool), the pass is re-run until
//! it removes nothing.

use crate::anim::SceneAnim;
use crate::registry::{GenRef, GenRegistry};
use crate::scene::node::ComponentIdx;
use crate::scene::scene::AttachmentList;
use crate::scene::{NodeRef, Scene};

/// Removes unreferenced slots of `pool`, given the marked bitset.
fn sweep<T>(pool: &mut GenRegistry<T>, referenced: &[bool]) -> usize {
    let mut removed = 0;
    for (idx, &is_referenced) in referenced.iter().enumerate() {
        let idx = idx as u32;
        if !is_referenced && pool.is_used(idx) {
            pool.remove_index(idx);
            removed += 1;
        }
    }
    removed
}

impl Scene {
    /// Clears orphaned scene content. Runs [`Self::garbage_collect_pass`]
    /// to its fixed point and returns the total number of components
    /// removed. Never invoked implicitly; call it after a batch of node
    /// removals.
    pub fn garbage_collect(&mut self) -> usize {
        let mut total_removed = 0;
        loop {
            let pass_removed = self.garbage_collect_pass();
            if pass_removed == 0 {
                break;
            }
            total_removed += pass_removed;
        }
        total_removed
    }

    /// One mark-and-sweep pass over every owning relation.
    pub(crate) fn garbage_collect_pass(&mut self) -> usize {
        let mut removed = 0;

        removed += self.gc_fixed_slot(ComponentIdx::Transform);
        removed += self.gc_fixed_slot(ComponentIdx::Camera);
        removed += self.gc_fixed_slot(ComponentIdx::Object);
        removed += self.gc_fixed_slot(ComponentIdx::Light);
        removed += self.gc_fixed_slot(ComponentIdx::RigidBody);

        removed += self.gc_collisions();
        removed += self.gc_instances();
        self.gc_instance_views();
        removed += self.gc_scripts();
        removed += self.garbage_collect_anims();

        removed
    }

    fn gc_fixed_slot(&mut self, slot: ComponentIdx) -> usize {
        let capacity = match slot {
            ComponentIdx::Transform => self.transforms.capacity(),
            ComponentIdx::Camera => self.cameras.capacity(),
            ComponentIdx::Object => self.objects.capacity(),
            ComponentIdx::Light => self.lights.capacity(),
            ComponentIdx::RigidBody => self.rigid_bodies.capacity(),
        };
        let mut referenced = vec![false; capacity];

        for (_, node) in self.nodes.iter() {
            let cref = node.component(slot);
            let valid = match slot {
                ComponentIdx::Transform => self.transforms.is_valid(cref),
                ComponentIdx::Camera => self.cameras.is_valid(cref),
                ComponentIdx::Object => self.objects.is_valid(cref),
                ComponentIdx::Light => self.lights.is_valid(cref),
                ComponentIdx::RigidBody => self.rigid_bodies.is_valid(cref),
            };
            if valid {
                referenced[cref.idx as usize] = true;
            }
        }

        match slot {
            ComponentIdx::Transform => sweep(&mut self.transforms, &referenced),
            ComponentIdx::Camera => sweep(&mut self.cameras, &referenced),
            ComponentIdx::Object => sweep(&mut self.objects, &referenced),
            ComponentIdx::Light => sweep(&mut self.lights, &referenced),
            ComponentIdx::RigidBody => sweep(&mut self.rigid_bodies, &referenced),
        }
    }

    fn gc_collisions(&mut self) -> usize {
        let mut referenced = vec![false; self.collisions.capacity()];

        // prune entries of dead nodes, mark live attachments, turn stale
        // attachments into sentinels
        let nodes = &self.nodes;
        let collisions = &self.collisions;
        self.node_collisions.retain(|&node, list| {
            if !nodes.is_valid(node) {
                return false;
            }
            for entry in list.iter_mut() {
                if collisions.is_valid(*entry) {
                    referenced[entry.idx as usize] = true;
                } else {
                    *entry = GenRef::INVALID;
                }
            }
            true
        });

        sweep(&mut self.collisions, &referenced)
    }

    fn gc_instances(&mut self) -> usize {
        let mut referenced = vec![false; self.instances.capacity()];

        let nodes = &self.nodes;
        let instances = &self.instances;
        self.node_instance.retain(|&node, &mut cref| {
            if nodes.is_valid(node) && instances.is_valid(cref) {
                referenced[cref.idx as usize] = true;
                true
            } else {
                false
            }
        });

        sweep(&mut self.instances, &referenced)
    }

    /// Tears down views whose owning node/instance association collapsed.
    fn gc_instance_views(&mut self) {
        let dead_hosts: Vec<NodeRef> = self
            .node_instance_view
            .keys()
            .copied()
            .filter(|host| {
                match self.node_instance.get(host) {
                    None => true, // node not found or association pruned
                    Some(&cref) => !self.instances.is_valid(cref),
                }
            })
            .collect();

        for host in dead_hosts {
            if let Some(view) = self.node_instance_view.remove(&host) {
                self.destroy_view_content(&view);
            }
        }
    }

    fn gc_scripts(&mut self) -> usize {
        let mut referenced = vec![false; self.scripts.capacity()];

        for &cref in &self.scene_scripts {
            if self.scripts.is_valid(cref) {
                referenced[cref.idx as usize] = true;
            }
        }

        let nodes = &self.nodes;
        let scripts = &self.scripts;
        self.node_scripts.retain(|&node, list: &mut AttachmentList| {
            if !nodes.is_valid(node) {
                return false;
            }
            for entry in list.iter() {
                if scripts.is_valid(*entry) {
                    referenced[entry.idx as usize] = true;
                }
            }
            true
        });

        sweep(&mut self.scripts, &referenced)
    }

    /// Removes anims no longer referenced by any scene anim. Part of the GC
    /// pass, also callable on its own.
    pub fn garbage_collect_anims(&mut self) -> usize {
        let mut referenced = vec![false; self.anims.capacity()];

        let mark = |referenced: &mut Vec<bool>, scene_anim: &SceneAnim| {
            if !scene_anim.scene_anim.is_invalid() {
                if let Some(flag) = referenced.get_mut(scene_anim.scene_anim.idx as usize) {
                    *flag = true;
                }
            }
            for node_anim in &scene_anim.node_anims {
                if !node_anim.anim.is_invalid() {
                    if let Some(flag) = referenced.get_mut(node_anim.anim.idx as usize) {
                        *flag = true;
                    }
                }
            }
        };

        for (_, scene_anim) in self.scene_anims.iter() {
            mark(&mut referenced, scene_anim);
        }

        sweep(&mut self.anims, &referenced)
    }
}
