// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The registry: entity identity, archetype storage, and the structural
//! change operations that move entities between archetypes.
//!
//! Archetype 0 always exists and always has zero columns — every entity is
//! born into it and leaves the moment its first component is attached.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::component::{Bundle, Component, ComponentId, ComponentInfo, MAX_BUNDLE_COMPONENTS};
use crate::entity::{Entity, EntityInfo, EntityLocation};
use crate::error::{EcsError, Result};
use crate::query::{Filter, QueryItem};

#[cfg(feature = "profiling")]
use tracing::instrument;

/// Entity identity table, archetype storage, and structural-change engine.
pub struct World {
    entity_table: Vec<EntityInfo>,
    free_list: Vec<u32>,
    pub(crate) archetypes: Vec<Archetype>,
    archetype_index: FxHashMap<u32, Vec<usize>>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrows two distinct elements of `archetypes` mutably at once.
fn borrow_two_mut(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b, "cannot move an entity within the same archetype");
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            entity_table: Vec::new(),
            free_list: Vec::new(),
            archetypes: vec![Archetype::empty()],
            archetype_index: FxHashMap::default(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entity_table.len() - self.free_list.len()
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        (entity.id as usize) < self.entity_table.len()
            && self.entity_table[entity.id as usize].identifier == entity
    }

    pub fn iter_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.archetypes.iter().flat_map(|a| a.entities().iter().copied())
    }

    /// Creates a bare entity with no components, living in the empty archetype.
    #[cfg_attr(feature = "profiling", instrument(skip(self)))]
    pub fn create_entity(&mut self) -> Entity {
        let id = if let Some(id) = self.free_list.pop() {
            id
        } else {
            let id = self.entity_table.len() as u32;
            self.entity_table.push(EntityInfo {
                identifier: Entity { id, version: 0 },
                location: EntityLocation { archetype_index: 0, row: 0 },
            });
            id
        };
        let identifier = self.entity_table[id as usize].identifier;
        let row = self.archetypes[0].add_entity(identifier);
        self.entity_table[id as usize].location = EntityLocation { archetype_index: 0, row };
        identifier
    }

    /// Destroys `entity`, running every component's destructor. A no-op if
    /// `entity` is already dead.
    #[cfg_attr(feature = "profiling", instrument(skip(self)))]
    pub fn destroy_entity(&mut self, entity: Entity) {
        if !self.is_alive(entity) {
            return;
        }
        let loc = self.entity_table[entity.id as usize].location;
        let swapped = self.archetypes[loc.archetype_index].remove_entity(loc.row);
        if let Some(s) = swapped {
            self.entity_table[s.id as usize].location.row = loc.row;
        }
        let new_version = entity.version.wrapping_add(1);
        self.entity_table[entity.id as usize] = EntityInfo {
            identifier: Entity { id: entity.id, version: new_version },
            location: EntityLocation { archetype_index: 0, row: 0 },
        };
        self.free_list.push(entity.id);
    }

    /// Spawns an entity with every component of `bundle` attached at once.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        let decl_infos = B::component_infos();
        let mut sorted: Vec<ComponentInfo> = decl_infos.iter().copied().collect();
        sorted.sort_by_key(|i| i.id);
        sorted.dedup_by_key(|i| i.id);
        let target_idx = self.get_or_create_archetype(sorted);

        let entity = self.create_entity();
        let loc = self.entity_table[entity.id as usize].location;
        let (src, dst) = borrow_two_mut(&mut self.archetypes, loc.archetype_index, target_idx);
        let (own_row, swapped) = dst.move_row_from(src, loc.row, entity);
        if let Some(s) = swapped {
            self.entity_table[s.id as usize].location.row = loc.row;
        }
        self.entity_table[entity.id as usize].location =
            EntityLocation { archetype_index: target_idx, row: own_row };

        let archetype = &mut self.archetypes[target_idx];
        let mut ptrs: SmallVec<[*mut u8; MAX_BUNDLE_COMPONENTS]> = SmallVec::new();
        for info in decl_infos.iter() {
            let column = archetype
                .column_mut(info.id)
                .expect("spawn target archetype carries every bundle column");
            ptrs.push(unsafe { column.row_bytes_mut(own_row) });
        }
        unsafe {
            bundle.write_components(&ptrs);
        }

        entity
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.is_alive(entity) {
            return None;
        }
        let loc = self.entity_table[entity.id as usize].location;
        let column = self.archetypes[loc.archetype_index].column(ComponentId::of::<T>())?;
        Some(unsafe { column.get::<T>(loc.row) })
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.is_alive(entity) {
            return None;
        }
        let loc = self.entity_table[entity.id as usize].location;
        let column = self.archetypes[loc.archetype_index].column_mut(ComponentId::of::<T>())?;
        Some(unsafe { column.get_mut::<T>(loc.row) })
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let loc = self.entity_table[entity.id as usize].location;
        self.archetypes[loc.archetype_index].contains(ComponentId::of::<T>())
    }

    /// Attaches `value` to `entity`, moving it to the archetype that has
    /// every one of its current components plus `T`. If `entity` already
    /// carries a `T`, the existing value is kept and `value` is dropped
    /// without being written.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound);
        }
        let info = ComponentInfo::of::<T>();
        let loc = self.entity_table[entity.id as usize].location;
        if self.archetypes[loc.archetype_index].contains(info.id) {
            return Ok(());
        }
        self.modify_component_set(entity, std::slice::from_ref(&info), &[])?;
        let loc = self.entity_table[entity.id as usize].location;
        unsafe {
            let column = self.archetypes[loc.archetype_index].column_mut(info.id).unwrap();
            std::ptr::write(column.row_bytes_mut(loc.row) as *mut T, value);
        }
        Ok(())
    }

    /// Detaches `T` from `entity`, moving it to the archetype missing `T`.
    /// A no-op (not an error) if `entity` doesn't carry `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound);
        }
        let info = ComponentInfo::of::<T>();
        self.modify_component_set(entity, &[], std::slice::from_ref(&info.id))
    }

    /// Moves `entity` to the archetype whose component set is its current
    /// set plus `added` minus `removed`. A component id present in both
    /// `added` and `removed` ends up removed — this one flush sees both at
    /// once, there's no "last writer wins" between them.
    pub fn modify_component_set(
        &mut self,
        entity: Entity,
        added: &[ComponentInfo],
        removed: &[ComponentId],
    ) -> Result<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound);
        }
        let loc = self.entity_table[entity.id as usize].location;
        let current = self.archetypes[loc.archetype_index].infos();

        let mut target: Vec<ComponentInfo> =
            current.into_iter().filter(|i| !removed.contains(&i.id)).collect();
        for info in added {
            if removed.contains(&info.id) {
                continue;
            }
            if !target.iter().any(|t| t.id == info.id) {
                target.push(*info);
            }
        }
        target.sort_by_key(|i| i.id);

        let target_idx = self.get_or_create_archetype(target);
        if target_idx == loc.archetype_index {
            return Ok(());
        }

        let (src, dst) = borrow_two_mut(&mut self.archetypes, loc.archetype_index, target_idx);
        let (own_row, swapped) = dst.move_row_from(src, loc.row, entity);
        if let Some(s) = swapped {
            self.entity_table[s.id as usize].location.row = loc.row;
        }
        self.entity_table[entity.id as usize].location =
            EntityLocation { archetype_index: target_idx, row: own_row };
        Ok(())
    }

    /// Overwrites `entity`'s `info`-identified component with `info.size`
    /// bytes from `payload`. Silently does nothing if `entity` has no such
    /// component — used by the command buffer, which resolves structural
    /// changes before replaying raw payload writes.
    ///
    /// # Safety
    /// `payload` must point at `info.size` readable, initialised bytes of
    /// the component type `info` describes.
    pub(crate) unsafe fn write_component_raw(&mut self, entity: Entity, info: ComponentInfo, payload: *const u8) {
        if !self.is_alive(entity) {
            return;
        }
        let loc = self.entity_table[entity.id as usize].location;
        let Some(column) = self.archetypes[loc.archetype_index].column_mut(info.id) else {
            return;
        };
        let dst = column.row_bytes_mut(loc.row);
        if info.size > 0 {
            std::ptr::copy_nonoverlapping(payload, dst, info.size);
        }
    }

    /// Finds or creates the archetype for an already sorted, duplicate-free
    /// list of component descriptors.
    ///
    /// The XOR-folded hash of a type set is not injective, so a hash hit is
    /// verified against the candidate archetype's actual type list before
    /// it's accepted; a hash collision falls back to scanning the rest of
    /// that hash's bucket rather than aliasing two distinct archetypes.
    fn get_or_create_archetype(&mut self, infos: Vec<ComponentInfo>) -> usize {
        let ids: SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]> = infos.iter().map(|i| i.id).collect();
        let hash = ids.iter().fold(0u32, |acc, id| acc ^ id.0);

        if let Some(bucket) = self.archetype_index.get(&hash) {
            for &idx in bucket {
                if self.archetypes[idx].types() == ids.as_slice() {
                    return idx;
                }
            }
        }

        let idx = self.archetypes.len();
        self.archetypes.push(Archetype::new(&infos));
        self.archetype_index.entry(hash).or_default().push(idx);
        idx
    }

    /// Visits every entity matching `Q`, fetching its components.
    pub fn for_all<Q: QueryItem>(&mut self, f: impl FnMut(Q::Item<'_>)) {
        self.for_all_with::<Q, ()>(f);
    }

    /// Visits every entity matching both `Q` and the extra filter `F`.
    #[cfg_attr(feature = "profiling", instrument(skip(self, f)))]
    pub fn for_all_with<Q: QueryItem, F: Filter>(&mut self, mut f: impl FnMut(Q::Item<'_>)) {
        let mut required: SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]> = SmallVec::new();
        Q::required_ids(&mut required);

        for archetype in &mut self.archetypes {
            if archetype.is_empty() {
                continue;
            }
            if !required.iter().all(|id| archetype.contains(*id)) {
                continue;
            }
            if !F::matches(archetype.types()) {
                continue;
            }
            let state = Q::init(archetype);
            for row in 0..archetype.len() {
                let item = unsafe { Q::fetch(state, row) };
                f(item);
            }
        }
    }
}
