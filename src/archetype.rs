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

//! Type-erased columns and archetype storage.
//!
//! An [`Archetype`] is Structure-of-Arrays storage for every entity sharing
//! one exact component type set: a sorted list of [`ComponentId`]s, one
//! [`Column`] per type, and a parallel entity list. Row `i` of every column
//! belongs to `entities[i]`.

use std::alloc::{self, Layout};
use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::component::{Component, ComponentId, ComponentInfo, DropFn};
use crate::entity::Entity;

/// A growable, type-erased, contiguous buffer of same-sized elements.
///
/// Growth policy: starting from zero capacity, `cap` is repeatedly replaced
/// by `max(4, 2 * cap)` until it covers the requested element count. Holds
/// raw bytes; the owner is responsible for only ever storing values of the
/// type it was constructed for.
pub struct Column {
    ptr: *mut u8,
    len: usize,
    cap: usize,
    item_size: usize,
    align: usize,
    drop_fn: Option<DropFn>,
}

// SAFETY: a `Column` only ever holds values of a `Component`, and `Component`
// requires `Send + Sync`.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    pub fn new(item_size: usize, align: usize, drop_fn: Option<DropFn>) -> Self {
        let align = align.max(1);
        // Zero-sized types never allocate, but `row_ptr` must still yield a
        // non-null, correctly-aligned pointer: forming a reference through a
        // null pointer panics even when nothing is actually read or written.
        let ptr = if item_size == 0 { align as *mut u8 } else { std::ptr::null_mut() };
        Self {
            ptr,
            len: 0,
            cap: 0,
            item_size,
            align,
            drop_fn,
        }
    }

    pub fn of<T: Component>() -> Self {
        let info = ComponentInfo::of::<T>();
        Self::new(info.size, info.align, info.drop_fn)
    }

    pub fn from_info(info: ComponentInfo) -> Self {
        Self::new(info.size, info.align, info.drop_fn)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Base pointer of the column's backing storage. Valid for `len()` rows.
    #[inline]
    pub fn data_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Mutable base pointer of the column's backing storage.
    #[inline]
    pub fn data_ptr_mut(&mut self) -> *mut u8 {
        self.ptr
    }

    fn layout(&self, cap: usize) -> Layout {
        Layout::from_size_align(cap * self.item_size, self.align)
            .expect("column capacity overflowed a valid layout")
    }

    fn grow(&mut self, required: usize) {
        if self.item_size == 0 {
            self.cap = usize::MAX;
            return;
        }
        if required <= self.cap {
            return;
        }
        let mut new_cap = self.cap;
        while new_cap < required {
            new_cap = (new_cap * 2).max(4);
        }
        let new_layout = self.layout(new_cap);
        let new_ptr = unsafe {
            if self.cap == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = self.layout(self.cap);
                alloc::realloc(self.ptr, old_layout, new_layout.size())
            }
        };
        if new_ptr.is_null() {
            alloc::handle_alloc_error(new_layout);
        }
        self.ptr = new_ptr;
        self.cap = new_cap;
    }

    /// # Safety
    /// `row` must be `< len`.
    #[inline]
    unsafe fn row_ptr(&self, row: usize) -> *mut u8 {
        debug_assert!(row < self.len);
        if self.item_size == 0 {
            self.ptr
        } else {
            self.ptr.add(row * self.item_size)
        }
    }

    /// Reserves storage for one more element and returns a pointer to the
    /// new, uninitialised row.
    ///
    /// # Safety
    /// Caller must initialise `item_size` bytes at the returned pointer
    /// before the row is observed through `get`/`get_mut`.
    pub unsafe fn push_uninit(&mut self) -> *mut u8 {
        self.grow(self.len + 1);
        let ptr = if self.item_size == 0 {
            self.ptr
        } else {
            self.ptr.add(self.len * self.item_size)
        };
        self.len += 1;
        ptr
    }

    /// # Safety
    /// `src` must point at `item_size` readable, initialised bytes.
    pub unsafe fn push_bytes(&mut self, src: *const u8) {
        let dst = self.push_uninit();
        if self.item_size > 0 {
            std::ptr::copy_nonoverlapping(src, dst, self.item_size);
        }
    }

    /// Destroys and removes the last element.
    ///
    /// # Panics
    /// Debug builds assert the column is non-empty.
    pub fn pop(&mut self) {
        debug_assert!(self.len > 0, "pop on empty column");
        self.len -= 1;
        if let Some(drop_fn) = self.drop_fn {
            unsafe {
                drop_fn(self.row_ptr(self.len), 1);
            }
        }
    }

    /// Removes `row`, destroying its value, and relocates the last row into
    /// its place (a bitwise move — the moved row's destructor is never run).
    ///
    /// # Safety
    /// `row` must be `< len`.
    pub unsafe fn swap_remove(&mut self, row: usize) {
        debug_assert!(row < self.len);
        let last = self.len - 1;
        if let Some(drop_fn) = self.drop_fn {
            drop_fn(self.row_ptr(row), 1);
        }
        if row != last && self.item_size > 0 {
            std::ptr::copy_nonoverlapping(self.row_ptr(last), self.row_ptr(row), self.item_size);
        }
        self.len -= 1;
    }

    /// Relocates the last row into `row` without running any destructor.
    ///
    /// Used when `row`'s value has already been copied out elsewhere (a
    /// structural move into another archetype) and must not be destroyed a
    /// second time.
    ///
    /// # Safety
    /// `row` must be `< len`.
    pub unsafe fn relocate_out(&mut self, row: usize) {
        debug_assert!(row < self.len);
        let last = self.len - 1;
        if row != last && self.item_size > 0 {
            std::ptr::copy_nonoverlapping(self.row_ptr(last), self.row_ptr(row), self.item_size);
        }
        self.len -= 1;
    }

    pub fn drop_fn(&self) -> Option<DropFn> {
        self.drop_fn
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// # Safety
    /// `row` must be `< len` and must actually hold a live `T`.
    pub unsafe fn get<T: Component>(&self, row: usize) -> &T {
        &*(self.row_ptr(row) as *const T)
    }

    /// # Safety
    /// `row` must be `< len` and must actually hold a live `T`.
    pub unsafe fn get_mut<T: Component>(&mut self, row: usize) -> &mut T {
        &mut *(self.row_ptr(row) as *mut T)
    }

    /// # Safety
    /// `row` must be `< len`.
    pub unsafe fn row_bytes(&self, row: usize) -> *const u8 {
        self.row_ptr(row)
    }

    /// # Safety
    /// `row` must be `< len`.
    pub unsafe fn row_bytes_mut(&mut self, row: usize) -> *mut u8 {
        self.row_ptr(row)
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            unsafe {
                drop_fn(self.ptr, self.len);
            }
        }
        if self.cap > 0 && self.item_size > 0 {
            let layout = self.layout(self.cap);
            unsafe {
                alloc::dealloc(self.ptr, layout);
            }
        }
    }
}

/// A group of entities sharing the exact same sorted set of component types.
pub struct Archetype {
    types: Vec<ComponentId>,
    columns: Vec<Column>,
    entities: Vec<Entity>,
    column_index: FxHashMap<ComponentId, usize>,
    hash: u32,
}

impl Archetype {
    /// Builds an archetype from a sorted, duplicate-free list of component
    /// descriptors. `infos` must already be sorted ascending by id — callers
    /// (the registry) own that invariant.
    pub fn new(infos: &[ComponentInfo]) -> Self {
        let mut types = Vec::with_capacity(infos.len());
        let mut columns = Vec::with_capacity(infos.len());
        let mut column_index = FxHashMap::default();
        let mut hash = 0u32;
        for (i, info) in infos.iter().enumerate() {
            types.push(info.id);
            columns.push(Column::from_info(*info));
            column_index.insert(info.id, i);
            hash ^= info.id.0;
        }
        debug_assert!(
            types.windows(2).all(|w| w[0] < w[1]),
            "archetype type list must be strictly sorted"
        );
        Self {
            types,
            columns,
            entities: Vec::new(),
            column_index,
            hash,
        }
    }

    /// The always-present, empty archetype that new entities start in.
    pub fn empty() -> Self {
        Self::new(&[])
    }

    #[inline]
    pub fn types(&self) -> &[ComponentId] {
        &self.types
    }

    /// XOR-combination of contained type ids; used as the registry's
    /// archetype-lookup key. Collisions between distinct type sets are
    /// possible and must be resolved by comparing `types()` on a hash hit.
    #[inline]
    pub fn type_set_hash(&self) -> u32 {
        self.hash
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn column_index_of(&self, id: ComponentId) -> Option<usize> {
        self.column_index.get(&id).copied()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.column_index.contains_key(&id)
    }

    pub fn column(&self, id: ComponentId) -> Option<&Column> {
        self.column_index_of(id).map(|i| &self.columns[i])
    }

    pub fn column_mut(&mut self, id: ComponentId) -> Option<&mut Column> {
        let idx = self.column_index_of(id)?;
        Some(&mut self.columns[idx])
    }

    pub fn column_at(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Reconstructs this archetype's component descriptors, sorted by id.
    pub fn infos(&self) -> Vec<ComponentInfo> {
        self.types
            .iter()
            .zip(self.columns.iter())
            .map(|(&id, column)| ComponentInfo {
                id,
                size: column.item_size(),
                align: column.align(),
                drop_fn: column.drop_fn(),
            })
            .collect()
    }

    /// Appends `entity` to the entity list and an uninitialised row to every
    /// column. Returns the new row index; the caller must populate every
    /// column's new row before the archetype is observed.
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            unsafe {
                column.push_uninit();
            }
        }
        row
    }

    /// Removes `row` from the entity list and every column via swap-remove.
    ///
    /// Returns the entity that was moved from the last row into `row`, or
    /// `None` if `row` was already the last row (no entity_info patch
    /// needed in that case).
    pub fn remove_entity(&mut self, row: usize) -> Option<Entity> {
        debug_assert!(row < self.entities.len());
        for column in &mut self.columns {
            unsafe {
                column.swap_remove(row);
            }
        }
        self.finish_row_removal(row)
    }

    /// Shrinks the entity list after row `row`'s columns have already been
    /// individually removed. Returns the entity swapped in from the last
    /// row, or `None` if `row` was the last row.
    fn finish_row_removal(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        if row == last {
            self.entities.pop();
            None
        } else {
            let moved = self.entities[last];
            self.entities.swap_remove(row);
            Some(moved)
        }
    }

    /// Moves `entity`'s row at `other_row` in `other` into `self`.
    ///
    /// Components present in both archetypes are relocated (memcpy into
    /// `self`, then removed from `other` without running a destructor —
    /// the value already lives on in `self`). Components present only in
    /// `other` are dropped via a destroying swap-remove. Components
    /// present only in `self` are left uninitialised for the caller to
    /// populate. Returns `(own_row, swapped_in_other)`.
    pub fn move_row_from(
        &mut self,
        other: &mut Archetype,
        other_row: usize,
        entity: Entity,
    ) -> (usize, Option<Entity>) {
        let own_row = self.add_entity(entity);

        let mut own_i = 0;
        let mut other_i = 0;
        while own_i < self.types.len() && other_i < other.types.len() {
            let own_type = self.types[own_i];
            let other_type = other.types[other_i];
            match own_type.cmp(&other_type) {
                Ordering::Equal => {
                    unsafe {
                        let src = other.columns[other_i].row_bytes(other_row);
                        let dst = self.columns[own_i].row_bytes_mut(own_row);
                        std::ptr::copy_nonoverlapping(src, dst, self.columns[own_i].item_size());
                        other.columns[other_i].relocate_out(other_row);
                    }
                    own_i += 1;
                    other_i += 1;
                }
                Ordering::Less => own_i += 1,
                Ordering::Greater => {
                    unsafe {
                        other.columns[other_i].swap_remove(other_row);
                    }
                    other_i += 1;
                }
            }
        }
        while other_i < other.types.len() {
            unsafe {
                other.columns[other_i].swap_remove(other_row);
            }
            other_i += 1;
        }

        let swapped = other.finish_row_removal(other_row);
        (own_row, swapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn add_and_remove_last_row() {
        let mut arch = Archetype::new(&[ComponentInfo::of::<Position>()]);
        let row = arch.add_entity(Entity { id: 0, version: 0 });
        unsafe {
            let ptr = arch.column_mut(ComponentId::of::<Position>()).unwrap();
            *ptr.get_mut::<Position>(row) = Position { x: 1.0, y: 2.0 };
        }
        assert_eq!(arch.len(), 1);
        let swapped = arch.remove_entity(row);
        assert_eq!(swapped, None);
        assert_eq!(arch.len(), 0);
    }

    #[test]
    fn remove_middle_row_swaps_last_in() {
        let mut arch = Archetype::new(&[ComponentInfo::of::<Position>()]);
        let e0 = Entity { id: 0, version: 0 };
        let e1 = Entity { id: 1, version: 0 };
        let e2 = Entity { id: 2, version: 0 };
        for e in [e0, e1, e2] {
            let row = arch.add_entity(e);
            let id = ComponentId::of::<Position>();
            unsafe {
                *arch.column_mut(id).unwrap().get_mut::<Position>(row) =
                    Position { x: e.id as f32, y: 0.0 };
            }
        }
        let swapped = arch.remove_entity(0);
        assert_eq!(swapped, Some(e2));
        assert_eq!(arch.entities(), &[e2, e1]);
        let id = ComponentId::of::<Position>();
        let value = unsafe { *arch.column(id).unwrap().get::<Position>(0) };
        assert_eq!(value, Position { x: 2.0, y: 0.0 });
    }

    #[test]
    fn destructor_accounting_through_swap_remove() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Counted(u32);
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut arch = Archetype::new(&[ComponentInfo::of::<Counted>()]);
        let id = ComponentId::of::<Counted>();
        for v in 0..3u32 {
            let row = arch.add_entity(Entity {
                id: v,
                version: 0,
            });
            unsafe {
                arch.column_mut(id).unwrap().get_mut::<Counted>(row).0 = v;
                std::ptr::write(
                    arch.column_mut(id).unwrap().row_bytes_mut(row) as *mut Counted,
                    Counted(v),
                );
            }
        }
        assert_eq!(arch.len(), 3);
        arch.remove_entity(0);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        assert_eq!(arch.len(), 2);
    }

    #[test]
    fn move_row_relocates_shared_columns_and_drops_source_column() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Velocity {
            dx: f32,
        }

        let mut src = Archetype::new(&{
            let mut v = vec![ComponentInfo::of::<Position>(), ComponentInfo::of::<Velocity>()];
            v.sort_by_key(|i| i.id);
            v
        });
        let mut dst = Archetype::new(&[ComponentInfo::of::<Position>()]);

        let e = Entity { id: 0, version: 0 };
        let row = src.add_entity(e);
        let pos_id = ComponentId::of::<Position>();
        let vel_id = ComponentId::of::<Velocity>();
        unsafe {
            *src.column_mut(pos_id).unwrap().get_mut::<Position>(row) = Position { x: 3.0, y: 4.0 };
            *src.column_mut(vel_id).unwrap().get_mut::<Velocity>(row) = Velocity { dx: 1.0 };
        }

        let (own_row, swapped) = dst.move_row_from(&mut src, row, e);
        assert_eq!(swapped, None);
        assert_eq!(src.len(), 0);
        assert_eq!(dst.len(), 1);
        let moved = unsafe { *dst.column(pos_id).unwrap().get::<Position>(own_row) };
        assert_eq!(moved, Position { x: 3.0, y: 4.0 });
    }

    #[test]
    fn move_row_does_not_double_drop_relocated_columns() {
        use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Counted(u32);
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Tag;

        let mut src = Archetype::new(&{
            let mut v = vec![ComponentInfo::of::<Counted>(), ComponentInfo::of::<Tag>()];
            v.sort_by_key(|i| i.id);
            v
        });
        let mut dst = Archetype::new(&[ComponentInfo::of::<Counted>()]);

        let e = Entity { id: 0, version: 0 };
        let row = src.add_entity(e);
        let counted_id = ComponentId::of::<Counted>();
        let tag_id = ComponentId::of::<Tag>();
        unsafe {
            std::ptr::write(
                src.column_mut(counted_id).unwrap().row_bytes_mut(row) as *mut Counted,
                Counted(7),
            );
            *src.column_mut(tag_id).unwrap().get_mut::<Tag>(row) = Tag;
        }

        // Counted is shared between src and dst: it must relocate, not drop.
        // Tag exists only in src: it must be dropped as part of the move.
        let (own_row, swapped) = dst.move_row_from(&mut src, row, e);
        assert_eq!(swapped, None);
        assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 0);
        let moved = unsafe { dst.column(counted_id).unwrap().get::<Counted>(own_row).0 };
        assert_eq!(moved, 7);

        drop(dst);
        assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 1, "relocated value drops exactly once");
    }
}
