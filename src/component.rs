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

//! Component type identity and the `Bundle` trait.
//!
//! Components are data attached to entities. A component's identity is a
//! stable 32-bit id derived from its type name, not `std::any::TypeId` —
//! this is what lets the registry combine identities of a whole type set
//! with a plain XOR fold (see [`crate::archetype::Archetype::type_set_hash`]).

use smallvec::{smallvec, SmallVec};
use std::any::TypeId;
use std::sync::Mutex;

/// Maximum number of components supported by a single `Bundle` spawn call.
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Stable 32-bit identifier for a component type.
///
/// Derived by CRC-32 over the type's fully-qualified name
/// (`std::any::type_name::<T>()`). Stable for the lifetime of one process,
/// not across compilations or binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);

impl ComponentId {
    #[inline]
    pub fn of<T: Component>() -> ComponentId {
        id_of::<T>()
    }
}

/// Destructor thunk: drops `count` consecutive `T`s starting at `ptr`.
pub type DropFn = unsafe fn(ptr: *mut u8, count: usize);

/// Id, size, alignment and destructor describing one component type.
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub size: usize,
    pub align: usize,
    pub drop_fn: Option<DropFn>,
}

impl ComponentInfo {
    pub fn of<T: Component>() -> ComponentInfo {
        info_of::<T>()
    }
}

/// Marker trait for components.
///
/// Components must be `'static` (no borrowed data) and `Send + Sync` so that
/// archetype columns and parallel iteration are sound. They must also be
/// trivially relocatable: the structural-change engine moves rows between
/// archetypes with `memcpy`, never running a move constructor (see
/// [`crate::archetype::Archetype::move_row_from`]). Any `T: 'static + Send +
/// Sync` that does not rely on its own address is safe here, which covers
/// the overwhelming majority of component types; self-referential structs
/// must not be used as components.
pub trait Component: 'static + Send + Sync {}
impl<T: 'static + Send + Sync> Component for T {}

unsafe fn drop_in_place_n<T>(ptr: *mut u8, count: usize) {
    let ptr = ptr as *mut T;
    for i in 0..count {
        std::ptr::drop_in_place(ptr.add(i));
    }
}

fn drop_fn_of<T>() -> Option<DropFn> {
    if std::mem::needs_drop::<T>() {
        Some(drop_in_place_n::<T>)
    } else {
        None
    }
}

/// Debug-only id-collision registry: two distinct types must never map to
/// the same [`ComponentId`]. Release builds skip this check entirely.
#[cfg(debug_assertions)]
static KNOWN_IDS: Mutex<Option<rustc_hash::FxHashMap<u32, TypeId>>> = Mutex::new(None);

#[cfg(debug_assertions)]
fn check_collision<T: 'static>(id: ComponentId) {
    let mut guard = KNOWN_IDS.lock().unwrap();
    let map = guard.get_or_insert_with(Default::default);
    let type_id = TypeId::of::<T>();
    match map.get(&id.0) {
        Some(existing) if *existing != type_id => {
            panic!(
                "component id collision: {} and another type both hash to {:#x}",
                std::any::type_name::<T>(),
                id.0
            );
        }
        Some(_) => {}
        None => {
            map.insert(id.0, type_id);
        }
    }
}

/// Deterministic 32-bit id for `T`, derived by CRC-32 over its fully
/// qualified type name.
pub fn id_of<T: 'static>() -> ComponentId {
    let id = ComponentId(crc32fast::hash(std::any::type_name::<T>().as_bytes()));
    #[cfg(debug_assertions)]
    check_collision::<T>(id);
    id
}

/// Bundles id, size, and destructor thunk for `T`.
pub fn info_of<T: Component>() -> ComponentInfo {
    ComponentInfo {
        id: id_of::<T>(),
        size: std::mem::size_of::<T>(),
        align: std::mem::align_of::<T>(),
        drop_fn: drop_fn_of::<T>(),
    }
}

/// A group of components spawned onto one entity at once.
pub trait Bundle: Send + Sync + 'static {
    /// Descriptors for the components carried by this bundle, in declaration
    /// order. Used both to build a fresh archetype's columns and to derive
    /// the target type set for a spawn.
    fn component_infos() -> SmallVec<[ComponentInfo; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Component ids carried by this bundle, in declaration order.
    fn component_ids() -> SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized,
    {
        Self::component_infos().into_iter().map(|info| info.id).collect()
    }

    /// Write the bundle's components to the given row pointers.
    ///
    /// # Safety
    /// `ptrs[i]` must point at uninitialised, suitably aligned storage for
    /// the i-th component in declaration order.
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn component_infos() -> SmallVec<[ComponentInfo; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(info_of::<$T>()),*]
            }

            #[allow(non_snake_case)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    i += 1;
                )*
                let _ = i;
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[test]
    fn id_is_deterministic() {
        assert_eq!(id_of::<i32>(), id_of::<i32>());
        assert_ne!(id_of::<i32>(), id_of::<u32>());
    }

    #[test]
    fn bundle_single_component() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            x: f32,
            y: f32,
        }

        let ids = <(Position,)>::component_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0], id_of::<Position>());
    }

    #[test]
    fn bundle_multiple_components() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            x: f32,
        }
        #[derive(Debug, Clone, Copy)]
        struct Velocity {
            x: f32,
        }

        let ids = <(Position, Velocity)>::component_ids();
        assert_eq!(ids.len(), 2);
    }
}
