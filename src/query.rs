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

//! Query algebra: what to fetch (`QueryItem`) and what to additionally
//! require without fetching it (`Filter`).
//!
//! `&T`/`&mut T` and tuples of them (up to eight) implement [`QueryItem`];
//! [`Opt<T>`] fetches an optional component. [`With`], [`Has`], [`Not`],
//! [`And`] and [`WithExactly`] implement [`Filter`] and narrow which
//! archetypes a query visits without appearing in the fetched item.
//! `With<T>` and `Has<T>` differ only in whether `T` also needs fetching —
//! if you already fetch `&T` there's no reason to additionally filter with
//! `With<T>`, so reach for `Has<T>` when the presence check alone is all you
//! need.
//!
//! A query resolves each archetype's matching column pointers once, not per
//! row — iterating an archetype of `n` entities does `O(columns)` lookups,
//! not `O(columns * n)`.

use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentId, MAX_BUNDLE_COMPONENTS};
use crate::entity::Entity;

/// Something that can be fetched from a matching archetype, once per row.
pub trait QueryItem {
    type Item<'a>;
    /// Per-archetype state (typically resolved column base pointers),
    /// computed once and reused for every row.
    type State: Copy;

    /// Component ids this item needs present to fetch (empty for optional
    /// items like [`Opt`]).
    fn required_ids(out: &mut SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>);

    /// Resolves this item's column pointers against `archetype`, once.
    fn init(archetype: &Archetype) -> Self::State;

    /// # Safety
    /// `state` must come from [`QueryItem::init`] on the archetype `row`
    /// belongs to, and `row` must be `< archetype.len()`.
    unsafe fn fetch<'a>(state: Self::State, row: usize) -> Self::Item<'a>;
}

impl<T: Component> QueryItem for &T {
    type Item<'a> = &'a T;
    type State = *const T;

    fn required_ids(out: &mut SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>) {
        out.push(ComponentId::of::<T>());
    }

    fn init(archetype: &Archetype) -> Self::State {
        let id = ComponentId::of::<T>();
        let column = archetype
            .column(id)
            .expect("required_ids guarantees the column is present");
        column.data_ptr() as *const T
    }

    unsafe fn fetch<'a>(state: Self::State, row: usize) -> &'a T {
        &*state.add(row)
    }
}

impl<T: Component> QueryItem for &mut T {
    type Item<'a> = &'a mut T;
    type State = *mut T;

    fn required_ids(out: &mut SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>) {
        out.push(ComponentId::of::<T>());
    }

    fn init(archetype: &Archetype) -> Self::State {
        let id = ComponentId::of::<T>();
        let idx = archetype
            .column_index_of(id)
            .expect("required_ids guarantees the column is present");
        // SAFETY: init borrows `archetype` immutably only to resolve the
        // column's base pointer; no aliasing &mut is ever created here.
        let column = archetype.column_at(idx);
        column.data_ptr() as *const T as *mut T
    }

    unsafe fn fetch<'a>(state: Self::State, row: usize) -> &'a mut T {
        &mut *state.add(row)
    }
}

/// Fetches the row's own [`Entity`]. Never narrows which archetypes match —
/// every archetype carries its entities.
impl QueryItem for Entity {
    type Item<'a> = Entity;
    type State = *const Entity;

    fn required_ids(_out: &mut SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>) {}

    fn init(archetype: &Archetype) -> Self::State {
        archetype.entities().as_ptr()
    }

    unsafe fn fetch<'a>(state: Self::State, row: usize) -> Self::Item<'a> {
        *state.add(row)
    }
}

/// Fetches `Option<&T>`: never filters out an archetype for lacking `T`.
pub struct Opt<T>(PhantomData<T>);

impl<T: Component> QueryItem for Opt<T> {
    type Item<'a> = Option<&'a T>;
    type State = Option<*const T>;

    fn required_ids(_out: &mut SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>) {}

    fn init(archetype: &Archetype) -> Self::State {
        archetype
            .column(ComponentId::of::<T>())
            .map(|column| column.data_ptr() as *const T)
    }

    unsafe fn fetch<'a>(state: Self::State, row: usize) -> Option<&'a T> {
        state.map(|ptr| &*ptr.add(row))
    }
}

macro_rules! impl_query_item_tuple {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T: QueryItem),*> QueryItem for ($($T,)*) {
            type Item<'a> = ($($T::Item<'a>,)*);
            type State = ($($T::State,)*);

            fn required_ids(out: &mut SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>) {
                $( $T::required_ids(out); )*
            }

            fn init(archetype: &Archetype) -> Self::State {
                ($( $T::init(archetype), )*)
            }

            unsafe fn fetch<'a>(state: Self::State, row: usize) -> Self::Item<'a> {
                let ($($T,)*) = state;
                ($( $T::fetch($T, row), )*)
            }
        }
    };
}

impl_query_item_tuple!(A);
impl_query_item_tuple!(A, B);
impl_query_item_tuple!(A, B, C);
impl_query_item_tuple!(A, B, C, D);
impl_query_item_tuple!(A, B, C, D, E);
impl_query_item_tuple!(A, B, C, D, E, F);
impl_query_item_tuple!(A, B, C, D, E, F, G);
impl_query_item_tuple!(A, B, C, D, E, F, G, H);

/// An additional archetype-matching constraint that fetches nothing.
pub trait Filter {
    fn matches(types: &[ComponentId]) -> bool;
}

/// No extra constraint. The default filter for [`crate::world::World::for_all`].
impl Filter for () {
    fn matches(_types: &[ComponentId]) -> bool {
        true
    }
}

/// Requires `T`, identical to fetching `&T` but without projecting it.
pub struct With<T>(PhantomData<T>);
impl<T: Component> Filter for With<T> {
    fn matches(types: &[ComponentId]) -> bool {
        types.binary_search(&ComponentId::of::<T>()).is_ok()
    }
}

/// Requires `T` without fetching it. Identical to [`With`] — kept as a
/// separate name because "does this entity have a marker component" and "I
/// need this component's id present among several `With`s" read differently
/// at call sites.
pub struct Has<T>(PhantomData<T>);
impl<T: Component> Filter for Has<T> {
    fn matches(types: &[ComponentId]) -> bool {
        types.binary_search(&ComponentId::of::<T>()).is_ok()
    }
}

/// Matches archetypes that do not satisfy `F`.
pub struct Not<F>(PhantomData<F>);
impl<F: Filter> Filter for Not<F> {
    fn matches(types: &[ComponentId]) -> bool {
        !F::matches(types)
    }
}

/// Matches archetypes that satisfy both `A` and `B`.
pub struct And<A, B>(PhantomData<(A, B)>);
impl<A: Filter, B: Filter> Filter for And<A, B> {
    fn matches(types: &[ComponentId]) -> bool {
        A::matches(types) && B::matches(types)
    }
}

/// Matches archetypes whose component set is *exactly* `Q`'s ids — no
/// extras, no missing ones. `Q` is any [`QueryItem`] tuple of `&T`s; only
/// its id list is used.
pub struct WithExactly<Q>(PhantomData<Q>);
impl<Q: QueryItem> Filter for WithExactly<Q> {
    fn matches(types: &[ComponentId]) -> bool {
        let mut ids: SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]> = SmallVec::new();
        Q::required_ids(&mut ids);
        ids.sort();
        types.len() == ids.len() && types == ids.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
    }
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
    }

    #[test]
    fn fetches_single_component() {
        let mut world = World::new();
        world.spawn((Position { x: 1.0 },));
        world.spawn((Position { x: 2.0 }, Velocity { dx: 0.5 }));

        let mut seen = Vec::new();
        world.for_all::<&Position>(|p| seen.push(p.x));
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, vec![1.0, 2.0]);
    }

    #[test]
    fn mutates_through_mut_fetch() {
        let mut world = World::new();
        world.spawn((Position { x: 1.0 }, Velocity { dx: 1.0 }));

        world.for_all::<(&mut Position, &Velocity)>(|(p, v)| p.x += v.dx);
        let mut total = 0.0;
        world.for_all::<&Position>(|p| total += p.x);
        assert_eq!(total, 2.0);
    }

    #[test]
    fn optional_component_is_none_when_absent() {
        let mut world = World::new();
        world.spawn((Position { x: 1.0 },));

        let mut results = Vec::new();
        world.for_all::<(&Position, Opt<Velocity>)>(|(_p, v)| results.push(v.is_some()));
        assert_eq!(results, vec![false]);
    }

    #[test]
    fn has_filter_narrows_without_fetching() {
        let mut world = World::new();
        world.spawn((Position { x: 1.0 },));
        world.spawn((Position { x: 2.0 }, Velocity { dx: 0.0 }));

        let mut count = 0;
        world.for_all_with::<&Position, Has<Velocity>>(|_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn not_filter_excludes_matching_archetypes() {
        let mut world = World::new();
        world.spawn((Position { x: 1.0 },));
        world.spawn((Position { x: 2.0 }, Velocity { dx: 0.0 }));

        let mut count = 0;
        world.for_all_with::<&Position, Not<Has<Velocity>>>(|_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn entity_item_fetches_the_row_owner() {
        let mut world = World::new();
        let a = world.spawn((Position { x: 1.0 },));
        let b = world.spawn((Position { x: 2.0 },));

        let mut seen = Vec::new();
        world.for_all::<(Entity, &Position)>(|(e, _p)| seen.push(e));
        seen.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn with_exactly_matches_only_that_exact_set() {
        let mut world = World::new();
        world.spawn((Position { x: 1.0 },));
        world.spawn((Position { x: 2.0 }, Velocity { dx: 0.0 }));

        let mut count = 0;
        world.for_all_with::<&Position, WithExactly<(&Position,)>>(|_| count += 1);
        assert_eq!(count, 1);
    }
}
