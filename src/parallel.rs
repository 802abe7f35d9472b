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

//! Archetype-sharded parallel iteration.
//!
//! Matching archetypes are visited one at a time by every worker thread at
//! once: within an archetype, worker `t` walks the static row chunks
//! `[t*64, (t+1)*64), [(n+t)*64, (n+t+1)*64), …` — no row-level contention,
//! each thread's chunks are fixed by its id. A barrier then holds every
//! thread until the archetype is fully drained before any of them moves on
//! to the next one.

use std::sync::Barrier;

use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::component::{ComponentId, MAX_BUNDLE_COMPONENTS};
use crate::query::{Filter, QueryItem};
use crate::world::World;

/// Row chunk size of each thread's static stride.
const STRIDE: usize = 64;

/// Wraps a `QueryItem::State` (raw column pointers) so it can be shared
/// across worker threads. Sound because every thread only ever dereferences
/// the disjoint row range it claimed via the shared cursor.
struct ParallelState<S>(S);
unsafe impl<S> Send for ParallelState<S> {}
unsafe impl<S> Sync for ParallelState<S> {}

impl World {
    /// Runs `f` over every entity matching `Q`, spread across `thread_count`
    /// worker threads.
    pub fn for_all_parallel<Q>(&mut self, thread_count: usize, f: impl Fn(Q::Item<'_>) + Sync)
    where
        Q: QueryItem,
    {
        self.for_all_parallel_with::<Q, ()>(thread_count, f);
    }

    /// Like [`World::for_all_parallel`], with an extra non-fetching filter `F`.
    pub fn for_all_parallel_with<Q, F>(&mut self, thread_count: usize, f: impl Fn(Q::Item<'_>) + Sync)
    where
        Q: QueryItem,
        F: Filter,
    {
        let mut required: SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]> = SmallVec::new();
        Q::required_ids(&mut required);

        let matching: Vec<(&Archetype, ParallelState<Q::State>)> = self
            .archetypes
            .iter()
            .filter(|a| !a.is_empty() && required.iter().all(|id| a.contains(*id)) && F::matches(a.types()))
            .map(|a| (a, ParallelState(Q::init(a))))
            .collect();

        let thread_count = thread_count.max(1);
        if thread_count == 1 {
            for (archetype, state) in &matching {
                for row in 0..archetype.len() {
                    unsafe { f(Q::fetch(state.0, row)) };
                }
            }
            return;
        }

        let barrier = Barrier::new(thread_count);
        let matching = &matching;
        let barrier = &barrier;
        let f = &f;

        std::thread::scope(|scope| {
            for thread_id in 0..thread_count {
                scope.spawn(move || {
                    for (archetype, state) in matching.iter() {
                        let len = archetype.len();
                        let mut start = thread_id * STRIDE;
                        while start < len {
                            let end = (start + STRIDE).min(len);
                            for row in start..end {
                                unsafe { f(Q::fetch(state.0, row)) };
                            }
                            start += thread_count * STRIDE;
                        }
                        barrier.wait();
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Counter {
        value: u64,
    }

    #[test]
    fn parallel_iteration_visits_every_entity_exactly_once() {
        let mut world = World::new();
        for i in 0..2000u64 {
            world.spawn((Counter { value: i },));
        }

        let total = AtomicU64::new(0);
        let seen = AtomicUsize::new(0);
        world.for_all_parallel::<&Counter>(4, |c| {
            total.fetch_add(c.value, Ordering::Relaxed);
            seen.fetch_add(1, Ordering::Relaxed);
        });

        let expected: u64 = (0..2000u64).sum();
        assert_eq!(total.load(Ordering::Relaxed), expected);
        assert_eq!(seen.load(Ordering::Relaxed), 2000);
    }

    #[test]
    fn parallel_matches_serial_with_single_thread() {
        let mut world = World::new();
        for i in 0..10u64 {
            world.spawn((Counter { value: i },));
        }

        let mut serial_total = 0u64;
        world.for_all::<&Counter>(|c| serial_total += c.value);

        let parallel_total = AtomicU64::new(0);
        world.for_all_parallel::<&Counter>(1, |c| {
            parallel_total.fetch_add(c.value, Ordering::Relaxed);
        });

        assert_eq!(parallel_total.load(Ordering::Relaxed), serial_total);
    }
}
