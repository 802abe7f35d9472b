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

//! The `System` trait: a named, orderable job that mutates a [`crate::world::World`].

use crate::world::World;

/// A user-supplied job ordered by the scheduler.
///
/// Systems declare their ordering relative to other systems by name via
/// [`System::before`]/[`System::after`], not by the component types they
/// touch — the scheduler (see [`crate::schedule`]) only ever reorders
/// opaque jobs, it never inspects entity data. Errors are reported
/// out-of-band by the system itself; `execute` has no return value.
pub trait System: Send + Sync {
    /// Stable name identifying this system to the scheduler.
    fn name(&self) -> &str;

    /// Run the system against the world.
    fn execute(&mut self, world: &mut World);

    /// Names of systems that must run after this one.
    fn before(&self) -> &[&str] {
        &[]
    }

    /// Names of systems that must run before this one.
    fn after(&self) -> &[&str] {
        &[]
    }
}

/// A boxed, type-erased [`System`].
pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);
    impl System for Noop {
        fn name(&self) -> &str {
            self.0
        }
        fn execute(&mut self, _world: &mut World) {}
    }

    #[test]
    fn boxed_system_dispatches_through_trait_object() {
        let mut world = World::new();
        let mut sys: BoxedSystem = Box::new(Noop("physics"));
        assert_eq!(sys.name(), "physics");
        sys.execute(&mut world);
    }
}
