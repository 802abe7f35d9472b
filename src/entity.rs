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

//! Entity identifiers and location metadata.
//!
//! An [`Entity`] is a plain `(id, version)` pair: the registry owns the
//! free-list and the version bump itself (see
//! [`crate::world::World::destroy_entity`]), rather than delegating identity
//! management to a generational-key container.

use std::cmp::Ordering;

/// Unique entity identifier.
///
/// Ordering is lexicographic by `id` then `version`, matching the order the
/// command buffer sorts commands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub id: u32,
    pub version: u32,
}

impl Entity {
    /// Sentinel entity that never compares equal to a live one.
    pub const NULL: Entity = Entity {
        id: u32::MAX,
        version: u32::MAX,
    };

    /// A command-buffer-local placeholder naming an entity that will only
    /// exist after the buffer is replayed. Tagged by `version == u32::MAX`,
    /// disjoint from any version a real entity can reach (versions only
    /// ever increment by one per destroy).
    #[inline]
    pub const fn placeholder(id: u32) -> Entity {
        Entity {
            id,
            version: u32::MAX,
        }
    }

    #[inline]
    pub const fn is_placeholder(self) -> bool {
        self.version == u32::MAX
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.id, self.version).cmp(&(other.id, other.version))
    }
}

/// Where an entity's row lives: which archetype, and which row within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_index: usize,
    pub row: usize,
}

/// Per-entity bookkeeping kept in the registry's entity table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntityInfo {
    pub identifier: Entity,
    pub location: EntityLocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_by_id_then_version() {
        let a = Entity { id: 1, version: 5 };
        let b = Entity { id: 1, version: 6 };
        let c = Entity { id: 2, version: 0 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn placeholder_is_disjoint_from_real_entities() {
        let placeholder = Entity::placeholder(3);
        assert!(placeholder.is_placeholder());
        assert_ne!(placeholder, Entity { id: 3, version: 0 });
    }
}
