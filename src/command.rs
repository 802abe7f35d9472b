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

//! Deferred command buffer.
//!
//! Structural changes queued from inside a system body (where `&mut World`
//! isn't available) are recorded here and replayed later by [`CommandBuffer::run`].
//! Payloads are bump-allocated rather than boxed individually — the whole
//! buffer's component values live in one arena that's reset after each flush.

use bumpalo::Bump;

use crate::component::{Component, ComponentId, ComponentInfo};
use crate::entity::Entity;
use crate::world::World;

/// The kind of a queued command. Declaration order is significant: deriving
/// `Ord` on this enum gives exactly the replay order the buffer sorts on —
/// `Destroy < Create < Add < Remove < Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CommandKind {
    Destroy,
    Create,
    Add,
    Remove,
    Set,
}

struct QueuedCommand {
    target: Entity,
    kind: CommandKind,
    info: Option<ComponentInfo>,
    payload: *mut u8,
}

/// A buffer of structural changes to be applied to a [`World`] all at once.
///
/// Entities created through the buffer are named by a placeholder (see
/// [`Entity::placeholder`]) until [`CommandBuffer::run`] resolves them to
/// real entities; other commands against the same placeholder are replayed
/// against that real entity.
pub struct CommandBuffer {
    bump: Bump,
    commands: Vec<QueuedCommand>,
    next_placeholder: u32,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            bump: Bump::new(),
            commands: Vec::new(),
            next_placeholder: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queues creation of a new entity and returns a placeholder naming it
    /// for the rest of this buffer.
    pub fn create_entity(&mut self) -> Entity {
        let placeholder = Entity::placeholder(self.next_placeholder);
        self.next_placeholder += 1;
        self.commands.push(QueuedCommand {
            target: placeholder,
            kind: CommandKind::Create,
            info: None,
            payload: std::ptr::null_mut(),
        });
        placeholder
    }

    pub fn destroy_entity(&mut self, target: Entity) {
        self.commands.push(QueuedCommand {
            target,
            kind: CommandKind::Destroy,
            info: None,
            payload: std::ptr::null_mut(),
        });
    }

    pub fn add_component<T: Component>(&mut self, target: Entity, value: T) {
        let payload = self.bump.alloc(value) as *mut T as *mut u8;
        self.commands.push(QueuedCommand {
            target,
            kind: CommandKind::Add,
            info: Some(ComponentInfo::of::<T>()),
            payload,
        });
    }

    pub fn remove_component<T: Component>(&mut self, target: Entity) {
        self.commands.push(QueuedCommand {
            target,
            kind: CommandKind::Remove,
            info: Some(ComponentInfo::of::<T>()),
            payload: std::ptr::null_mut(),
        });
    }

    pub fn set_component<T: Component>(&mut self, target: Entity, value: T) {
        let payload = self.bump.alloc(value) as *mut T as *mut u8;
        self.commands.push(QueuedCommand {
            target,
            kind: CommandKind::Set,
            info: Some(ComponentInfo::of::<T>()),
            payload,
        });
    }

    /// Replays every queued command against `world`, then clears the buffer.
    ///
    /// Commands are stably sorted by `(target, kind)` so that every command
    /// against one entity runs together and in `Destroy < Create < Add <
    /// Remove < Set` order; a leading `Destroy` short-circuits the rest of
    /// its group. Contiguous `Add`/`Remove` commands against one entity are
    /// folded into a single structural change; duplicate `Add`s of the same
    /// component type are written in original relative order, so the last
    /// one queued wins.
    pub fn run(&mut self, world: &mut World) {
        self.commands.sort_by_key(|c| (c.target, c.kind));

        let mut i = 0;
        while i < self.commands.len() {
            let target = self.commands[i].target;
            let mut j = i;
            while j < self.commands.len() && self.commands[j].target == target {
                j += 1;
            }
            self.run_group(world, i, j);
            i = j;
        }

        self.commands.clear();
        self.bump.reset();
    }

    fn run_group(&self, world: &mut World, start: usize, end: usize) {
        let mut idx = start;
        if self.commands[idx].kind == CommandKind::Destroy {
            world.destroy_entity(self.commands[idx].target);
            return;
        }

        let real_target = if self.commands[idx].kind == CommandKind::Create {
            idx += 1;
            world.create_entity()
        } else {
            self.commands[idx].target
        };

        let mut added: Vec<ComponentInfo> = Vec::new();
        let mut removed: Vec<ComponentId> = Vec::new();
        let mut add_payloads: Vec<(ComponentInfo, *mut u8)> = Vec::new();
        let mut set_payloads: Vec<(ComponentInfo, *mut u8)> = Vec::new();

        for cmd in &self.commands[idx..end] {
            match cmd.kind {
                CommandKind::Add => {
                    let info = cmd.info.expect("Add command carries a ComponentInfo");
                    if !added.iter().any(|i: &ComponentInfo| i.id == info.id) {
                        added.push(info);
                    }
                    add_payloads.push((info, cmd.payload));
                }
                CommandKind::Remove => {
                    let id = cmd.info.expect("Remove command carries a ComponentInfo").id;
                    if !removed.contains(&id) {
                        removed.push(id);
                    }
                }
                CommandKind::Set => {
                    set_payloads.push((cmd.info.expect("Set command carries a ComponentInfo"), cmd.payload));
                }
                CommandKind::Destroy | CommandKind::Create => {
                    unreachable!("Destroy/Create only ever lead a group")
                }
            }
        }

        if !added.is_empty() || !removed.is_empty() {
            let _ = world.modify_component_set(real_target, &added, &removed);
        }

        for (info, payload) in add_payloads {
            if removed.contains(&info.id) {
                continue;
            }
            unsafe {
                world.write_component_raw(real_target, info, payload);
            }
        }
        for (info, payload) in set_payloads {
            unsafe {
                world.write_component_raw(real_target, info, payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
    }
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
    }

    #[test]
    fn create_then_add_resolves_placeholder_to_real_entity() {
        let mut world = World::new();
        let mut cmds = CommandBuffer::new();
        let placeholder = cmds.create_entity();
        cmds.add_component(placeholder, Position { x: 1.0 });
        cmds.run(&mut world);

        let real = world.iter_entities().next().expect("one entity created");
        assert_eq!(world.get_component::<Position>(real), Some(&Position { x: 1.0 }));
    }

    #[test]
    fn destroy_short_circuits_rest_of_group() {
        let mut world = World::new();
        let e = world.create_entity();
        let mut cmds = CommandBuffer::new();
        cmds.destroy_entity(e);
        cmds.add_component(e, Position { x: 1.0 });
        cmds.run(&mut world);

        assert!(!world.is_alive(e));
    }

    #[test]
    fn duplicate_add_keeps_last_value() {
        let mut world = World::new();
        let e = world.create_entity();
        let mut cmds = CommandBuffer::new();
        cmds.add_component(e, Position { x: 1.0 });
        cmds.add_component(e, Position { x: 2.0 });
        cmds.run(&mut world);

        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: 2.0 }));
    }

    #[test]
    fn add_then_remove_same_type_nets_to_removed() {
        let mut world = World::new();
        let e = world.create_entity();
        let mut cmds = CommandBuffer::new();
        cmds.add_component(e, Velocity { dx: 1.0 });
        cmds.remove_component::<Velocity>(e);
        cmds.run(&mut world);

        assert_eq!(world.get_component::<Velocity>(e), None);
    }

    #[test]
    fn buffer_is_empty_and_reset_after_run() {
        let mut world = World::new();
        let e = world.create_entity();
        let mut cmds = CommandBuffer::new();
        cmds.add_component(e, Position { x: 1.0 });
        assert!(!cmds.is_empty());
        cmds.run(&mut world);
        assert!(cmds.is_empty());
    }
}
