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

//! Archetype-based ECS storage engine.
//!
//! Entities are grouped into [`Archetype`]s by their exact component type
//! set; components live in contiguous per-type columns. [`World`] owns
//! entity identity and drives structural changes; [`query`] supplies the
//! filter/fetch algebra `for_all`/`for_all_with` run against it;
//! [`CommandBuffer`] defers structural changes recorded from inside a
//! system body; [`schedule::SystemSchedule`] orders named [`System`]s by
//! declared before/after dependencies.

pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
#[cfg(feature = "parallel")]
pub mod parallel;
pub mod query;
pub mod schedule;
pub mod system;
pub mod world;

pub use archetype::{Archetype, Column};
pub use command::CommandBuffer;
pub use component::{Bundle, Component, ComponentId, ComponentInfo};
pub use entity::{Entity, EntityLocation};
pub use error::{EcsError, Result};
pub use query::{And, Filter, Has, Not, Opt, QueryItem, With, WithExactly};
pub use schedule::{Scheduler, SystemSchedule};
pub use system::{BoxedSystem, System};
pub use world::World;
