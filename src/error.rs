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

//! Error types.
//!
//! Most misuse of this crate is a precondition violation (a dead entity
//! reaching an unsafe archetype-level call, a swap-remove index out of
//! range) and is caught by `debug_assert!` rather than surfaced here —
//! release builds trust the caller, per the core's error-handling design.
//! `EcsError` only covers the handful of conditions a caller can trigger
//! through the safe `World` API and reasonably wants to recover from.

use std::fmt;

/// Errors returned by the safe [`crate::world::World`] API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity passed to an operation is not alive.
    EntityNotFound,

    /// The entity does not carry the requested component.
    ComponentNotFound,

    /// The system dependency graph given to the scheduler contains a cycle.
    SchedulerCycle,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "entity not found or no longer alive"),
            EcsError::ComponentNotFound => write!(f, "entity does not have the requested component"),
            EcsError::SchedulerCycle => write!(f, "system dependency graph contains a cycle"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, EcsError>;
