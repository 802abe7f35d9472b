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

//! Topological ordering of named jobs via Kahn's algorithm.
//!
//! `predecessors[v]` holds the jobs that must run before `v`; `successors[v]`
//! holds the jobs that must run after `v`. Kept as two separate, correctly
//! named fields — naming a node's edge list `previous` while filling it with
//! *successor* ids the way some topological sorters do is exactly the kind
//! of bug this module avoids by construction.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::system::BoxedSystem;
use crate::world::World;

/// A directed dependency graph over named jobs.
#[derive(Default)]
pub struct Scheduler {
    names: Vec<String>,
    index_of: FxHashMap<String, usize>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn id_of(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index_of.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index_of.insert(name.to_string(), id);
        self.predecessors.push(Vec::new());
        self.successors.push(Vec::new());
        id
    }

    /// Registers `name` as a job, if not already known, and records edges
    /// from every name in `predecessors` to it and from it to every name in
    /// `successors`. Predecessor/successor names are registered as jobs
    /// themselves if not already known. Self-edges are silently skipped.
    pub fn add_job(&mut self, name: &str, predecessors: &[&str], successors: &[&str]) -> usize {
        let job = self.id_of(name);
        for &p in predecessors {
            let p = self.id_of(p);
            if p == job {
                continue;
            }
            self.successors[p].push(job);
            self.predecessors[job].push(p);
        }
        for &s in successors {
            let s = self.id_of(s);
            if s == job {
                continue;
            }
            self.successors[job].push(s);
            self.predecessors[s].push(job);
        }
        job
    }

    pub fn job_name(&self, id: usize) -> &str {
        &self.names[id]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns job ids in a topological order, FIFO-tie-broken by insertion
    /// order. Fails if the graph contains a cycle.
    pub fn schedule_jobs(&self) -> Result<Vec<usize>> {
        let n = self.names.len();
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(job) = queue.pop_front() {
            order.push(job);
            for &next in &self.successors[job] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < n {
            return Err(EcsError::SchedulerCycle);
        }
        Ok(order)
    }
}

/// Orders and runs a set of named [`crate::system::System`] jobs.
///
/// Thin wrapper pairing a [`Scheduler`] with the boxed systems it orders; the
/// scheduler itself stays usable standalone for callers that only need
/// ordering, not execution.
#[derive(Default)]
pub struct SystemSchedule {
    scheduler: Scheduler,
    systems: Vec<Option<BoxedSystem>>,
    cached_order: Option<Vec<usize>>,
}

impl SystemSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system, wiring up its declared `before`/`after` dependencies.
    pub fn add_system(&mut self, system: BoxedSystem) {
        let before: Vec<&str> = system.before().to_vec();
        let after: Vec<&str> = system.after().to_vec();
        let name = system.name().to_string();
        let id = self.scheduler.add_job(&name, &after, &before);
        if self.systems.len() <= id {
            self.systems.resize_with(id + 1, || None);
        }
        self.systems[id] = Some(system);
        self.cached_order = None;
    }

    /// Computes (and caches) the run order.
    pub fn order(&mut self) -> Result<&[usize]> {
        if self.cached_order.is_none() {
            self.cached_order = Some(self.scheduler.schedule_jobs()?);
        }
        Ok(self.cached_order.as_ref().unwrap())
    }

    /// Runs every registered system once, in dependency order.
    pub fn run(&mut self, world: &mut World) -> Result<()> {
        self.order()?;
        let order = self.cached_order.clone().unwrap();
        for id in order {
            if let Some(system) = self.systems[id].as_mut() {
                system.execute(world);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_declared_dependencies() {
        let mut sched = Scheduler::new();
        sched.add_job("A", &[], &[]);
        sched.add_job("B", &["A"], &[]);
        sched.add_job("C", &["A", "B"], &[]);
        sched.add_job("D", &["A", "B", "C"], &[]);

        let order = sched.schedule_jobs().unwrap();
        let names: Vec<&str> = order.iter().map(|&id| sched.job_name(id)).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn detects_cycles() {
        let mut sched = Scheduler::new();
        sched.add_job("A", &["B"], &[]);
        sched.add_job("B", &["A"], &[]);
        assert_eq!(sched.schedule_jobs(), Err(EcsError::SchedulerCycle));
    }

    #[test]
    fn self_edges_are_skipped() {
        let mut sched = Scheduler::new();
        sched.add_job("A", &["A"], &["A"]);
        let order = sched.schedule_jobs().unwrap();
        assert_eq!(order, vec![0]);
    }

    #[test]
    fn system_schedule_runs_in_order() {
        use crate::world::World;
        use std::sync::{Arc, Mutex};

        struct Recording {
            name: &'static str,
            after: Vec<&'static str>,
            log: Arc<Mutex<Vec<&'static str>>>,
        }
        impl crate::system::System for Recording {
            fn name(&self) -> &str {
                self.name
            }
            fn after(&self) -> &[&str] {
                &self.after
            }
            fn execute(&mut self, _world: &mut World) {
                self.log.lock().unwrap().push(self.name);
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut schedule = SystemSchedule::new();
        schedule.add_system(Box::new(Recording {
            name: "B",
            after: vec!["A"],
            log: log.clone(),
        }));
        schedule.add_system(Box::new(Recording {
            name: "A",
            after: vec![],
            log: log.clone(),
        }));

        let mut world = World::new();
        schedule.run(&mut world).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    }
}
