/// Delayed, coalescing task queue driving reconciliation passes
use std::collections::{HashMap, HashSet};

use crate::tab_data::WindowId;

/// Milliseconds on the caller's clock
pub type Millis = u64;

/// Deferred work; the task value doubles as its coalescing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    ReconcileWindow(WindowId),
    ReconcileAll,
    /// Dissolve one-tab groups everywhere, then reconcile everything
    SweepAndReconcileAll,
}

/// Pending tasks by deadline plus the tasks currently running
///
/// Scheduling a task that is already pending moves its deadline instead of
/// queueing a duplicate. A due task whose twin is still running waits until
/// that run finishes.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: HashMap<Task, Millis>,
    in_flight: HashSet<Task>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler::default()
    }

    /// Queue `task` for `due_at`; returns false when it was coalesced into a pending one
    pub fn schedule(&mut self, task: Task, due_at: Millis) -> bool {
        match self.pending.insert(task, due_at) {
            Some(previous) => {
                log::debug!("Coalesced {:?}: deadline {} -> {}", task, previous, due_at);
                false
            }
            None => true,
        }
    }

    /// Remove and start every task due by `now`, earliest first
    pub fn take_due(&mut self, now: Millis) -> Vec<Task> {
        let mut due: Vec<(Millis, Task)> = self
            .pending
            .iter()
            .filter(|(task, due_at)| **due_at <= now && !self.in_flight.contains(*task))
            .map(|(task, due_at)| (*due_at, *task))
            .collect();
        due.sort();

        for (_, task) in &due {
            self.pending.remove(task);
            self.in_flight.insert(*task);
        }
        due.into_iter().map(|(_, task)| task).collect()
    }

    pub fn finish(&mut self, task: Task) {
        self.in_flight.remove(&task);
    }

    /// Earliest deadline of a task that could start now
    ///
    /// Tasks waiting on a running twin are left out; they come back once
    /// [`finish`](Scheduler::finish) is called for the twin.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.pending
            .iter()
            .filter(|(task, _)| !self.in_flight.contains(*task))
            .map(|(_, due_at)| *due_at)
            .min()
    }

    pub fn is_pending(&self, task: Task) -> bool {
        self.pending.contains_key(&task)
    }

    pub fn is_running(&self, task: Task) -> bool {
        self.in_flight.contains(&task)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}
