//! In-flight task tracking
//!
//! [`TaskTracker`] holds at most one render task per key, drains finished
//! tasks, aborts tasks that overrun the render timeout, and keeps counters
//! for diagnostics. Cancelled tasks are forgotten immediately, so a late
//! result from the engine can never be reported.

use crate::task::{RenderError, RenderResult, RenderTask};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Tracker statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Total tasks started
    pub started: u64,

    /// Tasks that produced a raster
    pub completed: u64,

    /// Tasks that resolved with an engine error or disconnected
    pub failed: u64,

    /// Tasks cancelled by the owner
    pub cancelled: u64,

    /// Tasks aborted by the render timeout
    pub timed_out: u64,

    /// Tasks currently in flight
    pub in_flight: usize,
}

impl TrackerStats {
    /// Tasks that have finished one way or another
    pub fn settled(&self) -> u64 {
        self.completed + self.failed + self.cancelled + self.timed_out
    }
}

/// A task that finished during [`TaskTracker::poll`]
#[derive(Debug)]
pub struct Finished<K> {
    pub key: K,
    pub result: RenderResult,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct InFlight {
    task: RenderTask,
    started_at: Instant,
}

/// One-task-per-key registry of running renders
#[derive(Debug)]
pub struct TaskTracker<K> {
    tasks: HashMap<K, InFlight>,
    timeout: Duration,
    stats: TrackerStats,
}

impl<K: Eq + Hash + Clone> TaskTracker<K> {
    /// Creates an empty tracker that abandons tasks older than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { tasks: HashMap::new(), timeout, stats: TrackerStats::default() }
    }

    /// How long a task may run before it is timed out
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a task is in flight for `key`
    pub fn contains(&self, key: &K) -> bool {
        self.tasks.contains_key(key)
    }

    /// Start tracking `task` under `key`
    ///
    /// Returns the task back if the key already has one in flight.
    pub fn start(&mut self, key: K, task: RenderTask, now: Instant) -> Result<(), RenderTask> {
        if self.tasks.contains_key(&key) {
            return Err(task);
        }
        self.tasks.insert(key, InFlight { task, started_at: now });
        self.stats.started += 1;
        Ok(())
    }

    /// Abort and forget the task for `key`
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some(entry) => {
                entry.task.abort();
                self.stats.cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Abort every task whose key matches `predicate`
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let keys: Vec<K> = self.tasks.keys().filter(|key| predicate(key)).cloned().collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// Cancel every in-flight task, returning how many were cancelled
    pub fn cancel_all(&mut self) -> usize {
        self.cancel_where(|_| true)
    }

    /// Drain finished tasks and time out overdue ones
    ///
    /// A task that finished and is also overdue is reported with its real
    /// result.
    pub fn poll(&mut self, now: Instant) -> Vec<Finished<K>> {
        let mut finished = Vec::new();

        for (key, entry) in &self.tasks {
            let elapsed = now.saturating_duration_since(entry.started_at);
            let result = match entry.task.try_result() {
                Some(result) => result,
                None if elapsed >= self.timeout => {
                    entry.task.abort();
                    Err(RenderError::TimedOut(self.timeout))
                }
                None => continue,
            };
            finished.push(Finished { key: key.clone(), result, elapsed });
        }

        for done in &finished {
            self.tasks.remove(&done.key);
            match &done.result {
                Ok(_) => self.stats.completed += 1,
                Err(RenderError::TimedOut(_)) => self.stats.timed_out += 1,
                Err(RenderError::Aborted) => self.stats.cancelled += 1,
                Err(_) => self.stats.failed += 1,
            }
        }

        finished
    }

    /// When the oldest in-flight task will time out
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.values().map(|entry| entry.started_at + self.timeout).min()
    }

    /// Number of in-flight tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Counters since the tracker was created
    pub fn stats(&self) -> TrackerStats {
        TrackerStats { in_flight: self.tasks.len(), ..self.stats.clone() }
    }
}
