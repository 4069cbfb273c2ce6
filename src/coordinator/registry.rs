//! The coordinator's task registry and phase machine.
//!
//! This module is pure bookkeeping: no I/O, no locking, no clock of its
//! own. The service wraps one [`Registry`] in a mutex and feeds it the
//! current time, which keeps every rule here directly testable.

use std::fmt;
use std::time::{Duration, Instant};

use crate::rpc::{TaskKind, TaskReply};

/// Status of a single task.
///
/// The worker id and start time live inside `InProgress`, so an `Idle`
/// task structurally cannot carry a stale assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Ready to assign.
    Idle,
    /// Assigned; may yet complete.
    InProgress {
        worker_id: String,
        started_at: Instant,
    },
    /// Finalized. Terminal: a completed task is never reassigned.
    Completed,
}

/// Global execution state. Advances monotonically; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Map,
    Reduce,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Reduce => write!(f, "reduce"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// What a completion report did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The report moved the task to `Completed`.
    Completed,
    /// A failure report from the assigned worker; the task is idle again.
    Reset,
    /// Duplicate or stale report; nothing changed.
    Ignored,
}

/// A job was created without any reduce partition to consume map output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidReduceCount;

impl fmt::Display for InvalidReduceCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a job needs at least one reduce partition")
    }
}

impl std::error::Error for InvalidReduceCount {}

/// A completion report named a task that was never created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownTask {
    pub kind: TaskKind,
    pub id: u32,
}

impl fmt::Display for UnknownTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no {} task with id {}", self.kind, self.id)
    }
}

impl std::error::Error for UnknownTask {}

#[derive(Debug)]
struct TaskEntry {
    id: u32,
    status: TaskStatus,
}

/// Task records for one job: `M` map tasks (one per input file, in
/// argument order) and `R` reduce tasks, created at startup and never
/// destroyed.
#[derive(Debug)]
pub struct Registry {
    input_files: Vec<String>,
    n_reduce: u32,
    phase: Phase,
    map_tasks: Vec<TaskEntry>,
    reduce_tasks: Vec<TaskEntry>,
}

impl Registry {
    /// `n_reduce` must be at least one: every partition index a map task
    /// can produce needs a reduce task to consume it.
    pub fn new(input_files: Vec<String>, n_reduce: u32) -> Result<Self, InvalidReduceCount> {
        if n_reduce == 0 {
            return Err(InvalidReduceCount);
        }
        let map_tasks = (0..input_files.len() as u32)
            .map(|id| TaskEntry {
                id,
                status: TaskStatus::Idle,
            })
            .collect();
        let reduce_tasks = (0..n_reduce)
            .map(|id| TaskEntry {
                id,
                status: TaskStatus::Idle,
            })
            .collect();
        Ok(Self {
            input_files,
            n_reduce,
            phase: Phase::Map,
            map_tasks,
            reduce_tasks,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn n_map(&self) -> u32 {
        self.input_files.len() as u32
    }

    pub fn n_reduce(&self) -> u32 {
        self.n_reduce
    }

    /// Pick work for `worker_id`: the first idle task of the current phase
    /// in id order. When the phase has no idle task left this either waits
    /// (some task still in progress) or advances the phase and retries
    /// (everything completed). `Done` always answers `Exit`.
    pub fn assign(&mut self, worker_id: &str, now: Instant) -> TaskReply {
        loop {
            match self.phase {
                Phase::Map => {
                    if let Some(entry) = first_idle(&mut self.map_tasks) {
                        entry.status = TaskStatus::InProgress {
                            worker_id: worker_id.to_string(),
                            started_at: now,
                        };
                        let task_id = entry.id;
                        return TaskReply::AssignMap {
                            task_id,
                            input_file: self.input_files[task_id as usize].clone(),
                            n_reduce: self.n_reduce,
                        };
                    }
                    if all_completed(&self.map_tasks) {
                        self.phase = Phase::Reduce;
                        continue;
                    }
                    return TaskReply::Wait;
                }
                Phase::Reduce => {
                    if let Some(entry) = first_idle(&mut self.reduce_tasks) {
                        entry.status = TaskStatus::InProgress {
                            worker_id: worker_id.to_string(),
                            started_at: now,
                        };
                        return TaskReply::AssignReduce {
                            task_id: entry.id,
                            n_map: self.input_files.len() as u32,
                        };
                    }
                    if all_completed(&self.reduce_tasks) {
                        self.phase = Phase::Done;
                        continue;
                    }
                    return TaskReply::Wait;
                }
                Phase::Done => return TaskReply::Exit,
            }
        }
    }

    /// Apply a completion report.
    ///
    /// Only the worker recorded at assignment time may move its task, in
    /// either direction; anything else is a stale echo of a reclaimed
    /// assignment and is ignored. Reports against a completed task are
    /// ignored too, which makes redelivery harmless.
    pub fn complete(
        &mut self,
        worker_id: &str,
        kind: TaskKind,
        task_id: u32,
        success: bool,
    ) -> Result<Disposition, UnknownTask> {
        let entry = match kind {
            TaskKind::Map => self.map_tasks.get_mut(task_id as usize),
            TaskKind::Reduce => self.reduce_tasks.get_mut(task_id as usize),
        }
        .ok_or(UnknownTask { kind, id: task_id })?;

        let disposition = match &entry.status {
            TaskStatus::Completed => Disposition::Ignored,
            TaskStatus::InProgress {
                worker_id: assigned,
                ..
            } if assigned == worker_id => {
                if success {
                    entry.status = TaskStatus::Completed;
                    Disposition::Completed
                } else {
                    entry.status = TaskStatus::Idle;
                    Disposition::Reset
                }
            }
            // Idle, or running under a different worker: the reporter lost
            // its assignment to the timeout monitor.
            _ => Disposition::Ignored,
        };

        self.advance_phase();
        Ok(disposition)
    }

    /// Reset every `IN_PROGRESS` task of the active phase that has been
    /// running for `task_timeout` or longer. Returns the reclaimed ids.
    ///
    /// This never declares a worker dead: the old assignee may still
    /// finish and report, and the stale-worker check in [`complete`]
    /// discards that report.
    ///
    /// [`complete`]: Registry::complete
    pub fn reclaim_expired(
        &mut self,
        task_timeout: Duration,
        now: Instant,
    ) -> Vec<(TaskKind, u32)> {
        let (kind, tasks) = match self.phase {
            Phase::Map => (TaskKind::Map, &mut self.map_tasks),
            Phase::Reduce => (TaskKind::Reduce, &mut self.reduce_tasks),
            Phase::Done => return Vec::new(),
        };

        let mut reclaimed = Vec::new();
        for entry in tasks.iter_mut() {
            let expired = matches!(
                &entry.status,
                TaskStatus::InProgress { started_at, .. }
                    if now.duration_since(*started_at) >= task_timeout
            );
            if expired {
                entry.status = TaskStatus::Idle;
                reclaimed.push((kind, entry.id));
            }
        }
        reclaimed
    }

    fn advance_phase(&mut self) {
        if self.phase == Phase::Map && all_completed(&self.map_tasks) {
            self.phase = Phase::Reduce;
        }
        if self.phase == Phase::Reduce && all_completed(&self.reduce_tasks) {
            self.phase = Phase::Done;
        }
    }
}

fn first_idle(tasks: &mut [TaskEntry]) -> Option<&mut TaskEntry> {
    tasks
        .iter_mut()
        .find(|entry| entry.status == TaskStatus::Idle)
}

fn all_completed(tasks: &[TaskEntry]) -> bool {
    tasks
        .iter()
        .all(|entry| entry.status == TaskStatus::Completed)
}
