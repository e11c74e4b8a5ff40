//! The abstract unit of work the runtime schedules (spec §3 "Task").
//!
//! A task's `execute` returns a [`TaskResult`] describing whether it frees
//! itself, chains into a successor task, or signals the worker to stop.
//! Successors are followed in place when they target the same worker and
//! enqueued otherwise (spec §4.1 "Task results").

use db_dataflow::Target;

/// What `Task::execute` handed back to the worker loop.
pub enum TaskResult {
    /// Return the task object to the per-worker task allocator; the loop
    /// advances to the next queued task.
    Remove,
    /// `next` runs in place on this worker if its annotation targets us,
    /// otherwise it is enqueued on its target worker. The current task is
    /// not freed.
    Succeed(Box<dyn Task>),
    /// As `Succeed`, and the current task is also freed.
    SucceedAndRemove(Box<dyn Task>),
    /// The worker finishes draining its local queue, then shuts down.
    Stop,
}

/// A schedulable unit of work. Implementors must be cheap to move across
/// threads: a task is pushed to a remote inbox whenever its annotation names
/// a worker other than the one that produced it.
pub trait Task: Send {
    /// Where this task must run: a literal worker, the owner of a resource
    /// pointer, or the worker that is currently executing it.
    fn target(&self) -> Target;

    fn execute(&mut self, worker_id: u8) -> TaskResult;

    /// Estimated execution cost in cycles, used by the `auto` prefetch
    /// distance heuristic (spec §4.1 "Cycles"). Zero means "unknown".
    fn estimated_cycles(&self) -> u64 {
        0
    }

    /// Opaque id surfaced to the tracing subsystem and the wire protocol's
    /// `TaskTrace` response kind. Zero means untraced.
    fn trace_id(&self) -> u64 {
        0
    }
}

/// A boxed [`Task`] plus the annotation-derived offsets the prefetch
/// pipeline should issue hints for once it peeks this task. Kept separate
/// from the task itself so the pipeline can resolve prefetch targets without
/// mutably borrowing the task.
pub struct Scheduled {
    pub task: Box<dyn Task>,
    pub prefetch_offsets: Vec<u32>,
}

impl Scheduled {
    pub fn new(task: Box<dyn Task>) -> Self {
        Self {
            task,
            prefetch_offsets: Vec::new(),
        }
    }

    pub fn with_prefetch(mut self, offsets: Vec<u32>) -> Self {
        self.prefetch_offsets = offsets;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Task for Noop {
        fn target(&self) -> Target {
            Target::Local
        }
        fn execute(&mut self, _worker_id: u8) -> TaskResult {
            TaskResult::Remove
        }
    }

    #[test]
    fn default_cycles_and_trace_are_zero() {
        let t = Noop;
        assert_eq!(t.estimated_cycles(), 0);
        assert_eq!(t.trace_id(), 0);
    }
}
