//! One worker: an OS thread pinned to one core, running a cooperative loop
//! that drains its local ready queue, then its remote inbox, then the
//! prefetch pipeline, in that precedence (spec §4.1 "Channels").

use crate::prefetch::{PrefetchDepth, PrefetchPipeline};
use crate::task::{Scheduled, Task, TaskResult};
use crate::trace::TaskTrace;
use db_kernel::queue::{LocalQueue, RemoteInbox, StealQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The cross-thread-visible half of a worker: the handles other workers (or
/// the runtime's dispatch entry point) push into. Every field here must be
/// safe to touch from any thread; the local ready queue and prefetch
/// pipeline, by contrast, live only on the owning thread's stack.
pub struct WorkerHandle {
    pub worker_id: u8,
    pub core_id: u16,
    inbox: RemoteInbox<Scheduled>,
    steal_out: StealQueue<Scheduled>,
    running: AtomicBool,
}

impl WorkerHandle {
    pub fn new(worker_id: u8, core_id: u16, steal_capacity: usize) -> Self {
        Self {
            worker_id,
            core_id,
            inbox: RemoteInbox::new(),
            steal_out: StealQueue::new(steal_capacity.max(1)),
            running: AtomicBool::new(true),
        }
    }

    pub fn push_remote(&self, scheduled: Scheduled) {
        self.inbox.push(scheduled);
    }

    /// Best-effort: only succeeds while the steal-out queue has spare
    /// capacity, per spec §4.1 ("optional path used only when explicitly
    /// annotated").
    pub fn publish_for_stealing(&self, scheduled: Scheduled) -> Result<(), Scheduled> {
        self.steal_out.try_push(scheduled)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Per-thread state for the worker that actually runs the loop. Not `Sync`:
/// only the thread that owns it ever touches `local` or `pipeline`.
pub struct Worker {
    pub handle: Arc<WorkerHandle>,
    local: LocalQueue<Scheduled>,
    pipeline: PrefetchPipeline,
    trace: TaskTrace,
}

/// What the worker loop asks its caller to do with a task's successor: run
/// it in place (same worker) or hand it to the peer worker it targets.
pub enum Dispatch {
    InPlace(Scheduled),
    Remote { worker_id: u8, scheduled: Scheduled },
}

impl Worker {
    pub fn new(handle: Arc<WorkerHandle>, depth: PrefetchDepth) -> Self {
        Self {
            handle,
            local: LocalQueue::new(),
            pipeline: PrefetchPipeline::new(depth),
            trace: TaskTrace::new(),
        }
    }

    pub fn push_local(&mut self, scheduled: Scheduled) {
        self.local.push_back(scheduled);
    }

    /// Resolves a task's own target against the worker currently running it,
    /// deciding whether a `succeed` continuation stays in place or must be
    /// routed to a different worker's inbox.
    pub fn route(&self, scheduled: Scheduled) -> Dispatch {
        let target = scheduled.task.target().resolve(self.handle.worker_id);
        if target == self.handle.worker_id {
            Dispatch::InPlace(scheduled)
        } else {
            Dispatch::Remote {
                worker_id: target,
                scheduled,
            }
        }
    }

    /// Drains in precedence: local ready queue, then remote inbox, then the
    /// prefetch pipeline. Returns `None` once every source is empty (the
    /// caller should busy-wait with a pause instruction and re-poll).
    fn next_scheduled(&mut self) -> Option<Scheduled> {
        if let Some(s) = self.local.pop_front() {
            self.pipeline.push(s, None);
        }
        while let Some(s) = self.handle.inbox.pop() {
            self.pipeline.push(s, None);
        }
        let force = self.local.is_empty();
        self.pipeline.pop_ready(force)
    }

    /// Runs one task to completion, following its `succeed` continuation
    /// chain in place as long as each successor targets this worker, and
    /// routing cross-worker successors back out via `route_out`.
    pub fn run_one(&mut self, route_out: &mut impl FnMut(u8, Scheduled)) -> bool {
        let Some(mut scheduled) = self.next_scheduled() else {
            return true;
        };

        self.trace.begin(scheduled.task.trace_id());
        loop {
            match scheduled.task.execute(self.handle.worker_id) {
                TaskResult::Remove => {
                    self.trace.end();
                    return true;
                }
                TaskResult::Succeed(next) | TaskResult::SucceedAndRemove(next) => {
                    let next_scheduled = Scheduled::new(next);
                    match self.route(next_scheduled) {
                        Dispatch::InPlace(s) => {
                            scheduled = s;
                            continue;
                        }
                        Dispatch::Remote { worker_id, scheduled: s } => {
                            route_out(worker_id, s);
                            self.trace.end();
                            return true;
                        }
                    }
                }
                TaskResult::Stop => {
                    self.trace.end();
                    self.handle.request_stop();
                    return false;
                }
            }
        }
    }

    pub fn idle(&self) -> bool {
        self.local.is_empty() && self.handle.inbox.is_empty() && self.pipeline.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_dataflow::Target;

    struct CountDown(u32);
    impl Task for CountDown {
        fn target(&self) -> Target {
            Target::Local
        }
        fn execute(&mut self, _worker_id: u8) -> TaskResult {
            if self.0 == 0 {
                TaskResult::Remove
            } else {
                TaskResult::Succeed(Box::new(CountDown(self.0 - 1)))
            }
        }
    }

    #[test]
    fn in_place_successor_chain_runs_without_reenqueue() {
        let handle = Arc::new(WorkerHandle::new(0, 0, 4));
        let mut worker = Worker::new(handle, PrefetchDepth::Fixed(0));
        worker.push_local(Scheduled::new(Box::new(CountDown(3))));
        let mut routed = Vec::new();
        let progressed = worker.run_one(&mut |w, s| routed.push((w, s)));
        assert!(progressed);
        assert!(routed.is_empty());
        assert!(worker.idle());
    }

    #[test]
    fn remote_target_is_routed_out_not_run_in_place() {
        let handle = Arc::new(WorkerHandle::new(0, 0, 4));
        let mut worker = Worker::new(handle, PrefetchDepth::Fixed(0));

        struct JumpToOne;
        impl Task for JumpToOne {
            fn target(&self) -> Target {
                Target::Local
            }
            fn execute(&mut self, _worker_id: u8) -> TaskResult {
                struct Landed;
                impl Task for Landed {
                    fn target(&self) -> Target {
                        Target::Worker(1)
                    }
                    fn execute(&mut self, _worker_id: u8) -> TaskResult {
                        TaskResult::Remove
                    }
                }
                TaskResult::Succeed(Box::new(Landed))
            }
        }

        worker.push_local(Scheduled::new(Box::new(JumpToOne)));
        let mut routed = Vec::new();
        worker.run_one(&mut |w, s| routed.push((w, s)));
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].0, 1);
    }

    #[test]
    fn stop_halts_the_worker() {
        struct StopNow;
        impl Task for StopNow {
            fn target(&self) -> Target {
                Target::Local
            }
            fn execute(&mut self, _worker_id: u8) -> TaskResult {
                TaskResult::Stop
            }
        }

        let handle = Arc::new(WorkerHandle::new(0, 0, 4));
        let mut worker = Worker::new(handle.clone(), PrefetchDepth::Fixed(0));
        worker.push_local(Scheduled::new(Box::new(StopNow)));
        let progressed = worker.run_one(&mut |_, _| {});
        assert!(!progressed);
        assert!(!handle.is_running());
    }
}
