//! Binds one OS thread per worker in the core set, pinned to its physical
//! (or SMT) core, and owns the shared handles other workers (and the
//! dispatch entry point) push tasks into (spec §4.1 "Tasking Runtime").

use crate::prefetch::PrefetchDepth;
use crate::task::{Scheduled, Task};
use crate::worker::{Worker, WorkerHandle};
use db_dataflow::Target;
use db_kernel::topology::{CoreSet, WorkerOrder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct RuntimeConfig {
    pub worker_count: u16,
    pub order: WorkerOrder,
    pub prefetch_depth: PrefetchDepth,
    pub steal_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get() as u16,
            order: WorkerOrder::Ascending,
            prefetch_depth: PrefetchDepth::Fixed(0),
            steal_queue_capacity: 64,
        }
    }
}

/// The tasking runtime: one thread per worker, a shared set of per-worker
/// inboxes any thread can dispatch into, and a global running flag every
/// worker polls between tasks.
pub struct Runtime {
    core_set: CoreSet,
    handles: Arc<Vec<Arc<WorkerHandle>>>,
    threads: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Runtime {
    pub fn start(config: RuntimeConfig) -> Self {
        let core_set = CoreSet::build(config.worker_count, config.order);
        let handles: Vec<Arc<WorkerHandle>> = (0..config.worker_count)
            .map(|w| {
                Arc::new(WorkerHandle::new(
                    w as u8,
                    core_set.core_id(w),
                    config.steal_queue_capacity,
                ))
            })
            .collect();
        let handles = Arc::new(handles);
        let running = Arc::new(AtomicBool::new(true));

        let threads = handles
            .iter()
            .map(|handle| {
                let handle = Arc::clone(handle);
                let all_handles = Arc::clone(&handles);
                let running = Arc::clone(&running);
                let depth = config.prefetch_depth;
                std::thread::Builder::new()
                    .name(format!("db-worker-{}", handle.worker_id))
                    .spawn(move || run_worker_loop(handle, all_handles, running, depth))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        tracing::info!(workers = config.worker_count, "runtime started");

        Self {
            core_set,
            handles,
            threads,
            running,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn core_set(&self) -> &CoreSet {
        &self.core_set
    }

    /// Resolves `task`'s annotation and pushes it onto the target worker's
    /// inbox. Callable from any thread, including outside the runtime (a
    /// scan's initial tokens, a client connection handler).
    pub fn dispatch(&self, task: Box<dyn Task>) {
        let target = task.target().resolve(0);
        let worker_id = match task.target() {
            Target::Local => 0,
            _ => target,
        };
        self.handles[worker_id as usize % self.handles.len()].push_remote(Scheduled::new(task));
    }

    /// Sets the global running flag false; each worker observes this and
    /// stops once its local queue and pipeline drain (spec §5 "Suspension
    /// points": `is_running` is periodically polled).
    pub fn shutdown(self) {
        self.running.store(false, Ordering::Release);
        for handle in self.handles.iter() {
            handle.request_stop();
        }
        for thread in self.threads {
            let _ = thread.join();
        }
        tracing::info!("runtime stopped");
    }
}

fn run_worker_loop(
    handle: Arc<WorkerHandle>,
    all_handles: Arc<Vec<Arc<WorkerHandle>>>,
    global_running: Arc<AtomicBool>,
    depth: PrefetchDepth,
) {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(core) = core_ids.iter().find(|c| c.id == handle.core_id as usize) {
            core_affinity::set_for_current(*core);
        }
    }

    tracing::debug!(worker_id = handle.worker_id, "worker thread starting");
    let mut worker = Worker::new(Arc::clone(&handle), depth);

    loop {
        let mut to_route = Vec::new();
        worker.run_one(&mut |worker_id, scheduled| to_route.push((worker_id, scheduled)));
        for (worker_id, scheduled) in to_route {
            if let Some(target) = all_handles.get(worker_id as usize) {
                target.push_remote(scheduled);
            }
        }

        if !handle.is_running() && worker.idle() {
            break;
        }
        if !global_running.load(Ordering::Acquire) && worker.idle() {
            break;
        }
        if worker.idle() {
            std::hint::spin_loop();
        }
    }
    tracing::debug!(worker_id = handle.worker_id, "worker thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskResult;

    struct Once(std::sync::Arc<std::sync::atomic::AtomicBool>);
    impl Task for Once {
        fn target(&self) -> Target {
            Target::Worker(0)
        }
        fn execute(&mut self, _worker_id: u8) -> TaskResult {
            self.0.store(true, Ordering::Release);
            TaskResult::Remove
        }
    }

    #[test]
    fn dispatched_task_runs_and_runtime_shuts_down_cleanly() {
        let runtime = Runtime::start(RuntimeConfig {
            worker_count: 2,
            order: WorkerOrder::Ascending,
            prefetch_depth: PrefetchDepth::Fixed(0),
            steal_queue_capacity: 4,
        });
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        runtime.dispatch(Box::new(Once(ran.clone())));

        let start = std::time::Instant::now();
        while !ran.load(Ordering::Acquire) && start.elapsed() < std::time::Duration::from_secs(2) {
            std::thread::yield_now();
        }
        assert!(ran.load(Ordering::Acquire));
        runtime.shutdown();
    }
}
