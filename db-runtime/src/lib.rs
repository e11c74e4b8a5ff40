#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! The tasking runtime: one OS thread per worker in the core set, a
//! cooperative inner loop that never yields inside a task, annotation-driven
//! dispatch, and a prefetch pipeline that lets a task's hints mature before
//! it runs (spec §4.1).

pub mod error;
pub mod prefetch;
pub mod scheduler;
pub mod task;
pub mod trace;
pub mod worker;

pub use prefetch::{PrefetchDepth, PrefetchPipeline};
pub use scheduler::{Runtime, RuntimeConfig};
pub use task::{Scheduled, Task, TaskResult};
pub use trace::{TaskTrace, TraceEntry};
pub use worker::{Dispatch, Worker, WorkerHandle};
