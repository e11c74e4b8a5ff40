#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
// Unsafe code is isolated to `platform` and `alloc`, where no safe
// alternative exists, and documented at each call site.

//! Core primitives shared by every crate in the database: worker topology,
//! the packed resource pointer, spin/optimistic locks, epoch-based
//! reclamation, the queue types backing task dispatch, and per-worker
//! allocators.

pub mod alloc;
pub mod epoch;
pub mod error;
pub mod optlock;
pub mod platform;
pub mod queue;
pub mod resource;
pub mod spinlock;
pub mod timer;
pub mod topology;

pub use error::{DbError, DbResult, ExecutionError, IoError, OptimizerError, ParseError, PlanError};
pub use optlock::OptimisticLock;
pub use resource::{ResourceFlags, ResourcePointer};
pub use spinlock::Spinlock;
pub use timer::{calibrate_tsc, CycleTimer};
pub use topology::{CoreSet, WorkerOrder, MAX_CORES};
