#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Wire protocol framing, query-result serialization, and the TCP server
//! loop boundary (spec §4.12, §6). Statement parsing, planning, optimising,
//! and execution are external collaborators, wired in through
//! [`listener::QueryEngine`].

pub mod error;
pub mod frame;
pub mod listener;
pub mod protocol;
pub mod result;

pub use listener::{serve, HandleMessageTask, QueryEngine, RoundRobin};
pub use protocol::{Request, Response, ResponseKind};
pub use result::QueryResult;
