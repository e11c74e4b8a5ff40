//! The server loop boundary (spec §4.12): accepts TCP connections, copies
//! incoming frames into fresh buffers, and dispatches a `HandleMessageTask`
//! annotated to a round-robin worker. Parsing a statement into a plan,
//! optimising, and executing it are supplied by the caller through
//! [`QueryEngine`] — the core's job here stops at "turn bytes into a task".

use crate::frame::{read_frame_or_eof, write_frame};
use crate::protocol::{Request, Response};
use crate::result::QueryResult;
use db_dataflow::Target;
use db_kernel::error::{DbError, IoError};
use db_runtime::{Runtime, Task, TaskResult};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Supplied by the binary wiring `db-plan`/`db-operators`/`db-runtime`
/// together; the server loop itself has no opinion on how a statement
/// becomes a result.
pub trait QueryEngine: Send + Sync {
    fn execute(&self, statement: &str) -> Result<QueryResult, DbError>;
    fn table_names(&self) -> Vec<String>;
}

/// Round-robins accepted connections' first message across workers, the way
/// the runtime's dispatch entry point would for any externally-produced
/// task.
pub struct RoundRobin {
    next: AtomicU8,
    worker_count: u8,
}

impl RoundRobin {
    pub fn new(worker_count: u8) -> Self {
        Self {
            next: AtomicU8::new(0),
            worker_count: worker_count.max(1),
        }
    }

    pub fn next_worker(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed) % self.worker_count
    }
}

/// Parses one request frame, runs it against the engine, and writes the
/// framed response back to the client socket. Constructed per accepted
/// connection's inbound frame; returns `Stop` only for the `.stop` sentinel.
pub struct HandleMessageTask {
    stream: TcpStream,
    payload: Vec<u8>,
    engine: Arc<dyn QueryEngine>,
    worker: u8,
}

impl HandleMessageTask {
    pub fn new(stream: TcpStream, payload: Vec<u8>, engine: Arc<dyn QueryEngine>, worker: u8) -> Self {
        Self {
            stream,
            payload,
            engine,
            worker,
        }
    }

    fn respond(&mut self, response: Response) -> Result<(), IoError> {
        write_frame(&mut self.stream, &response.encode())
    }

    fn respond_query_result(&mut self, result: &QueryResult) -> Result<(), IoError> {
        let mut body = vec![crate::protocol::ResponseKind::QueryResult.discriminator()];
        result.serialize(&mut body)?;
        write_frame(&mut self.stream, &body)
    }
}

impl Task for HandleMessageTask {
    fn target(&self) -> Target {
        Target::Worker(self.worker)
    }

    fn execute(&mut self, _worker_id: u8) -> TaskResult {
        let request = match Request::parse(&self.payload) {
            Ok(r) => r,
            Err(e) => {
                let _ = self.respond(Response::Error(e.to_string()));
                return TaskResult::Remove;
            }
        };

        match request {
            Request::Stop => {
                let _ = self.respond(Response::Success("stopping".into()));
                TaskResult::Stop
            }
            Request::SetCores(_) | Request::Config => {
                let _ = self.respond(Response::Success("ok".into()));
                TaskResult::Remove
            }
            Request::Tables => {
                let names = self.engine.table_names().join(",");
                let _ = self.respond(Response::Success(names));
                TaskResult::Remove
            }
            Request::Table(name) => {
                let _ = self.respond(Response::Success(name));
                TaskResult::Remove
            }
            Request::Statement(sql) => {
                match self.engine.execute(&sql) {
                    Ok(result) => {
                        let _ = self.respond_query_result(&result);
                    }
                    Err(e) => {
                        let _ = self.respond(Response::Error(e.to_string()));
                    }
                }
                TaskResult::Remove
            }
        }
    }
}

/// Accepts connections on `port`, reading one frame per connection and
/// dispatching it as a `HandleMessageTask`; a client that sends `.stop`
/// causes that task to return `Stop`, which this loop treats as the
/// listener's own shutdown sentinel (spec §4.12).
pub fn serve(
    port: u16,
    runtime: &Runtime,
    engine: Arc<dyn QueryEngine>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    let round_robin = RoundRobin::new(runtime.worker_count() as u8);
    tracing::info!(port, "server listening");

    for stream in listener.incoming() {
        let mut stream = stream?;
        let payload = match read_frame_or_eof(&mut stream) {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame from client");
                continue;
            }
        };

        let is_stop = payload == b".stop";
        let worker = round_robin.next_worker();
        let task = HandleMessageTask::new(
            stream.try_clone()?,
            payload,
            Arc::clone(&engine),
            worker,
        );
        runtime.dispatch(Box::new(task));

        if is_stop {
            tracing::info!("stop sentinel received, server loop exiting");
            let _ = stream.flush();
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_wraps_around_worker_count() {
        let rr = RoundRobin::new(3);
        let seq: Vec<u8> = (0..7).map(|_| rr.next_worker()).collect();
        assert_eq!(seq, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
