//! Inter-process communication with `pacer-worker` processes.
//!
//! Running each program in a worker process lets the host kill it
//! immediately, even when it never yields back to the interpreter's
//! cancellation checks.

pub mod protocol;
mod worker;

pub use protocol::{WorkerCommand, WorkerEvent, read_message, write_message};
pub use worker::{CommandSink, EventStream, WORKER_PATH_ENV, WorkerHandle};
