//! Execution contexts hosting an executor/monitor pair.
//!
//! A [`Runtime`] starts one [`ExecutionContext`] per submitted program.
//! Two isolation levels are available:
//!
//! - [`ProcessRuntime`] runs the pair inside a `pacer-worker` process and
//!   forwards capability calls over IPC. Termination can always be forced
//!   by killing the process.
//! - [`ThreadRuntime`] runs the pair on threads of the host process and
//!   forces termination through the interpreter's kill switch.

mod process;
mod thread;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::execute::{ExecutionSession, ExecutorExit};
use crate::partition::PartitionResult;

pub use process::ProcessRuntime;
pub use thread::ThreadRuntime;

/// Where programs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Isolation {
    /// One worker process per program.
    #[default]
    Process,
    /// Threads inside the host process.
    Thread,
}

impl FromStr for Isolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "thread" => Ok(Self::Thread),
            other => Err(Error::Execution(format!(
                "unknown isolation '{}' (expected 'process' or 'thread')",
                other
            ))),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::Thread => f.write_str("thread"),
        }
    }
}

/// A live executor/monitor pair.
pub trait ExecutionContext: Send {
    /// Identifier used in logs.
    fn id(&self) -> Uuid;

    /// Propagate a new target cycle time to the running executor.
    ///
    /// The session cell has already been updated by the caller.
    fn set_target_cycle(&mut self, ms: f64) -> Result<()>;

    /// Whether the executor is still running.
    fn is_running(&mut self) -> bool;

    /// Stop the pair and wait for it.
    ///
    /// The caller sets the session's cancel flag first. If the executor has
    /// not stopped within `grace` it is forcibly terminated.
    fn terminate(self: Box<Self>, grace: Duration) -> ExecutorExit;
}

/// Factory for execution contexts.
pub trait Runtime: Send + Sync {
    /// Isolation level of the contexts this runtime creates.
    fn isolation(&self) -> Isolation;

    /// Start a fresh pair running `program` against the session cells.
    fn start(
        &self,
        program: &PartitionResult,
        session: &ExecutionSession,
    ) -> Result<Box<dyn ExecutionContext>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_parse() {
        assert_eq!("process".parse::<Isolation>().unwrap(), Isolation::Process);
        assert_eq!("Thread".parse::<Isolation>().unwrap(), Isolation::Thread);
        assert!("fiber".parse::<Isolation>().is_err());
        assert_eq!(Isolation::default(), Isolation::Process);
        assert_eq!(Isolation::Thread.to_string(), "thread");
    }
}
