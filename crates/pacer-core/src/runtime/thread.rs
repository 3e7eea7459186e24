//! In-process execution contexts.

use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::capability::Collaborators;
use crate::error::Result;
use crate::execute::{ExecutionSession, ExecutorExit, PairHandle, PairOptions, ProgramSource, SAMPLE_INTERVAL, launch};
use crate::partition::PartitionResult;

use super::{ExecutionContext, Isolation, Runtime};

/// Poll interval while waiting out the grace period.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Runs programs on threads of the host process.
///
/// Forced termination fires the interpreter's kill switch, which is checked
/// before every statement. A program blocked inside a collaborator call is
/// stopped when that call returns.
pub struct ThreadRuntime {
    collaborators: Collaborators,
    sample_interval: Duration,
}

impl ThreadRuntime {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            sample_interval: SAMPLE_INTERVAL,
        }
    }

    /// Override the monitor's sampling window.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

impl Runtime for ThreadRuntime {
    fn isolation(&self) -> Isolation {
        Isolation::Thread
    }

    fn start(
        &self,
        program: &PartitionResult,
        session: &ExecutionSession,
    ) -> Result<Box<dyn ExecutionContext>> {
        let id = Uuid::new_v4();
        let pair = launch(
            ProgramSource::from(program),
            session,
            self.collaborators.capabilities(),
            PairOptions {
                sample_interval: self.sample_interval,
                observer: None,
            },
        )?;
        tracing::debug!("Started thread context {}", id);
        Ok(Box::new(ThreadContext { id, pair }))
    }
}

struct ThreadContext {
    id: Uuid,
    pair: PairHandle,
}

impl ExecutionContext for ThreadContext {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_target_cycle(&mut self, _ms: f64) -> Result<()> {
        // The executor reads the shared session cell directly.
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        !self.pair.executor_finished()
    }

    fn terminate(self: Box<Self>, grace: Duration) -> ExecutorExit {
        let deadline = Instant::now().checked_add(grace);
        while !self.pair.executor_finished() && deadline.is_none_or(|deadline| Instant::now() < deadline) {
            thread::sleep(POLL_INTERVAL);
        }
        if !self.pair.executor_finished() {
            tracing::debug!("Context {} did not stop within {:?}; killing", self.id, grace);
            self.pair.kill();
        }
        let exit = self.pair.join();
        tracing::debug!("Context {} ended: {:?}", self.id, exit);
        exit
    }
}
