//! Cyclic executor: setup once, then one loop iteration per cycle.

use std::time::{Duration, Instant};

use rkyv::{Archive, Deserialize, Serialize};

use crate::capability::Capabilities;

use super::cells::{ExecutionSession, IterationRecorder, cycle_duration};
use super::program::Program;

/// How an executor run ended.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum ExecutorExit {
    /// The cancel flag was observed between iterations.
    Cancelled,
    /// Setup raised; the loop never started. Carries the diagnostic.
    SetupFailed(String),
    /// The kill switch interrupted the program mid-statement.
    Killed,
    /// The executor thread panicked.
    Panicked(String),
}

impl ExecutorExit {
    /// Whether the program stopped at an iteration boundary.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Cancelled | Self::SetupFailed(_))
    }
}

/// Time left in the cycle after a body that took `elapsed`.
///
/// `max(0, target - elapsed)`; an overrunning body gets no sleep and no
/// catch-up.
pub fn pacing_delay(target_cycle_ms: f64, elapsed: Duration) -> Duration {
    cycle_duration(target_cycle_ms - elapsed.as_secs_f64() * 1000.0)
}

/// Runs a [`Program`] against the session's shared cells.
pub struct CyclicExecutor<P> {
    program: P,
    session: ExecutionSession,
    recorder: IterationRecorder,
}

impl<P: Program> CyclicExecutor<P> {
    pub fn new(program: P, session: ExecutionSession, recorder: IterationRecorder) -> Self {
        Self {
            program,
            session,
            recorder,
        }
    }

    /// Run until cancelled, killed or setup fails.
    pub fn run(mut self, caps: &mut dyn Capabilities) -> ExecutorExit {
        if let Err(err) = self.program.setup(caps) {
            if err.is_interrupted() {
                return ExecutorExit::Killed;
            }
            let message = err.to_string();
            tracing::info!("Setup failed: {}", message);
            caps.console_write(&message);
            return ExecutorExit::SetupFailed(message);
        }

        let cancel = self.session.cancel().clone();
        let has_loop = self.program.has_loop();
        tracing::debug!(
            "Entering loop (body: {}, target {} ms)",
            has_loop,
            self.session.target_cycle_ms()
        );

        while !cancel.is_set() {
            let started = Instant::now();

            if has_loop {
                match self.program.iterate(caps) {
                    Ok(()) => {}
                    Err(err) if err.is_interrupted() => return ExecutorExit::Killed,
                    Err(err) => caps.console_write(&err.to_string()),
                }
                self.recorder.record();
            } else {
                self.recorder.clear();
            }

            let delay = pacing_delay(self.session.target_cycle_ms(), started.elapsed());
            if cancel.wait_timeout(delay) {
                break;
            }
        }

        ExecutorExit::Cancelled
    }
}
