//! Worker-process execution contexts.
//!
//! The host side of a context is a bridge thread reading the worker's
//! events. Capability calls are served against the host collaborators and
//! cadence samples are written into the session's realized-cycle cell.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use uuid::Uuid;

use crate::capability::Collaborators;
use crate::error::{Error, Result};
use crate::execute::{CycleTime, ExecutionSession, ExecutorExit};
use crate::ipc::{CommandSink, EventStream, WorkerCommand, WorkerEvent, WorkerHandle};
use crate::partition::PartitionResult;

use super::{ExecutionContext, Isolation, Runtime};

/// Runs each program in its own `pacer-worker` process.
pub struct ProcessRuntime {
    collaborators: Collaborators,
}

impl ProcessRuntime {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

impl Runtime for ProcessRuntime {
    fn isolation(&self) -> Isolation {
        Isolation::Process
    }

    fn start(
        &self,
        program: &PartitionResult,
        session: &ExecutionSession,
    ) -> Result<Box<dyn ExecutionContext>> {
        let id = Uuid::new_v4();
        let mut worker = WorkerHandle::spawn()?;
        let events = worker
            .take_events()
            .ok_or_else(|| Error::Ipc("Worker event stream unavailable".to_string()))?;

        let bridge = Bridge {
            id,
            events,
            commands: worker.commands(),
            collaborators: self.collaborators.clone(),
            realized: session.realized_cycle().clone(),
        };
        let bridge = thread::Builder::new()
            .name("pacer-bridge".into())
            .spawn(move || bridge.run())?;

        worker.send(&WorkerCommand::Start {
            setup_code: program.setup_code.clone(),
            loop_code: program.loop_code.clone(),
            loop_first_line: program.loop_first_line,
            target_cycle_ms: session.target_cycle_ms(),
        })?;

        tracing::debug!("Started worker context {} (pid {})", id, worker.pid());
        Ok(Box::new(ProcessContext {
            id,
            worker,
            bridge,
        }))
    }
}

/// Serves one worker's events until its stdout closes.
struct Bridge {
    id: Uuid,
    events: EventStream,
    commands: CommandSink,
    collaborators: Collaborators,
    realized: CycleTime,
}

impl Bridge {
    /// Returns the exit the worker reported, if it got that far.
    fn run(mut self) -> Option<ExecutorExit> {
        let mut exit = None;
        // Any read error means the worker is gone.
        while let Ok(event) = self.events.recv() {
            match event {
                WorkerEvent::ReadSensor => {
                    let image = self.collaborators.robot.read_image();
                    if let Err(e) = self.commands.send(&WorkerCommand::SensorFrame { image }) {
                        tracing::debug!("Context {}: sensor frame not delivered: {}", self.id, e);
                    }
                }
                WorkerEvent::SetLinear { v } => self.collaborators.robot.set_linear_velocity(v),
                WorkerEvent::SetAngular { w } => self.collaborators.robot.set_angular_velocity(w),
                WorkerEvent::ShowImage { image } => self.collaborators.display.show_image(&image),
                WorkerEvent::Console { text } => self.collaborators.console.write(&text),
                WorkerEvent::Cadence { realized_cycle_ms } => self.realized.set(realized_cycle_ms),
                WorkerEvent::Stopped { exit: reported } => exit = Some(reported),
                WorkerEvent::Pong => {}
            }
        }
        tracing::trace!("Context {}: event stream closed", self.id);
        exit
    }
}

struct ProcessContext {
    id: Uuid,
    worker: WorkerHandle,
    bridge: JoinHandle<Option<ExecutorExit>>,
}

impl ExecutionContext for ProcessContext {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_target_cycle(&mut self, ms: f64) -> Result<()> {
        self.worker.send(&WorkerCommand::SetCycleTime { ms })
    }

    fn is_running(&mut self) -> bool {
        self.worker.is_alive()
    }

    fn terminate(mut self: Box<Self>, grace: Duration) -> ExecutorExit {
        // The worker may already have exited; a closed pipe is fine.
        let _ = self.worker.send(&WorkerCommand::Stop);

        let exited = self.worker.wait_timeout(grace);
        if !exited {
            tracing::debug!(
                "Worker {} (context {}) did not stop within {:?}; killing",
                self.worker.pid(),
                self.id,
                grace
            );
        }
        if let Err(e) = self.worker.kill() {
            tracing::warn!("Failed to reap worker for context {}: {}", self.id, e);
        }

        let reported = match self.bridge.join() {
            Ok(reported) => reported,
            Err(_) => {
                tracing::warn!("Bridge thread for context {} panicked", self.id);
                None
            }
        };

        let exit = match reported {
            Some(exit) if exited => exit,
            _ => ExecutorExit::Killed,
        };
        tracing::debug!("Context {} ended: {:?}", self.id, exit);
        exit
    }
}
