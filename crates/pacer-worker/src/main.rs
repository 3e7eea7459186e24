//! Pacer worker - runs one control program in an isolated process.
//!
//! Speaks the length-prefixed rkyv protocol of `pacer_core::ipc` on
//! stdin/stdout. Logs go to stderr; nothing else may write to stdout.

mod remote;

use std::io::{self, BufReader, BufWriter};
use std::sync::mpsc::{self, Receiver, Sender};

use pacer_core::ipc::{WorkerCommand, WorkerEvent, read_message};
use pacer_core::{ExecutionSession, ExecutorExit, Image, PairHandle, PairOptions, ProgramSource, launch};

use remote::{EventSink, RemoteCapabilities};

/// The program this worker is running.
struct Running {
    session: ExecutionSession,
    pair: PairHandle,
}

struct Worker {
    events: EventSink,
    frames_tx: Sender<Image>,
    frames_rx: Option<Receiver<Image>>,
    running: Option<Running>,
}

impl Worker {
    fn new(events: EventSink) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel();
        Self {
            events,
            frames_tx,
            frames_rx: Some(frames_rx),
            running: None,
        }
    }

    /// Handle one command. Returns false once the worker should exit.
    fn handle(&mut self, cmd: WorkerCommand) -> anyhow::Result<bool> {
        match cmd {
            WorkerCommand::Ping => self.events.send(&WorkerEvent::Pong)?,
            WorkerCommand::Start {
                setup_code,
                loop_code,
                loop_first_line,
                target_cycle_ms,
            } => {
                let source = ProgramSource {
                    setup_code,
                    loop_code,
                    loop_first_line,
                };
                self.start(source, target_cycle_ms)?
            }
            WorkerCommand::SetCycleTime { ms } => match &self.running {
                Some(running) => {
                    if let Err(e) = running.session.set_target_cycle_ms(ms) {
                        tracing::warn!("Ignoring cycle time update: {}", e);
                    }
                }
                None => tracing::debug!("Cycle time update before start"),
            },
            WorkerCommand::SensorFrame { image } => {
                // The receiver only goes away when the executor has ended.
                let _ = self.frames_tx.send(image);
            }
            WorkerCommand::Stop => return Ok(false),
        }
        Ok(true)
    }

    fn start(&mut self, source: ProgramSource, target_cycle_ms: f64) -> anyhow::Result<()> {
        let Some(frames) = self.frames_rx.take() else {
            tracing::warn!("Worker already started; ignoring second program");
            return Ok(());
        };

        let session = ExecutionSession::new(target_cycle_ms)?;
        let caps = RemoteCapabilities::new(self.events.clone(), frames, session.cancel().clone());
        let cadence = self.events.clone();
        let options = PairOptions {
            observer: Some(Box::new(move |realized_cycle_ms: f64| {
                if let Err(e) = cadence.send(&WorkerEvent::Cadence { realized_cycle_ms }) {
                    tracing::debug!("Cadence sample dropped: {}", e);
                }
            })),
            ..PairOptions::default()
        };

        let pair = launch(source, &session, caps, options)?;
        tracing::debug!("Program started (target {} ms)", target_cycle_ms);
        self.running = Some(Running { session, pair });
        Ok(())
    }

    /// Cancel the program, wait for it and report how it ended.
    ///
    /// `hard` also fires the kill switch, for when the host is gone and
    /// nobody will escalate.
    fn finish(self, hard: bool) -> anyhow::Result<()> {
        let Some(Running { session, pair }) = self.running else {
            return Ok(());
        };
        session.cancel().set();
        if hard {
            pair.kill();
        }
        let exit = pair.join();
        match &exit {
            ExecutorExit::Panicked(message) => tracing::error!("Executor panicked: {}", message),
            other => tracing::debug!("Program ended: {:?}", other),
        }
        self.events.send(&WorkerEvent::Stopped { exit })?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let events = EventSink::new(BufWriter::new(io::stdout()));
    let mut stdin = BufReader::new(io::stdin());
    let mut worker = Worker::new(events);

    loop {
        let cmd: WorkerCommand = match read_message(&mut stdin) {
            Ok(cmd) => cmd,
            Err(e) => {
                // Host closed the pipe or died.
                tracing::debug!("Command stream ended: {}", e);
                return worker.finish(true);
            }
        };
        if !worker.handle(cmd)? {
            return worker.finish(false);
        }
    }
}
