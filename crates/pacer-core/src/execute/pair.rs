//! Launching an executor and its monitor as a thread pair.

use std::any::Any;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capability::Capabilities;
use crate::error::Result;

use super::cells::{ExecutionSession, iteration_counter};
use super::context::{CadenceObserver, KillSwitch};
use super::executor::{CyclicExecutor, ExecutorExit};
use super::monitor::CadenceMonitor;
use super::program::{ProgramSource, ScriptProgram};

/// Stack for the executor thread; the tree-walking interpreter recurses.
const EXECUTOR_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Options for [`launch`].
pub struct PairOptions {
    /// Monitor sampling window.
    pub sample_interval: Duration,
    /// Receives every monitor sample.
    pub observer: Option<Box<dyn CadenceObserver>>,
}

impl Default for PairOptions {
    fn default() -> Self {
        Self {
            sample_interval: super::monitor::SAMPLE_INTERVAL,
            observer: None,
        }
    }
}

/// Handle to a running executor/monitor pair.
pub struct PairHandle {
    executor: JoinHandle<ExecutorExit>,
    monitor: JoinHandle<()>,
    kill: KillSwitch,
}

/// Start an executor and a monitor for one program.
///
/// The program is compiled on the executor thread; compile errors are
/// reported to the console like setup errors. Both threads run until the
/// session's cancel flag is set (or the kill switch fires).
pub fn launch<C>(
    source: ProgramSource,
    session: &ExecutionSession,
    caps: C,
    options: PairOptions,
) -> Result<PairHandle>
where
    C: Capabilities + Send + 'static,
{
    let kill = KillSwitch::new();
    let (recorder, sampler) = iteration_counter();

    let executor_session = session.clone();
    let executor_kill = kill.clone();
    let executor = thread::Builder::new()
        .name("pacer-executor".into())
        .stack_size(EXECUTOR_STACK_SIZE)
        .spawn(move || {
            let mut caps = caps;
            match ScriptProgram::compile(&source, executor_kill) {
                Ok(program) => CyclicExecutor::new(program, executor_session, recorder).run(&mut caps),
                Err(err) => {
                    let message = err.to_string();
                    tracing::info!("Program failed to compile: {}", message);
                    caps.console_write(&message);
                    ExecutorExit::SetupFailed(message)
                }
            }
        })?;

    let mut monitor = CadenceMonitor::new(session.clone(), sampler).with_interval(options.sample_interval);
    if let Some(observer) = options.observer {
        monitor = monitor.with_observer(observer);
    }
    let monitor = thread::Builder::new()
        .name("pacer-monitor".into())
        .spawn(move || monitor.run());

    let monitor = match monitor {
        Ok(monitor) => monitor,
        Err(err) => {
            // Without a monitor the pair is unusable; stop the executor.
            kill.kill();
            return Err(err.into());
        }
    };

    Ok(PairHandle {
        executor,
        monitor,
        kill,
    })
}

impl PairHandle {
    /// Switch checked by the interpreter before every statement.
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill
    }

    /// Whether the executor thread has returned.
    pub fn executor_finished(&self) -> bool {
        self.executor.is_finished()
    }

    /// Whether both threads have returned.
    pub fn is_finished(&self) -> bool {
        self.executor.is_finished() && self.monitor.is_finished()
    }

    /// Force the program to stop at its next statement.
    pub fn kill(&self) {
        self.kill.kill();
    }

    /// Wait for both threads. The session's cancel flag must be set (or
    /// the kill switch fired), otherwise this blocks indefinitely.
    pub fn join(self) -> ExecutorExit {
        let exit = match self.executor.join() {
            Ok(exit) => exit,
            Err(payload) => ExecutorExit::Panicked(panic_message(payload.as_ref())),
        };
        if self.monitor.join().is_err() {
            tracing::warn!("Cadence monitor thread panicked");
        }
        exit
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "executor panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Image;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<String>>>);

    impl Capabilities for Shared {
        fn read_image(&mut self) -> Result<Image> {
            Ok(Image::blank(1, 1, 1))
        }

        fn set_linear_velocity(&mut self, _v: f64) -> Result<()> {
            Ok(())
        }

        fn set_angular_velocity(&mut self, _w: f64) -> Result<()> {
            Ok(())
        }

        fn show_image(&mut self, _image: &Image) -> Result<()> {
            Ok(())
        }

        fn console_write(&mut self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[test]
    fn test_pair_runs_and_cancels() {
        let session = ExecutionSession::new(5.0).unwrap();
        let console = Shared::default();
        let pair = launch(
            ProgramSource::new("n = 0\n", "n += 1\nprint(n)\n"),
            &session,
            console.clone(),
            PairOptions::default(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(60));
        session.cancel().set();
        assert_eq!(pair.join(), ExecutorExit::Cancelled);

        let lines = console.0.lock().unwrap();
        assert!(lines.len() >= 2);
        assert_eq!(lines[0], "1");
        assert_eq!(lines[1], "2");
    }

    #[test]
    fn test_kill_interrupts_busy_loop() {
        let session = ExecutionSession::new(5.0).unwrap();
        let pair = launch(
            ProgramSource::new("", "while True:\n    pass\n"),
            &session,
            Shared::default(),
            PairOptions::default(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        session.cancel().set();
        pair.kill();
        assert_eq!(pair.join(), ExecutorExit::Killed);
    }

    #[test]
    fn test_compile_error_is_setup_failure() {
        let session = ExecutionSession::new(5.0).unwrap();
        let console = Shared::default();
        let pair = launch(
            ProgramSource::new("x = (\n", ""),
            &session,
            console.clone(),
            PairOptions::default(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(pair.executor_finished());
        session.cancel().set();
        assert!(matches!(pair.join(), ExecutorExit::SetupFailed(_)));
        assert_eq!(console.0.lock().unwrap().len(), 1);
    }
}
