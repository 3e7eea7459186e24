//! Worker process management for isolated program execution.
//!
//! Provides `WorkerHandle` for spawning a `pacer-worker` process and
//! talking to it. Commands can be sent from any thread through a cloned
//! [`CommandSink`]; events are read by whoever took the event stream.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

use super::protocol::{WorkerCommand, WorkerEvent, read_message, write_message};

/// Environment variable overriding the worker binary location.
pub const WORKER_PATH_ENV: &str = "PACER_WORKER_PATH";

fn worker_name() -> &'static str {
    if cfg!(windows) {
        "pacer-worker.exe"
    } else {
        "pacer-worker"
    }
}

/// Clonable writer for the worker's stdin.
#[derive(Clone)]
pub struct CommandSink {
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,
}

impl CommandSink {
    /// Send one command. Fails once the worker's stdin is closed.
    pub fn send(&self, cmd: &WorkerCommand) -> Result<()> {
        let mut stdin = self
            .stdin
            .lock()
            .map_err(|_| Error::Ipc("Worker stdin lock poisoned".to_string()))?;
        write_message(&mut *stdin, cmd)
    }
}

/// Reader for the worker's event stream.
pub struct EventStream {
    stdout: BufReader<ChildStdout>,
}

impl EventStream {
    /// Block until the next event. Fails when the worker exits.
    pub fn recv(&mut self) -> Result<WorkerEvent> {
        read_message(&mut self.stdout)
    }
}

/// Handle to a worker process.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Shared stdin writer.
    commands: CommandSink,
    /// Stdout reader until someone takes it.
    events: Option<EventStream>,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn a new worker process and wait for its handshake.
    ///
    /// Looks for the `pacer-worker` binary in the following order:
    /// 1. `PACER_WORKER_PATH` environment variable
    /// 2. Same directory as the current executable
    /// 3. System PATH
    /// 4. The workspace `target/{debug,release}` directory
    pub fn spawn() -> Result<Self> {
        let worker_path = Self::find_worker_binary()?;

        let mut child = Command::new(&worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // worker logs go to our stderr
            .spawn()
            .map_err(|e| {
                Error::Worker(format!(
                    "Failed to spawn worker process '{}': {}",
                    worker_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        let mut handle = Self {
            child,
            commands: CommandSink {
                stdin: Arc::new(Mutex::new(BufWriter::new(stdin))),
            },
            events: Some(EventStream {
                stdout: BufReader::new(stdout),
            }),
            killed: false,
        };

        handle.commands.send(&WorkerCommand::Ping)?;
        match handle.recv_event()? {
            WorkerEvent::Pong => {
                tracing::debug!("Worker {} ready", handle.pid());
                Ok(handle)
            }
            other => Err(Error::Ipc(format!(
                "Unexpected handshake from worker: {:?}",
                other
            ))),
        }
    }

    /// Find the pacer-worker binary path.
    fn find_worker_binary() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let worker_path = exe_dir.join(worker_name());
            if worker_path.exists() {
                return Ok(worker_path);
            }
            // Test binaries live one level down in target/<profile>/deps.
            if let Some(profile_dir) = exe_dir.parent() {
                let worker_path = profile_dir.join(worker_name());
                if worker_path.exists() {
                    return Ok(worker_path);
                }
            }
        }

        if let Ok(path) = which::which(worker_name()) {
            return Ok(path);
        }

        // Development checkouts: the workspace target directory.
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        for profile in ["debug", "release"] {
            let path = manifest_dir
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(worker_name());
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }

        Err(Error::Worker(format!(
            "Could not find pacer-worker binary. Set {} or ensure it's in PATH.",
            WORKER_PATH_ENV
        )))
    }

    /// Send a command to the worker.
    pub fn send(&self, cmd: &WorkerCommand) -> Result<()> {
        if self.killed {
            return Err(Error::Worker("Worker has been killed".to_string()));
        }
        self.commands.send(cmd)
    }

    /// Writer usable from other threads.
    pub fn commands(&self) -> CommandSink {
        self.commands.clone()
    }

    /// Take the event stream, leaving the handle able only to send.
    pub fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    fn recv_event(&mut self) -> Result<WorkerEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv(),
            None => Err(Error::Ipc("Worker event stream already taken".to_string())),
        }
    }

    /// Wait up to `timeout` for the worker to exit on its own.
    ///
    /// Returns whether it exited.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now().checked_add(timeout);
        loop {
            if !self.is_alive() {
                return true;
            }
            if deadline.is_some_and(|deadline| std::time::Instant::now() >= deadline) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Kill the worker process immediately.
    ///
    /// Works without any cooperation from the program, even in the middle
    /// of a non-yielding statement.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;

        if let Err(e) = self.child.kill() {
            // Already exited is fine.
            if e.kind() != std::io::ErrorKind::InvalidInput
                && !e.to_string().contains("No such process")
            {
                tracing::warn!("Failed to kill worker {}: {}", self.child.id(), e);
            }
        }

        // Reap the zombie.
        self.child.wait()?;
        Ok(())
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::ExecutorExit;

    #[test]
    #[ignore = "Requires pacer-worker binary"]
    fn test_worker_spawn_and_kill() {
        let mut worker = WorkerHandle::spawn().unwrap();
        assert!(worker.is_alive());
        worker.kill().unwrap();
        assert!(!worker.is_alive());
        assert!(worker.send(&WorkerCommand::Ping).is_err());
    }

    #[test]
    #[ignore = "Requires pacer-worker binary"]
    fn test_worker_runs_program_until_stop() {
        let mut worker = WorkerHandle::spawn().unwrap();
        let mut events = worker.take_events().unwrap();

        worker
            .send(&WorkerCommand::Start {
                setup_code: String::new(),
                loop_code: "console.print('tick')\n".into(),
                loop_first_line: 2,
                target_cycle_ms: 10.0,
            })
            .unwrap();
        assert_eq!(events.recv().unwrap(), WorkerEvent::Console { text: "tick".into() });

        worker.send(&WorkerCommand::Stop).unwrap();
        let exit = loop {
            if let WorkerEvent::Stopped { exit } = events.recv().unwrap() {
                break exit;
            }
        };
        assert_eq!(exit, ExecutorExit::Cancelled);
        assert!(worker.wait_timeout(Duration::from_secs(2)));
    }

    #[test]
    #[ignore = "Requires pacer-worker binary"]
    fn test_kill_stops_non_yielding_program() {
        let mut worker = WorkerHandle::spawn().unwrap();
        worker
            .send(&WorkerCommand::Start {
                setup_code: String::new(),
                loop_code: "while True:\n    pass\n".into(),
                loop_first_line: 2,
                target_cycle_ms: 10.0,
            })
            .unwrap();
        worker.send(&WorkerCommand::Stop).unwrap();
        assert!(!worker.wait_timeout(Duration::from_millis(100)));
        worker.kill().unwrap();
        assert!(!worker.is_alive());
    }
}
