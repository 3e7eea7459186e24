//! Run command implementation for Pacer CLI.
//!
//! Runs a program headlessly: console output goes to stdout, actuator
//! commands and cadence samples are printed as they change.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use pacer_core::{Collaborators, Console, Display, ExecutionSession, ExecutorExit, Image, Isolation, Robot};
use pacer_server::build_runtime;

use crate::colors;

/// Camera frame served to headless programs.
const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// Collaborators printing to the terminal.
#[derive(Default)]
struct Terminal {
    velocity: Mutex<(f64, f64)>,
    frames: AtomicU64,
}

impl Terminal {
    fn update_velocity(&self, update: impl FnOnce(&mut (f64, f64))) {
        let mut velocity = self.velocity.lock().unwrap_or_else(|e| e.into_inner());
        let before = *velocity;
        update(&mut velocity);
        if *velocity != before {
            println!(
                "{}[motors] v = {}, w = {}{}",
                colors::DIM,
                velocity.0,
                velocity.1,
                colors::RESET
            );
        }
    }
}

impl Robot for Terminal {
    fn read_image(&self) -> Image {
        Image::blank(FRAME_WIDTH, FRAME_HEIGHT, 3)
    }

    fn set_linear_velocity(&self, v: f64) {
        self.update_velocity(|velocity| velocity.0 = v);
    }

    fn set_angular_velocity(&self, w: f64) {
        self.update_velocity(|velocity| velocity.1 = w);
    }
}

impl Display for Terminal {
    fn show_image(&self, _image: &Image) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {}
}

impl Console for Terminal {
    fn write(&self, text: &str) {
        println!("{}", text);
    }
}

/// Run a program file until the duration elapses or Ctrl+C.
pub async fn execute(
    file: &Path,
    cycle_ms: f64,
    duration_ms: Option<u64>,
    debug_level: u8,
    isolation: Isolation,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let program = pacer_core::partition::split(&text, debug_level);
    let session = ExecutionSession::new(cycle_ms)?;

    let terminal = Arc::new(Terminal::default());
    let collaborators = Collaborators::new(terminal.clone(), terminal.clone(), terminal.clone());
    let runtime = build_runtime(isolation, collaborators);

    println!(
        "{}Running{} {} {}({} isolation, {} ms cycle){}",
        colors::BOLD,
        colors::RESET,
        file.display(),
        colors::DIM,
        isolation,
        cycle_ms,
        colors::RESET
    );

    let context = runtime.start(&program, &session)?;

    // Report each monitor sample once.
    let reporter_session = session.clone();
    let reporter = tokio::spawn(async move {
        let mut last = 0.0;
        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let realized = reporter_session.realized_cycle_ms();
            if realized != last {
                last = realized;
                println!(
                    "{}[cadence] {} Hz ({:.1} ms/cycle){}",
                    colors::CYAN,
                    pacer_core::frequency_hz(realized),
                    realized,
                    colors::RESET
                );
            }
        }
    });

    match duration_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => tokio::signal::ctrl_c().await?,
    }
    reporter.abort();

    session.cancel().set();
    let exit = tokio::task::spawn_blocking(move || context.terminate(Duration::from_millis(500))).await?;

    let frames = terminal.frames.load(Ordering::Relaxed);
    match exit {
        ExecutorExit::Cancelled => println!(
            "{}Stopped{} ({} frames shown)",
            colors::GREEN,
            colors::RESET,
            frames
        ),
        ExecutorExit::SetupFailed(message) => {
            println!("{}Setup failed:{} {}", colors::RED, colors::RESET, message)
        }
        ExecutorExit::Killed => println!(
            "{}Killed{} (program did not yield within 500 ms)",
            colors::YELLOW,
            colors::RESET
        ),
        ExecutorExit::Panicked(message) => {
            anyhow::bail!("executor panicked: {}", message)
        }
    }
    Ok(())
}
