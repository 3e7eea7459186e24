//! Simulation collaborators for the shipped server.
//!
//! [`LocalSimulation`] stands in for the physics simulator, camera and
//! browser-side displays: it keeps the last velocity commands, serves a
//! synthetic camera frame, holds the most recent frame to present and logs
//! console output. [`spawn_renderer`] presents that frame at the renderer
//! cadence and measures the realized renderer cycle.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use pacer_core::execute::{CycleTime, SAMPLE_INTERVAL, cycle_duration, realized_cycle_ms, validate_cycle_ms};
use pacer_core::{Console, Display, Image, Robot};

/// Camera resolution of the simulated robot.
pub const CAMERA_WIDTH: u32 = 640;
pub const CAMERA_HEIGHT: u32 = 480;

/// Longest single renderer sleep; a retuned target applies within one slice.
const RETUNE_SLICE: Duration = Duration::from_millis(100);

/// Physics simulation controls reached by directives.
pub trait SimulationControl: Send + Sync {
    /// Unpause physics.
    fn resume(&self);

    /// Pause physics.
    fn pause(&self);

    /// Reset the world to its initial state.
    fn reset(&self);
}

/// Target and realized cycle of the renderer ("gui" in telemetry).
#[derive(Clone, Debug)]
pub struct RendererCadence {
    target: CycleTime,
    realized: CycleTime,
}

impl RendererCadence {
    pub fn new(target_cycle_ms: f64) -> pacer_core::Result<Self> {
        Ok(Self {
            target: CycleTime::new(validate_cycle_ms(target_cycle_ms)?),
            realized: CycleTime::new(0.0),
        })
    }

    pub fn target_cycle_ms(&self) -> f64 {
        self.target.get()
    }

    /// Set the target; non-positive or non-finite values are rejected.
    pub fn set_target_cycle_ms(&self, ms: f64) -> pacer_core::Result<()> {
        self.target.set(validate_cycle_ms(ms)?);
        Ok(())
    }

    /// Last measured renderer cycle (0 = unknown).
    pub fn realized_cycle_ms(&self) -> f64 {
        self.realized.get()
    }

    pub fn set_realized_cycle_ms(&self, ms: f64) {
        self.realized.set(ms);
    }
}

/// In-process stand-in for the simulator and its displays.
pub struct LocalSimulation {
    velocity: Mutex<(f64, f64)>,
    pending_frame: Mutex<Option<Image>>,
    frames_presented: AtomicU64,
    paused: AtomicBool,
    resets: AtomicU64,
}

impl Default for LocalSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSimulation {
    pub fn new() -> Self {
        Self {
            velocity: Mutex::new((0.0, 0.0)),
            pending_frame: Mutex::new(None),
            frames_presented: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            resets: AtomicU64::new(0),
        }
    }

    /// Last `(linear, angular)` velocity command.
    pub fn velocity(&self) -> (f64, f64) {
        *self.velocity.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Number of world resets so far.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    /// Frames presented by the renderer so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::SeqCst)
    }

    /// Take the frame waiting to be presented, counting it.
    pub fn present(&self) -> Option<Image> {
        let frame = self.pending_frame.lock().unwrap_or_else(|e| e.into_inner()).take();
        if frame.is_some() {
            self.frames_presented.fetch_add(1, Ordering::SeqCst);
        }
        frame
    }

    fn set_velocity(&self, update: impl FnOnce(&mut (f64, f64))) {
        let mut velocity = self.velocity.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut velocity);
    }
}

impl Robot for LocalSimulation {
    fn read_image(&self) -> Image {
        Image::blank(CAMERA_WIDTH, CAMERA_HEIGHT, 3)
    }

    fn set_linear_velocity(&self, v: f64) {
        self.set_velocity(|velocity| velocity.0 = v);
    }

    fn set_angular_velocity(&self, w: f64) {
        self.set_velocity(|velocity| velocity.1 = w);
    }
}

impl Display for LocalSimulation {
    fn show_image(&self, image: &Image) {
        *self.pending_frame.lock().unwrap_or_else(|e| e.into_inner()) = Some(image.clone());
    }

    fn reset(&self) {
        self.pending_frame.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Console for LocalSimulation {
    fn write(&self, text: &str) {
        tracing::info!(target: "pacer::console", "{}", text);
    }
}

impl SimulationControl for LocalSimulation {
    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("Simulation resumed");
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("Simulation paused");
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.set_velocity(|velocity| *velocity = (0.0, 0.0));
        tracing::info!("Simulation world reset");
    }
}

/// Present frames at the renderer cadence and publish its realized cycle.
///
/// The task ends when the runtime shuts down.
pub fn spawn_renderer(
    simulation: std::sync::Arc<LocalSimulation>,
    cadence: RendererCadence,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut window_start = Instant::now();
        let mut ticks = 0u64;
        loop {
            let started = Instant::now();
            if let Some(frame) = simulation.present() {
                tracing::trace!("Presented {:?}", frame);
            }
            ticks += 1;

            let window = window_start.elapsed();
            if window >= SAMPLE_INTERVAL {
                cadence.set_realized_cycle_ms(realized_cycle_ms(window, ticks));
                window_start = Instant::now();
                ticks = 0;
            }

            loop {
                let target = cycle_duration(cadence.target_cycle_ms());
                let remaining = target.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining.min(RETUNE_SLICE)).await;
            }
        }
    })
}
