//! Hard-stop signalling for running programs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle for forcibly stopping a running program.
///
/// Unlike the session's cancel flag, which a program only observes between
/// iterations, the interpreter checks the kill switch before every
/// statement and while sleeping. Clones share one flag.
///
/// # Example
///
/// ```
/// use pacer_core::KillSwitch;
///
/// let switch = KillSwitch::new();
/// let remote = switch.clone();
///
/// assert!(!switch.is_killed());
/// remote.kill();
/// assert!(switch.is_killed());
/// ```
#[derive(Clone, Default, Debug)]
pub struct KillSwitch {
    killed: Arc<AtomicBool>,
}

impl KillSwitch {
    /// Create an unarmed switch.
    pub fn new() -> Self {
        Self {
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a hard stop has been requested.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Request a hard stop.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// Re-arm the switch.
    pub fn reset(&self) {
        self.killed.store(false, Ordering::Release);
    }
}

/// Receives realized cycle-time samples from a cadence monitor.
pub trait CadenceObserver: Send {
    /// Called after every sampling window with the new value (0 = unknown).
    fn on_sample(&mut self, realized_cycle_ms: f64);
}

impl<F> CadenceObserver for F
where
    F: FnMut(f64) + Send,
{
    fn on_sample(&mut self, realized_cycle_ms: f64) {
        self(realized_cycle_ms)
    }
}
