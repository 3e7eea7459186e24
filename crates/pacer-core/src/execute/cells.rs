//! Shared session cells.
//!
//! An [`ExecutionSession`] is created once per host and outlives every
//! executor/monitor pair it hosts. Its cells are plain scalars behind
//! mutexes; a poisoned lock is recovered rather than propagated since no
//! invariant spans more than one store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cooperative stop request shared by the coordinator, executor and monitor.
///
/// Waiters block on a condition variable so a set flag wakes sleeping
/// executors and monitors immediately.
#[derive(Clone, Default, Debug)]
pub struct CancelFlag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake every waiter.
    pub fn set(&self) {
        let (flag, changed) = &*self.inner;
        *lock(flag) = true;
        changed.notify_all();
    }

    /// Lower the flag after the stopped pair has been reaped.
    pub fn clear(&self) {
        let (flag, _) = &*self.inner;
        *lock(flag) = false;
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Sleep for `timeout` or until the flag is set.
    ///
    /// Returns `true` if the flag is set when the wait ends.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, changed) = &*self.inner;
        // A deadline past the end of the clock means waiting for the flag.
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = lock(flag);
        while !*guard {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                break;
            }
            guard = match changed.wait_timeout(guard, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *guard
    }
}

/// A shared cycle time in milliseconds.
#[derive(Clone, Debug)]
pub struct CycleTime {
    value: Arc<Mutex<f64>>,
}

impl CycleTime {
    pub fn new(ms: f64) -> Self {
        Self {
            value: Arc::new(Mutex::new(ms)),
        }
    }

    pub fn get(&self) -> f64 {
        *lock(&self.value)
    }

    pub fn set(&self, ms: f64) {
        *lock(&self.value) = ms;
    }
}

/// Longest accepted cycle time: one hour.
pub const MAX_CYCLE_MS: f64 = 3_600_000.0;

/// Reject cycle times that are not strictly positive or exceed
/// [`MAX_CYCLE_MS`].
pub fn validate_cycle_ms(ms: f64) -> Result<f64> {
    if ms.is_finite() && ms > 0.0 && ms <= MAX_CYCLE_MS {
        Ok(ms)
    } else {
        Err(Error::InvalidCadence(format!(
            "cycle time must be between 0 and {MAX_CYCLE_MS} milliseconds, got {ms}"
        )))
    }
}

/// A millisecond count as a [`Duration`], saturating: non-positive or NaN
/// gives zero, anything too large for a `Duration` gives [`Duration::MAX`].
pub fn cycle_duration(ms: f64) -> Duration {
    if ms.is_nan() || ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
}

/// Convert a frequency in Hz into a cycle time in milliseconds.
pub fn cycle_ms_from_hz(hz: f64) -> Result<f64> {
    if !(hz.is_finite() && hz > 0.0) {
        return Err(Error::InvalidCadence(format!(
            "frequency must be a positive number of Hz, got {hz}"
        )));
    }
    validate_cycle_ms(1000.0 / hz)
}

/// Frequency for a cycle time, rounded to one decimal; 0 when unknown.
pub fn frequency_hz(cycle_ms: f64) -> f64 {
    if !(cycle_ms.is_finite() && cycle_ms > 0.0) {
        return 0.0;
    }
    let hz = 1000.0 / cycle_ms;
    if !hz.is_finite() {
        return 0.0;
    }
    (hz * 10.0).round() / 10.0
}

/// State shared by every executor/monitor pair of one host session.
#[derive(Clone, Debug)]
pub struct ExecutionSession {
    target_cycle: CycleTime,
    cancel: CancelFlag,
    realized_cycle: CycleTime,
}

impl ExecutionSession {
    /// Create a session with the given target cycle time.
    pub fn new(target_cycle_ms: f64) -> Result<Self> {
        Ok(Self {
            target_cycle: CycleTime::new(validate_cycle_ms(target_cycle_ms)?),
            cancel: CancelFlag::new(),
            realized_cycle: CycleTime::new(0.0),
        })
    }

    pub fn target_cycle_ms(&self) -> f64 {
        self.target_cycle.get()
    }

    /// Update the target cycle time; invalid values leave it unchanged.
    pub fn set_target_cycle_ms(&self, ms: f64) -> Result<()> {
        self.target_cycle.set(validate_cycle_ms(ms)?);
        Ok(())
    }

    /// Realized cycle time from the latest monitor window, 0 when unknown.
    pub fn realized_cycle_ms(&self) -> f64 {
        self.realized_cycle.get()
    }

    pub fn target_cycle(&self) -> &CycleTime {
        &self.target_cycle
    }

    pub fn realized_cycle(&self) -> &CycleTime {
        &self.realized_cycle
    }

    pub fn cancel(&self) -> &CancelFlag {
        &self.cancel
    }
}

/// Create the two halves of an iteration counter.
///
/// One pair is minted per executor/monitor pair: the executor gets the
/// recorder and the monitor the sampler.
pub fn iteration_counter() -> (IterationRecorder, IterationSampler) {
    let count = Arc::new(AtomicU64::new(0));
    (
        IterationRecorder {
            count: Arc::clone(&count),
        },
        IterationSampler { count },
    )
}

/// Write side of the iteration counter.
#[derive(Debug)]
pub struct IterationRecorder {
    count: Arc<AtomicU64>,
}

impl IterationRecorder {
    /// Count one completed loop iteration.
    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Forget iterations of the current window.
    pub fn clear(&self) {
        self.count.store(0, Ordering::Release);
    }
}

/// Read-and-reset side of the iteration counter.
#[derive(Debug)]
pub struct IterationSampler {
    count: Arc<AtomicU64>,
}

impl IterationSampler {
    /// Return the window's count and start a new window.
    pub fn take(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }
}
