//! Cadence monitor: samples the executor's realized loop frequency.

use std::time::{Duration, Instant};

use super::cells::{ExecutionSession, IterationSampler};
use super::context::CadenceObserver;

/// Length of one sampling window.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(2000);

/// Average cycle time over a window; 0 (unknown) when nothing ran.
pub fn realized_cycle_ms(elapsed: Duration, iterations: u64) -> f64 {
    if iterations == 0 {
        return 0.0;
    }
    elapsed.as_secs_f64() * 1000.0 / iterations as f64
}

/// Background sampler publishing the realized cycle time.
pub struct CadenceMonitor {
    session: ExecutionSession,
    sampler: IterationSampler,
    interval: Duration,
    observer: Option<Box<dyn CadenceObserver>>,
}

impl CadenceMonitor {
    pub fn new(session: ExecutionSession, sampler: IterationSampler) -> Self {
        Self {
            session,
            sampler,
            interval: SAMPLE_INTERVAL,
            observer: None,
        }
    }

    /// Override the sampling window.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Also push every sample to `observer`.
    pub fn with_observer(mut self, observer: Box<dyn CadenceObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Close a window of length `elapsed` and publish the result.
    pub fn sample(&mut self, elapsed: Duration) -> f64 {
        let iterations = self.sampler.take();
        let realized = realized_cycle_ms(elapsed, iterations);
        self.session.realized_cycle().set(realized);
        if let Some(observer) = self.observer.as_mut() {
            observer.on_sample(realized);
        }
        tracing::trace!("{} iterations in {:?}: {:.1} ms/cycle", iterations, elapsed, realized);
        realized
    }

    /// Sample every interval until the session is cancelled.
    pub fn run(mut self) {
        let cancel = self.session.cancel().clone();
        let mut previous = Instant::now();
        while !cancel.wait_timeout(self.interval) {
            let now = Instant::now();
            self.sample(now.duration_since(previous));
            previous = now;
        }
    }
}
