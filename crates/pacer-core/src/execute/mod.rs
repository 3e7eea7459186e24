//! Cyclic execution engine.
//!
//! A program runs as an executor/monitor pair of threads over the shared
//! cells of an [`ExecutionSession`]:
//!
//! ```text
//! ExecutionSession (lives as long as the host)
//!     │  target_cycle   cancel   realized_cycle
//!     │
//!     ├── CyclicExecutor ── setup once ─► loop body every target_cycle ms
//!     │        │ IterationRecorder
//!     │        ▼
//!     └── CadenceMonitor ── every 2 s: realized = elapsed / iterations
//! ```
//!
//! The coordinator stops a pair by setting the cancel flag (observed between
//! iterations) and, if the program does not yield, by firing its
//! [`KillSwitch`] or killing the worker process that hosts it.

mod cells;
mod context;
mod executor;
mod monitor;
mod pair;
mod program;

pub use cells::{
    CancelFlag, CycleTime, ExecutionSession, IterationRecorder, IterationSampler, MAX_CYCLE_MS,
    cycle_duration, cycle_ms_from_hz, frequency_hz, iteration_counter, validate_cycle_ms,
};
pub use context::{CadenceObserver, KillSwitch};
pub use executor::{CyclicExecutor, ExecutorExit, pacing_delay};
pub use monitor::{CadenceMonitor, SAMPLE_INTERVAL, realized_cycle_ms};
pub use pair::{PairHandle, PairOptions, launch};
pub use program::{Program, ProgramSource, ScriptProgram};
