//! Core engine for the Pacer control-program host.
//!
//! This crate provides:
//! - Code partitioning of raw submissions into setup and loop phases
//! - An interpreter for the submitted control language
//! - The cyclic executor and its cadence monitor
//! - Execution contexts (worker processes or in-process threads)
//! - The IPC protocol spoken with `pacer-worker`

pub mod capability;
pub mod error;
pub mod execute;
pub mod ipc;
pub mod partition;
pub mod runtime;
pub mod script;

pub use capability::{Capabilities, Collaborators, Console, Display, HostCapabilities, Image, Robot};
pub use error::{Error, Result};
pub use execute::{
    CadenceMonitor, CancelFlag, CycleTime, CyclicExecutor, ExecutionSession, ExecutorExit,
    KillSwitch, PairHandle, PairOptions, Program, ProgramSource, ScriptProgram, frequency_hz, launch,
};
pub use partition::{Directive, PartitionResult, ProgramSubmission, partition};
pub use runtime::{ExecutionContext, Isolation, ProcessRuntime, Runtime, ThreadRuntime};
pub use script::{Interpreter, Script, ScriptError};
