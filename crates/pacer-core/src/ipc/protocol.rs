//! IPC protocol messages for pacer worker processes.
//!
//! Uses length-prefixed rkyv messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + rkyv-encoded message.
//!
//! The host drives the worker with [`WorkerCommand`]s. The worker answers
//! with [`WorkerEvent`]s: capability calls made by the running program,
//! cadence samples, and a final `Stopped` carrying the executor's exit.

use std::io::{Read, Write};

use rkyv::{Archive, Deserialize, Serialize};

use crate::capability::Image;
use crate::error::{Error, Result};
use crate::execute::ExecutorExit;

/// Largest frame accepted from the other side.
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Command sent from the host to a worker process.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Liveness probe; answered with `Pong`.
    Ping,

    /// Start an executor/monitor pair for one program.
    Start {
        /// Code run once before the loop.
        setup_code: String,
        /// Loop body, already dedented.
        loop_code: String,
        /// Line of the submitted program holding the first loop line.
        loop_first_line: usize,
        /// Initial target cycle time in milliseconds.
        target_cycle_ms: f64,
    },

    /// Update the target cycle time of the running executor.
    SetCycleTime {
        /// New target cycle time in milliseconds.
        ms: f64,
    },

    /// Answer to a `ReadSensor` event.
    SensorFrame {
        /// Latest camera frame.
        image: Image,
    },

    /// Cooperative stop: set the cancel flag and exit once the pair ends.
    Stop,
}

/// Event sent from a worker process to the host.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum WorkerEvent {
    /// Response to `Ping`.
    Pong,

    /// The program requested a sensor frame; the host answers with
    /// `SensorFrame`.
    ReadSensor,

    /// Actuator write: linear velocity.
    SetLinear {
        /// Velocity command.
        v: f64,
    },

    /// Actuator write: angular velocity.
    SetAngular {
        /// Velocity command.
        w: f64,
    },

    /// Visual-output write.
    ShowImage {
        /// Frame produced by the program.
        image: Image,
    },

    /// Console write.
    Console {
        /// Diagnostic or printed text.
        text: String,
    },

    /// A cadence monitor sample (0 = unknown).
    Cadence {
        /// Realized cycle time in milliseconds.
        realized_cycle_ms: f64,
    },

    /// The executor/monitor pair has ended; the worker exits next.
    Stopped {
        /// How the executor ended.
        exit: ExecutorExit,
    },
}

/// Write a message to a writer using length-prefixed rkyv encoding.
pub fn write_message<W: Write>(
    writer: &mut W,
    message: &impl for<'a> Serialize<
        rkyv::rancor::Strategy<
            rkyv::ser::Serializer<
                rkyv::util::AlignedVec,
                rkyv::ser::allocator::ArenaHandle<'a>,
                rkyv::ser::sharing::Share,
            >,
            rkyv::rancor::Error,
        >,
    >,
) -> Result<()> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::Ipc(format!("IPC message too large: {} bytes", bytes.len())))?;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed rkyv encoding.
///
/// # Safety
///
/// Uses unchecked deserialization. Only safe when reading from trusted
/// sources: our own worker processes or the host that spawned us.
pub fn read_message<R: Read, T>(reader: &mut R) -> Result<T>
where
    T: Archive,
    T::Archived: Deserialize<T, rkyv::rancor::Strategy<rkyv::de::Pool, rkyv::rancor::Error>>,
{
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    // rkyv needs an aligned buffer for in-place access.
    let mut bytes = rkyv::util::AlignedVec::<16>::with_capacity(len);
    bytes.resize(len, 0);
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    // SAFETY: the bytes come from our own peer process and were produced by
    // `write_message` for the same type.
    let message = unsafe { rkyv::from_bytes_unchecked::<T, rkyv::rancor::Error>(&bytes) }
        .map_err(|e| Error::Serialization(format!("Failed to decode IPC message: {}", e)))?;

    Ok(message)
}
