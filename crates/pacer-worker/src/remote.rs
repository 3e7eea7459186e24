//! Capabilities forwarded to the host over the IPC channel.

use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pacer_core::ipc::{WorkerEvent, write_message};
use pacer_core::{Capabilities, CancelFlag, Error, Image, Result};

/// How often a pending sensor read re-checks the cancel flag.
const FRAME_POLL: Duration = Duration::from_millis(10);

/// Shared writer for worker events.
///
/// The executor, the monitor and the command loop all emit events; each
/// frame is written under the lock so frames never interleave.
#[derive(Clone)]
pub struct EventSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EventSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn send(&self, event: &WorkerEvent) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| Error::Ipc("event writer lock poisoned".to_string()))?;
        write_message(&mut *out, event)
    }
}

/// [`Capabilities`] implemented by round trips to the host.
pub struct RemoteCapabilities {
    events: EventSink,
    frames: Receiver<Image>,
    cancel: CancelFlag,
}

impl RemoteCapabilities {
    pub fn new(events: EventSink, frames: Receiver<Image>, cancel: CancelFlag) -> Self {
        Self {
            events,
            frames,
            cancel,
        }
    }
}

impl Capabilities for RemoteCapabilities {
    fn read_image(&mut self) -> Result<Image> {
        // Frames left over from an aborted read are stale.
        while self.frames.try_recv().is_ok() {}

        self.events.send(&WorkerEvent::ReadSensor)?;
        loop {
            match self.frames.recv_timeout(FRAME_POLL) {
                Ok(image) => return Ok(image),
                Err(RecvTimeoutError::Timeout) if self.cancel.is_set() => return Err(Error::Aborted),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Capability("host stopped serving sensor frames".to_string()));
                }
            }
        }
    }

    fn set_linear_velocity(&mut self, v: f64) -> Result<()> {
        self.events.send(&WorkerEvent::SetLinear { v })
    }

    fn set_angular_velocity(&mut self, w: f64) -> Result<()> {
        self.events.send(&WorkerEvent::SetAngular { w })
    }

    fn show_image(&mut self, image: &Image) -> Result<()> {
        self.events.send(&WorkerEvent::ShowImage {
            image: image.clone(),
        })
    }

    fn console_write(&mut self, text: &str) {
        if let Err(e) = self.events.send(&WorkerEvent::Console {
            text: text.to_string(),
        }) {
            tracing::debug!("Console line dropped: {}", e);
        }
    }
}
