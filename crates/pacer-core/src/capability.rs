//! Capability surface exposed to submitted programs.
//!
//! A running program can only touch the outside world through the four
//! capabilities of [`Capabilities`]: sensor read, actuator write,
//! visual-output write and console write. On the host side those calls are
//! served by the [`Robot`], [`Display`] and [`Console`] collaborators.

use std::fmt;
use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::Result;

/// Row-major image buffer exchanged by sensor reads and visual output.
#[derive(Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per pixel (3 for BGR camera frames).
    pub channels: u8,
    /// Pixel data, `height * width * channels` bytes.
    pub data: Vec<u8>,
}

impl Image {
    /// Create an image from raw pixel data.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Create a zero-filled image.
    pub fn blank(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![0; len])
    }

    /// Shape as `(height, width, channels)`, matching array conventions.
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }

    /// Whether the buffer carries no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Pixel data is elided; a 640x480 frame would flood the logs.
impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// The capability object a program runs against.
///
/// Exactly four capabilities are exposed. Implementations either call the
/// host collaborators directly ([`HostCapabilities`]) or forward the calls
/// over IPC from a worker process.
pub trait Capabilities {
    /// Sensor read: the latest camera frame.
    fn read_image(&mut self) -> Result<Image>;

    /// Actuator write: linear velocity.
    fn set_linear_velocity(&mut self, v: f64) -> Result<()>;

    /// Actuator write: angular velocity.
    fn set_angular_velocity(&mut self, w: f64) -> Result<()>;

    /// Visual-output write.
    fn show_image(&mut self, image: &Image) -> Result<()>;

    /// Console write, used for learner-facing diagnostics.
    fn console_write(&mut self, text: &str);
}

/// Sensor and actuator collaborator (the simulated robot).
pub trait Robot: Send + Sync {
    /// Latest camera frame.
    fn read_image(&self) -> Image;

    /// Set the linear velocity command.
    fn set_linear_velocity(&self, v: f64);

    /// Set the angular velocity command.
    fn set_angular_velocity(&self, w: f64);

    /// Bring the robot to a standstill.
    fn stop(&self) {
        self.set_linear_velocity(0.0);
        self.set_angular_velocity(0.0);
    }
}

/// Visual-output collaborator.
pub trait Display: Send + Sync {
    /// Present a frame produced by the program.
    fn show_image(&self, image: &Image);

    /// Clear any visual state (simulation reset).
    fn reset(&self);
}

/// Console collaborator rendering diagnostics to the learner.
pub trait Console: Send + Sync {
    /// Append a line of text.
    fn write(&self, text: &str);
}

/// Host collaborators shared by every execution context.
#[derive(Clone)]
pub struct Collaborators {
    /// Sensor/actuator surface.
    pub robot: Arc<dyn Robot>,
    /// Visual output surface.
    pub display: Arc<dyn Display>,
    /// Learner console.
    pub console: Arc<dyn Console>,
}

impl Collaborators {
    /// Bundle the three collaborators.
    pub fn new(robot: Arc<dyn Robot>, display: Arc<dyn Display>, console: Arc<dyn Console>) -> Self {
        Self {
            robot,
            display,
            console,
        }
    }

    /// Capability object calling the collaborators in-process.
    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            collaborators: self.clone(),
        }
    }
}

/// [`Capabilities`] served directly by the host collaborators.
pub struct HostCapabilities {
    collaborators: Collaborators,
}

impl Capabilities for HostCapabilities {
    fn read_image(&mut self) -> Result<Image> {
        Ok(self.collaborators.robot.read_image())
    }

    fn set_linear_velocity(&mut self, v: f64) -> Result<()> {
        self.collaborators.robot.set_linear_velocity(v);
        Ok(())
    }

    fn set_angular_velocity(&mut self, w: f64) -> Result<()> {
        self.collaborators.robot.set_angular_velocity(w);
        Ok(())
    }

    fn show_image(&mut self, image: &Image) -> Result<()> {
        self.collaborators.display.show_image(image);
        Ok(())
    }

    fn console_write(&mut self, text: &str) {
        self.collaborators.console.write(text);
    }
}
