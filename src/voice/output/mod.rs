//! Audio output devices and their playback clocks
//!
//! An [`OutputDevice`] hands out one [`OutputClock`] per playback session.
//! Frames are scheduled on the clock at absolute positions measured in sample
//! ticks, and the device renders them autonomously from its own thread.

mod device;
mod headless;
mod timeline;

pub use device::SpeakerOutput;
pub use headless::{HeadlessOutput, Pacing};

use tokio::sync::oneshot;

use crate::Result;
use crate::voice::{AudioFrame, PcmFormat};

/// Handle to a frame committed to an output clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    id: u64,
    start: u64,
    len: u64,
}

impl FrameHandle {
    pub(crate) const fn new(id: u64, start: u64, len: u64) -> Self {
        Self { id, start, len }
    }

    /// Clock-local identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Scheduled start, in ticks
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Length in ticks
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the frame is zero-length
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Scheduled end, in ticks
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// A source of playback clocks
pub trait OutputDevice: Send + Sync {
    /// Acquire the device and start a clock for `format`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if the device cannot be
    /// opened at this format
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputClock>>;
}

/// A running output device with a monotonically increasing clock
///
/// Dropping the clock must release the device.
pub trait OutputClock: Send {
    /// Ticks per second
    fn sample_rate(&self) -> u32;

    /// Current render position, in ticks
    fn current_time(&self) -> u64;

    /// Commit `frame` to start at tick `start`
    fn schedule(&mut self, frame: AudioFrame, start: u64) -> FrameHandle;

    /// Resolve once `frame` has been fully rendered
    ///
    /// The sender is dropped without firing if the clock is closed first.
    fn notify_ended(&mut self, frame: FrameHandle) -> oneshot::Receiver<()>;

    /// Stop all scheduled and sounding audio and release the device
    ///
    /// Safe to call more than once.
    fn close(&mut self);
}
