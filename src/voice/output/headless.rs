//! Output device without audio hardware
//!
//! Renders scheduled frames into memory instead of a sound card. With
//! [`Pacing::Manual`] the caller advances the clock explicitly, which makes
//! playback deterministic for tests; with [`Pacing::Realtime`] a background
//! task advances it at the wall-clock sample rate (`--no-audio`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::timeline::Timeline;
use super::{FrameHandle, OutputClock, OutputDevice};
use crate::voice::{AudioFrame, PcmFormat};
use crate::{Error, Result};

/// Interval between real-time render passes
const REALTIME_TICK: Duration = Duration::from_millis(10);

/// How a headless clock advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Only when [`HeadlessOutput::advance`] is called
    Manual,
    /// Continuously, at the clock's sample rate
    Realtime,
}

#[derive(Clone)]
struct OpenedClock {
    timeline: Timeline,
    scheduled: Arc<Mutex<Vec<FrameHandle>>>,
}

struct Inner {
    pacing: Pacing,
    available: AtomicBool,
    clocks: Mutex<Vec<OpenedClock>>,
}

/// In-memory output device
#[derive(Clone)]
pub struct HeadlessOutput {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HeadlessOutput {
    /// Create a headless device with the given pacing
    #[must_use]
    pub fn new(pacing: Pacing) -> Self {
        Self {
            inner: Arc::new(Inner {
                pacing,
                available: AtomicBool::new(true),
                clocks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Headless device advanced by [`Self::advance`]
    #[must_use]
    pub fn manual() -> Self {
        Self::new(Pacing::Manual)
    }

    /// Headless device advanced in real time
    #[must_use]
    pub fn realtime() -> Self {
        Self::new(Pacing::Realtime)
    }

    /// Make subsequent opens succeed or fail
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of clocks opened so far
    #[must_use]
    pub fn opened(&self) -> usize {
        lock(&self.inner.clocks).len()
    }

    /// Whether the most recently opened clock is still running
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.latest().is_some_and(|c| !c.timeline.is_closed())
    }

    /// Whether the `index`th opened clock has been closed
    #[must_use]
    pub fn is_closed(&self, index: usize) -> bool {
        lock(&self.inner.clocks)
            .get(index)
            .is_none_or(|c| c.timeline.is_closed())
    }

    /// Frames scheduled on the most recently opened clock
    #[must_use]
    pub fn scheduled(&self) -> Vec<FrameHandle> {
        self.latest()
            .map(|c| lock(&c.scheduled).clone())
            .unwrap_or_default()
    }

    /// Frames scheduled on the `index`th opened clock
    #[must_use]
    pub fn scheduled_on(&self, index: usize) -> Vec<FrameHandle> {
        lock(&self.inner.clocks)
            .get(index)
            .map(|c| lock(&c.scheduled).clone())
            .unwrap_or_default()
    }

    /// Render `ticks` samples from the most recently opened clock
    ///
    /// Returns the rendered mono signal; empty if no clock is open.
    #[must_use]
    pub fn advance(&self, ticks: usize) -> Vec<f32> {
        let Some(clock) = self.latest().filter(|c| !c.timeline.is_closed()) else {
            return Vec::new();
        };
        let mut out = vec![0.0; ticks];
        clock.timeline.render(&mut out, 1);
        out
    }

    fn latest(&self) -> Option<OpenedClock> {
        lock(&self.inner.clocks).last().cloned()
    }
}

impl OutputDevice for HeadlessOutput {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputClock>> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable(
                "headless output disabled".to_string(),
            ));
        }

        let opened = OpenedClock {
            timeline: Timeline::new(),
            scheduled: Arc::new(Mutex::new(Vec::new())),
        };

        if self.inner.pacing == Pacing::Realtime {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                Error::DeviceUnavailable("real-time headless output needs a tokio runtime".to_string())
            })?;
            runtime.spawn(pump(opened.timeline.clone(), format.sample_rate));
        }

        lock(&self.inner.clocks).push(opened.clone());
        tracing::debug!(sample_rate = format.sample_rate, pacing = ?self.inner.pacing, "headless clock opened");

        Ok(Box::new(HeadlessClock {
            opened,
            sample_rate: format.sample_rate,
        }))
    }
}

/// Advance `timeline` at `sample_rate` until it is closed
async fn pump(timeline: Timeline, sample_rate: u32) {
    let started = Instant::now();
    let mut rendered: u64 = 0;
    let mut scratch = Vec::new();
    let mut interval = tokio::time::interval(REALTIME_TICK);

    while !timeline.is_closed() {
        interval.tick().await;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let due = (started.elapsed().as_secs_f64() * f64::from(sample_rate)) as u64;
        let Ok(ticks) = usize::try_from(due.saturating_sub(rendered)) else {
            continue;
        };

        scratch.clear();
        scratch.resize(ticks, 0.0);
        timeline.render(&mut scratch, 1);
        rendered = due;
    }
}

struct HeadlessClock {
    opened: OpenedClock,
    sample_rate: u32,
}

impl OutputClock for HeadlessClock {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> u64 {
        self.opened.timeline.position()
    }

    fn schedule(&mut self, frame: AudioFrame, start: u64) -> FrameHandle {
        let handle = self.opened.timeline.schedule(frame, start);
        lock(&self.opened.scheduled).push(handle);
        handle
    }

    fn notify_ended(&mut self, frame: FrameHandle) -> oneshot::Receiver<()> {
        self.opened.timeline.notify_ended(frame)
    }

    fn close(&mut self) {
        self.opened.timeline.close();
    }
}

impl Drop for HeadlessClock {
    fn drop(&mut self) {
        self.close();
    }
}
