//! Sample-accurate frame timeline shared between a clock and its renderer

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::FrameHandle;
use crate::voice::AudioFrame;

struct Scheduled {
    handle: FrameHandle,
    /// Tick at which the frame actually sounds
    play_at: u64,
    samples: Vec<f32>,
    cursor: usize,
    ended: Option<oneshot::Sender<()>>,
}

impl Scheduled {
    fn is_done(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    fn end(&mut self) {
        if let Some(ended) = self.ended.take() {
            let _ = ended.send(());
        }
    }
}

#[derive(Default)]
struct State {
    position: u64,
    /// Delay accumulated by frames that arrived after their start
    shift: u64,
    next_id: u64,
    frames: VecDeque<Scheduled>,
    closed: bool,
}

/// Frames waiting to be rendered, ordered by the tick they sound at
///
/// The renderer (device callback or headless pump) calls [`Timeline::render`];
/// the owning clock schedules frames and closes the timeline.
///
/// A frame whose start has already been rendered sounds at the current
/// position instead, and every later frame is delayed by the same amount, so
/// frames scheduled back to back keep sounding back to back.
#[derive(Clone, Default)]
pub struct Timeline {
    state: Arc<Mutex<State>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn position(&self) -> u64 {
        self.lock().position
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn schedule(&self, frame: AudioFrame, start: u64) -> FrameHandle {
        let mut state = self.lock();
        let handle = FrameHandle::new(state.next_id, start, frame.len() as u64);
        state.next_id += 1;

        if state.closed || frame.is_empty() {
            return handle;
        }

        let mut play_at = start + state.shift;
        if play_at < state.position {
            let late = state.position - play_at;
            tracing::trace!(start, late, "frame arrived late");
            state.shift += late;
            play_at = state.position;
        }

        let entry = Scheduled {
            handle,
            play_at,
            samples: frame.into_samples(),
            cursor: 0,
            ended: None,
        };
        let index = state
            .frames
            .iter()
            .position(|f| f.play_at > play_at)
            .unwrap_or(state.frames.len());
        state.frames.insert(index, entry);

        handle
    }

    pub fn notify_ended(&self, handle: FrameHandle) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();

        if state.closed {
            return rx;
        }

        match state.frames.iter_mut().find(|f| f.handle.id == handle.id) {
            Some(frame) => frame.ended = Some(tx),
            // Already rendered
            None => {
                let _ = tx.send(());
            }
        }

        rx
    }

    /// Mix scheduled frames into `out` (interleaved, `channels` wide) and
    /// advance the position by one tick per output frame
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut state = self.lock();

        if state.closed {
            out.fill(0.0);
            return;
        }

        for slot in out.chunks_mut(channels) {
            let position = state.position;
            let mut mixed = 0.0f32;

            for frame in &mut state.frames {
                if frame.play_at > position {
                    break;
                }
                if let Some(sample) = frame.samples.get(frame.cursor) {
                    mixed += *sample;
                    frame.cursor += 1;
                }
            }

            slot.fill(mixed.clamp(-1.0, 1.0));
            state.position += 1;

            while state.frames.front().is_some_and(Scheduled::is_done) {
                if let Some(mut frame) = state.frames.pop_front() {
                    frame.end();
                }
            }
        }

        // Overlapping frames can finish behind a frame that is still sounding
        state.frames.retain_mut(|f| {
            if f.is_done() {
                f.end();
                return false;
            }
            true
        });
    }

    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        // Dropping the senders cancels every pending notification
        state.frames.clear();
    }
}
