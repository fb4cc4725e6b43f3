//! A single playback session
//!
//! The session exclusively owns the output clock, the start time of the next
//! frame and the bytes carried over between chunks. [`StreamingPlayer`] keeps
//! at most one of these alive at a time.
//!
//! [`StreamingPlayer`]: crate::voice::StreamingPlayer

use tokio::sync::oneshot;

use crate::voice::{AudioFrame, FrameHandle, OutputClock, PcmFormat, SampleAssembler};

/// State of one `play()` invocation
pub struct PlaybackSession {
    id: u64,
    format: PcmFormat,
    clock: Box<dyn OutputClock>,
    next_start: u64,
    assembler: SampleAssembler,
    last_frame: Option<FrameHandle>,
    frames: usize,
    cancel: Option<oneshot::Sender<()>>,
}

impl PlaybackSession {
    /// Start a session on an already opened clock
    ///
    /// Returns the session and a receiver that resolves when it is torn down.
    #[must_use]
    pub fn new(
        id: u64,
        format: PcmFormat,
        clock: Box<dyn OutputClock>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (cancel, cancelled) = oneshot::channel();
        let next_start = clock.current_time();

        let session = Self {
            id,
            format,
            clock,
            next_start,
            assembler: SampleAssembler::new(format),
            last_frame: None,
            frames: 0,
            cancel: Some(cancel),
        };

        (session, cancelled)
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Clock tick at which the next frame will start
    #[must_use]
    pub const fn next_start(&self) -> u64 {
        self.next_start
    }

    /// Bytes held over because they did not complete a sample
    #[must_use]
    pub fn carry_len(&self) -> usize {
        self.assembler.carry_len()
    }

    /// Frames scheduled so far
    #[must_use]
    pub const fn frames_scheduled(&self) -> usize {
        self.frames
    }

    /// Most recently scheduled frame
    #[must_use]
    pub const fn last_frame(&self) -> Option<FrameHandle> {
        self.last_frame
    }

    /// Decode `chunk` and schedule it right after the previous frame
    ///
    /// Chunks that complete no sample schedule nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<FrameHandle> {
        let samples = self.assembler.push(chunk);
        if samples.is_empty() {
            return None;
        }

        let frame = AudioFrame::new(samples, self.format.sample_rate);
        let len = frame.len() as u64;
        let handle = self.clock.schedule(frame, self.next_start);

        tracing::trace!(
            session = self.id,
            start = self.next_start,
            samples = len,
            "frame scheduled"
        );

        self.next_start += len;
        self.last_frame = Some(handle);
        self.frames += 1;

        Some(handle)
    }

    /// Mark the end of the input stream
    ///
    /// Drops any trailing partial sample and returns a receiver for the end of
    /// the last scheduled frame, or `None` if nothing was ever scheduled.
    pub fn finish_input(&mut self) -> Option<oneshot::Receiver<()>> {
        let assembler = std::mem::replace(&mut self.assembler, SampleAssembler::new(self.format));
        let dropped = assembler.finish();
        if dropped > 0 {
            tracing::debug!(session = self.id, bytes = dropped, "dropped trailing partial sample");
        }

        let last = self.last_frame?;
        Some(self.clock.notify_ended(last))
    }

    /// Release the output clock and wake the read loop
    pub fn teardown(mut self) {
        self.clock.close();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        tracing::debug!(session = self.id, frames = self.frames, "playback session torn down");
    }
}
