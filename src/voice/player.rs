//! Gapless playback of streamed speech
//!
//! [`StreamingPlayer`] reads linear PCM from a byte stream while it is still
//! arriving and schedules each decoded frame on the output clock exactly where
//! the previous one ends. Starting a new session or calling
//! [`StreamingPlayer::stop`] tears down the current one, including audio that
//! is already scheduled, and a torn-down session never reports completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{oneshot, watch};

use tokio::task::JoinHandle;

use crate::voice::{OutputDevice, PcmFormat, PlaybackSession};
use crate::{Error, Result};

/// How a playback session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All scheduled audio was heard
    Finished,
    /// Stopped explicitly or superseded by another session
    Cancelled,
}

struct Inner {
    device: Arc<dyn OutputDevice>,
    format: PcmFormat,
    session: Mutex<Option<PlaybackSession>>,
    next_id: AtomicU64,
    playing: watch::Sender<bool>,
}

/// Streams PCM speech to an output device, one session at a time
#[derive(Clone)]
pub struct StreamingPlayer {
    inner: Arc<Inner>,
}

impl StreamingPlayer {
    /// Create a player for 16-bit mono 24 kHz speech
    #[must_use]
    pub fn new(device: Arc<dyn OutputDevice>) -> Self {
        Self::build(device, PcmFormat::LINEAR16_MONO_24K)
    }

    /// Create a player for 16-bit mono speech at another sample rate
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] for any framing other than 16-bit mono
    pub fn with_format(device: Arc<dyn OutputDevice>, format: PcmFormat) -> Result<Self> {
        if format.channels != 1 || format.bits_per_sample != 16 || format.sample_rate == 0 {
            return Err(Error::Format(format!(
                "unsupported framing: {} channel(s), {}-bit, {} Hz (need 16-bit mono)",
                format.channels, format.bits_per_sample, format.sample_rate
            )));
        }
        Ok(Self::build(device, format))
    }

    fn build(device: Arc<dyn OutputDevice>, format: PcmFormat) -> Self {
        let (playing, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                device,
                format,
                session: Mutex::new(None),
                next_id: AtomicU64::new(1),
                playing,
            }),
        }
    }

    /// Framing expected on the input stream
    #[must_use]
    pub fn format(&self) -> PcmFormat {
        self.inner.format
    }

    /// Whether a session currently owns the output device
    #[must_use]
    pub fn is_playing(&self) -> bool {
        *self.inner.playing.borrow()
    }

    /// Observe the playing state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.playing.subscribe()
    }

    /// Stop the active session, if any
    ///
    /// Scheduled and sounding audio is discarded and the session's completion
    /// callback will not run.
    pub fn stop(&self) {
        let mut slot = self.lock();
        if let Some(session) = slot.take() {
            session.teardown();
        }
        self.inner.playing.send_replace(false);
    }

    /// Play `stream`, invoking `on_finished` once all of it has been heard
    ///
    /// Any previous session is stopped first. Returns when the stream is
    /// exhausted or the session is stopped; `on_finished` runs later, from a
    /// spawned task, and only if the session ends naturally.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if the output device cannot
    /// be opened; the player is left inactive
    pub async fn play<S, F>(&self, stream: S, on_finished: F) -> Result<()>
    where
        S: Stream<Item = Bytes> + Unpin + Send,
        F: FnOnce() + Send + 'static,
    {
        let (id, cancelled) = self.begin()?;
        self.read(id, cancelled, stream, on_finished).await;
        Ok(())
    }

    /// Start a session now and read `stream` on a spawned task
    ///
    /// The session is active when this returns, so a [`Self::stop`] issued
    /// right after cancels it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if the output device cannot
    /// be opened
    pub fn spawn_play<S, F>(&self, stream: S, on_finished: F) -> Result<JoinHandle<()>>
    where
        S: Stream<Item = Bytes> + Unpin + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (id, cancelled) = self.begin()?;
        let player = self.clone();
        Ok(tokio::spawn(async move {
            player.read(id, cancelled, stream, on_finished).await;
        }))
    }

    async fn read<S, F>(
        &self,
        id: u64,
        mut cancelled: oneshot::Receiver<()>,
        mut stream: S,
        on_finished: F,
    ) where
        S: Stream<Item = Bytes> + Unpin + Send,
        F: FnOnce() + Send + 'static,
    {
        let mut bytes_read: usize = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = &mut cancelled => {
                    tracing::debug!(session = id, bytes_read, "read loop cancelled");
                    return;
                }
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };
            bytes_read += chunk.len();

            let mut slot = self.lock();
            match slot.as_mut() {
                Some(session) if session.id() == id => {
                    session.feed(&chunk);
                }
                _ => return,
            }
        }

        let ended = {
            let mut slot = self.lock();
            let Some(session) = slot.as_mut().filter(|s| s.id() == id) else {
                return;
            };
            tracing::debug!(
                session = id,
                bytes_read,
                frames = session.frames_scheduled(),
                "speech stream complete"
            );
            session.finish_input()
        };

        match ended {
            Some(ended) => {
                let player = self.clone();
                tokio::spawn(async move {
                    if ended.await.is_ok() && player.complete(id) {
                        on_finished();
                    }
                });
            }
            None => {
                // Nothing was scheduled, so no frame will ever report its end
                tracing::debug!(session = id, "stream produced no audio");
                if self.complete(id) {
                    on_finished();
                }
            }
        }
    }

    /// Play `stream` and wait until it has been heard or cancelled
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if the output device cannot
    /// be opened
    pub async fn play_to_end<S>(&self, stream: S) -> Result<PlaybackOutcome>
    where
        S: Stream<Item = Bytes> + Unpin + Send,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.play(stream, move || {
            let _ = done_tx.send(());
        })
        .await?;

        Ok(match done_rx.await {
            Ok(()) => PlaybackOutcome::Finished,
            Err(_) => PlaybackOutcome::Cancelled,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<PlaybackSession>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Retire the current session and install a new one under one lock
    fn begin(&self) -> Result<(u64, oneshot::Receiver<()>)> {
        let mut slot = self.lock();

        if let Some(previous) = slot.take() {
            tracing::debug!(session = previous.id(), "superseding active session");
            previous.teardown();
        }

        let clock = match self.inner.device.open(self.inner.format) {
            Ok(clock) if clock.sample_rate() == self.inner.format.sample_rate => clock,
            Ok(clock) => {
                self.inner.playing.send_replace(false);
                tracing::warn!(
                    device_rate = clock.sample_rate(),
                    stream_rate = self.inner.format.sample_rate,
                    "output clock runs at the wrong rate"
                );
                return Err(Error::DeviceUnavailable(format!(
                    "output clock runs at {} Hz, stream is {} Hz",
                    clock.sample_rate(),
                    self.inner.format.sample_rate
                )));
            }
            Err(e) => {
                self.inner.playing.send_replace(false);
                tracing::warn!(error = %e, "failed to open output device");
                return Err(e);
            }
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, cancelled) = PlaybackSession::new(id, self.inner.format, clock);
        tracing::debug!(session = id, start = session.next_start(), "playback session started");

        *slot = Some(session);
        self.inner.playing.send_replace(true);

        Ok((id, cancelled))
    }

    /// Tear down session `id` after its last frame ended
    ///
    /// Returns false if the session was already stopped or replaced.
    fn complete(&self, id: u64) -> bool {
        let mut slot = self.lock();
        if !slot.as_ref().is_some_and(|s| s.id() == id) {
            return false;
        }
        if let Some(session) = slot.take() {
            session.teardown();
        }
        self.inner.playing.send_replace(false);
        tracing::debug!(session = id, "playback finished");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{AudioFrame, FrameHandle, HeadlessOutput, OutputClock};

    fn player() -> (StreamingPlayer, HeadlessOutput) {
        let output = HeadlessOutput::manual();
        (StreamingPlayer::new(Arc::new(output.clone())), output)
    }

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Bytes> + Unpin + Send + use<> {
        let owned: Vec<Bytes> = parts.iter().map(|p| Bytes::copy_from_slice(p)).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn test_stop_without_session_is_noop() {
        let (player, _output) = player();
        player.stop();
        player.stop();
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_play_marks_active_until_finished() {
        let (player, output) = player();
        let mut state = player.subscribe();

        player.play(chunks(&[&[0, 0, 0, 0]]), || {}).await.unwrap();
        assert!(player.is_playing());
        assert!(*state.borrow_and_update());

        let _ = output.advance(2);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(!player.is_playing());
        assert!(!output.is_open());
    }

    #[tokio::test]
    async fn test_device_failure_leaves_player_inactive() {
        let (player, output) = player();
        output.set_available(false);

        let err = player.play(chunks(&[&[0, 0]]), || {}).await.unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
        assert!(!player.is_playing());
    }

    /// Device whose clocks report a fixed rate regardless of the request
    struct FixedRate(HeadlessOutput, u32);

    struct FixedRateClock(Box<dyn OutputClock>, u32);

    impl OutputDevice for FixedRate {
        fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputClock>> {
            Ok(Box::new(FixedRateClock(self.0.open(format)?, self.1)))
        }
    }

    impl OutputClock for FixedRateClock {
        fn sample_rate(&self) -> u32 {
            self.1
        }

        fn current_time(&self) -> u64 {
            self.0.current_time()
        }

        fn schedule(&mut self, frame: AudioFrame, start: u64) -> FrameHandle {
            self.0.schedule(frame, start)
        }

        fn notify_ended(&mut self, frame: FrameHandle) -> oneshot::Receiver<()> {
            self.0.notify_ended(frame)
        }

        fn close(&mut self) {
            self.0.close();
        }
    }

    #[test]
    fn test_with_format_rejects_framings_it_cannot_decode() {
        let device: Arc<dyn OutputDevice> = Arc::new(HeadlessOutput::manual());
        let stereo = PcmFormat {
            channels: 2,
            ..PcmFormat::LINEAR16_MONO_24K
        };
        let eight_bit = PcmFormat {
            bits_per_sample: 8,
            ..PcmFormat::LINEAR16_MONO_24K
        };

        for format in [stereo, eight_bit] {
            let result = StreamingPlayer::with_format(Arc::clone(&device), format);
            assert!(matches!(result, Err(Error::Format(_))), "{format:?}");
        }
    }

    #[test]
    fn test_with_format_accepts_other_mono_rates() {
        let format = PcmFormat {
            sample_rate: 16_000,
            ..PcmFormat::LINEAR16_MONO_24K
        };
        let player = StreamingPlayer::with_format(Arc::new(HeadlessOutput::manual()), format).unwrap();
        assert_eq!(player.format(), format);
    }

    #[tokio::test]
    async fn test_clock_at_wrong_rate_is_refused() {
        let output = HeadlessOutput::manual();
        let player = StreamingPlayer::new(Arc::new(FixedRate(output.clone(), 48_000)));

        let err = player.play(chunks(&[&[0, 0]]), || {}).await.unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
        assert!(!player.is_playing());
        assert!(output.is_closed(0));
    }

    #[tokio::test]
    async fn test_spawn_play_is_active_before_the_task_runs() {
        let (player, output) = player();

        let reader = player
            .spawn_play(chunks(&[&[0, 0, 0, 0]]), || {})
            .unwrap();
        assert!(player.is_playing());

        player.stop();
        reader.await.unwrap();

        assert!(!player.is_playing());
        assert!(output.is_closed(0));
        assert!(output.scheduled_on(0).is_empty());
    }

    #[tokio::test]
    async fn test_empty_stream_completes_immediately() {
        let (player, output) = player();
        let outcome = player.play_to_end(chunks(&[])).await.unwrap();
        assert_eq!(outcome, PlaybackOutcome::Finished);
        assert!(!player.is_playing());
        assert!(output.is_closed(0));
    }
}
