//! Audio playback to speakers

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::runtime::RuntimeFlavor;
use tokio::sync::oneshot;

use super::timeline::Timeline;
use super::{FrameHandle, OutputClock, OutputDevice};
use crate::voice::{AudioFrame, PcmFormat};
use crate::{Error, Result};

/// Plays audio to a cpal output device
///
/// Each [`OutputDevice::open`] builds a fresh output stream on a dedicated
/// thread; the stream lives until the returned clock is closed or dropped.
#[derive(Debug, Clone, Default)]
pub struct SpeakerOutput {
    device_name: Option<String>,
}

impl SpeakerOutput {
    /// Use the default output device
    #[must_use]
    pub const fn new() -> Self {
        Self { device_name: None }
    }

    /// Prefer a named output device, falling back to the default one
    #[must_use]
    pub const fn with_device(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// List available output device names
    ///
    /// # Errors
    ///
    /// Returns error if devices cannot be enumerated
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("failed to enumerate devices: {e}")))?
            .filter_map(|d| d.name().ok())
            .collect();
        Ok(devices)
    }
}

impl OutputDevice for SpeakerOutput {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputClock>> {
        let timeline = Timeline::new();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u16>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let render_timeline = timeline.clone();
        let device_name = self.device_name.clone();

        // cpal streams are not Send, so the stream is built and dropped on
        // its own thread
        let thread = std::thread::Builder::new()
            .name("linguo-output".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), format, render_timeline) {
                    Ok((stream, channels)) => {
                        let _ = ready_tx.send(Ok(channels));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until the clock closes or is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("output stream released");
            })
            .map_err(|e| Error::DeviceUnavailable(format!("failed to spawn output thread: {e}")))?;

        let channels = match blocking(|| ready_rx.recv()) {
            Ok(Ok(channels)) => channels,
            Ok(Err(e)) => {
                let _ = blocking(|| thread.join());
                return Err(e);
            }
            Err(_) => {
                return Err(Error::DeviceUnavailable("output thread exited".to_string()));
            }
        };

        tracing::debug!(
            sample_rate = format.sample_rate,
            channels,
            "output clock opened"
        );

        Ok(Box::new(SpeakerClock {
            timeline,
            sample_rate: format.sample_rate,
            stop: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

/// Run `f`, which waits on the output thread, without stalling other tasks
/// on a multi-threaded runtime
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let found = host
            .output_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("failed to enumerate devices: {e}")))?
            .find(|d| d.name().ok().as_deref() == Some(name));

        if let Some(device) = found {
            return Ok(device);
        }
        tracing::warn!(device = name, "output device not found, falling back to default");
    }

    host.default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))
}

fn build_stream(
    device_name: Option<&str>,
    format: PcmFormat,
    timeline: Timeline,
) -> Result<(Stream, u16)> {
    let device = select_device(device_name)?;
    let rate = SampleRate(format.sample_rate);

    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported_config = supports(1)
        // Fallback: try stereo
        .or_else(|| supports(2))
        .ok_or_else(|| Error::DeviceUnavailable("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config.with_sample_rate(rate).config();
    let channels = config.channels;

    tracing::debug!(
        device = %device.name().unwrap_or_default(),
        sample_rate = format.sample_rate,
        channels,
        "audio playback initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                timeline.render(data, usize::from(channels));
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    Ok((stream, channels))
}

/// Clock backed by a live cpal output stream
struct SpeakerClock {
    timeline: Timeline,
    sample_rate: u32,
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputClock for SpeakerClock {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> u64 {
        self.timeline.position()
    }

    fn schedule(&mut self, frame: AudioFrame, start: u64) -> FrameHandle {
        self.timeline.schedule(frame, start)
    }

    fn notify_ended(&mut self, frame: FrameHandle) -> oneshot::Receiver<()> {
        self.timeline.notify_ended(frame)
    }

    fn close(&mut self) {
        self.timeline.close();

        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if blocking(|| thread.join()).is_err() {
                tracing::warn!("output thread panicked");
            }
        }
    }
}

impl Drop for SpeakerClock {
    fn drop(&mut self) {
        self.close();
    }
}
