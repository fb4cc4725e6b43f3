//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::Stream;
use linguo::StreamingPlayer;
use linguo::voice::HeadlessOutput;

/// A player on a manually advanced headless device
pub fn headless_player() -> (StreamingPlayer, HeadlessOutput) {
    let output = HeadlessOutput::manual();
    (StreamingPlayer::new(Arc::new(output.clone())), output)
}

/// Encode samples as 16-bit little-endian PCM
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// What the player should render for `samples`
pub fn normalized(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

/// A varied test signal
pub fn ramp(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let v = (i64::try_from(i).unwrap() * 997) % 65_536 - 32_768;
            i16::try_from(v).unwrap()
        })
        .collect()
}

/// Split `data` into consecutive chunks of the given sizes, cycling through
/// them until the data runs out
pub fn split_cycling(data: &[u8], sizes: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    for &size in sizes.iter().cycle() {
        if offset >= data.len() {
            break;
        }
        let end = data.len().min(offset + size);
        chunks.push(Bytes::copy_from_slice(&data[offset..end]));
        offset = end;
    }
    chunks
}

/// A finished byte stream made of `chunks`
pub fn stream_of(chunks: Vec<Bytes>) -> impl Stream<Item = Bytes> + Unpin + Send {
    futures::stream::iter(chunks)
}

/// Completion callback that counts its invocations
pub fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

/// Let spawned tasks on the current-thread runtime run
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
