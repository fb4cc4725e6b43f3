//! Streaming player integration tests
//!
//! Runs the player against a manually clocked headless device, so no audio
//! hardware is required.

use std::sync::atomic::Ordering;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_test::{assert_pending, assert_ready_ok};

use linguo::voice::{PcmFormat, SpeechStream};
use linguo::{Error, PlaybackOutcome};

mod common;

use common::{
    counter, headless_player, normalized, pcm_bytes, ramp, settle, split_cycling, stream_of,
};

#[tokio::test]
async fn test_chunk_boundaries_do_not_change_the_signal() {
    let samples = ramp(1_200);
    let data = pcm_bytes(&samples);
    let expected = normalized(&samples);

    let partitions: [&[usize]; 5] = [&[data.len()], &[1], &[3, 5, 7], &[2], &[1_001, 2, 3]];

    for sizes in partitions {
        let (player, output) = headless_player();
        player
            .play(stream_of(split_cycling(&data, sizes)), || {})
            .await
            .unwrap();

        let rendered = output.advance(samples.len());
        assert_eq!(rendered, expected, "partition {sizes:?}");
    }
}

#[tokio::test]
async fn test_frames_are_scheduled_back_to_back() {
    let (player, output) = headless_player();
    let data = pcm_bytes(&ramp(500));

    player
        .play(stream_of(split_cycling(&data, &[17, 4, 255, 1])), || {})
        .await
        .unwrap();

    let frames = output.scheduled();
    assert!(!frames.is_empty());
    assert_eq!(frames[0].start(), 0);
    for pair in frames.windows(2) {
        assert_eq!(pair[1].start(), pair[0].end());
    }
    assert_eq!(frames.iter().map(|f| f.len()).sum::<u64>(), 500);
}

#[tokio::test]
async fn test_sample_split_across_chunks_is_reassembled() {
    let (player, output) = headless_player();

    player
        .play(
            stream_of(vec![
                Bytes::from_static(&[0x00, 0x01, 0x02]),
                Bytes::from_static(&[0x03, 0x04, 0x05]),
            ]),
            || {},
        )
        .await
        .unwrap();

    let frames = output.scheduled();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].len(), 1);
    assert_eq!(frames[1].len(), 2);

    let rendered = output.advance(3);
    assert_eq!(rendered, normalized(&[0x0100, 0x0302, 0x0504]));
}

#[tokio::test]
async fn test_single_byte_stream_schedules_nothing_and_finishes() {
    let (player, output) = headless_player();

    let outcome = player
        .play_to_end(stream_of(vec![Bytes::from_static(&[0x7f])]))
        .await
        .unwrap();

    assert_eq!(outcome, PlaybackOutcome::Finished);
    assert!(output.scheduled_on(0).is_empty());
    assert!(output.is_closed(0));
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_completion_fires_once_after_last_frame() {
    let (player, output) = headless_player();
    let (count, on_finished) = counter();

    player
        .play(stream_of(split_cycling(&pcm_bytes(&ramp(300)), &[101])), on_finished)
        .await
        .unwrap();

    let _ = output.advance(299);
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(player.is_playing());

    let _ = output.advance(1);
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!player.is_playing());
    assert!(output.is_closed(0));

    player.stop();
    let _ = output.advance(100);
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_play_to_end_waits_for_the_clock() {
    let (player, output) = headless_player();
    let data = pcm_bytes(&ramp(48));

    let mut playing = tokio_test::task::spawn(player.play_to_end(stream_of(vec![Bytes::from(data)])));
    assert_pending!(playing.poll());
    assert!(player.is_playing());

    let _ = output.advance(48);
    settle().await;

    assert!(playing.is_woken());
    let outcome = assert_ready_ok!(playing.poll());
    assert_eq!(outcome, PlaybackOutcome::Finished);
}

#[tokio::test]
async fn test_new_session_replaces_the_old_one() {
    let (player, output) = headless_player();
    let (first_count, first_done) = counter();
    let (second_count, second_done) = counter();

    player
        .play(stream_of(vec![Bytes::from(pcm_bytes(&ramp(100)))]), first_done)
        .await
        .unwrap();
    assert_eq!(output.opened(), 1);

    player
        .play(stream_of(vec![Bytes::from(pcm_bytes(&ramp(10)))]), second_done)
        .await
        .unwrap();

    assert_eq!(output.opened(), 2);
    assert!(output.is_closed(0));
    assert!(player.is_playing());

    let _ = output.advance(200);
    settle().await;

    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_replacing_a_session_that_is_still_reading() {
    let (player, output) = headless_player();
    let (tx, rx) = mpsc::channel::<Bytes>(4);
    let (first_count, first_done) = counter();
    let (second_count, second_done) = counter();

    let reader = tokio::spawn({
        let player = player.clone();
        async move { player.play(ReceiverStream::new(rx), first_done).await }
    });

    tx.send(Bytes::from(pcm_bytes(&ramp(20)))).await.unwrap();
    settle().await;
    assert_eq!(output.scheduled_on(0).len(), 1);

    player
        .play(stream_of(vec![Bytes::from(pcm_bytes(&ramp(6)))]), second_done)
        .await
        .unwrap();
    reader.await.unwrap().unwrap();

    assert_eq!(output.opened(), 2);
    assert!(output.is_closed(0));

    let _ = tx.send(Bytes::from(pcm_bytes(&ramp(20)))).await;
    settle().await;
    assert_eq!(output.scheduled_on(0).len(), 1);
    assert_eq!(output.scheduled_on(1).len(), 1);

    let _ = output.advance(6);
    settle().await;
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_cancels_an_open_stream() {
    let (player, output) = headless_player();
    let (tx, rx) = mpsc::channel::<Bytes>(4);
    let (count, on_finished) = counter();

    let reader = tokio::spawn({
        let player = player.clone();
        async move { player.play(ReceiverStream::new(rx), on_finished).await }
    });

    tx.send(Bytes::from(pcm_bytes(&ramp(20)))).await.unwrap();
    settle().await;
    assert_eq!(output.scheduled().len(), 1);
    assert!(player.is_playing());

    player.stop();
    reader.await.unwrap().unwrap();

    assert!(!player.is_playing());
    assert!(output.is_closed(0));

    // The read loop is gone, so later bytes go nowhere
    let _ = tx.send(Bytes::from(pcm_bytes(&ramp(20)))).await;
    settle().await;
    assert_eq!(output.scheduled_on(0).len(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_late_chunk_plays_immediately_and_in_full() {
    let (player, output) = headless_player();
    let (tx, rx) = mpsc::channel::<Bytes>(4);

    let reader = tokio::spawn({
        let player = player.clone();
        async move { player.play(ReceiverStream::new(rx), || {}).await }
    });

    let first = ramp(10);
    tx.send(Bytes::from(pcm_bytes(&first))).await.unwrap();
    settle().await;

    // The clock runs past the end of everything scheduled
    let rendered = output.advance(25);
    assert_eq!(&rendered[..10], normalized(&first).as_slice());
    assert!(rendered[10..].iter().all(|s| *s == 0.0));

    let second: Vec<i16> = vec![1_000; 8];
    tx.send(Bytes::from(pcm_bytes(&second))).await.unwrap();
    drop(tx);
    reader.await.unwrap().unwrap();

    let late = output.scheduled()[1];
    assert_eq!(late.start(), 10);

    let rendered = output.advance(10);
    assert_eq!(&rendered[..8], normalized(&second).as_slice());
    assert_eq!(&rendered[8..], &[0.0, 0.0]);
}

#[tokio::test]
async fn test_late_start_delays_later_chunks_without_overlap() {
    let (player, output) = headless_player();
    let (tx, rx) = mpsc::channel::<Bytes>(4);
    let (count, on_finished) = counter();

    let reader = tokio::spawn({
        let player = player.clone();
        async move { player.play(ReceiverStream::new(rx), on_finished).await }
    });
    settle().await;

    // The device renders silence before the first chunk arrives
    let lead_in = output.advance(100);
    assert!(lead_in.iter().all(|s| *s == 0.0));

    let first: Vec<i16> = vec![8_192; 1_000];
    tx.send(Bytes::from(pcm_bytes(&first))).await.unwrap();
    settle().await;
    let mut rendered = output.advance(5);

    let second: Vec<i16> = vec![-16_384; 10];
    tx.send(Bytes::from(pcm_bytes(&second))).await.unwrap();
    drop(tx);
    reader.await.unwrap().unwrap();

    rendered.extend(output.advance(995));
    settle().await;
    assert_eq!(rendered, normalized(&first));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(player.is_playing());

    let tail = output.advance(12);
    assert_eq!(&tail[..10], normalized(&second).as_slice());
    assert_eq!(&tail[10..], &[0.0, 0.0]);

    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_unavailable_device_is_reported() {
    let (player, output) = headless_player();
    output.set_available(false);
    let (count, on_finished) = counter();

    let err = player
        .play(stream_of(vec![Bytes::from_static(&[0, 0])]), on_finished)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeviceUnavailable(_)));
    assert!(!player.is_playing());
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // The player recovers once the device comes back
    output.set_available(true);
    player
        .play(stream_of(vec![Bytes::from_static(&[0, 0])]), || {})
        .await
        .unwrap();
    assert!(player.is_playing());
}

#[tokio::test]
async fn test_playing_state_is_observable() {
    let (player, output) = headless_player();
    let mut state = player.subscribe();
    assert!(!*state.borrow());

    player
        .play(stream_of(vec![Bytes::from(pcm_bytes(&ramp(4)))]), || {})
        .await
        .unwrap();
    state.changed().await.unwrap();
    assert!(*state.borrow_and_update());

    let _ = output.advance(4);
    state.changed().await.unwrap();
    assert!(!*state.borrow_and_update());
}

#[tokio::test]
async fn test_wav_speech_stream_plays_only_samples() {
    let (player, output) = headless_player();
    let samples = ramp(64);

    let mut wav = Vec::new();
    {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut wav), spec).unwrap();
        for s in &samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    let chunks: Vec<linguo::Result<Bytes>> =
        split_cycling(&wav, &[7]).into_iter().map(Ok).collect();
    let stream = SpeechStream::open(futures::stream::iter(chunks), PcmFormat::LINEAR16_MONO_24K)
        .await
        .unwrap();

    player.play(stream, || {}).await.unwrap();
    assert_eq!(output.advance(64), normalized(&samples));
}

#[tokio::test]
async fn test_mismatched_wav_is_rejected_before_playback() {
    let mut wav = Vec::new();
    {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut wav), spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();
    }

    let result = SpeechStream::open(
        futures::stream::iter(vec![Ok(Bytes::from(wav))]),
        PcmFormat::LINEAR16_MONO_24K,
    )
    .await;
    assert!(matches!(result, Err(Error::Format(_))));
}
