use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::Stream;
use tokio_stream::StreamExt as _;
use tracing_subscriber::EnvFilter;

use linguo::voice::{
    AudioCapture, HeadlessOutput, OutputDevice, PcmFormat, SpeakerOutput, SpeechStream,
    SpeechToText, Synthesizer, TextToSpeech, calculate_energy,
};
use linguo::{ChatClient, Config, Conversation, PlaybackOutcome, StreamingPlayer, Tutor, TurnInput};

/// Linguo - a spoken language tutor
#[derive(Parser)]
#[command(name = "linguo", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Render audio in memory instead of on a sound card
    #[arg(long, env = "LINGUO_NO_AUDIO")]
    no_audio: bool,

    /// Output device name (defaults to the system default)
    #[arg(long)]
    output_device: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Talk with the tutor hands-free (default)
    Converse,
    /// Send one typed message and hear the reply
    Ask {
        /// What to say to the tutor
        text: String,
    },
    /// Synthesize text and play it
    Say {
        /// Text to speak
        text: String,
    },
    /// Stream a local 16-bit mono 24 kHz PCM or WAV file through the player
    Play {
        /// Path to the audio file
        path: std::path::PathBuf,
        /// Bytes per chunk
        #[arg(long, default_value = "4096")]
        chunk_size: usize,
        /// Delay between chunks in milliseconds, to mimic a network
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },
    /// List output devices
    Devices,
    /// Test speaker output
    TestSpeaker,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,linguo=info",
        1 => "info,linguo=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let device: Arc<dyn OutputDevice> = if cli.no_audio {
        tracing::info!("audio output disabled, rendering in memory");
        Arc::new(HeadlessOutput::realtime())
    } else {
        let name = cli.output_device.or_else(|| config.voice.output_device.clone());
        Arc::new(SpeakerOutput::with_device(name))
    };
    let player = StreamingPlayer::new(device);

    match cli.command.unwrap_or(Command::Converse) {
        Command::Converse => converse(&config, player).await,
        Command::Ask { text } => ask(&config, &player, text).await,
        Command::Say { text } => say(&config, &player, &text).await,
        Command::Play {
            path,
            chunk_size,
            interval_ms,
        } => play_file(&player, &path, chunk_size, interval_ms).await,
        Command::Devices => list_devices(),
        Command::TestSpeaker => test_speaker(&player).await,
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

fn tutor(config: &Config) -> anyhow::Result<Tutor> {
    let stt = SpeechToText::new(
        config.groq_key()?,
        config.voice.stt_base_url.clone(),
        config.voice.stt_model.clone(),
    )?;
    let chat = ChatClient::new(
        config.groq_key()?,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.system_prompt.clone(),
    )?;
    Ok(Tutor::new(Arc::new(stt), Arc::new(chat), Arc::new(tts(config)?)))
}

fn tts(config: &Config) -> anyhow::Result<TextToSpeech> {
    Ok(TextToSpeech::new(
        config.deepgram_key()?,
        config.voice.tts_base_url.clone(),
        config.voice.tts_model.clone(),
        config.voice.tts_container,
    )?)
}

/// Play `stream`, stopping early on Ctrl-C
async fn play_until_interrupted<S>(player: &StreamingPlayer, stream: S) -> anyhow::Result<()>
where
    S: Stream<Item = Bytes> + Unpin + Send,
{
    let outcome = tokio::select! {
        outcome = player.play_to_end(stream) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            player.stop();
            PlaybackOutcome::Cancelled
        }
    };
    tracing::debug!(?outcome, "playback ended");
    Ok(())
}

/// Run the hands-free conversation loop
#[allow(clippy::future_not_send)]
async fn converse(config: &Config, player: StreamingPlayer) -> anyhow::Result<()> {
    let conversation = Conversation::new(tutor(config)?, player);
    let capture = AudioCapture::new()?;

    println!("Linguo is listening. Say something in the language you are learning.");
    println!("Press Ctrl-C to quit.\n");

    conversation
        .run(capture, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

/// One typed turn
async fn ask(config: &Config, player: &StreamingPlayer, text: String) -> anyhow::Result<()> {
    let mut tutor = tutor(config)?;
    let turn = tutor.respond(TurnInput::Text(text)).await?;

    println!("you:    {}", turn.transcript);
    println!("linguo: {}", turn.response);

    play_until_interrupted(player, turn.audio).await
}

/// Synthesize and play text
async fn say(config: &Config, player: &StreamingPlayer, text: &str) -> anyhow::Result<()> {
    let audio = tts(config)?.synthesize(text).await?;
    play_until_interrupted(player, audio).await
}

/// Stream a local file through the player
async fn play_file(
    player: &StreamingPlayer,
    path: &Path,
    chunk_size: usize,
    interval_ms: u64,
) -> anyhow::Result<()> {
    if chunk_size == 0 {
        anyhow::bail!("--chunk-size must be at least 1");
    }

    let data = Bytes::from(tokio::fs::read(path).await?);
    let chunks: Vec<linguo::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..data.len().min(start + chunk_size))))
        .collect();

    println!("Playing {} ({} bytes, {} chunks)...", path.display(), data.len(), chunks.len());

    let source = tokio_stream::iter(chunks).throttle(Duration::from_millis(interval_ms));
    let stream = SpeechStream::open(source, player.format()).await?;
    play_until_interrupted(player, stream).await
}

/// List output devices
fn list_devices() -> anyhow::Result<()> {
    for name in SpeakerOutput::list_devices()? {
        println!("{name}");
    }
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker(player: &StreamingPlayer) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let format = PcmFormat::LINEAR16_MONO_24K;
    let frequency = 440.0_f32;
    let num_samples = format.sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let pcm: Vec<u8> = (0..num_samples)
        .flat_map(|i| {
            let t = i as f32 / format.sample_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3; // 30% volume
            ((sample * 32767.0) as i16).to_le_bytes()
        })
        .collect();

    // Odd chunk sizes split samples across chunk boundaries
    let data = Bytes::from(pcm);
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(4097)
        .map(|start| data.slice(start..data.len().min(start + 4097)))
        .collect();

    println!("Streaming {num_samples} samples in {} chunks...", chunks.len());
    play_until_interrupted(player, tokio_stream::iter(chunks)).await?;

    println!("\n---");
    println!("If you heard a clean tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: linguo devices");
    println!("  2. Run: pactl info | grep 'Default Sink'");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    println!("Device: {}", capture.device_name());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.drain();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}
