use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use aura_client::audio::{PlaybackPipeline, SAMPLE_RATE, samples_to_wav};
use aura_client::{Config, ConnectionManager, SessionRuntime, SignalMeter};

/// Aura - Voice assistant client runtime
#[derive(Parser)]
#[command(name = "aura", version, about)]
struct Cli {
    /// Service endpoint (wss://...)
    #[arg(long, env = "AURA_ENDPOINT")]
    endpoint: Option<String>,

    /// Auth credential from the identity provider
    #[arg(long, env = "AURA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Opaque owner reference attached to sessions
    #[arg(long, env = "AURA_OWNER")]
    owner: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input and write the recording to a WAV file
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Output path
        #[arg(short, long, default_value = "aura-mic-test.wav")]
        output: PathBuf,
    },
    /// Test speaker output with a generated tone
    TestSpeaker,
    /// Print meter readings for a WAV file
    Analyze {
        /// Path to a WAV file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aura_client=info",
        1 => "info,aura_client=debug",
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
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, output } => test_mic(duration, &output).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Analyze { file } => analyze(&file),
        };
    }

    let mut config = Config::from_env();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    let token = cli
        .token
        .ok_or_else(|| anyhow::anyhow!("AURA_TOKEN is required to connect"))?;

    tracing::info!(endpoint = %config.endpoint, "starting aura client");

    let (events_tx, events_rx) = mpsc::channel(64);
    let connection = ConnectionManager::new(
        &config.endpoint,
        SecretString::from(token),
        config.reconnect.clone(),
        events_tx,
    );

    let (runtime, handle, mut session_rx) =
        SessionRuntime::new(&config, cli.owner.as_deref(), connection.clone(), events_rx);

    // Log session snapshots for operators; a real UI subscribes instead
    tokio::spawn(async move {
        while session_rx.changed().await.is_ok() {
            let session = session_rx.borrow().clone();
            tracing::info!(
                status = %session.status,
                transcript = session.transcript.as_ref().map(|t| t.text.as_str()),
                error = session.last_error.as_deref(),
                "session"
            );
        }
    });

    connection.connect();

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown_handle.shutdown().await;
        }
    });

    runtime.run().await;
    Ok(())
}

/// Record from the default microphone and save a WAV file
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: &PathBuf) -> anyhow::Result<()> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("no input device"))?;

    let config = device
        .supported_input_configs()?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= cpal::SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= cpal::SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| anyhow::anyhow!("no suitable input config"))?
        .with_sample_rate(cpal::SampleRate(SAMPLE_RATE))
        .config();

    let buffer = std::sync::Arc::new(std::sync::Mutex::new(Vec::<f32>::new()));
    let writer = std::sync::Arc::clone(&buffer);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Ok(mut buf) = writer.lock() {
                buf.extend_from_slice(data);
            }
        },
        |err| tracing::error!(error = %err, "capture error"),
        None,
    )?;
    stream.play()?;

    println!("Recording for {duration}s...");
    let meter = SignalMeter::new(SAMPLE_RATE);
    for _ in 0..duration * 10 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let level = buffer
            .lock()
            .map(|buf| {
                let start = buf.len().saturating_sub(1600);
                meter.analyze(&buf[start..]).amplitude
            })
            .unwrap_or(0.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bars = "#".repeat((level * 40.0) as usize);
        print!("\rlevel [{bars:<40}]");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();
    }
    println!();
    drop(stream);

    let samples = buffer.lock().map(|buf| buf.clone()).unwrap_or_default();
    let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
    std::fs::write(output, wav)?;
    println!("Wrote {} samples to {}", samples.len(), output.display());

    Ok(())
}

/// Play a short tone through the default output device
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    let samples: Vec<f32> = (0..24_000)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / 24_000.0;
            0.4 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect();
    let wav = samples_to_wav(&samples, 24_000)?;

    let mut playback = PlaybackPipeline::new(0.01);
    playback.play(aura_client::AudioSource::Bytes(wav)).await?;

    println!("Playing test tone...");
    while playback.is_playing() {
        tokio::time::sleep(Duration::from_millis(16)).await;
        if playback.tick() {
            break;
        }
    }
    println!("Done");
    Ok(())
}

/// Print meter readings over a WAV file, one line per chunk
fn analyze(file: &PathBuf) -> anyhow::Result<()> {
    let mut reader = hound::WavReader::open(file)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let meter = SignalMeter::new(spec.sample_rate);
    let window = spec.sample_rate as usize / 10;

    println!("{:>8}  {:>9}  {:>8}", "time", "amplitude", "freq");
    for (i, chunk) in samples.chunks(window).enumerate() {
        let reading = meter.analyze(chunk);
        #[allow(clippy::cast_precision_loss)]
        let t = i as f32 / 10.0;
        println!(
            "{t:>7.1}s  {:>9.3}  {:>6.0}Hz",
            reading.amplitude, reading.dominant_frequency
        );
    }

    Ok(())
}
