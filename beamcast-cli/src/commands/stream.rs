//! Stream command - push a live stream to an ingest endpoint

use anyhow::{Context, Result};
use clap::Args;
use beamcast_core::config::{safe_url, Codec, ConfigFile, EncoderPreset, Platform, Preset};
use beamcast_core::{QueueSource, Session, SessionState};
use tokio::signal;
use tracing::{error, info};

use crate::pattern::spawn_test_pattern;

/// Arguments for the stream command
#[derive(Args)]
pub struct StreamArgs {
    /// Target platform (twitch, youtube, custom)
    #[arg(short, long)]
    platform: Option<String>,

    /// Custom ingest URL (rtmp://, rtmps://, or srt://)
    #[arg(short, long)]
    url: Option<String>,

    /// Stream key
    #[arg(short, long)]
    key: Option<String>,

    /// Output preset (720p30, 720p60, 1080p30, 1080p60, 1440p60, 4k60)
    #[arg(long)]
    preset: Option<String>,

    /// Video codec (h264, hevc, av1)
    #[arg(short, long)]
    codec: Option<String>,

    /// Bitrate in kbps (0 = auto from preset)
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Encoder quality preset (fast, medium, slow)
    #[arg(short, long)]
    quality: Option<String>,

    /// Disable the adaptive bitrate ladder
    #[arg(long)]
    no_adaptive: bool,

    /// Enable low-latency mode
    #[arg(long)]
    low_latency: bool,

    /// Print statistics every N seconds (0 = never)
    #[arg(long, default_value = "5")]
    stats_every: u64,
}

/// Start a streaming session
pub async fn stream(args: StreamArgs) -> Result<()> {
    // File settings first, command line overrides on top
    let mut config = ConfigFile::load().to_session_config();

    if let Some(ref platform) = args.platform {
        config.platform = platform
            .parse::<Platform>()
            .map_err(|_| anyhow::anyhow!("Invalid platform '{}'. Valid options: twitch, youtube, custom", platform))?;
    }
    if let Some(url) = args.url {
        config.platform = Platform::Custom;
        config.url = Some(url);
    }
    if let Some(key) = args.key {
        config.stream_key = key;
    }
    if let Some(ref preset) = args.preset {
        config.preset = Preset::from_preset_str(preset).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid preset '{}'. Valid options: 720p30, 720p60, 1080p30, 1080p60, 1440p60, 4k60",
                preset
            )
        })?;
    }
    if let Some(ref codec) = args.codec {
        config.codec = codec
            .parse::<Codec>()
            .map_err(|_| anyhow::anyhow!("Invalid codec '{}'. Valid options: h264, hevc, av1", codec))?;
    }
    if let Some(bitrate) = args.bitrate {
        config.bitrate = bitrate;
    }
    if let Some(ref quality) = args.quality {
        config.encoder_preset = match quality.to_lowercase().as_str() {
            "fast" => EncoderPreset::Fast,
            "medium" => EncoderPreset::Medium,
            "slow" => EncoderPreset::Slow,
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid quality '{}'. Valid options: fast, medium, slow",
                    quality
                ))
            }
        };
    }
    if args.no_adaptive {
        config.adaptive_bitrate = false;
    }
    if args.low_latency {
        config.low_latency = true;
    }

    config.validate().context("Invalid configuration")?;

    println!("Beamcast - Starting Stream\n");
    println!("Configuration:");
    println!("  Target:      {}", safe_url(&config.ingest_url()?));
    println!("  Preset:      {}", config.preset);
    println!("  Resolution:  {}x{}", config.width(), config.height());
    println!("  Framerate:   {} fps", config.fps());
    println!("  Codec:       {}", config.codec);
    println!("  Bitrate:     {} kbps", config.effective_bitrate());
    println!("  Audio:       {} @ {} kbps", config.audio_codec, config.effective_audio_bitrate());
    println!("  Adaptive:    {}", config.adaptive_bitrate);
    println!();

    let (source, pusher) = QueueSource::new(config.fps().max(30) as usize);
    let pattern = spawn_test_pattern(pusher, &config);

    let mut session = Session::new(config, Box::new(source)).context("Failed to create session")?;

    let mut stats_rx = session.subscribe_stats();
    let stats_every = args.stats_every;
    let stats_printer = tokio::spawn(async move {
        let mut ticks = 0u64;
        while let Ok(snapshot) = stats_rx.recv().await {
            ticks += 1;
            if stats_every > 0 && ticks % stats_every == 0 {
                println!("  {}", snapshot);
            }
        }
    });

    session.start().await.context("Failed to start session")?;
    println!("Streaming. Press Ctrl+C to stop...\n");

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            println!("\nReceived interrupt signal...");
        }
        _ = async {
            loop {
                match session.process().await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        error!("Session error: {}", e);
                        break;
                    }
                }
            }
        } => {
            info!("Session processing ended");
        }
    }

    println!("Stopping stream...");
    session.stop().await;
    pattern.abort();
    stats_printer.abort();

    if let SessionState::Failed(reason) = session.state() {
        return Err(anyhow::anyhow!("Session failed: {}", reason));
    }

    let snapshot = session.stats();
    println!("Stream stopped after {:.1}s: {} frames sent, {} dropped.",
        snapshot.duration.as_secs_f64(),
        snapshot.frames_sent,
        snapshot.frames_dropped
    );

    Ok(())
}
