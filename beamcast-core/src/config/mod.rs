//! Configuration types for Beamcast
//!
//! Provides platform presets, resolution/bitrate presets, protocol variant
//! selection, and the immutable per-session configuration.

mod file;

pub use file::{sample_config, ConfigFile};

use crate::error::{BeamcastError, Result};
use serde::{Deserialize, Serialize};

/// Streaming protocol variant for the ingest connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Plain RTMP (most compatible)
    #[default]
    Rtmp,
    /// RTMP over TLS
    Rtmps,
    /// SRT (recognized for configuration selection; same chunk layer)
    Srt,
}

impl ProtocolVariant {
    /// Detect the variant from an ingest URL scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.starts_with("rtmps://") {
            Some(Self::Rtmps)
        } else if lower.starts_with("rtmp://") {
            Some(Self::Rtmp)
        } else if lower.starts_with("srt://") {
            Some(Self::Srt)
        } else {
            None
        }
    }

    /// Default port used when the ingest URL does not carry one
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Rtmp => 1935,
            Self::Rtmps => 443,
            Self::Srt => 9710,
        }
    }

    /// Whether this variant encrypts the transport before any protocol byte
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Rtmps)
    }

    /// URL scheme string
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Rtmp => "rtmp",
            Self::Rtmps => "rtmps",
            Self::Srt => "srt",
        }
    }
}

impl std::fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rtmp => write!(f, "RTMP"),
            Self::Rtmps => write!(f, "RTMPS"),
            Self::Srt => write!(f, "SRT"),
        }
    }
}

impl std::str::FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rtmp" => Ok(Self::Rtmp),
            "rtmps" => Ok(Self::Rtmps),
            "srt" => Ok(Self::Srt),
            _ => Err(format!("Unknown protocol variant: {}", s)),
        }
    }
}

/// Target platform preset, resolving to a default ingest URL template
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Twitch ingest
    Twitch,
    /// YouTube Live ingest
    Youtube,
    /// Custom ingest URL
    #[default]
    Custom,
}

impl Platform {
    /// Default ingest URL template (`{key}` is replaced by the stream key)
    pub fn url_template(&self) -> Option<&'static str> {
        match self {
            Self::Twitch => Some("rtmp://live.twitch.tv/app/{key}"),
            Self::Youtube => Some("rtmp://a.rtmp.youtube.com/live2/{key}"),
            Self::Custom => None,
        }
    }

    /// All platforms with a built-in template
    pub fn presets() -> &'static [Platform] {
        &[Platform::Twitch, Platform::Youtube]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Twitch => write!(f, "Twitch"),
            Self::Youtube => write!(f, "YouTube"),
            Self::Custom => write!(f, "Custom"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitch" => Ok(Self::Twitch),
            "youtube" | "yt" => Ok(Self::Youtube),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// Video codec for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC (most compatible)
    #[default]
    H264,
    /// H.265 / HEVC (better compression)
    Hevc,
    /// AV1 (best compression)
    Av1,
}

impl Codec {
    /// Get the codec name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
            Self::Av1 => "AV1",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "avc" | "264" => Ok(Self::H264),
            "hevc" | "h265" | "265" => Ok(Self::Hevc),
            "av1" => Ok(Self::Av1),
            _ => Err(format!("Unknown codec: {}", s)),
        }
    }
}

/// Codec profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoProfile {
    /// Baseline profile (lowest latency, widest decode support)
    Baseline,
    /// Main profile (default)
    #[default]
    Main,
    /// High profile (best compression)
    High,
}

/// Encoder quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    /// Fast encoding, lower quality
    Fast,
    /// Balanced encoding (default)
    #[default]
    Medium,
    /// Slower encoding, better quality
    Slow,
}

/// Audio codec for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// AAC (most compatible)
    #[default]
    Aac,
    /// Opus (better quality at low bitrates)
    Opus,
}

impl AudioCodec {
    /// Get default bitrate for this codec in kbps
    pub fn default_bitrate(&self) -> u32 {
        match self {
            Self::Aac => 160,
            Self::Opus => 128,
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aac => write!(f, "AAC"),
            Self::Opus => write!(f, "Opus"),
        }
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aac" => Ok(Self::Aac),
            "opus" => Ok(Self::Opus),
            _ => Err(format!("Unknown audio codec: {}", s)),
        }
    }
}

/// Output resolution/framerate preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 1280x720 @ 30fps
    #[serde(rename = "720p30")]
    P720_30,
    /// 1280x720 @ 60fps
    #[serde(rename = "720p60")]
    P720_60,
    /// 1920x1080 @ 30fps
    #[serde(rename = "1080p30")]
    P1080_30,
    /// 1920x1080 @ 60fps (default)
    #[default]
    #[serde(rename = "1080p60")]
    P1080_60,
    /// 2560x1440 @ 60fps
    #[serde(rename = "1440p60")]
    P1440_60,
    /// 3840x2160 @ 60fps
    #[serde(rename = "4k60")]
    P4k60,
    /// Custom resolution/framerate
    Custom { width: u32, height: u32, fps: u32 },
}

impl Preset {
    /// Get width in pixels
    pub fn width(&self) -> u32 {
        match self {
            Self::P720_30 | Self::P720_60 => 1280,
            Self::P1080_30 | Self::P1080_60 => 1920,
            Self::P1440_60 => 2560,
            Self::P4k60 => 3840,
            Self::Custom { width, .. } => *width,
        }
    }

    /// Get height in pixels
    pub fn height(&self) -> u32 {
        match self {
            Self::P720_30 | Self::P720_60 => 720,
            Self::P1080_30 | Self::P1080_60 => 1080,
            Self::P1440_60 => 1440,
            Self::P4k60 => 2160,
            Self::Custom { height, .. } => *height,
        }
    }

    /// Get framerate
    pub fn fps(&self) -> u32 {
        match self {
            Self::P720_30 | Self::P1080_30 => 30,
            Self::P720_60 | Self::P1080_60 | Self::P1440_60 | Self::P4k60 => 60,
            Self::Custom { fps, .. } => *fps,
        }
    }

    /// Get suggested bitrate in kbps
    pub fn suggested_bitrate(&self) -> u32 {
        match self {
            Self::P720_30 => 2500,
            Self::P720_60 => 4000,
            Self::P1080_30 => 4500,
            Self::P1080_60 => 6000,
            Self::P1440_60 => 12000,
            Self::P4k60 => 35000,
            Self::Custom { width, height, fps } => {
                let pixels_per_second = (*width as u64) * (*height as u64) * (*fps as u64);
                // Roughly 0.07 bits per pixel for decent quality
                ((pixels_per_second * 7) / 100_000) as u32
            }
        }
    }

    /// Parse from string, returning Option instead of Result
    pub fn from_preset_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// Get resolution as (width, height) tuple
    pub fn resolution(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P720_30 => write!(f, "720p30"),
            Self::P720_60 => write!(f, "720p60"),
            Self::P1080_30 => write!(f, "1080p30"),
            Self::P1080_60 => write!(f, "1080p60"),
            Self::P1440_60 => write!(f, "1440p60"),
            Self::P4k60 => write!(f, "4K60"),
            Self::Custom { width, height, fps } => write!(f, "{}x{}@{}", width, height, fps),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "720p30" => Ok(Self::P720_30),
            "720p60" => Ok(Self::P720_60),
            "1080p30" => Ok(Self::P1080_30),
            "1080p60" => Ok(Self::P1080_60),
            "1440p60" | "2k60" => Ok(Self::P1440_60),
            "4k60" | "2160p60" => Ok(Self::P4k60),
            _ => Err(format!("Unknown preset: {}", s)),
        }
    }
}

/// Resolved ingest endpoint: host, port, and application path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTarget {
    /// Protocol variant from the URL scheme
    pub variant: ProtocolVariant,
    /// Remote host
    pub host: String,
    /// Remote port (URL port or the variant default)
    pub port: u16,
    /// Application path including the stream key (may be empty)
    pub path: String,
}

impl IngestTarget {
    /// Parse an ingest URL like `rtmp://host:port/app/key`
    pub fn parse(url: &str) -> Result<Self> {
        let variant = ProtocolVariant::from_url(url).ok_or_else(|| {
            BeamcastError::config(format!(
                "Invalid ingest URL '{}'. Must start with rtmp://, rtmps://, or srt://",
                url
            ))
        })?;

        let rest = &url[url.find("://").map(|i| i + 3).unwrap_or(0)..];
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], rest[i + 1..].to_string()),
            None => (rest, String::new()),
        };

        let (host, port) = match authority.rfind(':') {
            Some(i) => {
                let host = &authority[..i];
                let port = authority[i + 1..].parse::<u16>().map_err(|_| {
                    BeamcastError::config(format!("Invalid port in ingest URL '{}'", url))
                })?;
                (host, port)
            }
            None => (authority, variant.default_port()),
        };

        if host.is_empty() {
            return Err(BeamcastError::config(format!(
                "Ingest URL '{}' has no host",
                url
            )));
        }

        Ok(Self {
            variant,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Socket address string for connecting
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Mask the stream key in an ingest URL for safe logging
pub fn safe_url(url: &str) -> String {
    // For URLs like rtmp://server/app/stream_key, mask the stream key
    if let Some(idx) = url.rfind('/') {
        let (base, key) = url.split_at(idx + 1);
        if !key.is_empty() && !key.contains(':') && !base.ends_with("//") {
            return format!("{}****", base);
        }
    }
    url.to_string()
}

/// Complete session configuration
///
/// Immutable once a session starts; a new session requires a new config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target platform preset
    pub platform: Platform,
    /// Custom ingest URL (required when platform is Custom)
    pub url: Option<String>,
    /// Stream key
    pub stream_key: String,
    /// Resolution/framerate preset
    pub preset: Preset,
    /// Video codec
    pub codec: Codec,
    /// Codec profile
    pub profile: VideoProfile,
    /// Encoder quality preset
    pub encoder_preset: EncoderPreset,
    /// Keyframe interval in seconds
    pub keyframe_interval: u32,
    /// Video bitrate in kbps (0 = auto from preset)
    pub bitrate: u32,
    /// Adaptive bitrate floor in kbps (0 = auto)
    pub min_bitrate: u32,
    /// Adaptive bitrate ceiling in kbps (0 = auto)
    pub max_bitrate: u32,
    /// Audio codec
    pub audio_codec: AudioCodec,
    /// Audio bitrate in kbps (0 = codec default)
    pub audio_bitrate: u32,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Audio channel count
    pub channels: u32,
    /// Enable the adaptive bitrate ladder
    pub adaptive_bitrate: bool,
    /// Enable low-latency mode (shorter poll intervals, smaller queue)
    pub low_latency: bool,
    /// Prefer a hardware encoder backend when available
    pub hardware_encoder: bool,
    /// Outbound queue depth in units
    pub buffer_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Custom,
            url: None,
            stream_key: String::new(),
            preset: Preset::default(),
            codec: Codec::default(),
            profile: VideoProfile::default(),
            encoder_preset: EncoderPreset::default(),
            keyframe_interval: 2,
            bitrate: 0,
            min_bitrate: 0,
            max_bitrate: 0,
            audio_codec: AudioCodec::default(),
            audio_bitrate: 0,
            sample_rate: 48000,
            channels: 2,
            adaptive_bitrate: true,
            low_latency: false,
            hardware_encoder: false,
            buffer_depth: 64,
        }
    }
}

impl SessionConfig {
    /// Create a config for a platform preset with a stream key
    pub fn for_platform(platform: Platform, stream_key: impl Into<String>) -> Self {
        Self {
            platform,
            stream_key: stream_key.into(),
            ..Self::default()
        }
    }

    /// Create a config for a custom ingest URL
    pub fn for_url(url: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            platform: Platform::Custom,
            url: Some(url.into()),
            stream_key: stream_key.into(),
            ..Self::default()
        }
    }

    /// Set the resolution/framerate preset
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /// Set the video codec
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the video bitrate in kbps
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the adaptive bitrate bounds in kbps
    pub fn with_bitrate_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_bitrate = min;
        self.max_bitrate = max;
        self
    }

    /// Set the encoder quality preset
    pub fn with_encoder_preset(mut self, preset: EncoderPreset) -> Self {
        self.encoder_preset = preset;
        self
    }

    /// Set the keyframe interval in seconds
    pub fn with_keyframe_interval(mut self, seconds: u32) -> Self {
        self.keyframe_interval = seconds;
        self
    }

    /// Set the audio codec
    pub fn with_audio_codec(mut self, codec: AudioCodec) -> Self {
        self.audio_codec = codec;
        self
    }

    /// Set the audio bitrate in kbps
    pub fn with_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    /// Enable or disable adaptive bitrate
    pub fn with_adaptive_bitrate(mut self, enabled: bool) -> Self {
        self.adaptive_bitrate = enabled;
        self
    }

    /// Enable or disable low-latency mode
    pub fn with_low_latency(mut self, enabled: bool) -> Self {
        self.low_latency = enabled;
        self
    }

    /// Prefer a hardware encoder backend
    pub fn with_hardware_encoder(mut self, enabled: bool) -> Self {
        self.hardware_encoder = enabled;
        self
    }

    /// Set the outbound queue depth
    pub fn with_buffer_depth(mut self, depth: usize) -> Self {
        self.buffer_depth = depth;
        self
    }

    /// Get output width
    pub fn width(&self) -> u32 {
        self.preset.width()
    }

    /// Get output height
    pub fn height(&self) -> u32 {
        self.preset.height()
    }

    /// Get output framerate
    pub fn fps(&self) -> u32 {
        self.preset.fps()
    }

    /// Get the effective video bitrate (uses the preset suggestion if 0)
    pub fn effective_bitrate(&self) -> u32 {
        if self.bitrate > 0 {
            self.bitrate
        } else {
            self.preset.suggested_bitrate()
        }
    }

    /// Get the effective adaptive floor (half the target if unset)
    pub fn effective_min_bitrate(&self) -> u32 {
        if self.min_bitrate > 0 {
            self.min_bitrate
        } else {
            self.effective_bitrate() / 2
        }
    }

    /// Get the effective adaptive ceiling (the target if unset)
    pub fn effective_max_bitrate(&self) -> u32 {
        if self.max_bitrate > 0 {
            self.max_bitrate
        } else {
            self.effective_bitrate()
        }
    }

    /// Get the effective audio bitrate (uses the codec default if 0)
    pub fn effective_audio_bitrate(&self) -> u32 {
        if self.audio_bitrate > 0 {
            self.audio_bitrate
        } else {
            self.audio_codec.default_bitrate()
        }
    }

    /// Frames between forced keyframes
    pub fn keyframe_cadence(&self) -> u64 {
        (self.fps() as u64 * self.keyframe_interval as u64).max(1)
    }

    /// Full ingest URL with the stream key substituted
    pub fn ingest_url(&self) -> Result<String> {
        match self.platform.url_template() {
            Some(template) => Ok(template.replace("{key}", &self.stream_key)),
            None => {
                let url = self.url.as_deref().ok_or_else(|| {
                    BeamcastError::config("Custom platform requires an ingest URL")
                })?;
                if self.stream_key.is_empty() {
                    Ok(url.to_string())
                } else if url.ends_with('/') {
                    Ok(format!("{}{}", url, self.stream_key))
                } else {
                    Ok(format!("{}/{}", url, self.stream_key))
                }
            }
        }
    }

    /// Resolve the ingest target address
    pub fn resolve_target(&self) -> Result<IngestTarget> {
        IngestTarget::parse(&self.ingest_url()?)
    }

    /// Validate the configuration, returning a hard error for settings
    /// that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.width() == 0 || self.height() == 0 {
            return Err(BeamcastError::config("Resolution cannot be zero"));
        }
        if self.fps() == 0 {
            return Err(BeamcastError::config("Framerate cannot be zero"));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(BeamcastError::config("Audio format cannot be zero"));
        }
        if self.buffer_depth == 0 {
            return Err(BeamcastError::config("Buffer depth cannot be zero"));
        }
        if self.platform != Platform::Custom && self.stream_key.is_empty() {
            return Err(BeamcastError::config(format!(
                "{} requires a stream key",
                self.platform
            )));
        }

        let bitrate = self.effective_bitrate();
        let min = self.effective_min_bitrate();
        let max = self.effective_max_bitrate();
        if !(min <= bitrate && bitrate <= max) {
            return Err(BeamcastError::config(format!(
                "Bitrate bounds violated: require min ({}) <= bitrate ({}) <= max ({})",
                min, bitrate, max
            )));
        }

        // A non-empty resolved target is required before any connect
        self.resolve_target()?;

        Ok(())
    }

    /// Check the configuration and return any advisory warnings
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let effective = self.effective_bitrate();
        let suggested = self.preset.suggested_bitrate();

        if self.bitrate > 0 {
            if effective < suggested / 4 {
                warnings.push(format!(
                    "Bitrate {} kbps is very low for {} (suggested: {} kbps). Quality may suffer.",
                    effective, self.preset, suggested
                ));
            } else if effective > suggested * 3 {
                warnings.push(format!(
                    "Bitrate {} kbps is very high for {} (suggested: {} kbps).",
                    effective, self.preset, suggested
                ));
            }
        }

        if self.keyframe_interval > 10 {
            warnings.push(format!(
                "Keyframe interval of {}s will make stream recovery slow after a reconnect.",
                self.keyframe_interval
            ));
        }

        if self.stream_key.is_empty() && self.platform == Platform::Custom {
            warnings.push("No stream key set; sending the bare ingest URL.".to_string());
        }

        warnings
    }
}
