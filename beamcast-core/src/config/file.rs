//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/beamcast/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{BeamcastError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Stream target settings
    #[serde(default)]
    pub stream: StreamSettings,

    /// Video encoder settings
    #[serde(default)]
    pub video: VideoSettings,

    /// Audio encoder settings
    #[serde(default)]
    pub audio: AudioSettings,

    /// Network and transport settings
    #[serde(default)]
    pub network: NetworkSettings,
}

/// Stream target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Target platform (twitch, youtube, custom)
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Custom ingest URL (used when platform = "custom")
    #[serde(default)]
    pub url: String,

    /// Stream key
    #[serde(default)]
    pub key: String,
}

/// Video encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Output preset (e.g., "1080p60")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Codec (h264, hevc, av1)
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Bitrate in kbps (0 = auto)
    #[serde(default)]
    pub bitrate: u32,

    /// Adaptive bitrate floor in kbps (0 = auto)
    #[serde(default)]
    pub min_bitrate: u32,

    /// Adaptive bitrate ceiling in kbps (0 = auto)
    #[serde(default)]
    pub max_bitrate: u32,

    /// Keyframe interval in seconds
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval: u32,

    /// Prefer a hardware encoder backend
    #[serde(default)]
    pub hardware: bool,
}

/// Audio encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Codec (aac, opus)
    #[serde(default = "default_audio_codec")]
    pub codec: String,

    /// Bitrate in kbps (0 = codec default)
    #[serde(default)]
    pub bitrate: u32,
}

/// Network and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Enable the adaptive bitrate ladder
    #[serde(default = "default_true")]
    pub adaptive_bitrate: bool,

    /// Enable low-latency mode
    #[serde(default)]
    pub low_latency: bool,

    /// Outbound queue depth in units
    #[serde(default = "default_buffer_depth")]
    pub buffer_depth: usize,
}

fn default_platform() -> String {
    "custom".to_string()
}

fn default_preset() -> String {
    "1080p60".to_string()
}

fn default_codec() -> String {
    "h264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_keyframe_interval() -> u32 {
    2
}

fn default_buffer_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            url: String::new(),
            key: String::new(),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            codec: default_codec(),
            bitrate: 0,
            min_bitrate: 0,
            max_bitrate: 0,
            keyframe_interval: default_keyframe_interval(),
            hardware: false,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: default_audio_codec(),
            bitrate: 0,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            adaptive_bitrate: true,
            low_latency: false,
            buffer_depth: default_buffer_depth(),
        }
    }
}

impl ConfigFile {
    /// Default config file path: `~/.config/beamcast/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("beamcast").join("config.toml"))
    }

    /// Load from the default path, falling back to defaults if missing
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => {
                    debug!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to load config from {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Load from a specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| BeamcastError::config(format!("Invalid config file: {}", e)))
    }

    /// Save to a specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BeamcastError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build a session configuration from this file's settings.
    ///
    /// Unparseable values fall back to defaults with a warning rather than
    /// failing, so a stale config file never blocks a start.
    pub fn to_session_config(&self) -> SessionConfig {
        use crate::config::{AudioCodec, Codec, Platform, Preset};

        let platform: Platform = self.stream.platform.parse().unwrap_or_else(|e: String| {
            warn!("{}. Using custom.", e);
            Platform::Custom
        });

        let mut config = if platform == Platform::Custom && !self.stream.url.is_empty() {
            SessionConfig::for_url(&self.stream.url, &self.stream.key)
        } else {
            SessionConfig::for_platform(platform, &self.stream.key)
        };

        config.preset = Preset::from_preset_str(&self.video.preset).unwrap_or_else(|| {
            warn!("Unknown preset '{}'. Using 1080p60.", self.video.preset);
            Preset::default()
        });
        config.codec = self.video.codec.parse().unwrap_or_else(|e: String| {
            warn!("{}. Using H.264.", e);
            Codec::default()
        });
        config.bitrate = self.video.bitrate;
        config.min_bitrate = self.video.min_bitrate;
        config.max_bitrate = self.video.max_bitrate;
        config.keyframe_interval = self.video.keyframe_interval;
        config.hardware_encoder = self.video.hardware;
        config.audio_codec = self.audio.codec.parse().unwrap_or_else(|e: String| {
            warn!("{}. Using AAC.", e);
            AudioCodec::default()
        });
        config.audio_bitrate = self.audio.bitrate;
        config.adaptive_bitrate = self.network.adaptive_bitrate;
        config.low_latency = self.network.low_latency;
        config.buffer_depth = self.network.buffer_depth;

        config
    }
}

/// Generate a sample configuration file with comments
pub fn sample_config() -> String {
    r#"# Beamcast configuration
# Place at ~/.config/beamcast/config.toml

[stream]
# Target platform: twitch, youtube, custom
platform = "custom"
# Custom ingest URL (only used when platform = "custom")
url = "rtmp://localhost/live"
# Stream key
key = ""

[video]
# Output preset: 720p30, 720p60, 1080p30, 1080p60, 1440p60, 4k60
preset = "1080p60"
# Codec: h264, hevc, av1
codec = "h264"
# Bitrate in kbps (0 = auto from preset)
bitrate = 0
# Adaptive bitrate bounds in kbps (0 = auto)
min_bitrate = 0
max_bitrate = 0
# Keyframe interval in seconds
keyframe_interval = 2
# Prefer a hardware encoder backend when available
hardware = false

[audio]
# Codec: aac, opus
codec = "aac"
# Bitrate in kbps (0 = codec default)
bitrate = 0

[network]
# Adjust bitrate from buffer health once per second
adaptive_bitrate = true
# Shorter poll intervals and a smaller queue
low_latency = false
# Outbound queue depth in units
buffer_depth = 64
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config: ConfigFile = toml::from_str(&sample_config()).unwrap();
        assert_eq!(config.video.preset, "1080p60");
        assert_eq!(config.video.keyframe_interval, 2);
        assert!(config.network.adaptive_bitrate);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(config.video.codec, "h264");
        assert_eq!(config.network.buffer_depth, 64);
    }

    #[test]
    fn test_to_session_config() {
        let file: ConfigFile = toml::from_str(
            r#"
            [stream]
            platform = "twitch"
            key = "abc"

            [video]
            preset = "720p60"
            bitrate = 3000
            "#,
        )
        .unwrap();

        let config = file.to_session_config();
        assert_eq!(config.stream_key, "abc");
        assert_eq!(config.fps(), 60);
        assert_eq!(config.effective_bitrate(), 3000);
    }
}
