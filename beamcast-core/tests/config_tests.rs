//! Integration tests for session configuration
//!
//! Scenario-level coverage: building configs for real platforms,
//! resolving ingest targets, and the config file roundtrip.

use beamcast_core::config::{
    safe_url, Codec, ConfigFile, IngestTarget, Platform, Preset, ProtocolVariant, SessionConfig,
};

#[test]
fn test_config_for_twitch_1080p60() {
    let config = SessionConfig::for_platform(Platform::Twitch, "live_12345_abcdef")
        .with_preset(Preset::P1080_60)
        .with_codec(Codec::H264);

    assert_eq!(config.width(), 1920);
    assert_eq!(config.height(), 1080);
    assert_eq!(config.fps(), 60);

    // Auto bitrate should be reasonable for 1080p60
    let bitrate = config.effective_bitrate();
    assert!(bitrate >= 4000);
    assert!(bitrate <= 12000);

    // Keyframe every 2 seconds at 60fps
    assert_eq!(config.keyframe_cadence(), 120);

    assert!(config.validate().is_ok());

    let url = config.ingest_url().expect("twitch URL should resolve");
    assert!(url.starts_with("rtmp://live.twitch.tv/"));
    assert!(url.ends_with("live_12345_abcdef"));
}

#[test]
fn test_config_for_custom_tls_endpoint() {
    let config = SessionConfig::for_url("rtmps://ingest.example.com/live", "secret");
    let target = config.resolve_target().expect("target should resolve");

    assert_eq!(target.variant, ProtocolVariant::Rtmps);
    assert!(target.variant.requires_tls());
    assert_eq!(target.port, 443);
    assert_eq!(target.host, "ingest.example.com");
}

#[test]
fn test_ingest_target_explicit_port() {
    let target = IngestTarget::parse("rtmp://localhost:2935/app/key").unwrap();
    assert_eq!(target.port, 2935);
    assert_eq!(target.addr(), "localhost:2935");
    assert_eq!(target.path, "app/key");
}

#[test]
fn test_stream_key_never_logged() {
    let url = "rtmp://live.twitch.tv/app/live_12345_abcdef";
    let masked = safe_url(url);
    assert!(!masked.contains("live_12345_abcdef"));
    assert!(masked.contains("live.twitch.tv"));
    assert!(masked.ends_with("****"));
}

#[test]
fn test_validation_rejects_missing_key() {
    let config = SessionConfig::for_platform(Platform::Twitch, "");
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_inverted_bounds() {
    let config = SessionConfig::for_url("rtmp://localhost/live", "k")
        .with_bitrate(5000)
        .with_bitrate_bounds(6000, 4000);
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_custom_without_url() {
    let config = SessionConfig::for_platform(Platform::Custom, "k");
    assert!(config.validate().is_err());
}

#[test]
fn test_auto_bitrate_bounds_bracket_target() {
    let config = SessionConfig::for_url("rtmp://localhost/live", "k").with_bitrate(6000);
    assert_eq!(config.effective_min_bitrate(), 3000);
    assert_eq!(config.effective_max_bitrate(), 6000);
}

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");

    let mut file = ConfigFile::default();
    file.stream.platform = "youtube".to_string();
    file.stream.key = "yt-key".to_string();
    file.video.preset = "720p30".to_string();
    file.video.bitrate = 2500;
    file.network.low_latency = true;

    file.save_to(&path).expect("save");
    let loaded = ConfigFile::load_from(&path).expect("load");

    let config = loaded.to_session_config();
    assert_eq!(config.platform, Platform::Youtube);
    assert_eq!(config.stream_key, "yt-key");
    assert_eq!(config.fps(), 30);
    assert_eq!(config.effective_bitrate(), 2500);
    assert!(config.low_latency);
}

#[test]
fn test_garbled_config_file_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not toml [").expect("write");
    assert!(ConfigFile::load_from(&path).is_err());
}

#[test]
fn test_unknown_values_fall_back_with_defaults() {
    let file: ConfigFile = toml::from_str(
        r#"
        [stream]
        platform = "myspace"
        url = "rtmp://localhost/live"
        key = "k"

        [video]
        preset = "9000p"
        codec = "vp3"
        "#,
    )
    .expect("parse");

    // Lenient conversion: unknowns become defaults, never an error
    let config = file.to_session_config();
    assert_eq!(config.platform, Platform::Custom);
    assert_eq!(config.preset, Preset::default());
    assert_eq!(config.codec, Codec::default());
}
