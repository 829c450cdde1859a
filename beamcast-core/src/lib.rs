//! Beamcast Core Library
//!
//! Live push-streaming pipeline for RTMP-family ingest endpoints.
//!
//! This library provides:
//! - A pluggable frame source seam for capture integration
//! - Video/audio encoding with keyframe cadence and live bitrate retargeting
//! - A chunked TCP/TLS transport with wire handshake and reconnect
//! - Adaptive bitrate driven by outbound buffer health
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ Frame Source │───▶│    Encode    │───▶│    Transport    │
//! │ (push queue) │    │ (keyframes)  │    │ (chunked TCP)   │
//! └──────────────┘    └──────────────┘    └─────────────────┘
//!                            ▲                     │
//!                            └── adaptive bitrate ─┘
//! ```

pub mod abr;
pub mod config;
pub mod encode;
pub mod error;
pub mod session;
pub mod source;
pub mod stats;
pub mod transport;
pub mod types;

pub use config::{Platform, Preset, ProtocolVariant, SessionConfig};
pub use error::{BeamcastError, Result};
pub use session::Session;
pub use source::{FramePusher, FrameSource, QueueSource};
pub use stats::StatisticsSnapshot;
pub use types::{Handle, RawFrame, SessionState, StreamKind};
