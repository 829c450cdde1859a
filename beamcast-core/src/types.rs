//! Core types for Beamcast
//!
//! These types represent the fundamental data structures flowing through
//! the capture-encode-transport pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global handle counter for unique session IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Which elementary stream a frame or unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// Whether an encoded unit is independently decodable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitFlag {
    /// Self-contained unit, decodable without prior units
    Keyframe,
    /// Depends on prior units
    Delta,
}

/// A raw captured frame: pixel data for video, interleaved PCM for audio.
///
/// Produced by a [`FrameSource`](crate::source::FrameSource), consumed
/// exactly once by the encoder, then released.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Which stream this frame belongs to
    pub kind: StreamKind,
    /// Owned buffer (pixels or PCM samples)
    pub data: Bytes,
    /// Presentation timestamp in nanoseconds
    pub pts: u64,
    /// Frame duration in nanoseconds
    pub duration: u64,
}

impl RawFrame {
    /// Create a video frame
    pub fn video(data: impl Into<Bytes>, pts: u64, duration: u64) -> Self {
        Self {
            kind: StreamKind::Video,
            data: data.into(),
            pts,
            duration,
        }
    }

    /// Create an audio frame
    pub fn audio(data: impl Into<Bytes>, pts: u64, duration: u64) -> Self {
        Self {
            kind: StreamKind::Audio,
            data: data.into(),
            pts,
            duration,
        }
    }
}

/// One compressed elementary-stream access unit with timing metadata.
///
/// Produced by the encoder, owned by the transport until it is either
/// written to the wire or dropped by the outbound queue policy.
#[derive(Debug, Clone)]
pub struct EncodedUnit {
    /// Which stream this unit belongs to
    pub kind: StreamKind,
    /// Compressed payload
    pub payload: Bytes,
    /// Presentation timestamp in nanoseconds
    pub pts: u64,
    /// Keyframe or delta
    pub flag: UnitFlag,
}

impl EncodedUnit {
    /// Whether this unit must never be dropped from the outbound queue.
    ///
    /// Dropping a video keyframe would corrupt decodability downstream.
    pub fn is_protected(&self) -> bool {
        self.kind == StreamKind::Video && self.flag == UnitFlag::Keyframe
    }
}

/// Session state machine.
///
/// Exactly one authoritative instance per session, mutated only by the
/// session controller and observed read-only via a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Session created, nothing started
    Idle,
    /// Source starting, encoder initializing, handshake in flight
    Connecting,
    /// Media flowing; `paused` suppresses frame submission without
    /// tearing down the connection
    Streaming {
        /// Frame submission suppressed
        paused: bool,
    },
    /// Link broke; handshake retry cycle in progress
    Reconnecting {
        /// Retry attempt number, 1-based
        attempt: u32,
    },
    /// Explicit stop in progress, teardown running
    Stopping,
    /// Session fully torn down
    Stopped,
    /// Unrecoverable failure
    Failed(String),
}

impl SessionState {
    /// Whether the session is in any streaming sub-state
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming { .. })
    }

    /// Whether the session has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Streaming { paused: false } => write!(f, "streaming"),
            SessionState::Streaming { paused: true } => write!(f, "streaming (paused)"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
