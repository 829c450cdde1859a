//! Encoder backend seam
//!
//! Compression itself sits behind a trait so that software and hardware
//! backends produce equivalent unit semantics. The built-in software
//! backend is a deterministic constant-bitrate slicer; accelerated
//! backends plug in through the same trait.

use bytes::Bytes;
use tracing::warn;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::types::{RawFrame, StreamKind};

/// A compression backend for one elementary stream.
pub trait EncoderBackend: Send {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Compress one frame. Returns `None` when the backend is saturated
    /// and the frame should be dropped; never blocks the caller.
    fn encode(&mut self, frame: &RawFrame, keyframe: bool) -> Result<Option<Bytes>>;

    /// Retarget the output bitrate without re-initialization
    fn set_bitrate(&mut self, kbps: u32);
}

/// Deterministic software backend.
///
/// Emits a payload sized from the target bitrate: for video,
/// `bitrate / fps` bytes per delta unit with keyframes three times larger;
/// for audio, sized from the frame duration. The payload is a prefix slice
/// of the raw data, which keeps the output a pure function of its inputs.
pub struct SoftwareBackend {
    kind: StreamKind,
    bitrate_kbps: u32,
    fps: u32,
}

impl SoftwareBackend {
    /// Software video backend
    pub fn video(bitrate_kbps: u32, fps: u32) -> Self {
        Self {
            kind: StreamKind::Video,
            bitrate_kbps,
            fps: fps.max(1),
        }
    }

    /// Software audio backend
    pub fn audio(bitrate_kbps: u32) -> Self {
        Self {
            kind: StreamKind::Audio,
            bitrate_kbps,
            fps: 0,
        }
    }

    fn budget(&self, frame: &RawFrame, keyframe: bool) -> usize {
        let bytes_per_second = (self.bitrate_kbps as u64 * 1000) / 8;
        let budget = match self.kind {
            StreamKind::Video => {
                let per_frame = bytes_per_second / self.fps as u64;
                if keyframe {
                    per_frame * 3
                } else {
                    per_frame
                }
            }
            StreamKind::Audio => {
                // Scale by the frame's own duration
                (bytes_per_second * frame.duration.max(1)) / 1_000_000_000
            }
        };
        (budget as usize).max(1)
    }
}

impl EncoderBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn encode(&mut self, frame: &RawFrame, keyframe: bool) -> Result<Option<Bytes>> {
        let len = self.budget(frame, keyframe).min(frame.data.len());
        Ok(Some(frame.data.slice(0..len)))
    }

    fn set_bitrate(&mut self, kbps: u32) {
        self.bitrate_kbps = kbps;
    }
}

/// Select the video backend from the session configuration.
///
/// Hardware acceleration is a preference, not a contract change; when no
/// accelerated backend is built in, the software backend is used.
pub fn select_backend(config: &SessionConfig) -> Box<dyn EncoderBackend> {
    if config.hardware_encoder {
        warn!("Hardware encoder requested but no accelerated backend is available; using software");
    }
    Box::new(SoftwareBackend::video(
        config.effective_bitrate(),
        config.fps(),
    ))
}

/// Select the audio backend from the session configuration
pub fn audio_backend(config: &SessionConfig) -> Box<dyn EncoderBackend> {
    Box::new(SoftwareBackend::audio(config.effective_audio_bitrate()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_budget_tracks_bitrate() {
        let mut backend = SoftwareBackend::video(2400, 30);
        let frame = RawFrame::video(Bytes::from(vec![0u8; 1 << 20]), 0, 33_333_333);

        // 2400 kbps / 8 / 30 fps = 10000 bytes per delta frame
        let delta = backend.encode(&frame, false).unwrap().unwrap();
        assert_eq!(delta.len(), 10_000);

        let key = backend.encode(&frame, true).unwrap().unwrap();
        assert_eq!(key.len(), 30_000);

        backend.set_bitrate(1200);
        let smaller = backend.encode(&frame, false).unwrap().unwrap();
        assert_eq!(smaller.len(), 5_000);
    }

    #[test]
    fn test_audio_budget_tracks_duration() {
        let mut backend = SoftwareBackend::audio(128);
        // 20 ms frame at 128 kbps = 320 bytes
        let frame = RawFrame::audio(Bytes::from(vec![0u8; 8192]), 0, 20_000_000);
        let unit = backend.encode(&frame, false).unwrap().unwrap();
        assert_eq!(unit.len(), 320);
    }
}
