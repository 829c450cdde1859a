//! Video and audio encoding
//!
//! The encoder enforces the live-pipeline contract: one frame in at a time,
//! units out in presentation order, a forced keyframe every
//! `frame_rate * keyframe_interval` frames, and drop-and-count semantics
//! when the backend is saturated. The actual compression is behind
//! [`EncoderBackend`], so hardware acceleration is a configuration
//! preference rather than a contract change.

mod backend;

pub use backend::{select_backend, EncoderBackend, SoftwareBackend};

use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{BeamcastError, Result};
use crate::types::{EncodedUnit, RawFrame, StreamKind, UnitFlag};

/// Result of submitting one frame to an encoder
#[derive(Debug)]
pub enum EncodeOutcome {
    /// Frame compressed into a unit
    Unit(EncodedUnit),
    /// Backend saturated; frame dropped and counted, caller not blocked
    Dropped,
}

/// Video encoder with keyframe cadence and drop-and-count semantics
pub struct VideoEncoder {
    backend: Box<dyn EncoderBackend>,
    cadence: u64,
    frame_index: u64,
    bitrate: u32,
    last_pts: Option<u64>,
    units_encoded: u64,
    units_dropped: u64,
}

impl VideoEncoder {
    /// Create a video encoder from the session configuration
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if config.width() == 0 || config.height() == 0 || config.fps() == 0 {
            return Err(BeamcastError::encode_init(format!(
                "Invalid video format {}x{}@{}",
                config.width(),
                config.height(),
                config.fps()
            )));
        }

        let backend = select_backend(config);
        debug!(
            "Video encoder initialized: {} {}x{}@{}fps, {} kbps, keyframe every {} frames",
            backend.name(),
            config.width(),
            config.height(),
            config.fps(),
            config.effective_bitrate(),
            config.keyframe_cadence()
        );

        Ok(Self {
            backend,
            cadence: config.keyframe_cadence(),
            frame_index: 0,
            bitrate: config.effective_bitrate(),
            last_pts: None,
            units_encoded: 0,
            units_dropped: 0,
        })
    }

    /// Create an encoder with an explicit backend (tests, hardware plugins)
    pub fn with_backend(backend: Box<dyn EncoderBackend>, cadence: u64, bitrate: u32) -> Self {
        Self {
            backend,
            cadence: cadence.max(1),
            frame_index: 0,
            bitrate,
            last_pts: None,
            units_encoded: 0,
            units_dropped: 0,
        }
    }

    /// Encode one raw video frame.
    ///
    /// Units are emitted in presentation order; reordering is disabled to
    /// keep end-to-end latency deterministic. A saturated backend results
    /// in [`EncodeOutcome::Dropped`] without blocking the caller.
    pub fn encode(&mut self, frame: &RawFrame) -> Result<EncodeOutcome> {
        if frame.kind != StreamKind::Video {
            return Err(BeamcastError::encode("Video encoder fed a non-video frame"));
        }
        if let Some(last) = self.last_pts {
            if frame.pts < last {
                return Err(BeamcastError::encode(format!(
                    "Out-of-order frame: pts {} after {}",
                    frame.pts, last
                )));
            }
        }

        let keyframe = self.frame_index % self.cadence == 0;
        self.frame_index += 1;

        match self.backend.encode(frame, keyframe)? {
            Some(payload) => {
                self.last_pts = Some(frame.pts);
                self.units_encoded += 1;
                trace!(
                    "Encoded video unit: pts={} keyframe={} {} bytes",
                    frame.pts,
                    keyframe,
                    payload.len()
                );
                Ok(EncodeOutcome::Unit(EncodedUnit {
                    kind: StreamKind::Video,
                    payload,
                    pts: frame.pts,
                    flag: if keyframe {
                        UnitFlag::Keyframe
                    } else {
                        UnitFlag::Delta
                    },
                }))
            }
            None => {
                self.units_dropped += 1;
                trace!("Video backend saturated, dropped frame pts={}", frame.pts);
                Ok(EncodeOutcome::Dropped)
            }
        }
    }

    /// Retarget the encoder bitrate without interrupting the stream
    pub fn set_bitrate(&mut self, kbps: u32) {
        if kbps != self.bitrate {
            debug!("Video bitrate retargeted: {} -> {} kbps", self.bitrate, kbps);
            self.bitrate = kbps;
            self.backend.set_bitrate(kbps);
        }
    }

    /// Current target bitrate in kbps
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Units encoded so far
    pub fn units_encoded(&self) -> u64 {
        self.units_encoded
    }

    /// Frames dropped due to backend saturation
    pub fn units_dropped(&self) -> u64 {
        self.units_dropped
    }
}

/// Audio encoder. Every audio unit is self-contained, so there is no
/// keyframe cadence; the rest of the contract matches the video path.
pub struct AudioEncoder {
    backend: Box<dyn EncoderBackend>,
    bitrate: u32,
    last_pts: Option<u64>,
    units_encoded: u64,
    units_dropped: u64,
}

impl AudioEncoder {
    /// Create an audio encoder from the session configuration
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if config.sample_rate == 0 || config.channels == 0 {
            return Err(BeamcastError::encode_init(format!(
                "Invalid audio format {}Hz/{}ch",
                config.sample_rate, config.channels
            )));
        }

        let backend = backend::audio_backend(config);
        debug!(
            "Audio encoder initialized: {} {} {}Hz/{}ch @ {} kbps",
            backend.name(),
            config.audio_codec,
            config.sample_rate,
            config.channels,
            config.effective_audio_bitrate()
        );

        Ok(Self {
            backend,
            bitrate: config.effective_audio_bitrate(),
            last_pts: None,
            units_encoded: 0,
            units_dropped: 0,
        })
    }

    /// Create an encoder with an explicit backend
    pub fn with_backend(backend: Box<dyn EncoderBackend>, bitrate: u32) -> Self {
        Self {
            backend,
            bitrate,
            last_pts: None,
            units_encoded: 0,
            units_dropped: 0,
        }
    }

    /// Encode one raw audio frame
    pub fn encode(&mut self, frame: &RawFrame) -> Result<EncodeOutcome> {
        if frame.kind != StreamKind::Audio {
            return Err(BeamcastError::encode("Audio encoder fed a non-audio frame"));
        }
        if let Some(last) = self.last_pts {
            if frame.pts < last {
                return Err(BeamcastError::encode(format!(
                    "Out-of-order frame: pts {} after {}",
                    frame.pts, last
                )));
            }
        }

        match self.backend.encode(frame, false)? {
            Some(payload) => {
                self.last_pts = Some(frame.pts);
                self.units_encoded += 1;
                Ok(EncodeOutcome::Unit(EncodedUnit {
                    kind: StreamKind::Audio,
                    payload,
                    pts: frame.pts,
                    // Audio units are self-contained
                    flag: UnitFlag::Keyframe,
                }))
            }
            None => {
                self.units_dropped += 1;
                warn!("Audio backend saturated, dropped frame pts={}", frame.pts);
                Ok(EncodeOutcome::Dropped)
            }
        }
    }

    /// Current target bitrate in kbps
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Units encoded so far
    pub fn units_encoded(&self) -> u64 {
        self.units_encoded
    }

    /// Frames dropped due to backend saturation
    pub fn units_dropped(&self) -> u64 {
        self.units_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn video_frame(pts: u64) -> RawFrame {
        RawFrame::video(Bytes::from(vec![0u8; 64 * 1024]), pts, 33_333_333)
    }

    fn test_encoder(cadence: u64) -> VideoEncoder {
        VideoEncoder::with_backend(Box::new(SoftwareBackend::video(4000, 30)), cadence, 4000)
    }

    #[test]
    fn test_keyframe_cadence() {
        let mut enc = test_encoder(30);
        let mut keyframes = Vec::new();
        for i in 0..90u64 {
            match enc.encode(&video_frame(i * 33_333_333)).unwrap() {
                EncodeOutcome::Unit(unit) => {
                    if unit.flag == UnitFlag::Keyframe {
                        keyframes.push(i);
                    }
                }
                EncodeOutcome::Dropped => panic!("software backend should not saturate"),
            }
        }
        assert_eq!(keyframes, vec![0, 30, 60]);
    }

    #[test]
    fn test_presentation_order_enforced() {
        let mut enc = test_encoder(30);
        enc.encode(&video_frame(1000)).unwrap();
        assert!(enc.encode(&video_frame(500)).is_err());
    }

    #[test]
    fn test_wrong_stream_kind_rejected() {
        let mut enc = test_encoder(30);
        let audio = RawFrame::audio(Bytes::from_static(b"pcm"), 0, 0);
        assert!(enc.encode(&audio).is_err());
    }

    #[test]
    fn test_bitrate_retarget_shrinks_units() {
        let mut enc = test_encoder(30);
        // Skip the keyframe so both samples are delta-sized
        enc.encode(&video_frame(0)).unwrap();
        let before = match enc.encode(&video_frame(1)).unwrap() {
            EncodeOutcome::Unit(u) => u.payload.len(),
            EncodeOutcome::Dropped => unreachable!(),
        };
        enc.set_bitrate(1000);
        let after = match enc.encode(&video_frame(2)).unwrap() {
            EncodeOutcome::Unit(u) => u.payload.len(),
            EncodeOutcome::Dropped => unreachable!(),
        };
        assert!(after < before);
    }
}
