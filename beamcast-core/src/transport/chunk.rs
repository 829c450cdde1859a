//! Media chunk framing
//!
//! Each encoded unit is wrapped in a chunk: one type-tag byte, a 4-byte
//! big-endian timestamp delta in milliseconds, a 4-byte big-endian payload
//! length, then the payload. Video and audio run on independent timestamp
//! bases, both anchored to a single wall-clock reference captured when the
//! stream starts.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BeamcastError, Result};
use crate::types::{EncodedUnit, StreamKind, UnitFlag};

/// Type tag for audio chunks
pub const TAG_AUDIO: u8 = 0x08;
/// Type tag for video chunks
pub const TAG_VIDEO: u8 = 0x09;
/// Keyframe bit, OR-ed into the video tag
pub const TAG_KEYFRAME: u8 = 0x40;

/// Fixed chunk header length in bytes
pub const HEADER_LEN: usize = 9;

/// Per-stream timestamp base
#[derive(Debug, Default)]
struct StreamClock {
    /// pts of the first unit on this stream, in nanoseconds
    epoch_pts: Option<u64>,
    /// milliseconds of the previously framed unit
    last_ms: u32,
}

impl StreamClock {
    /// Milliseconds since the stream epoch for `pts`, and the delta from
    /// the previous unit
    fn advance(&mut self, pts: u64) -> u32 {
        let epoch = *self.epoch_pts.get_or_insert(pts);
        let ms = (pts.saturating_sub(epoch) / 1_000_000) as u32;
        let delta = ms.saturating_sub(self.last_ms);
        self.last_ms = ms;
        delta
    }
}

/// Frames encoded units into wire chunks, one clock per stream
#[derive(Debug, Default)]
pub struct ChunkWriter {
    video: StreamClock,
    audio: StreamClock,
}

impl ChunkWriter {
    /// Create a chunk writer; the first unit per stream anchors its clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame one unit into a wire chunk
    pub fn frame(&mut self, unit: &EncodedUnit) -> Bytes {
        let clock = match unit.kind {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => &mut self.audio,
        };
        let delta = clock.advance(unit.pts);

        let mut tag = match unit.kind {
            StreamKind::Video => TAG_VIDEO,
            StreamKind::Audio => TAG_AUDIO,
        };
        if unit.kind == StreamKind::Video && unit.flag == UnitFlag::Keyframe {
            tag |= TAG_KEYFRAME;
        }

        let mut chunk = BytesMut::with_capacity(HEADER_LEN + unit.payload.len());
        chunk.put_u8(tag);
        chunk.put_u32(delta);
        chunk.put_u32(unit.payload.len() as u32);
        chunk.put_slice(&unit.payload);
        chunk.freeze()
    }
}

/// A parsed chunk header (used by tests and loopback peers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Which stream the chunk belongs to
    pub kind: StreamKind,
    /// Keyframe bit (video only)
    pub keyframe: bool,
    /// Timestamp delta in milliseconds
    pub timestamp_delta: u32,
    /// Payload length in bytes
    pub payload_len: usize,
}

impl ChunkHeader {
    /// Parse a chunk header from the front of `buf`, advancing it
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(BeamcastError::link("Truncated chunk header"));
        }
        let tag = buf.get_u8();
        let kind = match tag & 0x0f {
            TAG_AUDIO => StreamKind::Audio,
            TAG_VIDEO => StreamKind::Video,
            other => {
                return Err(BeamcastError::link(format!(
                    "Unknown chunk type tag {:#04x}",
                    other
                )))
            }
        };
        Ok(Self {
            kind,
            keyframe: tag & TAG_KEYFRAME != 0,
            timestamp_delta: buf.get_u32(),
            payload_len: buf.get_u32() as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(kind: StreamKind, pts: u64, flag: UnitFlag) -> EncodedUnit {
        EncodedUnit {
            kind,
            payload: Bytes::from_static(b"payload"),
            pts,
            flag,
        }
    }

    #[test]
    fn test_frame_and_parse_roundtrip() {
        let mut writer = ChunkWriter::new();
        let mut chunk = writer.frame(&unit(StreamKind::Video, 0, UnitFlag::Keyframe));

        let header = ChunkHeader::parse(&mut chunk).unwrap();
        assert_eq!(header.kind, StreamKind::Video);
        assert!(header.keyframe);
        assert_eq!(header.timestamp_delta, 0);
        assert_eq!(header.payload_len, 7);
        assert_eq!(&chunk[..], b"payload");
    }

    #[test]
    fn test_independent_stream_clocks() {
        let mut writer = ChunkWriter::new();

        // Video anchors at pts 1s, audio at pts 2s
        writer.frame(&unit(StreamKind::Video, 1_000_000_000, UnitFlag::Keyframe));
        writer.frame(&unit(StreamKind::Audio, 2_000_000_000, UnitFlag::Keyframe));

        // 33ms later on video, 20ms later on audio: deltas are per-stream
        let mut v = writer.frame(&unit(StreamKind::Video, 1_033_000_000, UnitFlag::Delta));
        let mut a = writer.frame(&unit(StreamKind::Audio, 2_020_000_000, UnitFlag::Keyframe));

        assert_eq!(ChunkHeader::parse(&mut v).unwrap().timestamp_delta, 33);
        assert_eq!(ChunkHeader::parse(&mut a).unwrap().timestamp_delta, 20);
    }

    #[test]
    fn test_audio_never_carries_keyframe_bit() {
        let mut writer = ChunkWriter::new();
        let mut chunk = writer.frame(&unit(StreamKind::Audio, 0, UnitFlag::Keyframe));
        let header = ChunkHeader::parse(&mut chunk).unwrap();
        assert_eq!(header.kind, StreamKind::Audio);
        assert!(!header.keyframe);
    }
}
