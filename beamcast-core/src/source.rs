//! Frame source seam and capture handoff queues
//!
//! The core never depends on a particular capture callback ABI; it only
//! requires a source of timestamped frames. Capture, permissions, and
//! filter chains live behind [`FrameSource`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;
use crate::types::RawFrame;

/// A source of timestamped raw frames, polled non-blockingly by the session.
///
/// Implementations are injected by whoever composes the pipeline: a real
/// capture device, a push-queue adapter ([`QueueSource`]), or a synthetic
/// test pattern.
pub trait FrameSource: Send {
    /// Start producing frames
    fn start(&mut self) -> Result<()>;

    /// Stop producing frames. Must be idempotent.
    fn stop(&mut self);

    /// Next pending video frame, if any. Never blocks.
    fn next_video_frame(&mut self) -> Option<RawFrame>;

    /// Next pending audio frame, if any. Never blocks.
    fn next_audio_frame(&mut self) -> Option<RawFrame>;

    /// Total frames this source has discarded on overflow. Monotonic;
    /// the session folds the running difference into its drop counter.
    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// Bounded single-producer/single-consumer frame queue.
///
/// `push` never blocks the capture context: on overflow the oldest pending
/// frame is evicted and counted, so the newest frame always lands. This
/// bounds end-to-end latency instead of growing a backlog.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<RawFrame>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a frame, evicting the oldest pending frame when full.
    ///
    /// Returns `true` if a frame was evicted.
    pub fn push(&self, frame: RawFrame) -> bool {
        let mut frames = self.frames.lock();
        let evicted = if frames.len() >= self.capacity {
            frames.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };
        frames.push_back(frame);
        if evicted {
            trace!("Frame queue full, evicted oldest pending frame");
        }
        evicted
    }

    /// Pop the oldest pending frame
    pub fn pop(&self) -> Option<RawFrame> {
        self.frames.lock().pop_front()
    }

    /// Number of pending frames
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Total frames evicted on overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard all pending frames
    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

/// Producer handle for a [`QueueSource`], held by the capture context.
#[derive(Clone)]
pub struct FramePusher {
    video: Arc<FrameQueue>,
    audio: Arc<FrameQueue>,
}

impl FramePusher {
    /// Push a video frame (never blocks)
    pub fn push_video(&self, frame: RawFrame) -> bool {
        self.video.push(frame)
    }

    /// Push an audio frame (never blocks)
    pub fn push_audio(&self, frame: RawFrame) -> bool {
        self.audio.push(frame)
    }
}

/// Adapter turning push-style capture callbacks into a pollable
/// [`FrameSource`] via a pair of bounded per-stream queues.
pub struct QueueSource {
    video: Arc<FrameQueue>,
    audio: Arc<FrameQueue>,
    running: bool,
}

impl QueueSource {
    /// Create a queue-backed source with the given per-stream depth
    pub fn new(depth: usize) -> (Self, FramePusher) {
        let video = Arc::new(FrameQueue::new(depth));
        let audio = Arc::new(FrameQueue::new(depth));
        let pusher = FramePusher {
            video: video.clone(),
            audio: audio.clone(),
        };
        (
            Self {
                video,
                audio,
                running: false,
            },
            pusher,
        )
    }
}

impl FrameSource for QueueSource {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.video.clear();
        self.audio.clear();
    }

    fn next_video_frame(&mut self) -> Option<RawFrame> {
        if !self.running {
            return None;
        }
        self.video.pop()
    }

    fn next_audio_frame(&mut self) -> Option<RawFrame> {
        if !self.running {
            return None;
        }
        self.audio.pop()
    }

    fn dropped_frames(&self) -> u64 {
        self.video.dropped() + self.audio.dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamKind;
    use bytes::Bytes;

    fn frame(pts: u64) -> RawFrame {
        RawFrame::video(Bytes::from_static(b"test"), pts, 33_333_333)
    }

    #[test]
    fn test_queue_overflow_keeps_newest() {
        let queue = FrameQueue::new(3);
        for pts in 0..5 {
            queue.push(frame(pts));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        // Oldest two (pts 0, 1) were evicted
        assert_eq!(queue.pop().unwrap().pts, 2);
        assert_eq!(queue.pop().unwrap().pts, 3);
        assert_eq!(queue.pop().unwrap().pts, 4);
    }

    #[test]
    fn test_queue_source_roundtrip() {
        let (mut source, pusher) = QueueSource::new(8);
        source.start().unwrap();

        pusher.push_video(frame(100));
        pusher.push_audio(RawFrame::audio(Bytes::from_static(b"pcm"), 50, 21_333_333));

        let video = source.next_video_frame().unwrap();
        assert_eq!(video.pts, 100);
        assert_eq!(video.kind, StreamKind::Video);

        let audio = source.next_audio_frame().unwrap();
        assert_eq!(audio.kind, StreamKind::Audio);

        assert!(source.next_video_frame().is_none());
    }

    #[test]
    fn test_source_reports_evictions_across_streams() {
        let (source, pusher) = QueueSource::new(2);
        for pts in 0..5 {
            pusher.push_video(frame(pts));
        }
        pusher.push_audio(RawFrame::audio(Bytes::from_static(b"pcm"), 0, 20_000_000));
        // Three video evictions, audio queue still has room
        assert_eq!(source.dropped_frames(), 3);
    }

    #[test]
    fn test_stopped_source_returns_nothing() {
        let (mut source, pusher) = QueueSource::new(8);
        source.start().unwrap();
        pusher.push_video(frame(1));
        source.stop();
        assert!(source.next_video_frame().is_none());
    }
}
