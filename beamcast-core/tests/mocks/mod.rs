//! Mock infrastructure for testing
//!
//! Scriptable frame source and transport implementations plus a shared
//! event log for asserting teardown ordering.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use beamcast_core::encode::EncoderBackend;
use beamcast_core::error::{BeamcastError, Result};
use beamcast_core::source::FrameSource;
use beamcast_core::transport::{FlushReport, OutboundQueue, Transport};
use beamcast_core::types::{EncodedUnit, RawFrame, StreamKind};

/// Shared log of lifecycle events, in call order
pub type EventLog = Arc<Mutex<Vec<&'static str>>>;

/// Create an empty event log
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Create a small test video frame with the given timestamp
pub fn video_frame(pts: u64) -> RawFrame {
    RawFrame::video(Bytes::from(vec![0x42u8; 4096]), pts, 33_333_333)
}

/// Create a small test audio frame with the given timestamp
pub fn audio_frame(pts: u64) -> RawFrame {
    RawFrame::audio(Bytes::from(vec![0x11u8; 1920]), pts, 20_000_000)
}

/// Frame source backed by pre-loaded queues the test can refill
pub struct MockSource {
    video: Arc<Mutex<VecDeque<RawFrame>>>,
    audio: Arc<Mutex<VecDeque<RawFrame>>>,
    events: EventLog,
    running: bool,
}

/// Test-side handle for feeding a [`MockSource`]
#[derive(Clone)]
pub struct MockFeeder {
    video: Arc<Mutex<VecDeque<RawFrame>>>,
    audio: Arc<Mutex<VecDeque<RawFrame>>>,
}

impl MockFeeder {
    pub fn push_video(&self, frame: RawFrame) {
        self.video.lock().push_back(frame);
    }

    pub fn push_audio(&self, frame: RawFrame) {
        self.audio.lock().push_back(frame);
    }
}

impl MockSource {
    pub fn new(events: EventLog) -> (Self, MockFeeder) {
        let video = Arc::new(Mutex::new(VecDeque::new()));
        let audio = Arc::new(Mutex::new(VecDeque::new()));
        let feeder = MockFeeder {
            video: video.clone(),
            audio: audio.clone(),
        };
        (
            Self {
                video,
                audio,
                events,
                running: false,
            },
            feeder,
        )
    }
}

impl FrameSource for MockSource {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.events.lock().push("source_start");
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.events.lock().push("source_stop");
        }
    }

    fn next_video_frame(&mut self) -> Option<RawFrame> {
        if !self.running {
            return None;
        }
        self.video.lock().pop_front()
    }

    fn next_audio_frame(&mut self) -> Option<RawFrame> {
        if !self.running {
            return None;
        }
        self.audio.lock().pop_front()
    }
}

/// Backend that refuses every frame, as a fully saturated encoder does
pub struct SaturatingBackend;

impl EncoderBackend for SaturatingBackend {
    fn name(&self) -> &'static str {
        "saturating"
    }

    fn encode(&mut self, _frame: &RawFrame, _keyframe: bool) -> Result<Option<Bytes>> {
        Ok(None)
    }

    fn set_bitrate(&mut self, _kbps: u32) {}
}

/// Transport that records sent units and follows a scripted outcome list
pub struct MockTransport {
    /// Scripted connect outcomes, consumed front-first; empty means `Ok`
    connect_script: VecDeque<Result<()>>,
    /// Remaining flushes that fail with a link error
    failing_flushes: u32,
    queue: OutboundQueue,
    sent: Arc<Mutex<Vec<EncodedUnit>>>,
    events: EventLog,
    connected: bool,
}

impl MockTransport {
    pub fn new(events: EventLog) -> Self {
        Self {
            connect_script: VecDeque::new(),
            failing_flushes: 0,
            queue: OutboundQueue::new(64),
            sent: Arc::new(Mutex::new(Vec::new())),
            events,
            connected: false,
        }
    }

    /// Script the outcomes of upcoming connect calls
    pub fn with_connect_script(mut self, script: Vec<Result<()>>) -> Self {
        self.connect_script = script.into();
        self
    }

    /// Make the next `n` flush calls fail with a link error
    pub fn with_failing_flushes(mut self, n: u32) -> Self {
        self.failing_flushes = n;
        self
    }

    /// Handle to the units the transport has "sent"
    pub fn sent(&self) -> Arc<Mutex<Vec<EncodedUnit>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        self.events.lock().push("connect");
        match self.connect_script.pop_front() {
            Some(Ok(())) | None => {
                self.connected = true;
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    fn enqueue(&mut self, unit: EncodedUnit) -> u64 {
        self.queue.push(unit)
    }

    async fn flush(&mut self) -> Result<FlushReport> {
        if !self.connected {
            return Err(BeamcastError::link("not connected"));
        }
        if self.failing_flushes > 0 {
            self.failing_flushes -= 1;
            self.connected = false;
            return Err(BeamcastError::link("scripted link failure"));
        }

        let mut report = FlushReport::default();
        let mut sent = self.sent.lock();
        while let Some(unit) = self.queue.pop() {
            report.payload_bytes += unit.payload.len() as u64;
            match unit.kind {
                StreamKind::Video => report.video_units += 1,
                StreamKind::Audio => report.audio_units += 1,
            }
            sent.push(unit);
        }
        Ok(report)
    }

    fn buffer_health(&self) -> f64 {
        self.queue.health()
    }

    fn rtt_estimate(&self) -> Duration {
        Duration::from_millis(20)
    }

    async fn close(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            self.events.lock().push("close");
        }
        Ok(())
    }
}
