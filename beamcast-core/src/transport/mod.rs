//! Transport: connection, handshake, outbound queue, chunked writes
//!
//! The transport owns the network connection. It performs the wire
//! handshake before any media is accepted, frames encoded units into
//! chunks, and detects link degradation from failed writes and a
//! round-trip estimate. Writes are non-blocking against a bounded queue:
//! when the queue is full the oldest non-keyframe unit is dropped and
//! counted. Video keyframes are never silently dropped.

mod chunk;
mod handshake;

pub use chunk::{ChunkHeader, ChunkWriter, HEADER_LEN, TAG_AUDIO, TAG_KEYFRAME, TAG_VIDEO};
pub use handshake::{
    accept_handshake, client_handshake, DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_BLOCK_LEN,
    HANDSHAKE_VERSION,
};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::config::{safe_url, IngestTarget, SessionConfig};
use crate::error::{BeamcastError, Result};
use crate::types::{EncodedUnit, StreamKind};

/// Byte stream the transport writes chunks to (plain TCP or TLS)
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> AsyncStream for T {}

/// What one flush wrote to the wire
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushReport {
    /// Payload bytes written (chunk headers excluded)
    pub payload_bytes: u64,
    /// Video units written
    pub video_units: u64,
    /// Audio units written
    pub audio_units: u64,
}

/// Bounded outbound unit queue with a keyframe-preserving drop policy.
#[derive(Debug)]
pub struct OutboundQueue {
    units: VecDeque<EncodedUnit>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` units
    pub fn new(capacity: usize) -> Self {
        Self {
            units: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Enqueue a unit, never blocking.
    ///
    /// When full, the oldest non-protected unit is evicted and counted.
    /// If every queued unit is a video keyframe the queue grows past its
    /// capacity instead of corrupting decodability. Returns the number of
    /// units dropped by this push.
    pub fn push(&mut self, unit: EncodedUnit) -> u64 {
        let mut dropped = 0;
        if self.units.len() >= self.capacity {
            if let Some(idx) = self.units.iter().position(|u| !u.is_protected()) {
                self.units.remove(idx);
                self.dropped += 1;
                dropped = 1;
                trace!("Outbound queue full, dropped oldest non-keyframe unit");
            }
        }
        self.units.push_back(unit);
        dropped
    }

    /// Dequeue the oldest unit
    pub fn pop(&mut self) -> Option<EncodedUnit> {
        self.units.pop_front()
    }

    /// Number of queued units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unused share of the queue, 0.0 (full) to 1.0 (empty)
    pub fn health(&self) -> f64 {
        let used = self.units.len().min(self.capacity) as f64;
        1.0 - used / self.capacity as f64
    }

    /// Total units evicted by the drop policy
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard all queued units
    pub fn clear(&mut self) {
        self.units.clear();
    }
}

/// The transport seam the session drives.
///
/// `TcpTransport` is the production implementation; tests drive the
/// session against mocks.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection and complete the wire handshake.
    /// No media is accepted until this returns `Ok`.
    async fn connect(&mut self) -> Result<()>;

    /// Queue a unit for sending. Never blocks; applies the
    /// keyframe-preserving drop policy. Returns units dropped.
    fn enqueue(&mut self, unit: EncodedUnit) -> u64;

    /// Write all queued chunks to the wire.
    ///
    /// Fails with [`BeamcastError::Link`] on a write failure or when the
    /// round-trip estimate exceeds its threshold.
    async fn flush(&mut self) -> Result<FlushReport>;

    /// Unused share of the outbound queue, 0.0 to 1.0
    fn buffer_health(&self) -> f64;

    /// Smoothed round-trip estimate for the link
    fn rtt_estimate(&self) -> Duration;

    /// Close the connection. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// TCP (optionally TLS) transport speaking the chunked wire protocol
pub struct TcpTransport {
    target: IngestTarget,
    display_url: String,
    handshake_timeout: Duration,
    rtt_threshold: Duration,
    queue: OutboundQueue,
    chunker: ChunkWriter,
    stream: Option<Box<dyn AsyncStream>>,
    rtt: Duration,
}

impl TcpTransport {
    /// Build a transport from the session configuration
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let url = config.ingest_url()?;
        let target = config.resolve_target()?;
        Ok(Self::for_target(target, safe_url(&url), config.buffer_depth))
    }

    /// Build a transport for an already-resolved target
    pub fn for_target(target: IngestTarget, display_url: String, buffer_depth: usize) -> Self {
        Self {
            target,
            display_url,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            rtt_threshold: Duration::from_secs(3),
            queue: OutboundQueue::new(buffer_depth),
            chunker: ChunkWriter::new(),
            stream: None,
            rtt: Duration::ZERO,
        }
    }

    /// Override the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Override the round-trip degradation threshold
    pub fn with_rtt_threshold(mut self, threshold: Duration) -> Self {
        self.rtt_threshold = threshold;
        self
    }

    async fn open_stream(&self) -> Result<Box<dyn AsyncStream>> {
        let addr = self.target.addr();
        let tcp = tokio::time::timeout(self.handshake_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BeamcastError::link(format!("Connect to {} timed out", addr)))?
            .map_err(|e| BeamcastError::link(format!("Connect to {} failed: {}", addr, e)))?;
        tcp.set_nodelay(true).ok();

        if !self.target.variant.requires_tls() {
            return Ok(Box::new(tcp));
        }

        // TLS is negotiated before any protocol byte is exchanged
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
        let server_name = rustls::pki_types::ServerName::try_from(self.target.host.clone())
            .map_err(|_| {
                BeamcastError::config(format!("Invalid TLS server name '{}'", self.target.host))
            })?;

        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| BeamcastError::link(format!("TLS negotiation failed: {}", e)))?;
        debug!("TLS negotiated with {}", self.target.host);
        Ok(Box::new(tls))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}", self.display_url);
        let mut stream = self.open_stream().await?;
        client_handshake(&mut stream, self.handshake_timeout).await?;

        // A fresh connection restarts the chunk clocks
        self.chunker = ChunkWriter::new();
        self.stream = Some(stream);
        self.rtt = Duration::ZERO;
        info!("Connected to {}", self.display_url);
        Ok(())
    }

    fn enqueue(&mut self, unit: EncodedUnit) -> u64 {
        self.queue.push(unit)
    }

    async fn flush(&mut self) -> Result<FlushReport> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BeamcastError::link("Transport not connected"))?;

        let mut report = FlushReport::default();
        let start = Instant::now();

        // A stalled-but-open peer blocks writes without an error; every
        // write is bounded by the degradation threshold
        while let Some(unit) = self.queue.pop() {
            let chunk = self.chunker.frame(&unit);
            match tokio::time::timeout(self.rtt_threshold, stream.write_all(&chunk)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Keep the unit count honest: this unit was not sent
                    self.stream = None;
                    return Err(BeamcastError::link(format!("Write failed: {}", e)));
                }
                Err(_) => {
                    self.stream = None;
                    return Err(BeamcastError::link(format!(
                        "Write stalled past {:?}",
                        self.rtt_threshold
                    )));
                }
            }
            report.payload_bytes += unit.payload.len() as u64;
            match unit.kind {
                StreamKind::Video => report.video_units += 1,
                StreamKind::Audio => report.audio_units += 1,
            }
        }

        match tokio::time::timeout(self.rtt_threshold, stream.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stream = None;
                return Err(BeamcastError::link(format!("Flush failed: {}", e)));
            }
            Err(_) => {
                self.stream = None;
                return Err(BeamcastError::link(format!(
                    "Flush stalled past {:?}",
                    self.rtt_threshold
                )));
            }
        }

        // Socket backpressure shows up as write latency; use a smoothed
        // estimate as the round-trip proxy
        if report.video_units + report.audio_units > 0 {
            let elapsed = start.elapsed();
            self.rtt = if self.rtt.is_zero() {
                elapsed
            } else {
                (self.rtt * 7 + elapsed) / 8
            };
            if self.rtt > self.rtt_threshold {
                warn!(
                    "Round-trip estimate {:?} exceeds threshold {:?}",
                    self.rtt, self.rtt_threshold
                );
                return Err(BeamcastError::link(format!(
                    "Round-trip estimate {:?} exceeds threshold",
                    self.rtt
                )));
            }
        }

        Ok(report)
    }

    fn buffer_health(&self) -> f64 {
        self.queue.health()
    }

    fn rtt_estimate(&self) -> Duration {
        self.rtt
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            self.queue.clear();
            stream
                .shutdown()
                .await
                .map_err(|e| BeamcastError::link(format!("Shutdown failed: {}", e)))?;
            info!("Disconnected from {}", self.display_url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitFlag;
    use bytes::Bytes;

    fn unit(kind: StreamKind, pts: u64, flag: UnitFlag) -> EncodedUnit {
        EncodedUnit {
            kind,
            payload: Bytes::from_static(b"x"),
            pts,
            flag,
        }
    }

    #[test]
    fn test_queue_drops_oldest_delta() {
        let mut queue = OutboundQueue::new(3);
        queue.push(unit(StreamKind::Video, 0, UnitFlag::Delta));
        queue.push(unit(StreamKind::Video, 1, UnitFlag::Delta));
        queue.push(unit(StreamKind::Video, 2, UnitFlag::Delta));
        let dropped = queue.push(unit(StreamKind::Video, 3, UnitFlag::Delta));

        assert_eq!(dropped, 1);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().pts, 1);
    }

    #[test]
    fn test_queue_never_drops_keyframes() {
        let mut queue = OutboundQueue::new(2);
        queue.push(unit(StreamKind::Video, 0, UnitFlag::Keyframe));
        queue.push(unit(StreamKind::Video, 1, UnitFlag::Keyframe));
        // All queued units are protected: the queue grows instead
        let dropped = queue.push(unit(StreamKind::Video, 2, UnitFlag::Keyframe));

        assert_eq!(dropped, 0);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_keyframe_outlives_saturating_deltas() {
        let mut queue = OutboundQueue::new(4);
        for pts in 0..4 {
            queue.push(unit(StreamKind::Video, pts, UnitFlag::Delta));
        }
        let dropped = queue.push(unit(StreamKind::Video, 4, UnitFlag::Keyframe));

        assert_eq!(dropped, 1);
        assert_eq!(queue.len(), 4);

        let mut drained = Vec::new();
        while let Some(u) = queue.pop() {
            drained.push(u);
        }
        // The oldest delta was evicted; the keyframe goes out
        assert!(drained.iter().any(|u| u.flag == UnitFlag::Keyframe));
        assert_eq!(drained.first().map(|u| u.pts), Some(1));
        assert_eq!(drained.last().map(|u| u.pts), Some(4));
    }

    #[test]
    fn test_queue_health() {
        let mut queue = OutboundQueue::new(4);
        assert!((queue.health() - 1.0).abs() < f64::EPSILON);
        queue.push(unit(StreamKind::Video, 0, UnitFlag::Delta));
        queue.push(unit(StreamKind::Video, 1, UnitFlag::Delta));
        assert!((queue.health() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_flush_requires_connection() {
        let target = IngestTarget::parse("rtmp://localhost/live/key").unwrap();
        let mut transport = TcpTransport::for_target(target, "rtmp://localhost/live/****".into(), 8);
        transport.enqueue(unit(StreamKind::Video, 0, UnitFlag::Keyframe));
        assert!(matches!(
            transport.flush().await.unwrap_err(),
            BeamcastError::Link(_)
        ));
    }
}
