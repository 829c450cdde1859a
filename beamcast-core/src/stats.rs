//! Session statistics
//!
//! Monotonic counters updated by the encoder and transport on their own
//! execution contexts, turned into an immutable snapshot once per tick.
//! Counters are never reset mid-session; a new session starts a new set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Immutable point-in-time view of session health.
///
/// Rebuilt every sampling tick and published whole; never mutated in place.
#[derive(Debug, Clone)]
pub struct StatisticsSnapshot {
    /// Time since the session started
    pub duration: Duration,
    /// Total payload bytes written to the wire
    pub bytes_sent: u64,
    /// Video frames successfully sent
    pub frames_sent: u64,
    /// Frames dropped anywhere in the pipeline (capture overflow, encoder
    /// saturation, outbound queue eviction)
    pub frames_dropped: u64,
    /// Current encoder target bitrate in kbps
    pub current_bitrate_kbps: u32,
    /// Average bitrate over the whole session in kbps
    pub average_bitrate_kbps: u64,
    /// Video frames per second over the whole session
    pub fps: f64,
    /// Round-trip estimate for the transport link
    pub rtt: Duration,
    /// Unused share of the outbound queue, 0.0 (full) to 1.0 (empty)
    pub buffer_health: f64,
}

impl std::fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.0}s | {:.1} fps | {} kbps (avg {}) | {} frames, {} dropped | rtt {:.0}ms | buffer {:.0}%",
            self.duration.as_secs_f64(),
            self.fps,
            self.current_bitrate_kbps,
            self.average_bitrate_kbps,
            self.frames_sent,
            self.frames_dropped,
            self.rtt.as_secs_f64() * 1000.0,
            self.buffer_health * 100.0
        )
    }
}

/// Thread-safe counter set for one session.
#[derive(Debug)]
pub struct StatsCollector {
    start: Instant,
    bytes_sent: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    current_bitrate_kbps: AtomicU64,
    rtt_micros: AtomicU64,
    buffer_health_permille: AtomicU64,
}

impl StatsCollector {
    /// Create a collector anchored to now
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// Create a collector anchored to an explicit session start
    pub fn with_start(start: Instant) -> Self {
        Self {
            start,
            bytes_sent: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            current_bitrate_kbps: AtomicU64::new(0),
            rtt_micros: AtomicU64::new(0),
            buffer_health_permille: AtomicU64::new(1000),
        }
    }

    /// Record payload bytes written to the wire
    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record video frames successfully sent
    pub fn record_frames_sent(&self, frames: u64) {
        self.frames_sent.fetch_add(frames, Ordering::Relaxed);
    }

    /// Record dropped frames
    pub fn record_frames_dropped(&self, frames: u64) {
        self.frames_dropped.fetch_add(frames, Ordering::Relaxed);
    }

    /// Publish the current encoder target bitrate
    pub fn set_current_bitrate(&self, kbps: u32) {
        self.current_bitrate_kbps.store(kbps as u64, Ordering::Relaxed);
    }

    /// Publish the latest round-trip estimate
    pub fn set_rtt(&self, rtt: Duration) {
        self.rtt_micros.store(rtt.as_micros() as u64, Ordering::Relaxed);
    }

    /// Publish the outbound buffer health (0.0 full, 1.0 empty)
    pub fn set_buffer_health(&self, health: f64) {
        let permille = (health.clamp(0.0, 1.0) * 1000.0) as u64;
        self.buffer_health_permille.store(permille, Ordering::Relaxed);
    }

    /// Total frames sent so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Total frames dropped so far
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Total bytes sent so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Latest published buffer health
    pub fn buffer_health(&self) -> f64 {
        self.buffer_health_permille.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Build an immutable snapshot of the counters as of now
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let duration = self.start.elapsed();
        let secs = duration.as_secs_f64();
        let bytes = self.bytes_sent.load(Ordering::Relaxed);
        let frames = self.frames_sent.load(Ordering::Relaxed);

        StatisticsSnapshot {
            duration,
            bytes_sent: bytes,
            frames_sent: frames,
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            current_bitrate_kbps: self.current_bitrate_kbps.load(Ordering::Relaxed) as u32,
            average_bitrate_kbps: if secs > 0.0 {
                ((bytes * 8) as f64 / secs / 1000.0) as u64
            } else {
                0
            },
            fps: if secs > 0.0 { frames as f64 / secs } else { 0.0 },
            rtt: Duration::from_micros(self.rtt_micros.load(Ordering::Relaxed)),
            buffer_health: self.buffer_health(),
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = StatsCollector::new();
        stats.record_bytes(1000);
        stats.record_bytes(500);
        stats.record_frames_sent(10);
        stats.record_frames_dropped(2);

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_sent, 1500);
        assert_eq!(snap.frames_sent, 10);
        assert_eq!(snap.frames_dropped, 2);
    }

    #[test]
    fn test_derived_rates() {
        let stats = StatsCollector::with_start(Instant::now() - Duration::from_secs(10));
        stats.record_frames_sent(300);
        stats.record_bytes(5_000_000);

        let snap = stats.snapshot();
        assert!((snap.fps - 30.0).abs() < 0.5);
        // 5 MB over 10 s = 4000 kbps
        assert!((snap.average_bitrate_kbps as i64 - 4000).abs() < 100);
    }

    #[test]
    fn test_buffer_health_clamped() {
        let stats = StatsCollector::new();
        stats.set_buffer_health(1.5);
        assert!((stats.buffer_health() - 1.0).abs() < f64::EPSILON);
        stats.set_buffer_health(-0.1);
        assert!(stats.buffer_health().abs() < f64::EPSILON);
    }
}
