//! Streaming session controller
//!
//! Owns the capture-encode-transport pipeline for one push session and is
//! the only writer of the session state machine. Callers drive the session
//! with `start` / `process` / `stop` and observe it through watch and
//! broadcast subscriptions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::abr::AdaptiveBitrate;
use crate::config::SessionConfig;
use crate::encode::{AudioEncoder, EncodeOutcome, EncoderBackend, VideoEncoder};
use crate::error::{BeamcastError, Result};
use crate::source::FrameSource;
use crate::stats::{StatisticsSnapshot, StatsCollector};
use crate::transport::{TcpTransport, Transport};
use crate::types::{EncodedUnit, Handle, SessionState};

/// Link-break retries before the session gives up
const RECONNECT_ATTEMPTS: u32 = 3;
/// Backoff before the first retry; doubles per attempt
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Backoff ceiling
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Statistics sampling period
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// One push-streaming session.
///
/// Created idle; `start` brings up the source, encoders, and transport,
/// then `process` is called in a loop until it returns `false`. The
/// session never transitions state from a subscriber context.
pub struct Session {
    handle: Handle,
    config: SessionConfig,
    source: Box<dyn FrameSource>,
    transport: Box<dyn Transport>,
    video_encoder: Option<VideoEncoder>,
    audio_encoder: Option<AudioEncoder>,
    video_backend: Option<Box<dyn EncoderBackend>>,
    audio_backend: Option<Box<dyn EncoderBackend>>,
    state_tx: watch::Sender<SessionState>,
    stats: Arc<StatsCollector>,
    stats_tx: broadcast::Sender<StatisticsSnapshot>,
    units_tx: broadcast::Sender<Arc<EncodedUnit>>,
    stats_task: Option<JoinHandle<()>>,
    abr_rx: Option<mpsc::UnboundedReceiver<u32>>,
    source_drops_seen: u64,
    reconnect_attempts: u32,
    reconnect_base_delay: Duration,
    stats_interval: Duration,
    poll_interval: Duration,
    start_time: Option<Instant>,
}

impl Session {
    /// Create a session streaming to the configured ingest endpoint
    pub fn new(config: SessionConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        config.validate()?;
        let transport = Box::new(TcpTransport::new(&config)?);
        Ok(Self::with_transport(config, source, transport))
    }

    /// Create a session with an explicit transport (tests, loopback)
    pub fn with_transport(
        config: SessionConfig,
        source: Box<dyn FrameSource>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (stats_tx, _) = broadcast::channel(16);
        let (units_tx, _) = broadcast::channel(256);
        let poll_interval = if config.low_latency {
            Duration::from_millis(2)
        } else {
            Duration::from_millis(5)
        };

        Self {
            handle: Handle::new(),
            config,
            source,
            transport,
            video_encoder: None,
            audio_encoder: None,
            video_backend: None,
            audio_backend: None,
            state_tx,
            stats: Arc::new(StatsCollector::new()),
            stats_tx,
            units_tx,
            stats_task: None,
            abr_rx: None,
            source_drops_seen: 0,
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            stats_interval: STATS_INTERVAL,
            poll_interval,
            start_time: None,
        }
    }

    /// Use explicit encoder backends (tests, hardware plugins)
    pub fn with_backends(
        mut self,
        video: Box<dyn EncoderBackend>,
        audio: Box<dyn EncoderBackend>,
    ) -> Self {
        self.video_backend = Some(video);
        self.audio_backend = Some(audio);
        self
    }

    /// Override the reconnect budget and backoff base
    pub fn with_reconnect(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_base_delay = base_delay;
        self
    }

    /// Override the statistics sampling period
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Session handle
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to per-tick statistics snapshots
    pub fn subscribe_stats(&self) -> broadcast::Receiver<StatisticsSnapshot> {
        self.stats_tx.subscribe()
    }

    /// Subscribe to the encoded units as they are submitted.
    ///
    /// The tap feeds collaborators like a file writer without touching the
    /// transport path; lagging subscribers miss units, the session is never
    /// slowed down.
    pub fn subscribe_units(&self) -> broadcast::Receiver<Arc<EncodedUnit>> {
        self.units_tx.subscribe()
    }

    /// Statistics snapshot as of now
    pub fn stats(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the session is streaming (paused counts as streaming)
    pub fn is_running(&self) -> bool {
        self.state().is_streaming()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.borrow().clone();
        if previous != state {
            info!("{} state: {} -> {}", self.handle, previous, state);
            // The authoritative state must update even with no receiver alive
            self.state_tx.send_replace(state);
        }
    }

    /// Start the session: bring up the source, initialize both encoders,
    /// connect and handshake, then enter `Streaming`.
    ///
    /// Fails with [`BeamcastError::SessionAlreadyRunning`] unless the
    /// session is idle. A failed start leaves the session in `Failed`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(BeamcastError::SessionAlreadyRunning);
        }

        self.set_state(SessionState::Connecting);
        info!(
            "Starting {}: {}x{}@{}fps {} to {}",
            self.handle,
            self.config.width(),
            self.config.height(),
            self.config.fps(),
            self.config.codec,
            self.config
                .ingest_url()
                .map(|u| crate::config::safe_url(&u))
                .unwrap_or_else(|_| "<unresolved>".into())
        );
        for warning in self.config.warnings() {
            warn!("{}", warning);
        }

        if let Err(e) = self.try_start().await {
            self.source.stop();
            self.video_encoder = None;
            self.audio_encoder = None;
            self.set_state(SessionState::Failed(e.to_string()));
            return Err(e);
        }

        self.start_time = Some(Instant::now());
        self.source_drops_seen = self.source.dropped_frames();
        self.stats = Arc::new(StatsCollector::new());
        self.stats.set_current_bitrate(self.config.effective_bitrate());
        self.spawn_stats_task();
        self.set_state(SessionState::Streaming { paused: false });
        Ok(())
    }

    async fn try_start(&mut self) -> Result<()> {
        self.source.start()?;
        self.video_encoder = Some(match self.video_backend.take() {
            Some(backend) => VideoEncoder::with_backend(
                backend,
                self.config.keyframe_cadence(),
                self.config.effective_bitrate(),
            ),
            None => VideoEncoder::new(&self.config)?,
        });
        self.audio_encoder = Some(match self.audio_backend.take() {
            Some(backend) => {
                AudioEncoder::with_backend(backend, self.config.effective_audio_bitrate())
            }
            None => AudioEncoder::new(&self.config)?,
        });
        self.transport.connect().await
    }

    /// Periodic sampling runs independently of the frame path: snapshots
    /// are published on the broadcast channel and bitrate ladder moves are
    /// handed to the drive loop over an unbounded channel.
    fn spawn_stats_task(&mut self) {
        let stats = self.stats.clone();
        let stats_tx = self.stats_tx.clone();
        let mut state_rx = self.state_tx.subscribe();
        let mut abr = AdaptiveBitrate::new(&self.config);
        let interval = self.stats_interval;
        let (abr_tx, abr_rx) = mpsc::unbounded_channel();
        self.abr_rx = Some(abr_rx);

        self.stats_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let state = state_rx.borrow_and_update().clone();
                if state.is_terminal() || state == SessionState::Stopping {
                    break;
                }

                let snapshot = stats.snapshot();
                trace!("Stats tick: {}", snapshot);
                let _ = stats_tx.send(snapshot.clone());

                // The ladder only moves while media is actually flowing
                if state == (SessionState::Streaming { paused: false }) {
                    if let Some(kbps) = abr.observe(snapshot.buffer_health) {
                        if abr_tx.send(kbps).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Stats task finished");
        }));
    }

    /// Drive the session: drain pending frames through encode and
    /// transport, apply bitrate retargets, and run the reconnect cycle
    /// when the link breaks.
    ///
    /// Call in a loop; returns `false` once the session reaches a state
    /// it cannot stream from. Never blocks indefinitely.
    pub async fn process(&mut self) -> Result<bool> {
        let paused = match self.state() {
            SessionState::Streaming { paused } => paused,
            SessionState::Idle
            | SessionState::Connecting
            | SessionState::Reconnecting { .. }
            | SessionState::Stopping
            | SessionState::Stopped
            | SessionState::Failed(_) => return Ok(false),
        };

        self.apply_bitrate_retargets();

        let mut submitted = 0usize;
        while let Some(frame) = self.source.next_video_frame() {
            if paused {
                continue;
            }
            if let Some(ref mut encoder) = self.video_encoder {
                match encoder.encode(&frame)? {
                    EncodeOutcome::Unit(unit) => {
                        let _ = self.units_tx.send(Arc::new(unit.clone()));
                        let dropped = self.transport.enqueue(unit);
                        if dropped > 0 {
                            self.stats.record_frames_dropped(dropped);
                        }
                        submitted += 1;
                    }
                    EncodeOutcome::Dropped => {
                        self.stats.record_frames_dropped(1);
                    }
                }
            }
        }
        while let Some(frame) = self.source.next_audio_frame() {
            if paused {
                continue;
            }
            if let Some(ref mut encoder) = self.audio_encoder {
                match encoder.encode(&frame)? {
                    EncodeOutcome::Unit(unit) => {
                        let _ = self.units_tx.send(Arc::new(unit.clone()));
                        let dropped = self.transport.enqueue(unit);
                        if dropped > 0 {
                            self.stats.record_frames_dropped(dropped);
                        }
                        submitted += 1;
                    }
                    EncodeOutcome::Dropped => {
                        self.stats.record_frames_dropped(1);
                    }
                }
            }
        }

        // Capture overflow shows up on the source's eviction counter
        let source_drops = self.source.dropped_frames();
        if source_drops > self.source_drops_seen {
            self.stats
                .record_frames_dropped(source_drops - self.source_drops_seen);
            self.source_drops_seen = source_drops;
        }

        match self.transport.flush().await {
            Ok(report) => {
                self.stats.record_bytes(report.payload_bytes);
                self.stats.record_frames_sent(report.video_units);
                self.stats.set_rtt(self.transport.rtt_estimate());
                self.stats.set_buffer_health(self.transport.buffer_health());
            }
            Err(e) if e.is_transient() => {
                return self.reconnect(e).await;
            }
            Err(e) => {
                self.set_state(SessionState::Failed(e.to_string()));
                return Err(e);
            }
        }

        if submitted == 0 {
            // No pending frames; yield instead of spinning
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(true)
    }

    fn apply_bitrate_retargets(&mut self) {
        let Some(ref mut abr_rx) = self.abr_rx else {
            return;
        };
        while let Ok(kbps) = abr_rx.try_recv() {
            if let Some(ref mut encoder) = self.video_encoder {
                encoder.set_bitrate(kbps);
                self.stats.set_current_bitrate(kbps);
            }
        }
    }

    /// Retry the connect-and-handshake cycle with exponential backoff.
    /// Capture and encoders stay up; only the link is rebuilt.
    async fn reconnect(&mut self, cause: BeamcastError) -> Result<bool> {
        warn!("{} link lost: {}", self.handle, cause);
        let _ = self.transport.close().await;

        let mut delay = self.reconnect_base_delay;
        for attempt in 1..=self.reconnect_attempts {
            self.set_state(SessionState::Reconnecting { attempt });
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX_DELAY);

            match self.transport.connect().await {
                Ok(()) => {
                    info!("{} reconnected on attempt {}", self.handle, attempt);
                    self.set_state(SessionState::Streaming { paused: false });
                    return Ok(true);
                }
                Err(e) => {
                    warn!(
                        "{} reconnect attempt {}/{} failed: {}",
                        self.handle, attempt, self.reconnect_attempts, e
                    );
                }
            }
        }

        let reason = format!(
            "Link lost and {} reconnect attempts failed: {}",
            self.reconnect_attempts, cause
        );
        self.set_state(SessionState::Failed(reason.clone()));
        Err(BeamcastError::link(reason))
    }

    /// Suppress frame submission without tearing down the connection
    pub fn pause(&mut self) -> Result<()> {
        match self.state() {
            SessionState::Streaming { paused: false } => {
                self.set_state(SessionState::Streaming { paused: true });
                Ok(())
            }
            SessionState::Streaming { paused: true } => Ok(()),
            other => Err(BeamcastError::invalid_state(format!(
                "Cannot pause while {}",
                other
            ))),
        }
    }

    /// Resume frame submission after a pause
    pub fn resume(&mut self) -> Result<()> {
        match self.state() {
            SessionState::Streaming { paused: true } => {
                self.set_state(SessionState::Streaming { paused: false });
                Ok(())
            }
            SessionState::Streaming { paused: false } => Ok(()),
            other => Err(BeamcastError::invalid_state(format!(
                "Cannot resume while {}",
                other
            ))),
        }
    }

    /// Stop the session: source first, then the transport, then the
    /// encoders. Teardown failures are logged, never propagated, so stop
    /// always completes.
    pub async fn stop(&mut self) {
        if self.state().is_terminal() {
            return;
        }

        self.set_state(SessionState::Stopping);
        info!("Stopping {}", self.handle);

        self.source.stop();

        if let Err(e) = self.transport.close().await {
            warn!("Transport close failed: {}", e);
        }

        if let Some(encoder) = self.video_encoder.take() {
            debug!(
                "Video encoder released: {} units encoded, {} dropped",
                encoder.units_encoded(),
                encoder.units_dropped()
            );
        }
        self.audio_encoder = None;

        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
        self.abr_rx = None;

        self.set_state(SessionState::Stopped);

        let elapsed = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        info!(
            "{} stopped after {:.1}s: {} frames sent, {} dropped, {} bytes",
            self.handle,
            elapsed,
            self.stats.frames_sent(),
            self.stats.frames_dropped(),
            self.stats.bytes_sent()
        );
    }
}
