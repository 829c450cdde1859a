//! Adaptive bitrate controller
//!
//! A threshold ladder evaluated once per statistics tick while streaming:
//! sustained low buffer health steps the encoder bitrate down, sustained
//! headroom steps it back up. Changes apply to the encoder live; the
//! transport connection is never renegotiated.

use tracing::debug;

use crate::config::SessionConfig;

/// Buffer health below this for two consecutive ticks steps bitrate down
const LOW_WATER: f64 = 0.5;
/// Buffer health above this for five consecutive ticks steps bitrate up
const HIGH_WATER: f64 = 0.9;
/// Consecutive low ticks before a decrease
const LOW_TICKS: u32 = 2;
/// Consecutive high ticks before an increase
const HIGH_TICKS: u32 = 5;

/// Threshold-ladder bitrate controller
#[derive(Debug)]
pub struct AdaptiveBitrate {
    enabled: bool,
    min_kbps: u32,
    max_kbps: u32,
    current_kbps: u32,
    low_streak: u32,
    high_streak: u32,
}

impl AdaptiveBitrate {
    /// Build the controller from the session configuration
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            enabled: config.adaptive_bitrate,
            min_kbps: config.effective_min_bitrate(),
            max_kbps: config.effective_max_bitrate(),
            current_kbps: config.effective_bitrate(),
            low_streak: 0,
            high_streak: 0,
        }
    }

    /// Build the controller from explicit bounds
    pub fn with_bounds(min_kbps: u32, current_kbps: u32, max_kbps: u32) -> Self {
        Self {
            enabled: true,
            min_kbps,
            max_kbps,
            current_kbps,
            low_streak: 0,
            high_streak: 0,
        }
    }

    /// Feed one tick's buffer health. Returns the new target bitrate when
    /// the ladder moves, `None` when the bitrate is unchanged.
    pub fn observe(&mut self, buffer_health: f64) -> Option<u32> {
        if !self.enabled {
            return None;
        }

        if buffer_health < LOW_WATER {
            self.low_streak += 1;
            self.high_streak = 0;
        } else if buffer_health > HIGH_WATER {
            self.high_streak += 1;
            self.low_streak = 0;
        } else {
            self.low_streak = 0;
            self.high_streak = 0;
        }

        if self.low_streak >= LOW_TICKS {
            self.low_streak = 0;
            let target = ((self.current_kbps as u64 * 80) / 100) as u32;
            let target = target.max(self.min_kbps);
            if target != self.current_kbps {
                debug!(
                    "Buffer health {:.2} sustained below {}: bitrate {} -> {} kbps",
                    buffer_health, LOW_WATER, self.current_kbps, target
                );
                self.current_kbps = target;
                return Some(target);
            }
        } else if self.high_streak >= HIGH_TICKS {
            self.high_streak = 0;
            let target = ((self.current_kbps as u64 * 110) / 100) as u32;
            let target = target.min(self.max_kbps);
            if target != self.current_kbps {
                debug!(
                    "Buffer health {:.2} sustained above {}: bitrate {} -> {} kbps",
                    buffer_health, HIGH_WATER, self.current_kbps, target
                );
                self.current_kbps = target;
                return Some(target);
            }
        }

        None
    }

    /// Current target bitrate in kbps
    pub fn current(&self) -> u32 {
        self.current_kbps
    }

    /// Whether the ladder is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_low_ticks_decrease() {
        let mut abr = AdaptiveBitrate::with_bounds(1000, 5000, 8000);
        assert_eq!(abr.observe(0.3), None);
        assert_eq!(abr.observe(0.3), Some(4000));
    }

    #[test]
    fn test_decrease_floored_at_min() {
        let mut abr = AdaptiveBitrate::with_bounds(4500, 5000, 8000);
        abr.observe(0.3);
        assert_eq!(abr.observe(0.3), Some(4500));
        // Already at the floor, no further change
        abr.observe(0.3);
        assert_eq!(abr.observe(0.3), None);
        assert_eq!(abr.current(), 4500);
    }

    #[test]
    fn test_five_high_ticks_increase() {
        let mut abr = AdaptiveBitrate::with_bounds(1000, 5000, 8000);
        for _ in 0..4 {
            assert_eq!(abr.observe(0.95), None);
        }
        assert_eq!(abr.observe(0.95), Some(5500));
    }

    #[test]
    fn test_increase_capped_at_max() {
        let mut abr = AdaptiveBitrate::with_bounds(1000, 5000, 5200);
        for _ in 0..4 {
            abr.observe(0.95);
        }
        assert_eq!(abr.observe(0.95), Some(5200));
    }

    #[test]
    fn test_mid_band_resets_streaks() {
        let mut abr = AdaptiveBitrate::with_bounds(1000, 5000, 8000);
        abr.observe(0.3);
        abr.observe(0.7); // resets the low streak
        assert_eq!(abr.observe(0.3), None);
        assert_eq!(abr.observe(0.3), Some(4000));
    }

    #[test]
    fn test_disabled_never_moves() {
        let config = SessionConfig::for_url("rtmp://localhost/live", "k")
            .with_bitrate(5000)
            .with_bitrate_bounds(1000, 8000)
            .with_adaptive_bitrate(false);
        let mut abr = AdaptiveBitrate::new(&config);
        for _ in 0..10 {
            assert_eq!(abr.observe(0.1), None);
        }
        assert_eq!(abr.current(), 5000);
    }
}
