//! Synthetic test-pattern source
//!
//! Generates timestamped video and audio frames at the configured rates so
//! the full pipeline can be exercised without a capture device. Video is a
//! scrolling gradient, audio is silence.

use std::time::{Duration, Instant};

use beamcast_core::config::SessionConfig;
use beamcast_core::{FramePusher, RawFrame};
use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn a task pushing synthetic frames until the pusher's queues are
/// dropped or the task is aborted.
pub fn spawn_test_pattern(pusher: FramePusher, config: &SessionConfig) -> JoinHandle<()> {
    let width = config.width() as usize;
    let height = config.height() as usize;
    let fps = config.fps().max(1);
    let sample_rate = config.sample_rate.max(8000);
    let channels = config.channels.max(1) as usize;

    tokio::spawn(async move {
        let frame_duration = Duration::from_secs(1) / fps;
        let frame_duration_ns = frame_duration.as_nanos() as u64;
        // 20ms audio blocks, 16-bit samples
        let audio_duration = Duration::from_millis(20);
        let audio_bytes = (sample_rate as usize / 50) * channels * 2;
        let silence = Bytes::from(vec![0u8; audio_bytes]);

        let epoch = Instant::now();
        let mut video_ticker = tokio::time::interval(frame_duration);
        let mut audio_ticker = tokio::time::interval(audio_duration);
        let mut frame_index = 0u64;

        debug!(
            "Test pattern running: {}x{}@{}fps, {}Hz/{}ch audio",
            width, height, fps, sample_rate, channels
        );

        loop {
            tokio::select! {
                _ = video_ticker.tick() => {
                    let pts = epoch.elapsed().as_nanos() as u64;
                    pusher.push_video(RawFrame::video(
                        gradient_frame(width, height, frame_index),
                        pts,
                        frame_duration_ns,
                    ));
                    frame_index += 1;
                }
                _ = audio_ticker.tick() => {
                    let pts = epoch.elapsed().as_nanos() as u64;
                    pusher.push_audio(RawFrame::audio(
                        silence.clone(),
                        pts,
                        audio_duration.as_nanos() as u64,
                    ));
                }
            }
        }
    })
}

/// BGRA gradient that scrolls horizontally one pixel per frame
fn gradient_frame(width: usize, height: usize, frame_index: u64) -> Bytes {
    let mut data = vec![0u8; width * height * 4];
    let shift = (frame_index % width.max(1) as u64) as usize;
    for y in 0..height {
        let row = &mut data[y * width * 4..(y + 1) * width * 4];
        for x in 0..width {
            let v = (((x + shift) * 256 / width.max(1)) & 0xff) as u8;
            let px = &mut row[x * 4..x * 4 + 4];
            px[0] = v;
            px[1] = (y * 256 / height.max(1)) as u8;
            px[2] = 255 - v;
            px[3] = 255;
        }
    }
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_frame_size() {
        let frame = gradient_frame(64, 32, 0);
        assert_eq!(frame.len(), 64 * 32 * 4);
    }

    #[test]
    fn test_gradient_scrolls() {
        let a = gradient_frame(64, 32, 0);
        let b = gradient_frame(64, 32, 7);
        assert_ne!(a, b);
    }
}
