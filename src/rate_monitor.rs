//! Sliding-window FPS estimator and dropped-frame counter (§4.4).

use crate::ring_buffer::RingBuffer;
use crate::time_util::convert_to_utc_string;
use crate::video_stats::VideoStats;

/// Capacity of the capture-timestamp sliding window.
pub const WINDOW_SIZE: usize = 1000;

/// Tracks FPS and dropped/total frame counts from the stream of
/// `(sequence, epoch_time_us)` pairs reported by the capture device.
///
/// The FPS sliding window does not start accumulating until the third
/// frame of a session (device-reported timestamps are unreliable
/// immediately after stream activation); dropped/total frame accounting
/// only needs a single prior sequence number and so starts one frame
/// earlier. See DESIGN.md for why these two warm-up lengths differ, and
/// why this monitoring skip does *not* also apply to detection.
pub struct RateMonitor {
    window: RingBuffer<i64>,
    last_sequence: Option<u64>,
    frames_seen: u64,
    dropped_frames_total: u64,
    total_frames_total: u64,
}

impl RateMonitor {
    pub fn new() -> Self {
        Self {
            window: RingBuffer::new(WINDOW_SIZE),
            last_sequence: None,
            frames_seen: 0,
            dropped_frames_total: 0,
            total_frames_total: 0,
        }
    }

    /// Cumulative dropped-frame count observed so far.
    pub fn dropped_frames_total(&self) -> u64 {
        self.dropped_frames_total
    }

    /// Cumulative total-frame count observed so far (sequence-number based,
    /// so it includes driver-dropped frames per spec.md §9).
    pub fn total_frames_total(&self) -> u64 {
        self.total_frames_total
    }

    /// Folds in one new sample and returns the `VideoStats` snapshot for it.
    pub fn sample(&mut self, sequence: u64, epoch_time_us: i64) -> VideoStats {
        self.frames_seen += 1;

        // The very first frame has no predecessor to diff against.
        let (dropped_since, total_since) = if self.frames_seen <= 1 {
            (0, 0)
        } else {
            let last = self.last_sequence.expect("set by the first sampled frame");
            let dropped = sequence.saturating_sub(last + 1);
            let total = sequence.saturating_sub(last);
            (dropped, total)
        };

        self.last_sequence = Some(sequence);
        self.dropped_frames_total += dropped_since;
        self.total_frames_total += total_since;

        if self.frames_seen > 2 {
            self.window.push(epoch_time_us);
        }

        let fps = self.current_fps();

        VideoStats {
            fps,
            dropped_frames: dropped_since,
            total_frames: total_since,
            utc: convert_to_utc_string(epoch_time_us),
        }
    }

    fn current_fps(&self) -> f64 {
        if self.window.len() < 2 {
            return 0.0;
        }
        let oldest = *self.window.unroll().first().expect("len >= 2");
        let newest = *self.window.back().expect("len >= 2");
        let span_s = (newest - oldest) as f64 / 1_000_000.0;
        if span_s <= 0.0 {
            return 0.0;
        }
        (self.window.len() - 1) as f64 / span_s
    }
}

impl Default for RateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_no_predecessor_to_diff_against() {
        let mut rm = RateMonitor::new();
        let s1 = rm.sample(0, 1_000_000);
        assert_eq!(s1.total_frames, 0);
        assert_eq!(s1.fps, 0.0);
        assert_eq!(rm.total_frames_total(), 0);
    }

    #[test]
    fn fps_window_stays_empty_through_the_second_frame() {
        let mut rm = RateMonitor::new();
        rm.sample(0, 1_000_000);
        let s2 = rm.sample(1, 1_016_667);
        // total/dropped accounting is already live by the second frame...
        assert_eq!(s2.total_frames, 1);
        // ...but the FPS window itself only starts filling on the third.
        assert_eq!(s2.fps, 0.0);
    }

    /// Property 9: synthetic timestamps spaced exactly Δ apart over a full
    /// window yield FPS == 1e6 / Δ within ±0.1%.
    #[test]
    fn fps_matches_synthetic_spacing_within_tolerance() {
        let mut rm = RateMonitor::new();
        let delta_us = 33_333i64; // ~30 fps
        let mut t = 0i64;
        let mut last_stats = None;
        for seq in 0..(WINDOW_SIZE as u64 + 5) {
            last_stats = Some(rm.sample(seq, t));
            t += delta_us;
        }
        let fps = last_stats.unwrap().fps;
        let expected = 1_000_000.0 / delta_us as f64;
        assert!(
            (fps - expected).abs() / expected < 0.001,
            "fps={fps} expected={expected}"
        );
    }

    /// S5: sequences {0,1,2,4,5,7} -> after sequence=7, total_frames=7,
    /// dropped_frames=2.
    #[test]
    fn scenario_s5_dropped_frame_accounting() {
        let mut rm = RateMonitor::new();
        let sequences = [0u64, 1, 2, 4, 5, 7];
        let mut t = 0i64;
        for seq in sequences {
            rm.sample(seq, t);
            t += 10_000;
        }
        assert_eq!(rm.total_frames_total(), 7);
        assert_eq!(rm.dropped_frames_total(), 2);
    }

    #[test]
    fn no_drops_when_sequence_increments_by_one() {
        let mut rm = RateMonitor::new();
        for seq in 0..10u64 {
            rm.sample(seq, seq as i64 * 10_000);
        }
        assert_eq!(rm.dropped_frames_total(), 0);
        assert_eq!(rm.total_frames_total(), 9);
    }
}
