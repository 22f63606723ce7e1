//! `VideoStats`: a snapshot of the video stream's rate and drop behavior,
//! emitted to the `FrameBus` after every frame.
//!
//! Grounded on `examples/original_source/Asteria/infra/videostats.h`, which
//! this spec names without fully defining. Fields here are the
//! **incremental** per-sample values `RateMonitor` (§4.4) computes before
//! folding them into `Frame`'s cumulative counters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoStats {
    /// Sliding-window frames-per-second estimate.
    pub fps: f64,
    /// Dropped frames since the previous sample.
    pub dropped_frames: u64,
    /// Total frames (including dropped) since the previous sample.
    pub total_frames: u64,
    /// Diagnostic UTC string for the frame this snapshot accompanies.
    pub utc: String,
}
