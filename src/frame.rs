//! The `Frame` type: an owned, immutable snapshot of one captured image.

use std::sync::Arc;

/// One decoded capture, shared by reference-counted handle between the
/// head ring, the in-progress clip, and zero or more `FrameBus` observers.
/// No holder may mutate a `Frame`; the backing storage is freed when the
/// last `Arc` is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    /// Row-major 8-bit grey samples, `width * height` long.
    pub raw: Arc<Vec<u8>>,
    /// Packed RGBA samples (`0xggggggFF`, changed pixels `0x0000FFFF`),
    /// present only when the pipeline is not running headless.
    pub annotated: Option<Arc<Vec<u32>>>,
    /// Capture timestamp of the first byte, microseconds since the Unix epoch.
    pub epoch_time_us: i64,
    /// Device-reported monotonic frame index.
    pub sequence: u64,
    /// Sliding-window FPS estimate at production time.
    pub fps: f64,
    /// Cumulative dropped-frame count at production time.
    pub dropped_frames_total: u64,
    /// Cumulative frame count at production time.
    pub total_frames: u64,
}

impl Frame {
    /// Builds a frame, panicking if `raw`'s length doesn't match `width*height`
    /// (an invariant the decoder is responsible for upholding; a violation
    /// here is a decoder bug, not a runtime condition to recover from).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: usize,
        height: usize,
        raw: Vec<u8>,
        annotated: Option<Vec<u32>>,
        epoch_time_us: i64,
        sequence: u64,
        fps: f64,
        dropped_frames_total: u64,
        total_frames: u64,
    ) -> Self {
        assert_eq!(raw.len(), width * height, "raw buffer length mismatch");
        if let Some(ref a) = annotated {
            assert_eq!(a.len(), width * height, "annotated buffer length mismatch");
        }
        Self {
            width,
            height,
            raw: Arc::new(raw),
            annotated: annotated.map(Arc::new),
            epoch_time_us,
            sequence,
            fps,
            dropped_frames_total,
            total_frames,
        }
    }
}
