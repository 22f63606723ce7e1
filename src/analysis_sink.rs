//! Hand-off of completed clips to whatever does image/video encoding and
//! long-term storage — explicitly out of scope for this crate (§1
//! Non-goals); this module defines only the boundary.
//!
//! Grounded on the `async_trait` + tokio-channel pattern in
//! `examples/easternanemone-rudaq/src/instrument/mock.rs`, which decouples
//! a real-time producer from an async consumer the same way.

use async_trait::async_trait;
use uuid::Uuid;

use crate::state_machine::Clip;

/// Emitted to the `ClipEventBus` once a clip has been accepted by the sink.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredClipEvent {
    pub clip_id: Uuid,
    pub frame_count: usize,
}

/// Accepts completed clips for downstream processing. Implementations may
/// write to disk, stream to a remote service, or (in tests) simply record
/// what they were given; the pipeline never inspects the clip again once
/// `submit` returns.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn submit(&self, clip: Clip) -> AcquiredClipEvent;
}

/// Discards clip contents but assigns a fresh id to each, so pipeline
/// wiring can be exercised without a real downstream consumer.
#[derive(Default)]
pub struct NullAnalysisSink;

#[async_trait]
impl AnalysisSink for NullAnalysisSink {
    async fn submit(&self, clip: Clip) -> AcquiredClipEvent {
        AcquiredClipEvent {
            clip_id: Uuid::new_v4(),
            frame_count: clip.frames.len(),
        }
    }
}

/// Records every submitted clip in memory; used by pipeline tests to
/// assert on clip boundaries and contents.
#[derive(Default)]
pub struct RecordingAnalysisSink {
    clips: tokio::sync::Mutex<Vec<Clip>>,
}

impl RecordingAnalysisSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clips(&self) -> Vec<Clip> {
        self.clips.lock().await.clone()
    }
}

#[async_trait]
impl AnalysisSink for RecordingAnalysisSink {
    async fn submit(&self, clip: Clip) -> AcquiredClipEvent {
        let event = AcquiredClipEvent {
            clip_id: Uuid::new_v4(),
            frame_count: clip.frames.len(),
        };
        self.clips.lock().await.push(clip);
        event
    }
}
