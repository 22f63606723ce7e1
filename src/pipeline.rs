//! Wires capture, decode, rate monitoring, detection and the state
//! machine together on a dedicated OS thread, handing completed clips off
//! to an async analysis-sink task (§5 Concurrency & Resource Model).
//!
//! Grounded on the capture-thread/analysis-thread split in
//! `examples/original_source/Asteria/infra/acquisitionthread.cpp` (a
//! dedicated real-time thread that never blocks on downstream analysis)
//! and on the `tokio::sync::mpsc` hand-off pattern used throughout
//! `examples/easternanemone-rudaq/src/instrument/mock.rs`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::analysis_sink::AnalysisSink;
use crate::bus::{ClipEventBus, FrameBus, StatsBus};
use crate::capture::CaptureSource;
use crate::config::Config;
use crate::decode::PixelDecoder;
use crate::detect::DetectionEngine;
use crate::error::CaptureResult;
use crate::frame::Frame;
use crate::rate_monitor::RateMonitor;
use crate::state_machine::{Clip, StateMachine};
use crate::time_util::{epoch_time_diff_us, to_epoch_time_us};

fn wall_clock_now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

/// Handle to a running pipeline: lets the caller request a stop and wait
/// for the capture thread to exit.
pub struct PipelineHandle {
    cancel: Arc<AtomicBool>,
    control: Arc<AtomicU8>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
    sink_task: Option<tokio::task::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Requests that the capture loop exit at the top of its next
    /// iteration; does not block.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// External "run"/"detect" control input: the state machine starts
    /// honoring the per-frame event signal again at the top of the next
    /// iteration. A running pipeline is armed by default.
    pub fn arm(&self) {
        self.control.store(CONTROL_DETECTING, Ordering::Release);
    }

    /// External "pause" control input: the state machine stops honoring
    /// the event signal and discards any clip in progress, at the top of
    /// the next iteration.
    pub fn pause(&self) {
        self.control.store(CONTROL_IDLE, Ordering::Release);
    }

    /// Waits for the capture thread and the analysis hand-off task to
    /// finish. Call `stop` first, or this blocks until the capture
    /// source's `next_buffer` next returns (or errors) on its own.
    pub async fn join(mut self) {
        if let Some(handle) = self.capture_thread.take() {
            // `JoinHandle::join` blocks the calling thread; run it on a
            // blocking-pool thread so it can't stall the async runtime.
            let result = tokio::task::spawn_blocking(move || handle.join()).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(?e, "capture thread panicked"),
                Err(e) => error!(?e, "failed to join capture thread"),
            }
        }
        if let Some(task) = self.sink_task.take() {
            if let Err(e) = task.await {
                error!(?e, "analysis hand-off task panicked");
            }
        }
    }
}

/// Observer handles returned alongside a running pipeline.
pub struct PipelineObservers {
    pub frames: ringbuf::HeapConsumer<Frame>,
    pub stats: ringbuf::HeapConsumer<crate::video_stats::VideoStats>,
    pub clip_events: ringbuf::HeapConsumer<crate::analysis_sink::AcquiredClipEvent>,
}

/// Bounded capacity used for each bus subscription the pipeline creates
/// for itself; callers wanting a different depth should subscribe to the
/// buses directly before calling `run`.
const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// The `StateMachine`'s allowed state, as driven by the external
/// "run/pause/detect" control input (§4.7, §9 design notes): the state
/// machine itself only ever moves between these two from the inside via
/// [`StateMachine::arm`]/[`StateMachine::pause`]; `RECORDING` is reached
/// and left entirely by the per-frame event signal.
const CONTROL_DETECTING: u8 = 1;
const CONTROL_IDLE: u8 = 0;

/// Orchestrates one capture session end-to-end.
pub struct AcquisitionPipeline<C> {
    config: Arc<Config>,
    capture: C,
    sink: Arc<dyn AnalysisSink>,
    frame_bus: Arc<Mutex<FrameBus>>,
    stats_bus: Arc<Mutex<StatsBus>>,
    clip_event_bus: Arc<Mutex<ClipEventBus>>,
}

impl<C> AcquisitionPipeline<C>
where
    C: CaptureSource + Send + 'static,
{
    pub fn new(config: Arc<Config>, capture: C, sink: Arc<dyn AnalysisSink>) -> Self {
        Self {
            config,
            capture,
            sink,
            frame_bus: Arc::new(Mutex::new(FrameBus::new())),
            stats_bus: Arc::new(Mutex::new(StatsBus::new())),
            clip_event_bus: Arc::new(Mutex::new(ClipEventBus::new())),
        }
    }

    /// Starts the capture thread and the analysis hand-off task, and
    /// returns observer handles for frames, stats and clip events.
    pub fn run(mut self) -> (PipelineHandle, PipelineObservers) {
        let frames = self
            .frame_bus
            .lock()
            .expect("frame bus mutex poisoned")
            .subscribe(DEFAULT_MAILBOX_CAPACITY);
        let stats = self
            .stats_bus
            .lock()
            .expect("stats bus mutex poisoned")
            .subscribe(DEFAULT_MAILBOX_CAPACITY);
        let clip_events = self
            .clip_event_bus
            .lock()
            .expect("clip event bus mutex poisoned")
            .subscribe(DEFAULT_MAILBOX_CAPACITY);

        let cancel = Arc::new(AtomicBool::new(false));
        // A running pipeline is armed by default; there is no separate
        // "start detecting" step in the CLI surface (§4.11), only an
        // optional later `pause`/`arm` through the returned handle.
        let control = Arc::new(AtomicU8::new(CONTROL_DETECTING));
        let (clip_tx, mut clip_rx) = mpsc::unbounded_channel::<Clip>();

        let sink = self.sink.clone();
        let clip_event_bus = self.clip_event_bus.clone();
        let sink_task = tokio::spawn(async move {
            while let Some(clip) = clip_rx.recv().await {
                let frame_count = clip.frames.len();
                let event = sink.submit(clip).await;
                debug!(frame_count, clip_id = %event.clip_id, "clip handed to analysis sink");
                clip_event_bus
                    .lock()
                    .expect("clip event bus mutex poisoned")
                    .publish(event);
            }
        });

        let capture_cancel = cancel.clone();
        let capture_control = control.clone();
        let config = self.config.clone();
        let frame_bus = self.frame_bus.clone();
        let stats_bus = self.stats_bus.clone();
        // `self` was taken by value, so moving just this field out of it is
        // fine; the rest of `self` (already-cloned `Arc`/`Mutex` handles)
        // is simply dropped at the end of the method.
        let mut capture = self.capture;

        let capture_thread = std::thread::spawn(move || {
            if let Err(e) = run_capture_loop(
                &mut capture,
                config,
                capture_cancel,
                capture_control,
                frame_bus,
                stats_bus,
                clip_tx,
            ) {
                error!(error = %e, "capture loop exited with an error");
            }
        });

        (
            PipelineHandle {
                cancel,
                control,
                capture_thread: Some(capture_thread),
                sink_task: Some(sink_task),
            },
            PipelineObservers {
                frames,
                stats,
                clip_events,
            },
        )
    }
}

fn run_capture_loop<C: CaptureSource>(
    capture: &mut C,
    config: Arc<Config>,
    cancel: Arc<AtomicBool>,
    control: Arc<AtomicU8>,
    frame_bus: Arc<Mutex<FrameBus>>,
    stats_bus: Arc<Mutex<StatsBus>>,
    clip_tx: mpsc::UnboundedSender<Clip>,
) -> CaptureResult<()> {
    capture.start()?;
    info!("capture loop starting");

    let mut decoder = PixelDecoder::new(config.pixel_format, config.width, config.height);
    let mut rate_monitor = RateMonitor::new();
    let detector = DetectionEngine::new(
        config.pixel_difference_threshold,
        config.n_changed_pixels_for_trigger,
    );
    let mut state_machine = StateMachine::new(config.detection_head, config.detection_tail);
    let mut prior_raw: Option<Arc<Vec<u8>>> = None;
    let mut epoch_offset_us: Option<i64> = None;

    loop {
        if cancel.load(Ordering::Acquire) {
            break;
        }

        if control.load(Ordering::Acquire) == CONTROL_DETECTING {
            state_machine.arm();
        } else {
            state_machine.pause();
        }

        let borrowed = match capture.next_buffer() {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "driver read failure, stopping capture loop");
                let _ = capture.stop();
                return Err(e);
            }
        };

        let sequence = borrowed.meta.sequence;
        let device_timestamp_us = borrowed.meta.timestamp_us;
        let offset = *epoch_offset_us
            .get_or_insert_with(|| epoch_time_diff_us(wall_clock_now_us(), device_timestamp_us));
        let epoch_time_us = to_epoch_time_us(device_timestamp_us, offset);

        let raw = match decoder.decode(borrowed.bytes()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, sequence, "decode failure, skipping frame");
                continue;
            }
        };
        drop(borrowed);

        let stats = rate_monitor.sample(sequence, epoch_time_us);
        let detection = detector.run(&raw, prior_raw.as_deref().map(Vec::as_slice));

        let annotated = if config.headless {
            None
        } else {
            Some(annotate(&raw, &detection.changed_pixels))
        };

        let frame = Frame::new(
            config.width,
            config.height,
            raw,
            annotated,
            epoch_time_us,
            sequence,
            stats.fps,
            rate_monitor.dropped_frames_total(),
            rate_monitor.total_frames_total(),
        );

        // Shares the frame's own backing storage rather than keeping a
        // second, independently-allocated copy around for the next diff.
        prior_raw = Some(frame.raw.clone());

        stats_bus
            .lock()
            .expect("stats bus mutex poisoned")
            .publish(stats);
        frame_bus
            .lock()
            .expect("frame bus mutex poisoned")
            .publish(frame.clone());

        if let Some(clip) = state_machine.tick(frame, detection.event) {
            if clip_tx.send(clip).is_err() {
                warn!("analysis sink channel closed, dropping completed clip");
            }
        }
    }

    capture.stop()?;
    info!("capture loop stopped");
    Ok(())
}

/// Paints `0x0000FFFF` over every changed pixel, leaving the rest as
/// opaque greyscale (§4.2, matching the original annotated-image coding).
fn annotate(raw: &[u8], changed_pixels: &[usize]) -> Vec<u32> {
    let mut annotated: Vec<u32> = raw
        .iter()
        .map(|&g| (u32::from(g) << 24) | (u32::from(g) << 16) | (u32::from(g) << 8) | 0xFF)
        .collect();
    for &p in changed_pixels {
        if let Some(slot) = annotated.get_mut(p) {
            *slot = 0x0000_FFFF;
        }
    }
    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_sink::RecordingAnalysisSink;
    use crate::capture::SimulatedCaptureSource;
    use crate::config::PixelFormat;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            detection_head: 2,
            detection_tail: 1,
            pixel_difference_threshold: 10,
            n_changed_pixels_for_trigger: 0,
            headless: true,
            width: 2,
            height: 2,
            pixel_format: PixelFormat::Grey,
            buffer_count: 4,
        })
    }

    #[tokio::test]
    async fn a_scripted_event_frame_produces_exactly_one_clip() {
        let config = test_config();
        let capture = SimulatedCaptureSource::new(2, 2, 4, 1000).with_generator(|seq, buf| {
            if seq == 5 {
                buf.fill(255);
            }
        });
        let sink = Arc::new(RecordingAnalysisSink::new());
        let pipeline = AcquisitionPipeline::new(config, capture, sink.clone());
        let (handle, mut observers) = pipeline.run();

        // Let the capture loop run for a bounded number of frames, then
        // stop it; the simulated source never blocks so this settles fast.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.stop();
        handle.join().await;

        let clips = sink.clips().await;
        assert_eq!(clips.len(), 1);

        let mut saw_a_frame = false;
        while observers.frames.pop().is_some() {
            saw_a_frame = true;
        }
        assert!(saw_a_frame);
    }
}
