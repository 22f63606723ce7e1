//! End-to-end acquisition scenarios (S1, S3, S4, S6). S2 (single transient)
//! and S5 (dropped-frame accounting) are exercised in `pipeline.rs` and
//! `rate_monitor.rs`'s own `#[cfg(test)]` modules respectively.

use std::sync::Arc;
use std::time::Duration;

use meteorwatch::analysis_sink::RecordingAnalysisSink;
use meteorwatch::capture::SimulatedCaptureSource;
use meteorwatch::config::{Config, PixelFormat};
use meteorwatch::pipeline::AcquisitionPipeline;

fn scenario_config(detection_head: usize, detection_tail: usize) -> Arc<Config> {
    Arc::new(Config {
        detection_head,
        detection_tail,
        pixel_difference_threshold: 10,
        n_changed_pixels_for_trigger: 2,
        headless: true,
        width: 5,
        height: 1,
        pixel_format: PixelFormat::Grey,
        buffer_count: 8,
    })
}

fn event_frame(buf: &mut [u8]) {
    buf.fill(255);
}

/// S1: with no event ever signalled, every captured frame reaches the
/// FrameBus and no clip is ever produced.
#[tokio::test]
async fn s1_idle_passthrough_produces_no_clips() {
    let config = scenario_config(5, 5);
    let capture = SimulatedCaptureSource::new(5, 1, 8, 1000);
    let sink = Arc::new(RecordingAnalysisSink::new());
    let pipeline = AcquisitionPipeline::new(config, capture, sink.clone());
    let (handle, mut observers) = pipeline.run();

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();
    handle.join().await;

    assert!(sink.clips().await.is_empty());

    let mut frames_seen = 0;
    while observers.frames.pop().is_some() {
        frames_seen += 1;
    }
    assert!(frames_seen >= 20, "expected at least 20 frames, saw {frames_seen}");
}

/// S3: a second event at frame 13 (within the frame-10 event's tail
/// window) extends the clip instead of splitting it; the clip closes
/// exactly `tail` frames after the later trigger.
#[tokio::test]
async fn s3_overlapping_events_produce_one_unsplit_clip() {
    let config = scenario_config(3, 2);
    let capture = SimulatedCaptureSource::new(5, 1, 8, 1000).with_generator(|seq, buf| {
        if seq == 10 || seq == 13 {
            event_frame(buf);
        }
    });
    let sink = Arc::new(RecordingAnalysisSink::new());
    let pipeline = AcquisitionPipeline::new(config, capture, sink.clone());
    let (handle, _observers) = pipeline.run();

    tokio::time::sleep(Duration::from_millis(80)).await;
    handle.stop();
    handle.join().await;

    let clips = sink.clips().await;
    assert_eq!(clips.len(), 1, "overlap must not split the clip in two");

    let sequences: Vec<u64> = clips[0].frames.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, (8..=15).collect::<Vec<_>>());
}

/// S4: once the first clip's tail lapses, the state machine reopens on
/// the very next event rather than requiring re-arming, and the new
/// clip's pre-event portion is exactly the head ring's contents at that
/// moment.
#[tokio::test]
async fn s4_rapid_retrigger_opens_a_second_independent_clip() {
    let config = scenario_config(3, 2);
    let capture = SimulatedCaptureSource::new(5, 1, 8, 1000).with_generator(|seq, buf| {
        if seq == 10 || seq == 14 {
            event_frame(buf);
        }
    });
    let sink = Arc::new(RecordingAnalysisSink::new());
    let pipeline = AcquisitionPipeline::new(config, capture, sink.clone());
    let (handle, _observers) = pipeline.run();

    tokio::time::sleep(Duration::from_millis(80)).await;
    handle.stop();
    handle.join().await;

    let clips = sink.clips().await;
    assert_eq!(clips.len(), 2, "expected the tail lapse and the re-trigger to produce two clips");

    // head=3, tail=2: the first clip's tail lapses at trigger(10) + tail(2)
    // = 12, so frame 13 (the lapsing tick) opens the next `Detecting` run
    // rather than extending the closing clip.
    let first: Vec<u64> = clips[0].frames.iter().map(|f| f.sequence).collect();
    assert_eq!(first, (8..=12).collect::<Vec<_>>());

    // The second trigger's head-ring unroll captures frames 12,13,14 (the
    // ring already holds 14 by the time the DETECTING->RECORDING transition
    // reads it, matching frame 10's clip starting at 8 rather than 7 above).
    let second: Vec<u64> = clips[1].frames.iter().map(|f| f.sequence).collect();
    assert_eq!(second, (12..=16).collect::<Vec<_>>());
}

/// S6: with `headless=true`, no frame ever carries an annotated buffer,
/// and detection keeps operating normally off the raw samples alone.
#[tokio::test]
async fn s6_headless_never_populates_annotated_but_still_detects() {
    let config = scenario_config(2, 1);
    let capture = SimulatedCaptureSource::new(5, 1, 8, 1000).with_generator(|seq, buf| {
        if seq == 10 {
            event_frame(buf);
        }
    });
    let sink = Arc::new(RecordingAnalysisSink::new());
    let pipeline = AcquisitionPipeline::new(config, capture, sink.clone());
    let (handle, mut observers) = pipeline.run();

    tokio::time::sleep(Duration::from_millis(60)).await;
    handle.stop();
    handle.join().await;

    let mut saw_a_frame = false;
    while let Some(frame) = observers.frames.pop() {
        saw_a_frame = true;
        assert!(frame.annotated.is_none(), "headless frames must never carry an annotated buffer");
    }
    assert!(saw_a_frame);

    assert_eq!(sink.clips().await.len(), 1);
}
