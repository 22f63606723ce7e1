//! IDLE / DETECTING / RECORDING state machine (§4.7).
//!
//! Grounded on `examples/easternanemone-rudaq/src/data/trigger.rs`'s
//! `DataProcessor`, which implements the same pre-buffer/trigger/post-buffer
//! shape for its `Trigger`; generalized here to the head-ring-always-pushed,
//! re-triggerable-while-recording semantics this state machine needs, which
//! the teacher's single-shot `Holdoff` state does not cover.

use crate::frame::Frame;
use crate::ring_buffer::RingBuffer;

/// A contiguous run of frames handed off to the analysis sink: the
/// pre-event head followed by every frame captured while `RECORDING`.
#[derive(Debug, Clone)]
pub struct Clip {
    pub frames: Vec<Frame>,
}

/// Current phase of the detection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Detecting,
    Recording,
}

/// Drives the IDLE -> DETECTING -> RECORDING transition table.
///
/// Constructed in `Idle`: events are ignored until armed via [`arm`].
/// `RECORDING` is reached and left entirely by the internal event signal;
/// external control only ever toggles between `Idle` and `Detecting`
/// ([`arm`], [`pause`]), matching the "run/pause/detect" inputs in the
/// design notes. The head ring is pushed unconditionally on every tick
/// regardless of state, so a clip always opens with its full pre-event
/// context already resident — including the triggering frame itself,
/// since the push happens before the transition is evaluated.
///
/// [`arm`]: StateMachine::arm
/// [`pause`]: StateMachine::pause
pub struct StateMachine {
    state: State,
    head: RingBuffer<Frame>,
    clip_frames: Vec<Frame>,
    since_last_trigger: usize,
    tail: usize,
}

impl StateMachine {
    pub fn new(detection_head: usize, detection_tail: usize) -> Self {
        Self {
            state: State::Idle,
            head: RingBuffer::new(detection_head),
            clip_frames: Vec::new(),
            since_last_trigger: 0,
            tail: detection_tail,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// External "run"/"detect" control input: starts honoring the event
    /// signal. A no-op while already `Detecting` or `Recording`.
    pub fn arm(&mut self) {
        if self.state == State::Idle {
            self.state = State::Detecting;
        }
    }

    /// External "pause" control input: stops honoring the event signal
    /// and discards any clip in progress.
    pub fn pause(&mut self) {
        self.state = State::Idle;
        self.clip_frames.clear();
        self.since_last_trigger = 0;
    }

    /// Advances the state machine by one frame. Returns `Some(Clip)` the
    /// instant a clip closes (the tail countdown lapses without a
    /// re-trigger); the machine reverts to `Detecting` (not `Idle`) so a
    /// fresh event can open a new clip immediately.
    pub fn tick(&mut self, frame: Frame, event: bool) -> Option<Clip> {
        self.head.push(frame.clone());

        match self.state {
            State::Idle => None,
            State::Detecting => {
                if event {
                    self.clip_frames = self.head.unroll();
                    self.state = State::Recording;
                    self.since_last_trigger = 0;
                }
                None
            }
            State::Recording => {
                if event {
                    self.clip_frames.push(frame);
                    self.since_last_trigger = 0;
                    None
                } else if self.since_last_trigger < self.tail {
                    self.clip_frames.push(frame);
                    self.since_last_trigger += 1;
                    None
                } else {
                    // The tail has already lapsed: this frame belongs to
                    // the next Detecting run (already pushed to `head`
                    // above), not to the clip that's closing. Appending it
                    // here would extend every clip by one frame beyond
                    // what `tail` promises (spec.md S2: tail=2 closes the
                    // clip exactly at the trigger frame + 2, not + 3).
                    let clip = Clip {
                        frames: std::mem::take(&mut self.clip_frames),
                    };
                    self.state = State::Detecting;
                    self.since_last_trigger = 0;
                    Some(clip)
                }
            }
        }
    }
}
