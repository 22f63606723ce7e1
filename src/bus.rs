//! Non-blocking fan-out from the capture thread to any number of
//! observers (UI, diagnostics, recording indicators) — §4.8.
//!
//! Each subscriber gets its own bounded single-producer/single-consumer
//! mailbox from the `ringbuf` crate. Publishing never blocks and never
//! allocates on the hot path: a full mailbox has its oldest entry
//! overwritten rather than stalling the capture loop for a slow observer.

use ringbuf::{Consumer as _, HeapConsumer, HeapProducer, HeapRb, Producer as _};

/// Fans a stream of `T` out to any number of bounded, independent
/// mailboxes. Values are cloned once per subscriber; cheap for the
/// `Arc`-backed types this module is used with (`Frame`, `VideoStats`).
pub struct FanOut<T: Clone> {
    producers: Vec<HeapProducer<T>>,
}

impl<T: Clone> FanOut<T> {
    pub fn new() -> Self {
        Self {
            producers: Vec::new(),
        }
    }

    /// Registers a new observer with a mailbox of the given capacity.
    /// Past publications are not replayed.
    pub fn subscribe(&mut self, capacity: usize) -> HeapConsumer<T> {
        let rb = HeapRb::<T>::new(capacity.max(1));
        let (producer, consumer) = rb.split();
        self.producers.push(producer);
        consumer
    }

    /// Current number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.producers.len()
    }

    /// Publishes one value to every subscriber. Non-blocking: a full
    /// mailbox silently drops its oldest entry to make room.
    pub fn publish(&mut self, value: T) {
        for producer in &mut self.producers {
            producer.push_overwrite(value.clone());
        }
    }
}

impl<T: Clone> Default for FanOut<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out of decoded frames to observers such as a live-view UI.
pub type FrameBus = FanOut<crate::frame::Frame>;

/// Fan-out of per-frame rate/drop snapshots to diagnostics observers.
pub type StatsBus = FanOut<crate::video_stats::VideoStats>;

/// Fan-out of clip-acquired notifications, emitted once a clip has been
/// handed to the analysis sink.
pub type ClipEventBus = FanOut<crate::analysis_sink::AcquiredClipEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_subscriber_receives_every_published_value() {
        let mut bus: FanOut<u32> = FanOut::new();
        let mut a = bus.subscribe(4);
        let mut b = bus.subscribe(4);
        bus.publish(1);
        bus.publish(2);
        assert_eq!(a.pop(), Some(1));
        assert_eq!(a.pop(), Some(2));
        assert_eq!(b.pop(), Some(1));
        assert_eq!(b.pop(), Some(2));
    }

    #[test]
    fn overflow_drops_the_oldest_entry_not_the_newest() {
        let mut bus: FanOut<u32> = FanOut::new();
        let mut sub = bus.subscribe(2);
        bus.publish(1);
        bus.publish(2);
        bus.publish(3); // mailbox full at 2: oldest (1) is overwritten
        assert_eq!(sub.pop(), Some(2));
        assert_eq!(sub.pop(), Some(3));
        assert_eq!(sub.pop(), None);
    }

    #[test]
    fn late_subscriber_does_not_see_earlier_publications() {
        let mut bus: FanOut<u32> = FanOut::new();
        bus.publish(1);
        let mut sub = bus.subscribe(4);
        bus.publish(2);
        assert_eq!(sub.pop(), Some(2));
    }
}
