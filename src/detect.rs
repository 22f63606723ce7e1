//! Pair-wise pixel differencing between consecutive frames (§4.5).

/// Result of running the detection engine against one frame.
pub struct DetectionResult {
    /// Whether the changed-pixel count exceeded the configured threshold.
    pub event: bool,
    /// Indices of pixels whose absolute difference exceeded `threshold`,
    /// used by the caller to paint the event-indicator colour into an
    /// annotated image when one is being produced.
    pub changed_pixels: Vec<usize>,
}

/// Counts pixels whose absolute difference from the immediately preceding
/// frame exceeds `threshold`, and flags an event if that count exceeds `k`.
/// With no prior frame, always returns no event (property 3).
pub struct DetectionEngine {
    threshold: u8,
    k: usize,
}

impl DetectionEngine {
    pub fn new(threshold: u8, k: usize) -> Self {
        Self { threshold, k }
    }

    pub fn run(&self, current: &[u8], prior: Option<&[u8]>) -> DetectionResult {
        let Some(prior) = prior else {
            return DetectionResult {
                event: false,
                changed_pixels: Vec::new(),
            };
        };

        let mut changed_pixels = Vec::new();
        for (p, (&new, &old)) in current.iter().zip(prior.iter()).enumerate() {
            if new.abs_diff(old) > self.threshold {
                changed_pixels.push(p);
            }
        }

        DetectionResult {
            event: changed_pixels.len() > self.k,
            changed_pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property 3: with no prior frame, the signal is always false.
    #[test]
    fn no_prior_frame_is_always_safe() {
        let engine = DetectionEngine::new(10, 0);
        let current = vec![255u8; 16];
        let result = engine.run(&current, None);
        assert!(!result.event);
        assert!(result.changed_pixels.is_empty());
    }

    /// Property 2: DetectionEngine(A, B) == DetectionEngine(B, A) in count.
    #[test]
    fn detection_is_symmetric() {
        let engine = DetectionEngine::new(10, 2);
        let a = vec![0u8, 100, 200, 255];
        let b = vec![5u8, 90, 190, 0];
        let ab = engine.run(&a, Some(&b));
        let ba = engine.run(&b, Some(&a));
        assert_eq!(ab.changed_pixels.len(), ba.changed_pixels.len());
        assert_eq!(ab.event, ba.event);
    }

    #[test]
    fn threshold_uses_unsigned_saturating_distance() {
        let engine = DetectionEngine::new(10, 0);
        let a = vec![0u8];
        let b = vec![255u8];
        let result = engine.run(&a, Some(&b));
        assert_eq!(result.changed_pixels, vec![0]);
    }

    #[test]
    fn event_requires_strictly_more_than_k_changed_pixels() {
        let engine = DetectionEngine::new(10, 2);
        let current = vec![100u8, 100, 100, 0];
        let prior = vec![0u8, 0, 0, 0];
        // exactly 3 pixels changed (k=2): event should fire
        let result = engine.run(&current, Some(&prior));
        assert_eq!(result.changed_pixels.len(), 3);
        assert!(result.event);

        let engine2 = DetectionEngine::new(10, 3);
        let result2 = engine2.run(&current, Some(&prior));
        assert!(!result2.event);
    }
}
