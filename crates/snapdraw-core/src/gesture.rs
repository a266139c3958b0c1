//! Click and tap classification.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Where and when a pointer went down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub time_ms: u64,
    pub point: Point,
}

impl PointerSample {
    pub fn new(time_ms: u64, point: Point) -> Self {
        Self { time_ms, point }
    }
}

/// Upper bounds for a press/release pair to count as a click or tap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureThresholds {
    pub max_time_ms: u64,
    pub max_distance_px: f64,
}

impl GestureThresholds {
    /// Mouse click tolerance.
    pub const CLICK: Self = Self {
        max_time_ms: 500,
        max_distance_px: 4.0,
    };

    /// Touch tap tolerance.
    pub const TAP: Self = Self {
        max_time_ms: 250,
        max_distance_px: 25.0,
    };

    fn accepts(&self, start: &PointerSample, end: &PointerSample) -> bool {
        let elapsed = end.time_ms.saturating_sub(start.time_ms);
        elapsed <= self.max_time_ms && start.point.distance(end.point) <= self.max_distance_px
    }
}

/// Whether `end` completes a click started at `start`.
///
/// An absent start never classifies as a click.
pub fn is_click(
    start: Option<&PointerSample>,
    end: &PointerSample,
    thresholds: &GestureThresholds,
) -> bool {
    completes(start, end, thresholds)
}

/// Whether `end` completes a tap started at `start`.
pub fn is_tap(
    start: Option<&PointerSample>,
    end: &PointerSample,
    thresholds: &GestureThresholds,
) -> bool {
    completes(start, end, thresholds)
}

fn completes(
    start: Option<&PointerSample>,
    end: &PointerSample,
    thresholds: &GestureThresholds,
) -> bool {
    start.is_some_and(|s| thresholds.accepts(s, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time_ms: u64, x: f64, y: f64) -> PointerSample {
        PointerSample::new(time_ms, Point::new(x, y))
    }

    #[test]
    fn test_click_within_thresholds() {
        let start = sample(0, 0.0, 0.0);
        assert!(is_click(Some(&start), &sample(100, 3.0, 0.0), &GestureThresholds::CLICK));
    }

    #[test]
    fn test_click_boundaries_are_inclusive() {
        let start = sample(1000, 10.0, 10.0);
        let end = sample(1500, 14.0, 10.0);
        assert!(is_click(Some(&start), &end, &GestureThresholds::CLICK));
    }

    #[test]
    fn test_click_rejected_when_too_far() {
        let start = sample(0, 0.0, 0.0);
        assert!(!is_click(Some(&start), &sample(100, 5.0, 0.0), &GestureThresholds::CLICK));
    }

    #[test]
    fn test_click_rejected_when_too_slow() {
        let start = sample(0, 0.0, 0.0);
        assert!(!is_click(Some(&start), &sample(501, 0.0, 0.0), &GestureThresholds::CLICK));
    }

    #[test]
    fn test_click_requires_start() {
        assert!(!is_click(None, &sample(0, 0.0, 0.0), &GestureThresholds::CLICK));
        assert!(!is_tap(None, &sample(0, 0.0, 0.0), &GestureThresholds::TAP));
    }

    #[test]
    fn test_click_and_tap_differ_only_by_thresholds() {
        let start = sample(0, 0.0, 0.0);
        for end in [sample(200, 10.0, 0.0), sample(400, 1.0, 0.0), sample(100, 2.0, 2.0)] {
            for thresholds in [GestureThresholds::CLICK, GestureThresholds::TAP] {
                assert_eq!(
                    is_click(Some(&start), &end, &thresholds),
                    is_tap(Some(&start), &end, &thresholds)
                );
            }
        }
        let moved = sample(200, 10.0, 0.0);
        assert!(!is_click(Some(&start), &moved, &GestureThresholds::CLICK));
        assert!(is_tap(Some(&start), &moved, &GestureThresholds::TAP));
    }

    #[test]
    fn test_tap_thresholds() {
        let start = sample(0, 0.0, 0.0);
        assert!(is_tap(Some(&start), &sample(250, 15.0, 20.0), &GestureThresholds::TAP));
        assert!(!is_tap(Some(&start), &sample(251, 0.0, 0.0), &GestureThresholds::TAP));
        assert!(!is_tap(Some(&start), &sample(10, 20.0, 20.0), &GestureThresholds::TAP));
    }
}
