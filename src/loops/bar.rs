//! Bar-boundary detection on the audio clock
//!
//! The detector is edge-triggered on `floor((now - origin) / bar_duration)`:
//! it reports each increase of that integer exactly once, however often it
//! is polled, and never reports the bar it was armed in.

use crate::error::{validate_bpm, TransportError};

/// Length of one 4/4 bar in seconds.
pub fn bar_duration(bpm: f64) -> f64 {
    (60.0 / bpm) * 4.0
}

#[derive(Debug, Clone)]
pub struct BarBoundaryDetector {
    bpm: f64,
    origin: Option<f64>,
    last_bar: i64,
}

impl BarBoundaryDetector {
    pub fn new(bpm: f64) -> Result<Self, TransportError> {
        Ok(Self {
            bpm: validate_bpm(bpm)?,
            origin: None,
            last_bar: 0,
        })
    }

    /// Start counting bars from `now`.
    pub fn arm(&mut self, now: f64) {
        self.origin = Some(now);
        self.last_bar = 0;
    }

    pub fn disarm(&mut self) {
        self.origin = None;
        self.last_bar = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.origin.is_some()
    }

    pub fn origin(&self) -> Option<f64> {
        self.origin
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change tempo without jumping the bar phase at `now`.
    pub fn set_bpm(&mut self, bpm: f64, now: f64) -> Result<(), TransportError> {
        let bpm = validate_bpm(bpm)?;
        if let Some(position) = self.bar_position(now) {
            self.origin = Some(now - position * bar_duration(bpm));
        }
        self.bpm = bpm;
        Ok(())
    }

    /// Bars elapsed since arming, fractional.
    pub fn bar_position(&self, now: f64) -> Option<f64> {
        self.origin
            .map(|origin| (now - origin) / bar_duration(self.bpm))
    }

    /// Returns the new bar index when a boundary was crossed since the last
    /// poll. Several missed boundaries still report once.
    pub fn poll(&mut self, now: f64) -> Option<i64> {
        let bar = self.bar_position(now)?.floor() as i64;
        if bar > self.last_bar {
            self.last_bar = bar;
            Some(bar)
        } else {
            None
        }
    }

    /// Absolute time at which `bar` begins.
    pub fn boundary_time(&self, bar: i64) -> Option<f64> {
        self.origin
            .map(|origin| origin + bar as f64 * bar_duration(self.bpm))
    }

    /// Absolute time of the next boundary.
    pub fn next_boundary(&self) -> Option<f64> {
        self.boundary_time(self.last_bar + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_duration() {
        assert!((bar_duration(120.0) - 2.0).abs() < 1e-12);
        assert!((bar_duration(60.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_fires_on_arming() {
        let mut detector = BarBoundaryDetector::new(120.0).unwrap();
        assert_eq!(detector.poll(0.0), None, "disarmed detector is silent");

        detector.arm(10.0);
        assert_eq!(detector.poll(10.0), None);
        assert_eq!(detector.poll(11.99), None);
    }

    #[test]
    fn test_fires_once_per_crossing() {
        let mut detector = BarBoundaryDetector::new(120.0).unwrap();
        detector.arm(0.0);

        assert_eq!(detector.poll(2.0), Some(1));
        assert_eq!(detector.poll(2.016), None);
        assert_eq!(detector.poll(3.9), None);
        assert_eq!(detector.poll(4.1), Some(2));
    }

    #[test]
    fn test_missed_crossings_report_once() {
        let mut detector = BarBoundaryDetector::new(120.0).unwrap();
        detector.arm(0.0);
        assert_eq!(detector.poll(7.0), Some(3));
        assert_eq!(detector.poll(7.5), None);
    }

    #[test]
    fn test_bpm_change_keeps_phase() {
        let mut detector = BarBoundaryDetector::new(120.0).unwrap();
        detector.arm(0.0);
        // Halfway through bar 0
        detector.set_bpm(60.0, 1.0).unwrap();

        assert!((detector.bar_position(1.0).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(detector.poll(2.9), None);
        assert_eq!(detector.poll(3.0), Some(1), "remaining half bar at 60 BPM is 2s");
    }

    #[test]
    fn test_next_boundary() {
        let mut detector = BarBoundaryDetector::new(120.0).unwrap();
        assert_eq!(detector.next_boundary(), None);
        detector.arm(1.0);
        assert_eq!(detector.next_boundary(), Some(3.0));
        detector.poll(3.5);
        assert_eq!(detector.next_boundary(), Some(5.0));
        assert_eq!(detector.boundary_time(1), Some(3.0));
    }

    #[test]
    fn test_invalid_bpm_rejected() {
        assert!(BarBoundaryDetector::new(-1.0).is_err());
        let mut detector = BarBoundaryDetector::new(120.0).unwrap();
        assert!(detector.set_bpm(f64::INFINITY, 0.0).is_err());
        assert_eq!(detector.bpm(), 120.0);
    }
}
