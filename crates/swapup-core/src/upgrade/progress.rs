//! Upload progress accounting.
//!
//! Progress is per-image: the counter resets to zero when the next image's
//! upload opens. Display layers assume this, so a cumulative whole-run
//! fraction is deliberately not offered.

use std::time::SystemTime;

/// Fraction of an image uploaded, clamped to [0.0, 1.0].
pub fn ratio(bytes_sent: u64, image_size: u64) -> f64 {
    if image_size == 0 {
        return 0.0;
    }
    (bytes_sent as f64 / image_size as f64).clamp(0.0, 1.0)
}

/// One progress observation during Upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Bytes of the current image acknowledged so far.
    pub bytes_sent: u64,
    /// Size of the current image.
    pub image_size: u64,
    pub timestamp: SystemTime,
}

impl ProgressSample {
    pub fn ratio(&self) -> f64 {
        ratio(self.bytes_sent, self.image_size)
    }

    pub fn percent(&self) -> u8 {
        (self.ratio() * 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(ratio(0, 1000), 0.0);
        assert_eq!(ratio(500, 1000), 0.5);
        assert_eq!(ratio(1000, 1000), 1.0);
        // Overshoot clamps instead of leaking >1.0 to display code.
        assert_eq!(ratio(1500, 1000), 1.0);
    }

    #[test]
    fn test_ratio_zero_size() {
        assert_eq!(ratio(10, 0), 0.0);
    }

    #[test]
    fn test_sample_percent() {
        let sample = ProgressSample {
            bytes_sent: 250,
            image_size: 1000,
            timestamp: SystemTime::UNIX_EPOCH,
        };
        assert_eq!(sample.percent(), 25);
        assert!((sample.ratio() - 0.25).abs() < f64::EPSILON);
    }
}
