//! Brightness to icon-level quantizer
//!
//! Maps a cell's mean luma to an icon index by scanning the configured
//! thresholds from the highest index down and picking the first one the
//! value strictly exceeds. Values at or below every threshold fall back to
//! level 0.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrightnessQuantizer {
    thresholds: Vec<u8>,
}

impl BrightnessQuantizer {
    pub fn new(thresholds: Vec<u8>) -> Self {
        if !is_ascending(&thresholds) {
            log::warn!(
                "brightness thresholds {:?} are not ascending; levels are still picked by scanning from the last index",
                thresholds
            );
        }
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }

    pub fn levels(&self) -> usize {
        self.thresholds.len()
    }

    #[inline]
    pub fn quantize(&self, brightness: f64) -> usize {
        classify(brightness, &self.thresholds)
    }
}

/// Highest index whose threshold is strictly below `brightness`, else 0.
pub fn classify(brightness: f64, thresholds: &[u8]) -> usize {
    thresholds
        .iter()
        .rposition(|&t| brightness > f64::from(t))
        .unwrap_or(0)
}

/// True when thresholds never decrease with the level index.
pub fn is_ascending(thresholds: &[u8]) -> bool {
    thresholds.windows(2).all(|w| w[0] <= w[1])
}

/// Evenly spaced thresholds for `levels` icons: `i * (256 / levels)`.
pub fn default_thresholds(levels: usize) -> Vec<u8> {
    if levels == 0 {
        return Vec::new();
    }
    let step = 256 / levels;
    (0..levels).map(|i| (i * step).min(255) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_picks_highest_threshold_below() {
        let t = [0, 85, 170];
        assert_eq!(classify(200.0, &t), 2);
        assert_eq!(classify(50.0, &t), 0);
        assert_eq!(classify(90.0, &t), 1);
        assert_eq!(classify(170.0, &t), 1);
        assert_eq!(classify(170.5, &t), 2);
    }

    #[test]
    fn test_classify_falls_back_to_first_level() {
        let t = [0, 85, 170];
        assert_eq!(classify(0.0, &t), 0);
        assert_eq!(classify(10.0, &[20, 40]), 0);
        assert_eq!(classify(255.0, &[]), 0);
    }

    #[test]
    fn test_classify_unsorted_thresholds_use_raw_scan() {
        // scanning from the end, 100 > 50 hits index 2 before index 1 is considered
        assert_eq!(classify(100.0, &[0, 200, 50]), 2);
        assert_eq!(classify(40.0, &[0, 200, 50]), 0);
        assert_eq!(classify(10.0, &[200, 100]), 0);
    }

    #[test]
    fn test_default_thresholds() {
        assert_eq!(default_thresholds(3), vec![0, 85, 170]);
        assert_eq!(default_thresholds(4), vec![0, 64, 128, 192]);
        assert_eq!(default_thresholds(1), vec![0]);
        assert!(default_thresholds(0).is_empty());
    }

    #[test]
    fn test_quantizer_reports_levels() {
        let q = BrightnessQuantizer::new(vec![0, 85, 170]);
        assert_eq!(q.levels(), 3);
        assert_eq!(q.quantize(86.0), 1);
        assert!(is_ascending(q.thresholds()));
        assert!(!is_ascending(&[3, 1]));
    }
}
