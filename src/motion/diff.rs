//! Inter-frame luminance diff.
//!
//! Both diff fidelities share one brightness model and the same strict
//! `|ΔL| > threshold` rule; they differ only in stride and payload.

use crate::capture::frame::BYTES_PER_PIXEL;

/// Threshold used by the exhaustive diff that feeds the event evaluator.
pub const EVENT_THRESHOLD: f64 = 50.0;
/// Threshold used by the sampled diff that drives the overlay.
pub const OVERLAY_THRESHOLD: f64 = 70.0;
/// Fraction of pixels the sampled diff visits.
pub const SAMPLE_RATIO: f64 = 0.25;

/// Weighted brightness. The blue weight is `0.722`, not the Rec. 709
/// `0.0722`; existing alarm thresholds are tuned against this value.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.2126 * r as f64 + 0.7152 * g as f64 + 0.722 * b as f64
}

/// A pixel whose brightness moved past the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDelta {
    pub x: u32,
    pub y: u32,
    /// New pixel value; only filled in by [`exhaustive_diff`].
    pub rgba: Option<[u8; 4]>,
}

/// Pixel stride giving roughly `ratio` coverage of `total_pixels`.
pub fn sample_step(total_pixels: usize, ratio: f64) -> usize {
    if total_pixels == 0 || ratio <= 0.0 {
        return 1;
    }
    let step = (total_pixels as f64 / (total_pixels as f64 * ratio)).floor();
    (step as usize).max(1)
}

/// Every pixel, with its new RGBA value.
pub fn exhaustive_diff(previous: &[u8], current: &[u8], width: u32, threshold: f64) -> Vec<PixelDelta> {
    scan(previous, current, width, 1, threshold, true)
}

/// Every `sample_step`-th pixel, coordinates only.
pub fn sampled_diff(
    previous: &[u8],
    current: &[u8],
    width: u32,
    threshold: f64,
    ratio: f64,
) -> Vec<PixelDelta> {
    let pixels = previous.len().min(current.len()) / BYTES_PER_PIXEL;
    scan(previous, current, width, sample_step(pixels, ratio), threshold, false)
}

fn scan(
    previous: &[u8],
    current: &[u8],
    width: u32,
    step: usize,
    threshold: f64,
    with_rgba: bool,
) -> Vec<PixelDelta> {
    let width = width.max(1) as usize;

    previous
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(current.chunks_exact(BYTES_PER_PIXEL))
        .enumerate()
        .step_by(step.max(1))
        .filter(|(_, (prev, curr))| {
            let before = luminance(prev[0], prev[1], prev[2]);
            let after = luminance(curr[0], curr[1], curr[2]);
            (before - after).abs() > threshold
        })
        .map(|(index, (_, curr))| PixelDelta {
            x: (index % width) as u32,
            y: (index / width) as u32,
            rgba: with_rgba.then(|| [curr[0], curr[1], curr[2], curr[3]]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(b: u8) -> [u8; 4] {
        [0, 0, b, 255]
    }

    #[test]
    fn luminance_uses_reference_weights() {
        assert_eq!(luminance(0, 0, 0), 0.0);
        assert!((luminance(100, 0, 0) - 21.26).abs() < 1e-9);
        assert!((luminance(0, 100, 0) - 71.52).abs() < 1e-9);
        assert!((luminance(0, 0, 100) - 72.2).abs() < 1e-9);
    }

    #[test]
    fn exhaustive_threshold_is_strict() {
        // 0.722 * 70 = 50.54, 0.722 * 69 = 49.82
        assert_eq!(exhaustive_diff(&px(0), &px(70), 1, EVENT_THRESHOLD).len(), 1);
        assert!(exhaustive_diff(&px(0), &px(69), 1, EVENT_THRESHOLD).is_empty());
    }

    #[test]
    fn sampled_threshold_is_strict() {
        // 0.722 * 97 = 70.03, 0.722 * 96 = 69.31
        let changed = sampled_diff(&px(0), &px(97), 1, OVERLAY_THRESHOLD, SAMPLE_RATIO);
        assert_eq!(changed, vec![PixelDelta { x: 0, y: 0, rgba: None }]);
        assert!(sampled_diff(&px(0), &px(96), 1, OVERLAY_THRESHOLD, SAMPLE_RATIO).is_empty());
    }

    #[test]
    fn identical_frames_have_no_delta() {
        let frame: Vec<u8> = (0..64).collect();
        assert!(exhaustive_diff(&frame, &frame, 4, 0.0).is_empty());
        assert!(sampled_diff(&frame, &frame, 4, 0.0, SAMPLE_RATIO).is_empty());
    }

    #[test]
    fn darkening_counts_like_brightening() {
        assert_eq!(exhaustive_diff(&px(200), &px(100), 1, EVENT_THRESHOLD).len(), 1);
    }

    #[test]
    fn exhaustive_reports_coordinates_and_new_pixel() {
        let previous = vec![0u8; 3 * 2 * 4];
        let mut current = previous.clone();
        // pixel (2, 1) → index 5
        current[20..24].copy_from_slice(&[255, 255, 255, 9]);

        let deltas = exhaustive_diff(&previous, &current, 3, EVENT_THRESHOLD);

        assert_eq!(
            deltas,
            vec![PixelDelta {
                x: 2,
                y: 1,
                rgba: Some([255, 255, 255, 9])
            }]
        );
    }

    #[test]
    fn sample_step_covers_a_quarter() {
        assert_eq!(sample_step(1, 0.25), 4);
        assert_eq!(sample_step(1920 * 1080, 0.25), 4);
        assert_eq!(sample_step(100, 1.0), 1);
        assert_eq!(sample_step(0, 0.25), 1);
    }

    #[test]
    fn sampled_diff_skips_unsampled_pixels() {
        let previous = vec![0u8; 8 * 4];
        let current = vec![255u8; 8 * 4];

        let deltas = sampled_diff(&previous, &current, 8, OVERLAY_THRESHOLD, SAMPLE_RATIO);

        let xs: Vec<u32> = deltas.iter().map(|d| d.x).collect();
        assert_eq!(xs, vec![0, 4]);
    }
}
