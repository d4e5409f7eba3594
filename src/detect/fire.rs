//! Color-heuristic fire detector.
//!
//! The pipeline is fixed and deterministic:
//!
//! 1. RGB → 8-bit HSV.
//! 2. Two overlapping fire hue bands, masked separately and OR-ed together.
//! 3. Morphological closing then opening with a 5×5 square to fill gaps and drop speckle.
//! 4. External contours of the cleaned mask; contours of area ≤ 500 px are noise.
//! 5. Confidence is the covered share of the frame (percent, capped at 100);
//!    detection requires strictly more than 25%.

use anyhow::{anyhow, Result};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

use crate::detect::backend::DetectorBackend;
use crate::detect::hsv::{bitwise_or, frame_to_hsv, HsvRange};
use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Red-orange through yellow.
pub const FIRE_RANGE_A: HsvRange = HsvRange::new([0, 50, 50], [30, 255, 255]);
/// Orange through yellow. Overlaps range A on hue 15..=30.
pub const FIRE_RANGE_B: HsvRange = HsvRange::new([15, 50, 50], [35, 255, 255]);

/// Side length of the square structuring element.
pub const MORPH_KERNEL_SIZE: u8 = 5;
/// Contours enclosing this many pixels or fewer are discarded.
pub const MIN_CONTOUR_AREA: f64 = 500.0;
/// Confidence must be strictly above this to count as a detection.
pub const DETECTION_THRESHOLD: f64 = 25.0;

/// HSV color/shape fire detector. Stateless; one instance can serve any number of
/// threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct FireDetector;

impl FireDetector {
    pub fn new() -> Self {
        Self
    }

    /// Build the cleaned fire-candidate mask for a frame.
    pub fn fire_mask(&self, frame: &Frame) -> Result<GrayImage> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(anyhow!("empty frame ({}x{})", width, height));
        }

        let hsv = frame_to_hsv(frame.image());
        let mask_a = FIRE_RANGE_A.mask(&hsv, width, height)?;
        let mask_b = FIRE_RANGE_B.mask(&hsv, width, height)?;
        let candidates = bitwise_or(&mask_a, &mask_b)?;

        // LInf radius r is a (2r+1)×(2r+1) square.
        let radius = MORPH_KERNEL_SIZE / 2;
        let closed = close(&candidates, Norm::LInf, radius);
        Ok(open(&closed, Norm::LInf, radius))
    }
}

impl DetectorBackend for FireDetector {
    fn name(&self) -> &'static str {
        "fire-hsv"
    }

    fn analyze(&self, frame: &Frame) -> Result<DetectionResult> {
        let mask = self.fire_mask(frame)?;

        let mut total_fire_area = 0.0;
        let mut valid_contours = 0usize;
        for area in external_contour_areas(&mask) {
            if area > MIN_CONTOUR_AREA {
                valid_contours += 1;
                total_fire_area += area;
            }
        }

        let frame_area = u64::from(frame.width()) * u64::from(frame.height());
        let result = score(valid_contours, total_fire_area, frame_area);
        log::trace!(
            "FireDetector: contours={} area={:.0} confidence={:.2}",
            valid_contours,
            total_fire_area,
            result.confidence
        );
        Ok(result)
    }
}

/// Turn region statistics into a detection result.
pub fn score(valid_contours: usize, total_fire_area: f64, frame_area: u64) -> DetectionResult {
    if valid_contours == 0 || frame_area == 0 {
        return DetectionResult::default();
    }
    let confidence = (100.0 * total_fire_area / frame_area as f64).min(100.0);
    DetectionResult {
        detected: confidence > DETECTION_THRESHOLD,
        confidence,
    }
}

/// Areas of the outermost region boundaries in a binary mask.
fn external_contour_areas(mask: &GrayImage) -> Vec<f64> {
    find_contours::<i32>(mask)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(polygon_area)
        .collect()
}

/// Shoelace area of the polygon traced by a contour.
fn polygon_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    twice_area.abs() as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const ORANGE: Rgb<u8> = Rgb([255, 128, 0]);

    fn blank(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    fn fill(image: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, color);
            }
        }
    }

    #[test]
    fn black_frame_is_clear() {
        let frame = Frame::new(blank(120, 90, [0, 0, 0]));
        let result = FireDetector::new().detect(&frame);
        assert_eq!(result, DetectionResult::default());
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn uniform_non_fire_color_is_clear() {
        for rgb in [[0, 0, 255], [40, 200, 60], [128, 128, 128], [255, 255, 255]] {
            let frame = Frame::new(blank(80, 80, rgb));
            assert_eq!(
                FireDetector::new().detect(&frame),
                DetectionResult::default(),
                "color {rgb:?}"
            );
        }
    }

    #[test]
    fn large_fire_rectangle_is_detected() {
        let mut image = blank(100, 100, [0, 0, 0]);
        fill(&mut image, 20, 20, 60, 60, ORANGE);
        let frame = Frame::new(image);

        let result = FireDetector::new().detect(&frame);

        let expected = 100.0 * (60.0 * 60.0) / (100.0 * 100.0);
        assert!(result.detected);
        assert!(
            (result.confidence - expected).abs() < 3.0,
            "confidence {} vs {}",
            result.confidence,
            expected
        );
    }

    #[test]
    fn fire_below_threshold_reports_confidence_only() {
        let mut image = blank(100, 100, [0, 0, 0]);
        fill(&mut image, 30, 30, 40, 40, ORANGE);

        let result = FireDetector::new().detect(&Frame::new(image));

        assert!(!result.detected);
        assert!(result.confidence > 10.0 && result.confidence < 20.0);
    }

    #[test]
    fn small_specks_never_count() {
        // 49 squares of 20×20 cover 49% of the frame, but each contour encloses < 500 px.
        let mut image = blank(200, 200, [0, 0, 0]);
        for gy in 0..7 {
            for gx in 0..7 {
                fill(&mut image, gx * 30, gy * 30, 20, 20, ORANGE);
            }
        }

        let result = FireDetector::new().detect(&Frame::new(image));

        assert_eq!(result, DetectionResult::default());
    }

    #[test]
    fn isolated_pixels_are_removed_by_opening() -> Result<()> {
        let mut image = blank(50, 50, [0, 0, 0]);
        fill(&mut image, 10, 10, 2, 2, ORANGE);
        let mask = FireDetector::new().fire_mask(&Frame::new(image))?;
        assert!(mask.pixels().all(|p| p.0[0] == 0));
        Ok(())
    }

    #[test]
    fn threshold_is_strict() {
        let at = score(1, 2500.0, 10_000);
        assert_eq!(at.confidence, 25.0);
        assert!(!at.detected);

        let above = score(1, 2500.5, 10_000);
        assert!(above.detected);
    }

    #[test]
    fn confidence_is_capped_and_requires_contours() {
        let capped = score(2, 20_000.0, 10_000);
        assert_eq!(capped.confidence, 100.0);
        assert!(capped.detected);

        assert_eq!(score(0, 9_000.0, 10_000), DetectionResult::default());
    }

    #[test]
    fn empty_frame_faults_but_detect_degrades() {
        let frame = Frame::new(RgbImage::new(0, 0));
        let detector = FireDetector::new();
        assert!(detector.analyze(&frame).is_err());
        assert_eq!(detector.detect(&frame), DetectionResult::default());
    }
}
