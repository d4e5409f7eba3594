//! Frame container.
//!
//! - `Frame`: decoded RGB raster plus capture time. Sources produce it, the detector
//!   reads it, and the session annotates a copy of it for observers.
//!
//! Detection always runs on the untouched pixels. Annotation draws onto a clone, so
//! a marker banner can never feed back into the fire mask.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::DetectionResult;

/// Height of the status banner drawn across the top of annotated frames.
const BANNER_HEIGHT: u32 = 24;
/// Thickness of the alert border drawn around positive frames.
const ALERT_BORDER: u32 = 4;

const FIRE_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const CLEAR_COLOR: Rgb<u8> = Rgb([0, 160, 0]);

/// One sampled image from a camera or an uploaded file.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    /// Wrap a packed RGB24 buffer. Fails when the buffer length does not match the
    /// dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer rejected for {}x{}", width, height))?;
        Ok(Self::new(image))
    }

    /// Decode an encoded image (JPEG or PNG) into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode image")?;
        Ok(Self::new(image.into_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Render the detection outcome onto a copy of the frame.
    ///
    /// Positive frames get a red banner and border, negative frames a green banner.
    pub fn annotate(&self, result: &DetectionResult) -> RgbImage {
        let mut canvas = self.image.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        let color = if result.detected {
            FIRE_COLOR
        } else {
            CLEAR_COLOR
        };
        let banner = Rect::at(0, 0).of_size(width, BANNER_HEIGHT.min(height));
        draw_filled_rect_mut(&mut canvas, banner, color);

        if result.detected {
            let rings = ALERT_BORDER.min(width / 2).min(height / 2);
            for inset in 0..rings {
                let rect = Rect::at(inset as i32, inset as i32)
                    .of_size(width - 2 * inset, height - 2 * inset);
                draw_hollow_rect_mut(&mut canvas, rect, FIRE_COLOR);
            }
        }
        canvas
    }
}

/// Human-readable marker text for a detection outcome.
pub fn annotation_label(result: &DetectionResult) -> String {
    if result.detected {
        format!("FIRE DETECTED! Confidence: {:.1}%", result.confidence)
    } else {
        "No Fire Detected".to_string()
    }
}

/// Encode an RGB raster as JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Frame::decode(b"definitely not an image").is_err());
    }

    #[test]
    fn annotate_leaves_source_pixels_untouched() {
        let frame = solid(64, 48, [10, 10, 10]);
        let positive = DetectionResult {
            detected: true,
            confidence: 40.0,
        };

        let annotated = frame.annotate(&positive);

        assert_eq!(annotated.get_pixel(10, 5), &FIRE_COLOR);
        assert_eq!(annotated.get_pixel(0, 40), &FIRE_COLOR);
        assert_eq!(annotated.get_pixel(30, 30), &Rgb([10, 10, 10]));
        assert_eq!(frame.image().get_pixel(10, 5), &Rgb([10, 10, 10]));
    }

    #[test]
    fn negative_annotation_has_green_banner_and_no_border() {
        let frame = solid(64, 48, [10, 10, 10]);
        let annotated = frame.annotate(&DetectionResult::default());

        assert_eq!(annotated.get_pixel(10, 5), &CLEAR_COLOR);
        assert_eq!(annotated.get_pixel(0, 40), &Rgb([10, 10, 10]));
    }

    #[test]
    fn labels_match_marker_text() {
        let positive = DetectionResult {
            detected: true,
            confidence: 37.26,
        };
        assert_eq!(
            annotation_label(&positive),
            "FIRE DETECTED! Confidence: 37.3%"
        );
        assert_eq!(
            annotation_label(&DetectionResult::default()),
            "No Fire Detected"
        );
    }

    #[test]
    fn jpeg_encoding_produces_decodable_bytes() -> Result<()> {
        let frame = solid(32, 32, [200, 100, 0]);
        let bytes = encode_jpeg(frame.image(), 80)?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = Frame::decode(&bytes)?;
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 32);
        Ok(())
    }
}
