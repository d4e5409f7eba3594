//! 8-bit HSV conversion and range masking.
//!
//! Hue is stored halved (`0..180`) so it fits a byte; saturation and value span
//! `0..=255`. This is the layout the fire ranges are expressed in.

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, RgbImage};

/// Inclusive HSV box. A pixel matches when every channel lies within bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }

    /// Binary membership mask: 255 where the pixel is inside the range, 0 elsewhere.
    pub(crate) fn mask(&self, hsv: &[[u8; 3]], width: u32, height: u32) -> Result<GrayImage> {
        let expected = (width as usize) * (height as usize);
        if hsv.len() != expected {
            return Err(anyhow!(
                "hsv buffer length mismatch: expected {}, got {}",
                expected,
                hsv.len()
            ));
        }
        let data = hsv
            .iter()
            .map(|&px| if self.contains(px) { 255 } else { 0 })
            .collect();
        GrayImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("mask buffer rejected for {}x{}", width, height))
    }
}

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(i32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max == 0 {
        0
    } else {
        (255.0 * diff as f32 / max as f32).round() as i32
    };

    let h = if diff == 0 {
        0
    } else {
        let d = diff as f32;
        let sector = if max == r {
            30.0 * (g - b) as f32 / d
        } else if max == g {
            60.0 + 30.0 * (b - r) as f32 / d
        } else {
            120.0 + 30.0 * (r - g) as f32 / d
        };
        // Half rounds up: -0.5 is hue 0, not a wrap to 179.
        let mut h = (sector + 0.5).floor() as i32;
        if h < 0 {
            h += 180;
        }
        if h >= 180 {
            h -= 180;
        }
        h
    };

    [h as u8, s as u8, max as u8]
}

/// Convert a whole frame to HSV, row-major.
pub(crate) fn frame_to_hsv(image: &RgbImage) -> Vec<[u8; 3]> {
    image.pixels().map(|px| rgb_to_hsv(px.0)).collect()
}

/// Pixel-wise OR of two masks of equal size.
pub(crate) fn bitwise_or(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    if a.dimensions() != b.dimensions() {
        return Err(anyhow!(
            "mask size mismatch: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        ));
    }
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        *dst = Luma([dst.0[0] | src.0[0]]);
    }
    Ok(out)
}
