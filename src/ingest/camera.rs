//! Live camera source.
//!
//! This module provides `CameraSource` for live detection. It is responsible for:
//! - Opening the configured device (e.g., /dev/video0)
//! - Capturing frames in-memory and handing them over as RGB `Frame`s
//! - Releasing the device when the session ends
//!
//! Real devices require the `ingest-v4l2` feature. `stub://` devices use a
//! synthetic camera that renders a dark scene with a recurring flame patch.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::Rng;

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::DeviceV4l2Source;
use super::FrameSource;
use crate::frame::Frame;

/// Frames per synthetic scene cycle.
const SYNTHETIC_CYCLE: u64 = 50;
/// Cycle offset at which the synthetic flame appears.
const SYNTHETIC_FLAME_START: u64 = 25;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or "stub://<name>".
    pub device: String,
    /// Requested frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Live camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported(String),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        let backend = if config.device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(config))
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(DeviceV4l2Source::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                CameraBackend::Unsupported(config.device)
            }
        };
        Self { backend }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => false,
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(device) => CameraStats {
                frames_captured: 0,
                device: device.clone(),
            },
        }
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> String {
        format!("camera({})", self.stats().device)
    }

    fn open(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(device) => Err(anyhow!(
                "camera {} requires the ingest-v4l2 feature",
                device
            )),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame().map(Some),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame().map(Some),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(device) => {
                Err(anyhow!("camera {} is not open", device))
            }
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.disconnect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.disconnect(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => {}
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for demos and tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic camera {} has empty dimensions",
                self.config.device
            ));
        }
        self.connected = true;
        log::info!(
            "CameraSource: connected to {} (synthetic, {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            log::info!("CameraSource: released {}", self.config.device);
        }
        self.connected = false;
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic camera {} not connected", self.config.device));
        }
        self.frame_count += 1;
        Ok(Frame::new(self.render()))
    }

    /// Dark background; during the second half of every cycle a flickering flame
    /// patch covers roughly 40% of the frame.
    fn render(&self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = RgbImage::from_pixel(width, height, Rgb([18, 18, 26]));
        if self.frame_count % SYNTHETIC_CYCLE < SYNTHETIC_FLAME_START {
            return image;
        }

        let mut rng = rand::thread_rng();
        let (x0, x1) = (width / 5, width * 4 / 5);
        let (y0, y1) = (height / 6, height * 5 / 6);
        for y in y0..y1 {
            for x in x0..x1 {
                let red = rng.gen_range(230..=255);
                let green = rng.gen_range(60..=140);
                let blue = rng.gen_range(0..=30);
                image.put_pixel(x, y, Rgb([red, green, blue]));
            }
        }
        image
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorBackend, FireDetector};

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 10,
            width: 160,
            height: 120,
        }
    }

    #[test]
    fn stub_camera_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config());
        source.open()?;

        let frame = source.next_frame()?.expect("live sources never exhaust");
        assert_eq!(frame.width(), 160);
        assert_eq!(frame.height(), 120);
        assert_eq!(source.stats().frames_captured, 1);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn stub_camera_requires_open() {
        let mut source = CameraSource::new(stub_config());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn stub_camera_cycles_flame_patch() -> Result<()> {
        let detector = FireDetector::new();
        let mut source = CameraSource::new(stub_config());
        source.open()?;

        let mut outcomes = Vec::new();
        for _ in 0..SYNTHETIC_CYCLE {
            let frame = source.next_frame()?.expect("frame");
            outcomes.push(detector.detect(&frame).detected);
        }

        // Frames are 1-based: the flame shows from frame 25 through 49, and frame 50
        // starts the next cycle.
        assert!(!outcomes[0]);
        assert!(!outcomes[22]);
        assert!(outcomes[24]);
        assert!(outcomes[48]);
        assert!(!outcomes[49]);
        Ok(())
    }

    #[test]
    fn release_disconnects() -> Result<()> {
        let mut source = CameraSource::new(stub_config());
        source.open()?;
        source.release();
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn real_device_without_feature_is_unavailable() {
        let mut source = CameraSource::new(CameraConfig::default());
        assert!(source.open().is_err());
        assert!(!source.is_healthy());
    }
}
