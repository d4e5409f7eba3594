use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ingest::CameraConfig;
use crate::session::{SessionConfig, DEFAULT_JPEG_QUALITY};

const DEFAULT_CAMERA_DEVICE: &str = "stub://front_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 100;
const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";

#[derive(Debug, Deserialize, Default)]
struct FirewatchConfigFile {
    camera: Option<CameraConfigFile>,
    session: Option<SessionConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    frame_interval_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FirewatchConfig {
    pub camera: CameraSettings,
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
    pub api_addr: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl FirewatchConfig {
    /// Load from the JSON file named by `FIREWATCH_CONFIG` (optional), then apply
    /// `FIREWATCH_*` environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FIREWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FirewatchConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        Self {
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            frame_interval: Duration::from_millis(
                session
                    .frame_interval_ms
                    .unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
            ),
            jpeg_quality: session.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("FIREWATCH_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(fps) = std::env::var("FIREWATCH_CAMERA_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_CAMERA_FPS must be an integer"))?;
        }
        if let Ok(interval) = std::env::var("FIREWATCH_FRAME_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("FIREWATCH_FRAME_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.frame_interval = Duration::from_millis(millis);
        }
        if let Ok(quality) = std::env::var("FIREWATCH_JPEG_QUALITY") {
            self.jpeg_quality = quality
                .trim()
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_JPEG_QUALITY must be an integer in 1..=100"))?;
        }
        if let Ok(addr) = std::env::var("FIREWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.frame_interval.is_zero() {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be within 1..=100, got {}",
                self.jpeg_quality
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        Ok(())
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.camera.device.clone(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frame_interval: self.frame_interval,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

fn read_config_file(path: &Path) -> Result<FirewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
