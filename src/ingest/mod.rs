//! Frame ingestion sources.
//!
//! This module provides the sources a detection session can pull frames from:
//! - Live cameras: USB/V4L2 devices (feature: ingest-v4l2) and a synthetic
//!   `stub://` camera
//! - Batches of uploaded images held in memory
//!
//! All sources produce decoded RGB `Frame` instances. A source is opened once per
//! session, read until the session stops or the source reports exhaustion, then
//! released.

mod batch;
mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use batch::BatchSource;
pub use camera::{CameraConfig, CameraSource, CameraStats};

/// A sequence of frames.
///
/// Live sources block in `next_frame` until the device delivers; finite sources
/// return immediately and report `Ok(None)` once every item has been handed out.
pub trait FrameSource: Send {
    /// Identifier used in logs.
    fn name(&self) -> String;

    /// Acquire the underlying resource. A failure here means the source is unavailable.
    fn open(&mut self) -> Result<()>;

    /// Read the next frame.
    ///
    /// `Err` is a transient read failure; callers may keep reading.
    /// `Ok(None)` means the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying resource. Safe to call more than once.
    fn release(&mut self) {}
}
