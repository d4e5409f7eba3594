use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends are shared between the controller and the session worker, so they
/// take `&self` and must be thread-safe. `analyze` surfaces internal faults; the
/// session decides how a fault is counted.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the frame as read-only.
    fn analyze(&self, frame: &Frame) -> Result<DetectionResult>;

    /// Infallible detection: faults are logged and reported as no detection.
    fn detect(&self, frame: &Frame) -> DetectionResult {
        match self.analyze(frame) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("{}: detection failed: {:#}", self.name(), err);
                DetectionResult::default()
            }
        }
    }
}
