use serde::Serialize;

/// Outcome of running fire detection on one frame.
///
/// Recomputed for every frame; never mutated after creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Confidence cleared the detection threshold.
    pub detected: bool,
    /// Percentage of the frame covered by qualifying fire regions, in `0.0..=100.0`.
    pub confidence: f64,
}
