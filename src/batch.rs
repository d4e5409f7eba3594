//! One-shot analysis of uploaded images.
//!
//! Batch analysis never touches a `DetectionSession`: there is no lifecycle, no pacing
//! and no statistics. Results come back synchronously, in upload order.

use serde::Serialize;

use crate::detect::{DetectorBackend, FireDetector};
use crate::frame::Frame;

/// An uploaded image: its identifying name plus the encoded bytes.
#[derive(Clone, Debug)]
pub struct BatchImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BatchImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Detection outcome for one uploaded image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchResult {
    pub name: String,
    pub detected: bool,
    pub confidence: f64,
}

/// Run fire detection over every readable image.
///
/// Unreadable images are left out of the result list.
pub fn analyze_batch(images: &[BatchImage]) -> Vec<BatchResult> {
    let detector = FireDetector::new();
    images
        .iter()
        .filter_map(|image| match Frame::decode(&image.bytes) {
            Ok(frame) => Some((image, frame)),
            Err(err) => {
                log::debug!("analyze_batch: skipping {}: {:#}", image.name, err);
                None
            }
        })
        .map(|(image, frame)| {
            let result = detector.detect(&frame);
            BatchResult {
                name: image.name.clone(),
                detected: result.detected,
                confidence: result.confidence,
            }
        })
        .collect()
}
