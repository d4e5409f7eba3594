mod backend;
mod fire;
mod hsv;
mod result;

pub use backend::DetectorBackend;
pub use fire::{
    score, FireDetector, DETECTION_THRESHOLD, FIRE_RANGE_A, FIRE_RANGE_B, MIN_CONTOUR_AREA,
    MORPH_KERNEL_SIZE,
};
pub use hsv::{rgb_to_hsv, HsvRange};
pub use result::DetectionResult;
