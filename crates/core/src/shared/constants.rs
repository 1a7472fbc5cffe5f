pub const DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const DETECTOR_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Euclidean distance at or below which a detection matches an identity.
///
/// Calibrated for L2-normalized ArcFace embeddings, where a distance of 1.1
/// corresponds to a cosine similarity of roughly 0.4.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 1.1;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Recommended reference photos per student. Advisory only; the gallery
/// accepts any count from one upward.
pub const RECOMMENDED_REFERENCES_PER_STUDENT: usize = 4;
