use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_encoding::FaceEncoding;
use crate::shared::photo::Photo;

/// One face found in a photo: its embedding plus pixel region.
#[derive(Clone, Debug)]
pub struct DetectedFace {
    pub encoding: FaceEncoding,
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

/// Domain interface for turning photo pixels into face embeddings.
///
/// Zero, one, or many faces per photo. Implementations are shared across
/// enrollment workers, hence `&self` and `Sync`.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, photo: &Photo) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>>;
}
