use std::fmt;

use serde::Serialize;

use crate::encoding::domain::face_encoder::DetectedFace;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_encoding::FaceEncoding;

/// Identifier of one detection within a single attendance run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DetectionId(pub usize);

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One face found in the group photo.
///
/// Created per engine invocation; ends up either as supporting evidence
/// on a present student or in the unrecognized list awaiting reupload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub id: DetectionId,
    #[serde(skip)]
    pub encoding: FaceEncoding,
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

impl Detection {
    /// Numbers encoder output in order, yielding stable per-run ids.
    pub fn from_faces(faces: Vec<DetectedFace>) -> Vec<Detection> {
        faces
            .into_iter()
            .enumerate()
            .map(|(i, face)| Detection {
                id: DetectionId(i),
                encoding: face.encoding,
                bounding_box: face.bounding_box,
                confidence: face.confidence,
            })
            .collect()
    }
}
