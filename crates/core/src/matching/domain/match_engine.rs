use thiserror::Error;

use crate::gallery::domain::encoding_store::{EncodingStore, StudentId};
use crate::shared::constants::DEFAULT_MATCH_THRESHOLD;
use crate::shared::face_encoding::FaceEncoding;

/// Matching configuration for one attendance run.
#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    /// Euclidean distance at or below which a detection matches.
    pub threshold: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Result of comparing one query encoding against the gallery.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchVerdict {
    Matched { student_id: StudentId, distance: f64 },
    Unrecognized,
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no students enrolled")]
    EmptyGallery,
    #[error("encoding dimension mismatch: gallery has {expected}, query has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Decide the best-matching student for one query encoding.
///
/// Per student, the identity-level distance is the minimum over that
/// student's reference encodings — the closest-reference policy tolerates
/// individual bad reference photos. The globally closest student wins;
/// at or below the threshold it is a match, above it the query is
/// unrecognized.
///
/// Ties keep the lowest student id: iteration is in ascending id order
/// and only a strictly smaller distance replaces the current best.
pub fn match_detection(
    query: &FaceEncoding,
    store: &EncodingStore,
    config: &MatchConfig,
) -> Result<MatchVerdict, MatchError> {
    let Some(expected) = store.dim() else {
        return Err(MatchError::EmptyGallery);
    };
    if expected != query.dim() {
        return Err(MatchError::DimensionMismatch {
            expected,
            got: query.dim(),
        });
    }

    let mut best: Option<(&StudentId, f64)> = None;
    for (id, record) in store.students() {
        let distance = record
            .encodings
            .iter()
            .map(|reference| reference.distance(query))
            .fold(f64::INFINITY, f64::min);

        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((id, distance));
        }
    }

    match best {
        Some((id, distance)) if distance <= config.threshold => Ok(MatchVerdict::Matched {
            student_id: id.clone(),
            distance,
        }),
        _ => Ok(MatchVerdict::Unrecognized),
    }
}
