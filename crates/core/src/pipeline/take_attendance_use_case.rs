use std::sync::Arc;

use crate::encoding::domain::face_encoder::FaceEncoder;
use crate::gallery::domain::encoding_store::EncodingStore;
use crate::matching::domain::detection::Detection;
use crate::matching::domain::match_engine::{match_detection, MatchConfig};
use crate::matching::domain::roster_builder::RosterBuilder;
use crate::session::reconciliation_session::ReconciliationSession;
use crate::shared::photo::Photo;

/// First-pass attendance over one group photo.
///
/// Encodes the photo, matches every detection against the gallery,
/// builds the roster and hands back a reconciliation session holding
/// whatever stayed unrecognized.
pub struct TakeAttendanceUseCase {
    encoder: Arc<dyn FaceEncoder>,
    config: MatchConfig,
}

impl TakeAttendanceUseCase {
    pub fn new(encoder: Arc<dyn FaceEncoder>, config: MatchConfig) -> Self {
        Self { encoder, config }
    }

    pub fn execute(
        &self,
        photo: &Photo,
        store: EncodingStore,
    ) -> Result<ReconciliationSession, Box<dyn std::error::Error>> {
        let faces = self.encoder.encode(photo)?;
        log::info!("Detected {} faces in group photo", faces.len());

        let detections = Detection::from_faces(faces);
        let mut verdicts = Vec::with_capacity(detections.len());
        for detection in detections {
            let verdict = match_detection(&detection.encoding, &store, &self.config)?;
            verdicts.push((detection, verdict));
        }

        let roster = RosterBuilder::build(verdicts, &store);
        log::info!(
            "Roster: {} present, {} absent, {} unrecognized",
            roster.present.len(),
            roster.absent.len(),
            roster.unrecognized.len()
        );

        Ok(ReconciliationSession::new(
            self.encoder.clone(),
            store,
            roster,
            self.config,
        ))
    }
}
