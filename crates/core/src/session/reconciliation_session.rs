use std::sync::Arc;

use thiserror::Error;

use crate::encoding::domain::face_encoder::{DetectedFace, FaceEncoder};
use crate::gallery::domain::encoding_store::{EncodingStore, GalleryError, StudentId};
use crate::matching::domain::detection::{Detection, DetectionId};
use crate::matching::domain::match_engine::{
    match_detection, MatchConfig, MatchError, MatchVerdict,
};
use crate::matching::domain::roster_builder::{PresentEntry, Roster};
use crate::shared::photo::Photo;

/// Lifecycle of a reconciliation session.
///
/// `Resolving` is only held while a reupload is being processed; every
/// operation returns with the session back in `Open` or `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Resolving,
    Closed,
}

/// Operator-supplied label for a reupload.
///
/// The label is authoritative: the engine's own match verdict is surfaced
/// for the operator's benefit but never overrides it.
#[derive(Clone, Debug)]
pub enum ReuploadLabel {
    /// The face belongs to an already-enrolled student.
    Enrolled(StudentId),
    /// The face belongs to a student the gallery has never seen.
    NewStudent { student_id: StudentId, name: String },
}

#[derive(Error, Debug)]
pub enum ReuploadError {
    #[error("session is closed")]
    SessionClosed,
    #[error("no pending unrecognized entry {0}")]
    UnknownEntry(DetectionId),
    #[error("no face detected in reupload image")]
    NoFaceDetected,
    #[error("reupload image contains {count} faces, expected exactly one")]
    AmbiguousImage { count: usize },
    #[error("encoder failed: {0}")]
    Encoder(String),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// What happened to one accepted reupload.
#[derive(Clone, Debug)]
pub struct ReuploadOutcome {
    pub student_id: StudentId,
    /// The engine's opinion of the reupload against the gallery as it
    /// stood before the mutation. Advisory only.
    pub verdict: MatchVerdict,
    pub newly_enrolled: bool,
}

/// Validates the single-face contract for reupload images.
///
/// Also used by drivers that fold labeled photos into the gallery
/// outside a live session.
pub fn expect_single_face(mut faces: Vec<DetectedFace>) -> Result<DetectedFace, ReuploadError> {
    match faces.len() {
        0 => Err(ReuploadError::NoFaceDetected),
        1 => Ok(faces.remove(0)),
        count => Err(ReuploadError::AmbiguousImage { count }),
    }
}

/// One attendance run's interactive tail: holds the roster and the
/// gallery, feeds operator reuploads back through the match engine, and
/// folds accepted labels into both.
///
/// Mutation runs behind `&mut self`, so at most one reupload is in
/// flight. A failed reupload leaves roster, gallery and pending queue
/// untouched.
pub struct ReconciliationSession {
    encoder: Arc<dyn FaceEncoder>,
    store: EncodingStore,
    roster: Roster,
    config: MatchConfig,
    pending: Vec<DetectionId>,
    state: SessionState,
}

impl std::fmt::Debug for ReconciliationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationSession")
            .field("store", &self.store)
            .field("roster", &self.roster)
            .field("config", &self.config)
            .field("pending", &self.pending)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ReconciliationSession {
    pub fn new(
        encoder: Arc<dyn FaceEncoder>,
        store: EncodingStore,
        roster: Roster,
        config: MatchConfig,
    ) -> Self {
        let pending: Vec<DetectionId> = roster.unrecognized.iter().map(|d| d.id).collect();
        let state = if pending.is_empty() {
            SessionState::Closed
        } else {
            SessionState::Open
        };
        Self {
            encoder,
            store,
            roster,
            config,
            pending,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn store(&self) -> &EncodingStore {
        &self.store
    }

    /// Unresolved entries awaiting operator input, in roster order.
    pub fn pending(&self) -> &[DetectionId] {
        &self.pending
    }

    /// Processes one operator reupload for a pending unrecognized entry.
    ///
    /// The image must contain exactly one face. The face is matched
    /// against the current gallery for the advisory verdict, then the
    /// operator's label decides: merge the encoding into an enrolled
    /// student's references, or enroll a brand-new student. Either way
    /// the pending detection moves to present evidence.
    ///
    /// All validation happens before any mutation; on error the session
    /// is unchanged and stays open for a retry.
    pub fn submit_reupload(
        &mut self,
        entry_id: DetectionId,
        photo: &Photo,
        label: ReuploadLabel,
    ) -> Result<ReuploadOutcome, ReuploadError> {
        if self.state == SessionState::Closed {
            return Err(ReuploadError::SessionClosed);
        }
        self.state = SessionState::Resolving;
        let result = self.resolve(entry_id, photo, label);
        self.state = if result.is_ok() && self.pending.is_empty() {
            SessionState::Closed
        } else {
            SessionState::Open
        };
        result
    }

    /// Ends the session. Remaining pending entries stay unrecognized in
    /// the final roster. Always safe and immediate.
    pub fn close(self) -> (Roster, EncodingStore) {
        (self.roster, self.store)
    }

    fn resolve(
        &mut self,
        entry_id: DetectionId,
        photo: &Photo,
        label: ReuploadLabel,
    ) -> Result<ReuploadOutcome, ReuploadError> {
        if !self.pending.contains(&entry_id) {
            return Err(ReuploadError::UnknownEntry(entry_id));
        }

        let faces = self
            .encoder
            .encode(photo)
            .map_err(|e| ReuploadError::Encoder(e.to_string()))?;
        let face = expect_single_face(faces)?;

        let verdict = match_detection(&face.encoding, &self.store, &self.config)?;

        // Distance between the stuck detection and the operator's photo
        // of the same person; becomes the present entry's score.
        let entry_index = self
            .roster
            .unrecognized
            .iter()
            .position(|d| d.id == entry_id)
            .ok_or(ReuploadError::UnknownEntry(entry_id))?;
        let resolved_distance = self.roster.unrecognized[entry_index]
            .encoding
            .distance(&face.encoding);

        // Gallery mutation is the last fallible step; everything after
        // it must not fail.
        let (student_id, newly_enrolled) = match label {
            ReuploadLabel::Enrolled(id) => {
                self.store.add_encoding(&id, face.encoding)?;
                (id, false)
            }
            ReuploadLabel::NewStudent { student_id, name } => {
                self.store.enroll(student_id.clone(), name, face.encoding)?;
                (student_id, true)
            }
        };

        let detection = self.roster.unrecognized.remove(entry_index);
        self.mark_present(&student_id, detection, resolved_distance);
        self.pending.retain(|p| *p != entry_id);

        Ok(ReuploadOutcome {
            student_id,
            verdict,
            newly_enrolled,
        })
    }

    fn mark_present(&mut self, student_id: &StudentId, detection: Detection, distance: f64) {
        if let Some(entry) = self
            .roster
            .present
            .iter_mut()
            .find(|e| &e.student_id == student_id)
        {
            // Already present: the detection joins the evidence, presence
            // itself is not duplicated.
            entry.distance = entry.distance.min(distance);
            entry.detections.push(detection);
            return;
        }

        let name = self
            .store
            .get(student_id)
            .map(|record| record.name.clone())
            .unwrap_or_default();
        self.roster
            .absent
            .retain(|entry| &entry.student_id != student_id);
        self.roster.present.push(PresentEntry {
            student_id: student_id.clone(),
            name,
            distance,
            detections: vec![detection],
        });
    }
}
