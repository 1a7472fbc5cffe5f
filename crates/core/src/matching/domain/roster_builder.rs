use std::collections::HashMap;

use serde::Serialize;

use crate::gallery::domain::encoding_store::{EncodingStore, StudentId};
use crate::matching::domain::detection::Detection;
use crate::matching::domain::match_engine::MatchVerdict;

/// One present student with supporting detections.
///
/// A lookalike or a split detection can match the same student twice;
/// the student stays present once and every matching detection is kept
/// as evidence.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PresentEntry {
    pub student_id: StudentId,
    pub name: String,
    /// Smallest match distance among the supporting detections.
    pub distance: f64,
    pub detections: Vec<Detection>,
}

impl PresentEntry {
    /// Operator-facing score: `1 - distance`, as reported by the original
    /// attendance sheets. May go negative for very loose thresholds.
    pub fn confidence(&self) -> f64 {
        1.0 - self.distance
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AbsentEntry {
    pub student_id: StudentId,
    pub name: String,
}

/// Attendance outcome for one group photo.
///
/// Every enrolled student appears in exactly one of `present`/`absent`;
/// every detection appears in exactly one of present-evidence/
/// `unrecognized`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Roster {
    pub present: Vec<PresentEntry>,
    pub absent: Vec<AbsentEntry>,
    pub unrecognized: Vec<Detection>,
}

impl Roster {
    /// Mean confidence across present students, 0 when nobody is present.
    pub fn average_confidence(&self) -> f64 {
        if self.present.is_empty() {
            return 0.0;
        }
        self.present.iter().map(PresentEntry::confidence).sum::<f64>() / self.present.len() as f64
    }
}

/// Folds per-detection verdicts into the three roster lists.
pub struct RosterBuilder;

impl RosterBuilder {
    /// Pure function of the verdict sequence and the enrolled set.
    ///
    /// Present entries appear in first-match order, absent entries in
    /// ascending id order, unrecognized detections in input order.
    pub fn build(verdicts: Vec<(Detection, MatchVerdict)>, store: &EncodingStore) -> Roster {
        let mut present: Vec<PresentEntry> = Vec::new();
        let mut present_index: HashMap<StudentId, usize> = HashMap::new();
        let mut unrecognized: Vec<Detection> = Vec::new();

        for (detection, verdict) in verdicts {
            match verdict {
                MatchVerdict::Matched {
                    student_id,
                    distance,
                } => match present_index.get(&student_id) {
                    Some(&i) => {
                        let entry = &mut present[i];
                        entry.distance = entry.distance.min(distance);
                        entry.detections.push(detection);
                    }
                    None => {
                        let name = store
                            .get(&student_id)
                            .map(|record| record.name.clone())
                            .unwrap_or_default();
                        present_index.insert(student_id.clone(), present.len());
                        present.push(PresentEntry {
                            student_id,
                            name,
                            distance,
                            detections: vec![detection],
                        });
                    }
                },
                MatchVerdict::Unrecognized => unrecognized.push(detection),
            }
        }

        let absent = store
            .students()
            .filter(|(id, _)| !present_index.contains_key(*id))
            .map(|(id, record)| AbsentEntry {
                student_id: id.clone(),
                name: record.name.clone(),
            })
            .collect();

        Roster {
            present,
            absent,
            unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::domain::encoding_store::{SerializedGallery, SerializedStudent};
    use crate::matching::domain::detection::DetectionId;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::face_encoding::FaceEncoding;
    use approx::assert_relative_eq;

    fn store_ab() -> EncodingStore {
        EncodingStore::load(SerializedGallery {
            students: vec![
                SerializedStudent {
                    roll_no: "A".to_string(),
                    name: "Ada".to_string(),
                    encodings: vec![
                        FaceEncoding::new(vec![1.0, 0.0]),
                        FaceEncoding::new(vec![0.9, 0.1]),
                    ],
                },
                SerializedStudent {
                    roll_no: "B".to_string(),
                    name: "Bea".to_string(),
                    encodings: vec![
                        FaceEncoding::new(vec![0.0, 1.0]),
                        FaceEncoding::new(vec![0.1, 0.9]),
                    ],
                },
            ],
        })
        .unwrap()
    }

    fn detection(id: usize) -> Detection {
        Detection {
            id: DetectionId(id),
            encoding: FaceEncoding::new(vec![0.5, 0.5]),
            bounding_box: BoundingBox {
                x: 10 * id as i32,
                y: 0,
                width: 10,
                height: 10,
            },
            confidence: 0.9,
        }
    }

    fn matched(roll_no: &str, distance: f64) -> MatchVerdict {
        MatchVerdict::Matched {
            student_id: StudentId::new(roll_no),
            distance,
        }
    }

    // ── Scenarios ────────────────────────────────────────────────────

    #[test]
    fn test_both_matched_one_unrecognized() {
        // d1≈A (0.2), d2≈B (0.1), d3 unrelated (0.9), τ applied upstream
        let roster = RosterBuilder::build(
            vec![
                (detection(0), matched("A", 0.2)),
                (detection(1), matched("B", 0.1)),
                (detection(2), MatchVerdict::Unrecognized),
            ],
            &store_ab(),
        );

        let present_ids: Vec<&str> = roster
            .present
            .iter()
            .map(|e| e.student_id.as_str())
            .collect();
        assert_eq!(present_ids, vec!["A", "B"]);
        assert!(roster.absent.is_empty());
        assert_eq!(roster.unrecognized.len(), 1);
        assert_eq!(roster.unrecognized[0].id, DetectionId(2));
    }

    #[test]
    fn test_duplicate_detections_keep_student_present_once() {
        // Two detections both match A — expected edge case, not a failure
        let roster = RosterBuilder::build(
            vec![
                (detection(0), matched("A", 0.2)),
                (detection(1), matched("A", 0.3)),
            ],
            &store_ab(),
        );

        assert_eq!(roster.present.len(), 1);
        let entry = &roster.present[0];
        assert_eq!(entry.student_id.as_str(), "A");
        assert_eq!(entry.detections.len(), 2);
        assert_relative_eq!(entry.distance, 0.2);

        let absent_ids: Vec<&str> = roster.absent.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(absent_ids, vec!["B"]);
    }

    #[test]
    fn test_duplicate_keeps_best_distance_regardless_of_order() {
        let roster = RosterBuilder::build(
            vec![
                (detection(0), matched("A", 0.4)),
                (detection(1), matched("A", 0.1)),
            ],
            &store_ab(),
        );
        assert_relative_eq!(roster.present[0].distance, 0.1);
    }

    #[test]
    fn test_no_detections_everyone_absent() {
        let roster = RosterBuilder::build(vec![], &store_ab());
        assert!(roster.present.is_empty());
        assert_eq!(roster.absent.len(), 2);
        assert!(roster.unrecognized.is_empty());
    }

    // ── Invariants ───────────────────────────────────────────────────

    #[test]
    fn test_partition_invariant() {
        let store = store_ab();
        let roster = RosterBuilder::build(
            vec![
                (detection(0), matched("A", 0.2)),
                (detection(1), MatchVerdict::Unrecognized),
                (detection(2), matched("A", 0.5)),
            ],
            &store,
        );

        // Every enrolled student in exactly one of present/absent
        let mut seen: Vec<&str> = roster
            .present
            .iter()
            .map(|e| e.student_id.as_str())
            .chain(roster.absent.iter().map(|e| e.student_id.as_str()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["A", "B"]);

        // Every detection in exactly one of evidence/unrecognized
        let mut detection_ids: Vec<DetectionId> = roster
            .present
            .iter()
            .flat_map(|e| e.detections.iter().map(|d| d.id))
            .chain(roster.unrecognized.iter().map(|d| d.id))
            .collect();
        detection_ids.sort();
        assert_eq!(
            detection_ids,
            vec![DetectionId(0), DetectionId(1), DetectionId(2)]
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let verdicts = || {
            vec![
                (detection(0), matched("B", 0.3)),
                (detection(1), MatchVerdict::Unrecognized),
                (detection(2), matched("A", 0.2)),
            ]
        };
        let a = RosterBuilder::build(verdicts(), &store_ab());
        let b = RosterBuilder::build(verdicts(), &store_ab());
        assert_eq!(a, b);
    }

    #[test]
    fn test_present_order_follows_first_match() {
        let roster = RosterBuilder::build(
            vec![
                (detection(0), matched("B", 0.3)),
                (detection(1), matched("A", 0.2)),
            ],
            &store_ab(),
        );
        let present_ids: Vec<&str> = roster
            .present
            .iter()
            .map(|e| e.student_id.as_str())
            .collect();
        assert_eq!(present_ids, vec!["B", "A"]);
    }

    #[test]
    fn test_unrecognized_retains_bounding_box() {
        let roster = RosterBuilder::build(
            vec![(detection(3), MatchVerdict::Unrecognized)],
            &store_ab(),
        );
        assert_eq!(roster.unrecognized[0].bounding_box.x, 30);
    }

    // ── Confidence ───────────────────────────────────────────────────

    #[test]
    fn test_average_confidence() {
        let roster = RosterBuilder::build(
            vec![
                (detection(0), matched("A", 0.2)),
                (detection(1), matched("B", 0.4)),
            ],
            &store_ab(),
        );
        // (0.8 + 0.6) / 2
        assert_relative_eq!(roster.average_confidence(), 0.7);
    }

    #[test]
    fn test_average_confidence_empty_roster() {
        let roster = RosterBuilder::build(vec![], &store_ab());
        assert_relative_eq!(roster.average_confidence(), 0.0);
    }
}
