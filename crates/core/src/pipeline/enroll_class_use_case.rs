use std::sync::Arc;

use crate::encoding::domain::face_encoder::FaceEncoder;
use crate::gallery::domain::encoding_store::{EncodingStore, StudentId};
use crate::shared::face_encoding::FaceEncoding;
use crate::shared::photo::Photo;

/// One labeled reference photo queued for enrollment.
pub struct ReferencePhoto {
    pub student_id: StudentId,
    pub name: String,
    pub photo: Photo,
}

/// A reference photo that produced no usable encoding.
#[derive(Clone, Debug)]
pub struct SkippedPhoto {
    pub student_id: StudentId,
    pub reason: String,
}

type EncodeOutcome = (usize, StudentId, String, Result<FaceEncoding, String>);

/// Builds a fresh gallery from a batch of labeled reference photos.
///
/// Encoding fans out over a worker pool sharing one encoder; results are
/// folded back in submission order, so the resulting store is identical
/// regardless of worker interleaving. Photos without a detectable face
/// are skipped and reported, mirroring how the roster tolerates
/// imperfect reference material elsewhere.
pub struct EnrollClassUseCase {
    encoder: Arc<dyn FaceEncoder>,
    workers: usize,
}

impl EnrollClassUseCase {
    pub fn new(encoder: Arc<dyn FaceEncoder>, workers: Option<usize>) -> Self {
        let workers = workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Self {
            encoder,
            workers: workers.max(1),
        }
    }

    pub fn execute(
        &self,
        photos: Vec<ReferencePhoto>,
    ) -> Result<(EncodingStore, Vec<SkippedPhoto>), Box<dyn std::error::Error>> {
        let total = photos.len();
        log::info!("Enrolling from {total} reference photos across {} workers", self.workers);

        let (job_tx, job_rx) = crossbeam_channel::bounded::<(usize, ReferencePhoto)>(self.workers);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<EncodeOutcome>();

        let mut results: Vec<EncodeOutcome> = std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let encoder = Arc::clone(&self.encoder);
                scope.spawn(move || {
                    for (index, job) in job_rx {
                        let outcome = encode_reference(&*encoder, &job.photo);
                        if result_tx
                            .send((index, job.student_id, job.name, outcome))
                            .is_err()
                        {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            for (index, job) in photos.into_iter().enumerate() {
                if job_tx.send((index, job)).is_err() {
                    break;
                }
            }
            drop(job_tx);

            result_rx.iter().collect()
        });

        if results.len() != total {
            return Err("enrollment worker terminated early".into());
        }

        // Submission order, not completion order
        results.sort_by_key(|(index, _, _, _)| *index);

        let mut store = EncodingStore::default();
        let mut skipped = Vec::new();
        for (_, student_id, name, outcome) in results {
            match outcome {
                Ok(encoding) => {
                    if store.contains(&student_id) {
                        store.add_encoding(&student_id, encoding)?;
                    } else {
                        store.enroll(student_id, name, encoding)?;
                    }
                }
                Err(reason) => {
                    log::warn!("Skipping reference photo for {student_id}: {reason}");
                    skipped.push(SkippedPhoto { student_id, reason });
                }
            }
        }

        log::info!(
            "Enrolled {} students ({} photos skipped)",
            store.len(),
            skipped.len()
        );
        Ok((store, skipped))
    }
}

/// Encode one reference photo, keeping the highest-confidence face when
/// the detector finds several.
fn encode_reference(encoder: &dyn FaceEncoder, photo: &Photo) -> Result<FaceEncoding, String> {
    let faces = encoder.encode(photo).map_err(|e| e.to_string())?;
    faces
        .into_iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|face| face.encoding)
        .ok_or_else(|| "no face detected".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::domain::face_encoder::DetectedFace;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::face_encoding::FaceEncoding;

    // --- Stubs ---

    /// Derives encodings from pixel values, so outputs are a pure
    /// function of the input photo. A photo whose first byte is zero
    /// counts as faceless.
    struct PixelEncoder;

    impl FaceEncoder for PixelEncoder {
        fn encode(&self, photo: &Photo) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
            let first = photo.data()[0];
            if first == 0 {
                return Ok(vec![]);
            }
            Ok(vec![DetectedFace {
                encoding: FaceEncoding::new(vec![first as f32, photo.data()[1] as f32]),
                bounding_box: BoundingBox {
                    x: 0,
                    y: 0,
                    width: 2,
                    height: 2,
                },
                confidence: 0.9,
            }])
        }
    }

    /// Two faces per photo with distinct confidences.
    struct TwoFaceEncoder;

    impl FaceEncoder for TwoFaceEncoder {
        fn encode(&self, _photo: &Photo) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
            let bbox = BoundingBox {
                x: 0,
                y: 0,
                width: 2,
                height: 2,
            };
            Ok(vec![
                DetectedFace {
                    encoding: FaceEncoding::new(vec![1.0, 0.0]),
                    bounding_box: bbox,
                    confidence: 0.4,
                },
                DetectedFace {
                    encoding: FaceEncoding::new(vec![0.0, 1.0]),
                    bounding_box: bbox,
                    confidence: 0.8,
                },
            ])
        }
    }

    // --- Helpers ---

    fn photo_with(first: u8, second: u8) -> Photo {
        let mut data = vec![7u8; 2 * 2 * 3];
        data[0] = first;
        data[1] = second;
        Photo::new(data, 2, 2)
    }

    fn reference(roll_no: &str, name: &str, first: u8, second: u8) -> ReferencePhoto {
        ReferencePhoto {
            student_id: StudentId::new(roll_no),
            name: name.to_string(),
            photo: photo_with(first, second),
        }
    }

    fn batch() -> Vec<ReferencePhoto> {
        vec![
            reference("101", "Ada", 10, 1),
            reference("101", "Ada", 11, 2),
            reference("102", "Bea", 20, 1),
            reference("103", "Cid", 30, 1),
            reference("102", "Bea", 21, 2),
        ]
    }

    // --- Tests ---

    #[test]
    fn test_enrolls_all_students_with_all_photos() {
        let uc = EnrollClassUseCase::new(Arc::new(PixelEncoder), Some(3));
        let (store, skipped) = uc.execute(batch()).unwrap();

        assert!(skipped.is_empty());
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get(&StudentId::new("101")).unwrap().encodings.len(),
            2
        );
        assert_eq!(
            store.get(&StudentId::new("102")).unwrap().encodings.len(),
            2
        );
        assert_eq!(
            store.get(&StudentId::new("103")).unwrap().encodings.len(),
            1
        );
    }

    #[test]
    fn test_result_independent_of_worker_count() {
        let single = EnrollClassUseCase::new(Arc::new(PixelEncoder), Some(1))
            .execute(batch())
            .unwrap()
            .0;
        let parallel = EnrollClassUseCase::new(Arc::new(PixelEncoder), Some(4))
            .execute(batch())
            .unwrap()
            .0;
        assert_eq!(single, parallel);
    }

    #[test]
    fn test_encodings_kept_in_submission_order() {
        let uc = EnrollClassUseCase::new(Arc::new(PixelEncoder), Some(4));
        let (store, _) = uc.execute(batch()).unwrap();

        let encodings = &store.get(&StudentId::new("101")).unwrap().encodings;
        assert_eq!(encodings[0].values(), &[10.0, 1.0]);
        assert_eq!(encodings[1].values(), &[11.0, 2.0]);
    }

    #[test]
    fn test_faceless_photo_is_skipped_and_reported() {
        let photos = vec![
            reference("101", "Ada", 10, 1),
            reference("102", "Bea", 0, 0), // faceless
        ];
        let uc = EnrollClassUseCase::new(Arc::new(PixelEncoder), Some(2));
        let (store, skipped) = uc.execute(photos).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].student_id.as_str(), "102");
        assert!(skipped[0].reason.contains("no face"));
    }

    #[test]
    fn test_highest_confidence_face_wins() {
        let photos = vec![reference("101", "Ada", 10, 1)];
        let uc = EnrollClassUseCase::new(Arc::new(TwoFaceEncoder), Some(1));
        let (store, _) = uc.execute(photos).unwrap();

        let encodings = &store.get(&StudentId::new("101")).unwrap().encodings;
        assert_eq!(encodings[0].values(), &[0.0, 1.0]);
    }

    #[test]
    fn test_empty_batch_yields_empty_store() {
        let uc = EnrollClassUseCase::new(Arc::new(PixelEncoder), Some(2));
        let (store, skipped) = uc.execute(vec![]).unwrap();
        assert!(store.is_empty());
        assert!(skipped.is_empty());
    }
}
