use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::face_encoding::FaceEncoding;

/// Unique student identifier (roll number).
///
/// `Ord` over the roll string is the deterministic tie-break key used
/// throughout matching.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(roll_no: impl Into<String>) -> Self {
        Self(roll_no.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("corrupt dataset: {0}")]
    CorruptDataset(String),
    #[error("encoding dimension mismatch: gallery has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("unknown student: {0}")]
    UnknownStudent(StudentId),
    #[error("student already enrolled: {0}")]
    StudentExists(StudentId),
}

/// Persisted form of the gallery, exchanged with storage collaborators.
///
/// Deliberately flat: a list of students, each with a display name and
/// reference encodings. Validation happens in [`EncodingStore::load`],
/// not here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedGallery {
    pub students: Vec<SerializedStudent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedStudent {
    pub roll_no: String,
    pub name: String,
    pub encodings: Vec<FaceEncoding>,
}

/// One enrolled student's display name and reference encodings.
#[derive(Clone, Debug, PartialEq)]
pub struct StudentRecord {
    pub name: String,
    pub encodings: Vec<FaceEncoding>,
}

/// In-memory reference gallery: student → reference encodings.
///
/// Iteration is in ascending [`StudentId`] order, so every consumer sees
/// the same deterministic ordering. The nominal four-photos-per-student
/// convention is an enrollment-time recommendation; the store accepts
/// any count from one upward.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodingStore {
    students: BTreeMap<StudentId, StudentRecord>,
    dim: Option<usize>,
}

impl EncodingStore {
    /// Builds a store from its persisted form.
    ///
    /// Fails with [`GalleryError::CorruptDataset`] when a student has zero
    /// encodings, when two entries share a roll number, or when encodings
    /// disagree on dimensionality.
    pub fn load(gallery: SerializedGallery) -> Result<Self, GalleryError> {
        let mut store = EncodingStore::default();

        for student in gallery.students {
            if student.encodings.is_empty() {
                return Err(GalleryError::CorruptDataset(format!(
                    "student {} has no reference encodings",
                    student.roll_no
                )));
            }

            let id = StudentId::new(student.roll_no);
            if store.students.contains_key(&id) {
                return Err(GalleryError::CorruptDataset(format!(
                    "duplicate roll number {id}"
                )));
            }

            for encoding in &student.encodings {
                match store.dim {
                    None => store.dim = Some(encoding.dim()),
                    Some(expected) if expected != encoding.dim() => {
                        return Err(GalleryError::CorruptDataset(format!(
                            "student {id} mixes encoding dimensionalities ({expected} vs {})",
                            encoding.dim()
                        )));
                    }
                    Some(_) => {}
                }
            }

            store.students.insert(
                id,
                StudentRecord {
                    name: student.name,
                    encodings: student.encodings,
                },
            );
        }

        Ok(store)
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    /// Shared encoding dimensionality, `None` while the store is empty.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn contains(&self, id: &StudentId) -> bool {
        self.students.contains_key(id)
    }

    pub fn get(&self, id: &StudentId) -> Option<&StudentRecord> {
        self.students.get(id)
    }

    /// Ascending-id iteration over all enrolled students.
    pub fn students(&self) -> impl Iterator<Item = (&StudentId, &StudentRecord)> {
        self.students.iter()
    }

    /// Appends one reference encoding to an already-enrolled student.
    ///
    /// No upper bound on gallery size, and no check that the new encoding
    /// resembles the existing ones — resemblance is the match engine's
    /// business, not the store's.
    pub fn add_encoding(
        &mut self,
        id: &StudentId,
        encoding: FaceEncoding,
    ) -> Result<(), GalleryError> {
        self.check_dim(&encoding)?;
        let record = self
            .students
            .get_mut(id)
            .ok_or_else(|| GalleryError::UnknownStudent(id.clone()))?;
        record.encodings.push(encoding);
        Ok(())
    }

    /// Creates a new identity with a single reference encoding.
    pub fn enroll(
        &mut self,
        id: StudentId,
        name: impl Into<String>,
        encoding: FaceEncoding,
    ) -> Result<(), GalleryError> {
        self.check_dim(&encoding)?;
        if self.students.contains_key(&id) {
            return Err(GalleryError::StudentExists(id));
        }
        if self.dim.is_none() {
            self.dim = Some(encoding.dim());
        }
        self.students.insert(
            id,
            StudentRecord {
                name: name.into(),
                encodings: vec![encoding],
            },
        );
        Ok(())
    }

    /// Produces the persisted form, in ascending-id order.
    pub fn serialize(&self) -> SerializedGallery {
        SerializedGallery {
            students: self
                .students
                .iter()
                .map(|(id, record)| SerializedStudent {
                    roll_no: id.as_str().to_string(),
                    name: record.name.clone(),
                    encodings: record.encodings.clone(),
                })
                .collect(),
        }
    }

    fn check_dim(&self, encoding: &FaceEncoding) -> Result<(), GalleryError> {
        match self.dim {
            Some(expected) if expected != encoding.dim() => Err(GalleryError::DimensionMismatch {
                expected,
                got: encoding.dim(),
            }),
            _ => Ok(()),
        }
    }
}
