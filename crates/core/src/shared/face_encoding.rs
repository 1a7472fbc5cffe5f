use serde::{Deserialize, Serialize};

/// A fixed-length face embedding produced by an encoder.
///
/// Immutable once produced. Vectors are L2-normalized at the encoder
/// boundary; the gallery and the match engine assume nothing beyond a
/// consistent dimensionality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEncoding(Vec<f32>);

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Scale the vector to unit length. A zero vector is left unchanged.
    pub fn l2_normalize(&mut self) {
        let norm: f32 = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in self.0.iter_mut() {
                *x /= norm;
            }
        }
    }

    /// Euclidean distance to another encoding, accumulated in f64.
    pub fn distance(&self, other: &FaceEncoding) -> f64 {
        debug_assert_eq!(
            self.dim(),
            other.dim(),
            "encodings must share a dimensionality"
        );
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = (*a as f64) - (*b as f64);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}
