use std::path::{Path, PathBuf};

use crate::imaging::domain::crop_writer::CropWriter;
use crate::matching::domain::detection::DetectionId;
use crate::matching::domain::roster_builder::Roster;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::photo::Photo;

/// Exported thumbnail size in pixels.
const THUMBNAIL_SIZE: u32 = 256;

/// Saves a thumbnail of every unrecognized detection for the operator.
///
/// Files are named by detection id, so a reupload can be targeted back
/// at the entry it came from.
pub struct ExportUnrecognizedUseCase {
    writer: Box<dyn CropWriter>,
}

impl ExportUnrecognizedUseCase {
    pub fn new(writer: Box<dyn CropWriter>) -> Self {
        Self { writer }
    }

    /// Returns the saved `(detection id, path)` pairs in roster order.
    pub fn execute(
        &self,
        photo: &Photo,
        roster: &Roster,
        output_dir: &Path,
    ) -> Result<Vec<(DetectionId, PathBuf)>, Box<dyn std::error::Error>> {
        let mut saved = Vec::with_capacity(roster.unrecognized.len());

        for detection in &roster.unrecognized {
            let crop = square_crop(photo, &detection.bounding_box);
            let path = output_dir.join(format!("{}.jpg", detection.id));
            self.writer
                .write(&path, &crop, Some((THUMBNAIL_SIZE, THUMBNAIL_SIZE)))?;
            saved.push((detection.id, path));
        }

        Ok(saved)
    }
}

/// Extracts a square crop centered on the box, clamped to photo bounds.
fn square_crop(photo: &Photo, bbox: &BoundingBox) -> Photo {
    let cx = bbox.x + bbox.width / 2;
    let cy = bbox.y + bbox.height / 2;
    let half = bbox.width.max(bbox.height) / 2;

    photo.crop(&BoundingBox {
        x: cx - half,
        y: cy - half,
        width: half * 2,
        height: half * 2,
    })
}
