use std::path::Path;

use crate::imaging::domain::crop_writer::CropWriter;
use crate::shared::photo::Photo;

/// Writes a photo to an image file using the `image` crate.
///
/// Supports optional resizing for thumbnails.
pub struct ImageFileCropWriter;

impl ImageFileCropWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileCropWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CropWriter for ImageFileCropWriter {
    fn write(
        &self,
        path: &Path,
        photo: &Photo,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // Ensure parent directory exists (infrastructure concern)
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let img = image::RgbImage::from_raw(photo.width(), photo.height(), photo.data().to_vec())
            .ok_or("Failed to create image from photo data")?;

        let img = if let Some((w, h)) = size {
            image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        img.save(path)?;
        Ok(())
    }
}
