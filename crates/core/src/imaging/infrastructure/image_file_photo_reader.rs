use std::path::Path;

use crate::imaging::domain::photo_reader::PhotoReader;
use crate::shared::photo::Photo;

/// Decodes image files with the `image` crate, converting to RGB.
pub struct ImageFilePhotoReader;

impl ImageFilePhotoReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFilePhotoReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotoReader for ImageFilePhotoReader {
    fn read(&self, path: &Path) -> Result<Photo, Box<dyn std::error::Error>> {
        let img = image::open(path)?.to_rgb8();
        let (width, height) = (img.width(), img.height());
        Ok(Photo::new(img.into_raw(), width, height))
    }
}
