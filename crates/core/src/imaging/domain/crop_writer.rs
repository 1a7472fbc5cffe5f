use std::path::Path;

use crate::shared::photo::Photo;

/// Writes a face crop to an image file.
pub trait CropWriter: Send {
    /// Writes a photo to the given path, optionally resizing to the given dimensions.
    fn write(
        &self,
        path: &Path,
        photo: &Photo,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
