use std::path::Path;

use crate::shared::photo::Photo;

/// Decodes an image file into an RGB photo.
pub trait PhotoReader: Send {
    fn read(&self, path: &Path) -> Result<Photo, Box<dyn std::error::Error>>;
}
