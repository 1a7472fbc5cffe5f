use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::gallery::domain::encoding_store::SerializedGallery;
use crate::gallery::domain::gallery_repository::GalleryRepository;

#[derive(Error, Debug)]
pub enum GalleryFileError {
    #[error("failed to read gallery {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse gallery {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize gallery: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write gallery {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File-backed gallery persistence using pretty-printed JSON.
///
/// Saves go through a `.part` temp file and a rename, so a crash mid-write
/// never leaves a truncated gallery behind.
pub struct JsonGalleryRepository {
    path: PathBuf,
}

impl JsonGalleryRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GalleryRepository for JsonGalleryRepository {
    fn load(&self) -> Result<SerializedGallery, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(&self.path).map_err(|e| GalleryFileError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let gallery = serde_json::from_str(&json).map_err(|e| GalleryFileError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(gallery)
    }

    fn save(&self, gallery: &SerializedGallery) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| GalleryFileError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(gallery).map_err(GalleryFileError::Serialize)?;

        let temp_path = self.path.with_extension("part");
        fs::write(&temp_path, json).map_err(|e| GalleryFileError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| GalleryFileError::Write {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }
}
