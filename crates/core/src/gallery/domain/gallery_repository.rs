use crate::gallery::domain::encoding_store::SerializedGallery;

/// Persistence seam for the reference gallery.
///
/// The core loads at session start and saves after mutation; where the
/// bytes live (file, object store, …) is the implementation's business.
pub trait GalleryRepository: Send {
    fn load(&self) -> Result<SerializedGallery, Box<dyn std::error::Error>>;

    fn save(&self, gallery: &SerializedGallery) -> Result<(), Box<dyn std::error::Error>>;
}
